pub mod api;
pub mod auth;
pub mod error;
pub mod rate_limit;

use crate::cli::Args;
use axum::Router;
use log::{ info, warn };
use std::error::Error;
use std::net::SocketAddr;

pub use self::api::{ build_router, AppState };

pub struct Server {
    addr: String,
    state: AppState,
    args: Args,
}

impl Server {
    pub fn new(addr: String, state: AppState, args: Args) -> Self {
        Self { addr, state, args }
    }

    fn tls_paths(&self) -> Option<(&str, &str)> {
        if !self.args.enable_tls {
            return None;
        }
        match (self.args.tls_cert_path.as_deref(), self.args.tls_key_path.as_deref()) {
            (Some(cert), Some(key)) => Some((cert, key)),
            _ => None,
        }
    }

    pub async fn run(self) -> Result<(), Box<dyn Error + Send + Sync>> {
        let addr = self.addr.parse::<SocketAddr>()?;
        let app: Router = build_router(self.state.clone());

        if let Some((cert_path, key_path)) = self.tls_paths() {
            let tls_config = axum_server::tls_rustls::RustlsConfig::from_pem_file(
                cert_path,
                key_path
            ).await?;
            info!("HTTPS server listening on https://{}", addr);
            axum_server
                ::bind_rustls(addr, tls_config)
                .serve(app.into_make_service_with_connect_info::<SocketAddr>()).await?;
        } else {
            if self.args.enable_tls {
                warn!("ENABLE_TLS is set but TLS_CERT_PATH/TLS_KEY_PATH are missing, serving plain HTTP");
            }
            let listener = tokio::net::TcpListener::bind(addr).await?;
            info!("HTTP server listening on http://{}", addr);
            axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
        }
        Ok(())
    }
}
