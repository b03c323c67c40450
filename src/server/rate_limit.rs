use axum::extract::{ ConnectInfo, Request, State };
use axum::middleware::Next;
use axum::response::{ IntoResponse, Response };
use governor::clock::{ Clock, DefaultClock };
use governor::{ DefaultKeyedRateLimiter, Quota, RateLimiter };
use log::{ debug, warn };
use std::net::{ IpAddr, Ipv4Addr, SocketAddr };
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use super::error::ApiError;
use crate::cli::Args;

/// Tracked clients before idle entries are evicted.
const PRUNE_THRESHOLD: usize = 10_000;

/// One bucket per client address.
pub struct RouteLimiter {
    name: &'static str,
    limiter: DefaultKeyedRateLimiter<IpAddr>,
    message: &'static str,
}

impl RouteLimiter {
    /// Allows bursts of `max` requests, refilled evenly over `window`.
    pub fn new(name: &'static str, max: u32, window: Duration, message: &'static str) -> Self {
        let burst = NonZeroU32::new(max).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::with_period(window / burst.get())
            .unwrap_or_else(|| Quota::per_second(burst))
            .allow_burst(burst);
        Self { name, limiter: RateLimiter::keyed(quota), message }
    }

    /// `Err` carries the whole seconds until `client` may send again.
    pub fn check(&self, client: IpAddr) -> Result<(), u64> {
        if self.limiter.len() > PRUNE_THRESHOLD {
            self.limiter.retain_recent();
            debug!("Rate limit '{}' pruned to {} clients", self.name, self.limiter.len());
        }
        self.limiter.check_key(&client).map_err(|not_until| {
            let wait = not_until.wait_time_from(DefaultClock::default().now());
            wait.as_secs() + u64::from(wait.subsec_nanos() > 0)
        })
    }
}

#[derive(Clone)]
pub struct RateLimits {
    pub auth: Arc<RouteLimiter>,
    pub chat: Arc<RouteLimiter>,
    pub general: Arc<RouteLimiter>,
}

impl RateLimits {
    pub fn from_args(args: &Args) -> Self {
        Self {
            auth: Arc::new(
                RouteLimiter::new(
                    "auth",
                    args.auth_rate_limit,
                    Duration::from_secs(15 * 60),
                    "Too many authentication attempts. Please try again in 15 minutes."
                )
            ),
            chat: Arc::new(
                RouteLimiter::new(
                    "chat",
                    args.chat_rate_limit,
                    Duration::from_secs(60),
                    "You're sending messages too quickly. Please slow down."
                )
            ),
            general: Arc::new(
                RouteLimiter::new(
                    "general",
                    args.general_rate_limit,
                    Duration::from_secs(60),
                    "Too many requests. Please try again later."
                )
            ),
        }
    }
}

/// Peer address from the connection, or the unspecified address when the
/// router is driven without connect info.
fn client_ip(request: &Request) -> IpAddr {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

pub async fn enforce(
    State(limiter): State<Arc<RouteLimiter>>,
    request: Request,
    next: Next
) -> Response {
    let client = client_ip(&request);
    match limiter.check(client) {
        Ok(()) => next.run(request).await,
        Err(retry_after_secs) => {
            warn!(
                "Rate limit '{}' exceeded by {} on {}",
                limiter.name,
                client,
                request.uri().path()
            );
            (ApiError::TooManyRequests {
                message: limiter.message.to_string(),
                retry_after_secs: retry_after_secs.max(1),
            }).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
    }

    #[test]
    fn burst_then_reject() {
        let limiter = RouteLimiter::new("test", 3, Duration::from_secs(60), "slow");
        for _ in 0..3 {
            assert!(limiter.check(ip(1)).is_ok());
        }
        let retry = limiter.check(ip(1)).unwrap_err();
        assert!(retry >= 1 && retry <= 20);
    }

    #[test]
    fn clients_have_separate_buckets() {
        let limiter = RouteLimiter::new("test", 2, Duration::from_secs(60), "slow");
        assert!(limiter.check(ip(1)).is_ok());
        assert!(limiter.check(ip(1)).is_ok());
        assert!(limiter.check(ip(1)).is_err());

        assert!(limiter.check(ip(2)).is_ok());
        assert!(limiter.check(ip(2)).is_ok());
        assert!(limiter.check(ip(1)).is_err());
    }

    #[test]
    fn missing_connect_info_uses_unspecified_address() {
        let request = Request::builder().uri("/health").body(axum::body::Body::empty()).unwrap();
        assert_eq!(client_ip(&request), IpAddr::V4(Ipv4Addr::UNSPECIFIED));

        let mut request = Request::builder().uri("/health").body(axum::body::Body::empty()).unwrap();
        let peer: SocketAddr = "192.168.1.7:5000".parse().unwrap();
        request.extensions_mut().insert(ConnectInfo(peer));
        assert_eq!(client_ip(&request), peer.ip());
    }
}
