use axum::extract::FromRequestParts;
use axum::http::{ header, request::Parts, HeaderMap };

use super::api::AppState;
use super::error::ApiError;
use crate::accounts::AuthContext;

/// Extracts the caller from `Authorization: Bearer <token>`.
pub struct AuthUser(pub AuthContext);

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers).ok_or_else(||
            ApiError::Unauthorized("No token provided".into())
        )?;
        let ctx = state.accounts.authenticate(token).await?;
        Ok(AuthUser(ctx))
    }
}
