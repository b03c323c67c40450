use axum::extract::rejection::JsonRejection;
use axum::http::{ header, HeaderValue, StatusCode };
use axum::response::{ IntoResponse, Response };
use axum::Json;
use log::error;
use serde_json::json;

use crate::accounts::AuthError;
use crate::agent::ChatError;
use crate::error::StoreError;

/// Error surface of the HTTP layer. Rendered as `{"error": "..."}`.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    NotFound(String),
    Conflict(String),
    TooManyRequests {
        message: String,
        retry_after_secs: u64,
    },
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::TooManyRequests { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            ApiError::TooManyRequests { message, retry_after_secs } => {
                let mut response = (
                    status,
                    Json(json!({ "error": message, "retryAfter": retry_after_secs })),
                ).into_response();
                if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                    response.headers_mut().insert(header::RETRY_AFTER, value);
                }
                response
            }
            ApiError::Internal(detail) => {
                error!("Internal error: {}", detail);
                (status, Json(json!({ "error": "Internal server error" }))).into_response()
            }
            ApiError::BadRequest(message) |
            ApiError::Unauthorized(message) |
            ApiError::NotFound(message) |
            ApiError::Conflict(message) => {
                (status, Json(json!({ "error": message }))).into_response()
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => ApiError::NotFound("Not found".into()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::Unauthorized => ApiError::Unauthorized("Unauthorized".into()),
            AuthError::Validation(message) => ApiError::BadRequest(message),
            AuthError::EmailTaken => ApiError::Conflict(AuthError::EmailTaken.to_string()),
            AuthError::InvalidCredentials(message) => ApiError::Unauthorized(message.into()),
            AuthError::Store(inner) => ApiError::Internal(inner.to_string()),
            AuthError::Internal(detail) => ApiError::Internal(detail),
        }
    }
}

impl From<ChatError> for ApiError {
    fn from(e: ChatError) -> Self {
        match e {
            ChatError::EmptyMessage => ApiError::BadRequest(e.to_string()),
            ChatError::SessionNotFound => ApiError::NotFound(e.to_string()),
            ChatError::Store(inner) => ApiError::Internal(inner.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        let cases: Vec<(ApiError, StatusCode)> = vec![
            (ChatError::EmptyMessage.into(), StatusCode::BAD_REQUEST),
            (ChatError::SessionNotFound.into(), StatusCode::NOT_FOUND),
            (AuthError::EmailTaken.into(), StatusCode::CONFLICT),
            (AuthError::Unauthorized.into(), StatusCode::UNAUTHORIZED),
            (AuthError::InvalidCredentials("Invalid password").into(), StatusCode::UNAUTHORIZED),
            (StoreError::Backend("down".into()).into(), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }

    #[test]
    fn rate_limit_sets_retry_after() {
        let response = (ApiError::TooManyRequests {
            message: "slow down".into(),
            retry_after_secs: 42,
        }).into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "42");
    }
}
