use axum::body::Bytes;
use axum::extract::rejection::JsonRejection;
use axum::extract::{ Path, State };
use axum::http::{ header, HeaderMap, HeaderValue, StatusCode };
use axum::middleware::from_fn_with_state;
use axum::response::IntoResponse;
use axum::routing::{ delete, get, post };
use axum::{ Json, Router };
use serde::de::DeserializeOwned;
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{ Any, CorsLayer };
use tower_http::set_header::SetResponseHeaderLayer;

use super::auth::AuthUser;
use super::error::ApiError;
use super::rate_limit::{ enforce, RateLimits };
use crate::accounts::AccountService;
use crate::agent::TherapyAgent;
use crate::models::account::{ LoginRequest, LoginResponse, RegisterRequest, RegisterResponse };
use crate::models::chat::{
    AiMetadataView,
    AiTurnView,
    CreateSessionRequest,
    CreateSessionResponse,
    HistoryEntry,
    SendMessageRequest,
    SendMessageResponse,
    SessionSummary,
    UserTurnView,
};
use crate::models::wellness::{ ActivityRequest, ActivityResponse, MoodRequest };
use crate::wellness::{ build_activity, build_mood, WellnessService };

#[derive(Clone)]
pub struct AppState {
    pub agent: Arc<TherapyAgent>,
    pub accounts: AccountService,
    pub wellness: WellnessService,
    pub limits: RateLimits,
}

type ApiResult<T> = Result<T, ApiError>;

/// Empty bodies read as `T::default()`.
fn optional_body<T: DeserializeOwned + Default>(body: &Bytes) -> ApiResult<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(format!("Invalid JSON body: {}", e)))
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    let auth_routes = Router::new()
        .route("/auth/register", post(register_handler))
        .route("/auth/login", post(login_handler))
        .route("/auth/logout", post(logout_handler))
        .route("/auth/me", get(me_handler))
        .route_layer(from_fn_with_state(state.limits.auth.clone(), enforce));

    let chat_routes = Router::new()
        .route("/chat/sessions", post(create_session_handler).get(list_sessions_handler))
        .route("/chat/sessions/{session_id}", delete(delete_session_handler))
        .route("/chat/sessions/{session_id}/messages", post(send_message_handler))
        .route("/chat/sessions/{session_id}/history", get(history_handler))
        .route_layer(from_fn_with_state(state.limits.chat.clone(), enforce));

    let general_routes = Router::new()
        .route("/mood", post(mood_handler))
        .route("/activities", post(activity_handler))
        .route("/activities/today", get(today_activities_handler))
        .route_layer(from_fn_with_state(state.limits.general.clone(), enforce));

    Router::new()
        .route("/health", get(health_handler))
        .merge(auth_routes)
        .merge(chat_routes)
        .merge(general_routes)
        .layer(
            SetResponseHeaderLayer::overriding(
                header::X_CONTENT_TYPE_OPTIONS,
                HeaderValue::from_static("nosniff")
            )
        )
        .layer(SetResponseHeaderLayer::overriding(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY")))
        .layer(
            SetResponseHeaderLayer::overriding(
                header::REFERRER_POLICY,
                HeaderValue::from_static("no-referrer")
            )
        )
        .layer(cors)
        .with_state(state)
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

// --- Auth ---

async fn register_handler(
    State(state): State<AppState>,
    body: Result<Json<RegisterRequest>, JsonRejection>
) -> ApiResult<impl IntoResponse> {
    let Json(req) = body?;
    let user = state.accounts.register(req).await?;
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse { user, message: "User registered successfully".into() }),
    ))
}

async fn login_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<LoginRequest>, JsonRejection>
) -> ApiResult<impl IntoResponse> {
    let Json(req) = body?;
    let device_info = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let (user, token) = state.accounts.login(req, device_info).await?;
    Ok(Json(LoginResponse { user, token, message: "Successfully logged in".into() }))
}

async fn logout_handler(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser
) -> ApiResult<impl IntoResponse> {
    state.accounts.logout(&ctx).await?;
    Ok(Json(json!({ "message": "Successfully logged out" })))
}

async fn me_handler(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser
) -> ApiResult<impl IntoResponse> {
    let user = state.accounts.me(&ctx).await?;
    Ok(Json(json!({ "user": user })))
}

// --- Chat ---

async fn create_session_handler(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    body: Bytes
) -> ApiResult<impl IntoResponse> {
    let req: CreateSessionRequest = optional_body(&body)?;
    let session = state.agent.create_session(&ctx.user_id, req.title).await?;
    Ok((
        StatusCode::CREATED,
        Json(CreateSessionResponse {
            session_id: session.session_id,
            user_id: session.user_id,
            title: session.title,
            created_at: session.created_at,
        }),
    ))
}

async fn list_sessions_handler(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser
) -> ApiResult<impl IntoResponse> {
    let sessions = state.agent.list_sessions(&ctx.user_id).await?;
    let summaries: Vec<SessionSummary> = sessions.into_iter().map(SessionSummary::from).collect();
    Ok(Json(summaries))
}

async fn send_message_handler(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    Path(session_id): Path<String>,
    body: Result<Json<SendMessageRequest>, JsonRejection>
) -> ApiResult<impl IntoResponse> {
    let Json(req) = body?;
    let message = req.message.unwrap_or_default();
    let exchange = state.agent.send_message(&ctx.user_id, &session_id, &message).await?;

    Ok(Json(SendMessageResponse {
        user_message: UserTurnView {
            role: exchange.user_message.role,
            content: exchange.user_message.content,
            timestamp: exchange.user_message.timestamp,
        },
        ai_message: AiTurnView {
            role: exchange.ai_message.role,
            content: exchange.ai_message.content,
            timestamp: exchange.ai_message.timestamp,
            metadata: AiMetadataView {
                technique: exchange.technique.technique,
                goal: exchange.technique.goal,
                emotional_state: exchange.classification.emotional_state,
            },
        },
    }))
}

async fn history_handler(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    Path(session_id): Path<String>
) -> ApiResult<impl IntoResponse> {
    let messages = state.agent.history(&ctx.user_id, &session_id).await?;
    let entries: Vec<HistoryEntry> = messages.into_iter().map(HistoryEntry::from).collect();
    Ok(Json(entries))
}

async fn delete_session_handler(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    Path(session_id): Path<String>
) -> ApiResult<impl IntoResponse> {
    state.agent.deactivate_session(&ctx.user_id, &session_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Wellness ---

async fn mood_handler(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    body: Result<Json<MoodRequest>, JsonRejection>
) -> ApiResult<impl IntoResponse> {
    let Json(req) = body?;
    let entry = build_mood(&ctx.user_id, req).map_err(ApiError::BadRequest)?;
    let mood = state.wellness.record_mood(entry).await?;
    Ok((StatusCode::CREATED, Json(mood)))
}

async fn activity_handler(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    body: Result<Json<ActivityRequest>, JsonRejection>
) -> ApiResult<impl IntoResponse> {
    let Json(req) = body?;
    let entry = build_activity(&ctx.user_id, req).map_err(ApiError::BadRequest)?;
    let activity = state.wellness.log_activity(entry).await?;
    Ok((StatusCode::CREATED, Json(ActivityResponse { activity })))
}

async fn today_activities_handler(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser
) -> ApiResult<impl IntoResponse> {
    let activities = state.wellness.today_activities(&ctx.user_id).await?;
    Ok(Json(activities))
}
