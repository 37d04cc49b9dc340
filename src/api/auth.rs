//! Authentication API endpoints
//!
//! - POST /api/auth/register
//! - POST /api/auth/token, /api/auth/token/refresh
//! - POST /api/auth/password/change
//! - POST /api/auth/password/reset, /api/auth/password/reset/confirm

use axum::{extract::State, http::StatusCode, routing::post, Extension, Json, Router};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{ApiError, ApiJson, AppState, AuthenticatedUser};
use crate::api::users::UserResponse;
use crate::services::{RegisterInput, TokenPair};

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AccessResponse {
    pub access: String,
}

#[derive(Debug, Deserialize)]
pub struct PasswordChangeRequest {
    pub old_password: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct PasswordResetRequest {
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct PasswordResetConfirmRequest {
    pub uid: i64,
    pub token: String,
    pub new_password: String,
}

/// `{"message": ...}`
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            message: message.into(),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub message: String,
    pub user: UserResponse,
}

/// Routes that work without credentials
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/token", post(obtain_token))
        .route("/token/refresh", post(refresh_token))
        .route("/password/reset", post(request_password_reset))
        .route("/password/reset/confirm", post(confirm_password_reset))
}

/// Routes behind `require_auth`
pub fn protected_router() -> Router<AppState> {
    Router::new().route("/password/change", post(change_password))
}

/// POST /api/auth/register
async fn register(
    State(state): State<AppState>,
    ApiJson(input): ApiJson<RegisterInput>,
) -> Result<(StatusCode, Json<RegisterResponse>), ApiError> {
    let user = state.user_service.register(input).await?;
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "User registered successfully.".to_string(),
            user: user.into(),
        }),
    ))
}

/// POST /api/auth/token
async fn obtain_token(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<TokenRequest>,
) -> Result<Json<TokenPair>, ApiError> {
    let pair = state
        .user_service
        .issue_tokens(&req.username, &req.password)
        .await?;
    Ok(Json(pair))
}

/// POST /api/auth/token/refresh
async fn refresh_token(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RefreshRequest>,
) -> Result<Json<AccessResponse>, ApiError> {
    let access = state.user_service.refresh_token(&req.refresh).await?;
    Ok(Json(AccessResponse { access }))
}

/// POST /api/auth/password/change
async fn change_password(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    ApiJson(req): ApiJson<PasswordChangeRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    state
        .user_service
        .change_password(&user, &req.old_password, &req.new_password)
        .await?;
    Ok(MessageResponse::new("Password changed successfully."))
}

/// POST /api/auth/password/reset
async fn request_password_reset(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<PasswordResetRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.user_service.request_password_reset(&req.email).await?;
    Ok(MessageResponse::new("Password reset link sent to your email."))
}

/// POST /api/auth/password/reset/confirm
async fn confirm_password_reset(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<PasswordResetConfirmRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    state
        .user_service
        .confirm_password_reset(req.uid, &req.token, &req.new_password)
        .await?;
    Ok(MessageResponse::new("Password has been reset."))
}
