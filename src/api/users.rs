//! User API endpoints
//!
//! - GET/POST /api/users
//! - GET /api/users/me
//! - GET /api/users/by_role?role=
//! - GET/PUT/PATCH/DELETE /api/users/{id}

use axum::{
    extract::{OriginalUri, Path, Query, State},
    http::StatusCode,
    routing::get,
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::common::{Page, PaginationQuery};
use crate::api::middleware::{ApiError, ApiJson, AppState, AuthenticatedUser};
use crate::models::{CreateUserInput, UpdateUserInput, User, UserRole};

/// Public view of an account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: UserRole,
    pub date_joined: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            role: user.role,
            date_joined: user.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub role: Option<UserRole>,
}

impl From<CreateUserRequest> for CreateUserInput {
    fn from(req: CreateUserRequest) -> Self {
        Self {
            username: req.username,
            email: req.email,
            password: req.password,
            first_name: req.first_name,
            last_name: req.last_name,
            role: req.role,
        }
    }
}

/// PUT body: username and email are required
#[derive(Debug, Deserialize)]
pub struct ReplaceUserRequest {
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub role: Option<UserRole>,
}

impl From<ReplaceUserRequest> for UpdateUserInput {
    fn from(req: ReplaceUserRequest) -> Self {
        Self {
            username: Some(req.username),
            email: Some(req.email),
            first_name: Some(req.first_name),
            last_name: Some(req.last_name),
            role: req.role,
        }
    }
}

/// PATCH body
#[derive(Debug, Default, Deserialize)]
pub struct PatchUserRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: Option<UserRole>,
}

impl From<PatchUserRequest> for UpdateUserInput {
    fn from(req: PatchUserRequest) -> Self {
        Self {
            username: req.username,
            email: req.email,
            first_name: req.first_name,
            last_name: req.last_name,
            role: req.role,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RoleQuery {
    pub role: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_users).post(create_user))
        .route("/me", get(me))
        .route("/by_role", get(by_role))
        .route(
            "/{id}",
            get(get_user).put(replace_user).patch(patch_user).delete(delete_user),
        )
}

/// GET /api/users
async fn list_users(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<Page<UserResponse>>, ApiError> {
    let result = state.user_service.list(&query.params()).await?;
    Ok(Json(Page::from_result(result.map(UserResponse::from), &uri)))
}

/// POST /api/users
async fn create_user(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(requester)): Extension<AuthenticatedUser>,
    ApiJson(req): ApiJson<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    let user = state.user_service.create(&requester, req.into()).await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

/// GET /api/users/me
async fn me(Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>) -> Json<UserResponse> {
    Json(user.into())
}

/// GET /api/users/by_role?role=journalist
async fn by_role(
    State(state): State<AppState>,
    Query(query): Query<RoleQuery>,
) -> Result<Json<Vec<UserResponse>>, ApiError> {
    let users = state.user_service.by_role(query.role.as_deref()).await?;
    Ok(Json(users.into_iter().map(UserResponse::from).collect()))
}

/// GET /api/users/{id}
async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<UserResponse>, ApiError> {
    let user = state.user_service.get(id).await?;
    Ok(Json(user.into()))
}

/// PUT /api/users/{id}
async fn replace_user(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(requester)): Extension<AuthenticatedUser>,
    Path(id): Path<i64>,
    ApiJson(req): ApiJson<ReplaceUserRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    let user = state.user_service.update(&requester, id, req.into()).await?;
    Ok(Json(user.into()))
}

/// PATCH /api/users/{id}
async fn patch_user(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(requester)): Extension<AuthenticatedUser>,
    Path(id): Path<i64>,
    ApiJson(req): ApiJson<PatchUserRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    let user = state.user_service.update(&requester, id, req.into()).await?;
    Ok(Json(user.into()))
}

/// DELETE /api/users/{id}
async fn delete_user(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(requester)): Extension<AuthenticatedUser>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.user_service.delete(&requester, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
