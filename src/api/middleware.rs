//! Shared state, error envelope and authentication middleware

use axum::{
    extract::{rejection::JsonRejection, FromRequest, Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Map, Value};
use std::sync::Arc;

use crate::config::{Config, SiteConfig};
use crate::db::repositories::{
    SqlxCategoryRepository, SqlxCommentRepository, SqlxContentRepository,
    SqlxPublisherRepository, SqlxSessionRepository, SqlxSubscriptionRepository,
    SqlxUserRepository,
};
use crate::db::DynDatabasePool;
use crate::models::User;
use crate::services::{
    CategoryService, CommentService, ContentService, Mailer, NotificationService,
    PublisherService, ServiceError, SubscriptionService, TokenService, UserService,
    NON_FIELD_ERRORS,
};
use crate::web::TemplateEngine;

/// Name of the web session cookie
pub const SESSION_COOKIE: &str = "session";

/// Everything handlers need, cheap to clone
#[derive(Clone)]
pub struct AppState {
    pub pool: DynDatabasePool,
    pub site: Arc<SiteConfig>,
    pub session_ttl_days: i64,
    pub user_service: Arc<UserService>,
    pub publisher_service: Arc<PublisherService>,
    pub category_service: Arc<CategoryService>,
    pub content_service: Arc<ContentService>,
    pub comment_service: Arc<CommentService>,
    pub subscription_service: Arc<SubscriptionService>,
    pub templates: Arc<TemplateEngine>,
}

impl AppState {
    /// Wire repositories and services over one pool. Fails on a config
    /// that `Config::validate` rejects.
    pub fn new(pool: DynDatabasePool, config: &Config, mailer: Arc<dyn Mailer>) -> anyhow::Result<Self> {
        config.validate()?;
        let user_repo = SqlxUserRepository::boxed(pool.clone());
        let publisher_repo = SqlxPublisherRepository::boxed(pool.clone());
        let category_repo = SqlxCategoryRepository::boxed(pool.clone());
        let content_repo = SqlxContentRepository::boxed(pool.clone());
        let subscription_repo = SqlxSubscriptionRepository::boxed(pool.clone());

        let notifier = Arc::new(NotificationService::new(
            subscription_repo.clone(),
            mailer,
            config.site.clone(),
        ));
        let tokens = Arc::new(TokenService::new(&config.auth));

        let user_service = UserService::new(
            user_repo.clone(),
            SqlxSessionRepository::boxed(pool.clone()),
            tokens,
            notifier.clone(),
            config.auth.session_ttl_days,
        );
        let publisher_service = PublisherService::new(publisher_repo.clone(), user_repo.clone());
        let category_service = CategoryService::new(category_repo.clone());
        let content_service = ContentService::new(
            content_repo.clone(),
            publisher_repo.clone(),
            category_repo,
            user_repo.clone(),
            notifier,
        );
        let comment_service =
            CommentService::new(SqlxCommentRepository::boxed(pool.clone()), content_repo.clone());
        let subscription_service =
            SubscriptionService::new(subscription_repo, publisher_repo, user_repo, content_repo);

        Ok(Self {
            pool,
            site: Arc::new(config.site.clone()),
            session_ttl_days: config.auth.session_ttl_days,
            user_service: Arc::new(user_service),
            publisher_service: Arc::new(publisher_service),
            category_service: Arc::new(category_service),
            content_service: Arc::new(content_service),
            comment_service: Arc::new(comment_service),
            subscription_service: Arc::new(subscription_service),
            templates: Arc::new(TemplateEngine::new()?),
        })
    }
}

/// Authenticated user extracted from request
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

/// An error answered as JSON: `{"detail": ...}` or field-keyed message lists
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: Value,
}

impl ApiError {
    pub fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            body: json!({ "detail": detail.into() }),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    /// 400 with `{field: [message]}`
    pub fn validation_error(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut fields = Map::new();
        fields.insert(field.into(), json!([message.into()]));
        Self {
            status: StatusCode::BAD_REQUEST,
            body: Value::Object(fields),
        }
    }

    /// Logs the cause; the client only sees a generic message
    pub fn internal_error(cause: impl std::fmt::Display) -> Self {
        tracing::error!("Internal error: {}", cause);
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "A server error occurred.")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Authentication(m) => ApiError::unauthorized(m),
            ServiceError::PermissionDenied(m) => ApiError::forbidden(m),
            ServiceError::Validation { field, message } => ApiError::validation_error(field, message),
            ServiceError::Precondition(m) | ServiceError::Conflict(m) => {
                ApiError::validation_error(NON_FIELD_ERRORS, m)
            }
            ServiceError::NotFound(m) => ApiError::not_found(m),
            ServiceError::Internal(e) => ApiError::internal_error(format!("{:#}", e)),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::validation_error(NON_FIELD_ERRORS, rejection.body_text())
    }
}

/// `Json` whose rejections use the API error envelope
#[derive(Debug, FromRequest)]
#[from_request(via(Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// Where a request's credentials came from
#[derive(Debug, PartialEq, Eq)]
pub enum Credentials {
    Bearer(String),
    Session(String),
}

/// Bearer token first, then the session cookie
pub fn extract_credentials(headers: &HeaderMap) -> Option<Credentials> {
    if let Some(auth) = headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        if let Some(token) = auth.strip_prefix("Bearer ") {
            return Some(Credentials::Bearer(token.trim().to_string()));
        }
    }
    session_cookie(headers).map(Credentials::Session)
}

/// Value of the session cookie, if present
pub fn session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|c| c.trim().strip_prefix("session="))
        .find(|v| !v.is_empty())
        .map(str::to_string)
}

/// Resolve credentials to a user. `Ok(None)` means no credentials were sent.
pub async fn resolve_user(state: &AppState, headers: &HeaderMap) -> Result<Option<User>, ApiError> {
    match extract_credentials(headers) {
        None => Ok(None),
        Some(Credentials::Bearer(token)) => {
            let user = state
                .user_service
                .user_from_access_token(&token)
                .await
                .map_err(|e| match e {
                    ServiceError::Internal(_) => ApiError::from(e),
                    _ => ApiError::unauthorized("Given token not valid for any token type"),
                })?;
            Ok(Some(user))
        }
        Some(Credentials::Session(id)) => {
            let user = state
                .user_service
                .validate_session(&id)
                .await?
                .ok_or_else(|| ApiError::unauthorized("Invalid or expired session"))?;
            Ok(Some(user))
        }
    }
}

/// Authentication middleware
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let user = resolve_user(&state, request.headers())
        .await?
        .ok_or_else(|| ApiError::unauthorized("Authentication credentials were not provided."))?;

    request.extensions_mut().insert(AuthenticatedUser(user));
    Ok(next.run(request).await)
}
