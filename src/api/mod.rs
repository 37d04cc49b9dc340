//! API layer - HTTP handlers and routing
//!
//! The REST API lives under `/api/`. Everything except registration, token
//! issue/refresh, password reset and the health check requires a bearer
//! access token or a web session cookie.

pub mod auth;
pub mod categories;
pub mod comments;
pub mod common;
pub mod content;
pub mod middleware;
pub mod publishers;
pub mod subscriptions;
pub mod users;

use axum::{
    extract::State,
    http::{header, HeaderValue, Method, StatusCode},
    middleware as axum_middleware,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::models::ContentKind;

pub use middleware::{ApiError, AppState, AuthenticatedUser};

/// Build the router mounted at `/api`
pub fn build_api_router(state: AppState) -> Router<AppState> {
    let protected_routes = Router::new()
        .nest("/auth", auth::protected_router())
        .nest("/users", users::router())
        .nest("/categories", categories::router())
        .nest("/publishers", publishers::router())
        .nest("/articles", content::router(ContentKind::Article))
        .nest("/newsletters", content::router(ContentKind::Newsletter))
        .nest("/comments", comments::router())
        .nest("/subscriptions", subscriptions::router())
        .route_layer(axum_middleware::from_fn_with_state(
            state,
            middleware::require_auth,
        ));

    Router::new()
        .nest("/auth", auth::public_router())
        .route("/health", get(health))
        .merge(protected_routes)
}

/// Build the complete application: API, web pages and shared layers
pub fn build_router(state: AppState, cors_origin: &str) -> anyhow::Result<Router> {
    let origin = cors_origin
        .parse::<HeaderValue>()
        .map_err(|e| anyhow::anyhow!("Invalid CORS origin '{}': {}", cors_origin, e))?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::COOKIE])
        .allow_credentials(true);

    Ok(Router::new()
        .nest("/api", build_api_router(state.clone()))
        .merge(crate::web::router(state.clone()))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state))
}

/// GET /api/health
async fn health(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    state.pool.ping().await.map_err(|e| {
        tracing::error!("Health check failed: {:#}", e);
        ApiError::new(StatusCode::SERVICE_UNAVAILABLE, "Database unavailable.")
    })?;
    Ok(Json(json!({ "status": "ok" })))
}


#[cfg(test)]
mod tests {
    use super::testing::{bearer, create_user, test_server};
    use super::AppState;
    use crate::config::Config;
    use crate::db::repositories::test_support::setup_pool;
    use crate::models::UserRole;
    use crate::services::notify::testing::RecordingMailer;
    use crate::services::{TokenKind, TokenService};
    use axum::http::StatusCode;
    use serde_json::{json, Value};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_health() {
        let (server, _) = test_server().await;
        let response = server.get("/api/health").await;
        assert_eq!(response.status_code(), StatusCode::OK);
        assert_eq!(response.json::<Value>(), json!({"status": "ok"}));
    }

    #[tokio::test]
    async fn test_protected_routes_need_credentials() {
        let (server, _) = test_server().await;
        for path in ["/api/articles", "/api/users", "/api/subscriptions", "/api/comments"] {
            let response = server.get(path).await;
            assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED, "{}", path);
            assert_eq!(
                response.json::<Value>(),
                json!({"detail": "Authentication credentials were not provided."})
            );
        }

        let response = server
            .get("/api/articles")
            .add_header(
                axum::http::header::AUTHORIZATION,
                axum::http::HeaderValue::from_static("Bearer not-a-token"),
            )
            .await;
        assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_state_refuses_placeholder_secret() {
        let pool = setup_pool().await;
        let mailer = Arc::new(RecordingMailer::default());
        let result = AppState::new(pool, &Config::default(), mailer);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_token_signed_with_placeholder_secret_is_rejected() {
        let (server, _) = test_server().await;
        let editor = create_user(&server, "chief", UserRole::Editor).await;

        let forged = TokenService::new(&Config::default().auth)
            .issue(&editor, TokenKind::Access)
            .unwrap();
        let (name, value) = bearer(&forged);
        let response = server
            .get("/api/articles/pending_approval")
            .add_header(name, value)
            .await;
        assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
    }
}
