//! Server-rendered web pages
//!
//! Browsers sign in with a session cookie. Public pages (front page, article
//! and newsletter listings, categories) work anonymously; member pages
//! redirect anonymous visitors to `/login`.

mod account;
mod content;
mod manage;
mod pages;
mod session;
mod templates;
mod views;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::{self as axum_middleware, Next},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Extension, Router,
};

use crate::api::AppState;
use crate::models::ContentKind;
use crate::services::ServiceError;

pub use session::PageContext;
pub use templates::{PageVars, TemplateEngine, TemplateError};

/// A failed page request
#[derive(Debug)]
pub enum WebError {
    /// Anonymous visitor on a member page; carries the page to return to
    LoginRequired(String),
    Forbidden(String),
    NotFound(String),
    BadRequest(String),
    Internal(String),
}

impl From<ServiceError> for WebError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Authentication(_) => WebError::LoginRequired("/".into()),
            ServiceError::PermissionDenied(m) => WebError::Forbidden(m),
            ServiceError::NotFound(m) => WebError::NotFound(m),
            ServiceError::Validation { message, .. } => WebError::BadRequest(message),
            ServiceError::Precondition(m) | ServiceError::Conflict(m) => WebError::BadRequest(m),
            ServiceError::Internal(e) => WebError::Internal(format!("{:#}", e)),
        }
    }
}

impl From<anyhow::Error> for WebError {
    fn from(err: anyhow::Error) -> Self {
        WebError::Internal(format!("{:#}", err))
    }
}

/// Marker left on error responses; [`render_error_pages`] turns it into HTML
#[derive(Debug, Clone)]
struct ErrorPage {
    message: String,
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            WebError::LoginRequired(next) => {
                let to = format!("/login?next={}", urlencoding::encode(&next));
                return Redirect::to(&to).into_response();
            }
            WebError::Forbidden(m) => (StatusCode::FORBIDDEN, m),
            WebError::NotFound(m) => (StatusCode::NOT_FOUND, m),
            WebError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            WebError::Internal(cause) => {
                tracing::error!("Page failed: {}", cause);
                (StatusCode::INTERNAL_SERVER_ERROR, "A server error occurred.".to_string())
            }
        };
        let mut response = (status, message.clone()).into_response();
        response.extensions_mut().insert(ErrorPage { message });
        response
    }
}

/// Replace bare error responses from page handlers with the error template
async fn render_error_pages(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();
    let mut response = next.run(request).await;
    let Some(page) = response.extensions_mut().remove::<ErrorPage>() else {
        return response;
    };
    let status = response.status();
    let vars = PageVars::new(state.site.name.clone(), path);
    let html = state.templates.render_error(status.as_u16(), &page.message, &vars);
    (status, Html(html)).into_response()
}

/// Routes for one content kind, mounted at `/articles` or `/newsletters`
fn content_routes(kind: ContentKind) -> Router<AppState> {
    let mut router = Router::new()
        .route("/", get(content::list))
        .route("/new", get(content::new_form).post(content::create))
        .route("/{id}", get(content::detail))
        .route("/{id}/edit", get(content::edit_form).post(content::update))
        .route("/{id}/delete", get(content::confirm_delete).post(content::delete))
        .route("/{id}/approve", post(content::approve))
        .route("/{id}/publish", post(content::publish));
    if kind == ContentKind::Article {
        router = router.route("/{id}/comments", post(content::add_comment));
    }
    router.layer(Extension(kind))
}

/// Build the web router
pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(pages::home))
        .nest("/articles", content_routes(ContentKind::Article))
        .nest("/newsletters", content_routes(ContentKind::Newsletter))
        .route("/categories", get(pages::categories).post(pages::create_category))
        .route("/categories/{id}", get(pages::category_articles))
        .route(
            "/categories/{id}/edit",
            get(manage::edit_category_form).post(manage::update_category),
        )
        .route(
            "/categories/{id}/delete",
            get(manage::confirm_delete_category).post(manage::delete_category),
        )
        .route("/publishers", get(pages::publishers).post(pages::create_publisher))
        .route(
            "/publishers/{id}/edit",
            get(manage::edit_publisher_form).post(manage::update_publisher),
        )
        .route(
            "/publishers/{id}/delete",
            get(manage::confirm_delete_publisher).post(manage::delete_publisher),
        )
        .route("/publishers/{id}/staff", get(manage::staff).post(manage::add_staff))
        .route(
            "/publishers/{id}/staff/{user_id}/edit",
            get(manage::edit_staff_form).post(manage::update_staff),
        )
        .route(
            "/publishers/{id}/staff/{user_id}/delete",
            get(manage::confirm_remove_staff).post(manage::remove_staff),
        )
        .route("/publishers/{id}/subscribe", post(pages::subscribe_publisher))
        .route("/publishers/{id}/unsubscribe", post(pages::unsubscribe_publisher))
        .route("/journalists/{id}/subscribe", post(pages::subscribe_journalist))
        .route("/journalists/{id}/unsubscribe", post(pages::unsubscribe_journalist))
        .route(
            "/comments/{id}/edit",
            get(content::edit_comment_form).post(content::update_comment),
        )
        .route("/comments/{id}/delete", post(content::delete_comment))
        .route("/pending", get(pages::pending))
        .route("/users", get(manage::users))
        .route("/users/{id}", get(manage::user_detail))
        .route("/users/{id}/edit", get(manage::edit_user_form).post(manage::update_user))
        .route(
            "/users/{id}/delete",
            get(manage::confirm_delete_user).post(manage::delete_user),
        )
        .route("/profile", get(account::profile).post(account::update_profile))
        .route("/login", get(account::login_form).post(account::login))
        .route("/logout", post(account::logout))
        .route("/register", get(account::register_form).post(account::register))
        .route(
            "/password-reset",
            get(account::password_reset_form).post(account::password_reset),
        )
        .route(
            "/reset-password/{uid}/{token}/",
            get(account::password_reset_confirm_form).post(account::password_reset_confirm),
        )
        .layer(axum_middleware::from_fn_with_state(state, render_error_pages))
}
