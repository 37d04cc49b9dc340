//! Web session handling: the session cookie and the per-request page context

use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderValue},
    response::{IntoResponse, Redirect, Response},
};
use std::convert::Infallible;
use tera::Context as TeraContext;

use super::templates::PageVars;
use super::WebError;
use crate::api::middleware::{session_cookie, SESSION_COOKIE};
use crate::api::AppState;
use crate::models::{Capability, User};

/// `Set-Cookie` value that starts a session
pub fn session_cookie_header(session_id: &str, ttl_days: i64) -> String {
    format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE,
        session_id,
        ttl_days * 24 * 60 * 60
    )
}

/// `Set-Cookie` value that ends a session
pub fn clear_session_cookie() -> String {
    format!("{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0", SESSION_COOKIE)
}

/// Redirect that also sets a cookie
pub fn redirect_with_cookie(to: &str, cookie: String) -> Response {
    let mut response = Redirect::to(to).into_response();
    match HeaderValue::from_str(&cookie) {
        Ok(value) => {
            response.headers_mut().insert(header::SET_COOKIE, value);
        }
        Err(e) => tracing::error!("Invalid cookie header: {}", e),
    }
    response
}

/// Redirect carrying a one-line notice for the next page
pub fn redirect_with_notice(to: &str, notice: &str) -> Response {
    let separator = if to.contains('?') { '&' } else { '?' };
    Redirect::to(&format!("{}{}notice={}", to, separator, urlencoding::encode(notice))).into_response()
}

/// Who is asking, where, and any notice carried over from a redirect
#[derive(Debug, Clone)]
pub struct PageContext {
    pub viewer: Option<User>,
    /// Path and query of the request
    pub path: String,
    pub notice: Option<String>,
}

impl PageContext {
    /// The signed-in user, or a redirect to the login page
    pub fn member(&self) -> Result<&User, WebError> {
        self.viewer
            .as_ref()
            .ok_or_else(|| WebError::LoginRequired(self.path.clone()))
    }

    /// A signed-in editor
    pub fn editor(&self) -> Result<&User, WebError> {
        let user = self.member()?;
        if !user.can(Capability::ApproveContent) {
            return Err(WebError::Forbidden("Only editors can view this page.".into()));
        }
        Ok(user)
    }

    pub fn vars(&self, state: &AppState) -> PageVars {
        PageVars::new(state.site.name.clone(), self.path.clone())
            .with_user(self.viewer.as_ref())
            .with_notice(self.notice.clone())
    }

    /// Render a page template for this request
    pub fn render(
        &self,
        state: &AppState,
        template: &str,
        context: &TeraContext,
    ) -> Result<Response, WebError> {
        let html = state
            .templates
            .render_page(template, context, &self.vars(state))?;
        Ok(axum::response::Html(html).into_response())
    }
}

impl FromRequestParts<AppState> for PageContext {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let viewer = match session_cookie(&parts.headers) {
            Some(id) => match state.user_service.validate_session(&id).await {
                Ok(user) => user,
                Err(e) => {
                    tracing::warn!("Session lookup failed: {}", e);
                    None
                }
            },
            None => None,
        };
        let path = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());
        Ok(Self {
            viewer,
            notice: notice_from_query(parts.uri.query()),
            path,
        })
    }
}

fn notice_from_query(query: Option<&str>) -> Option<String> {
    query?
        .split('&')
        .find_map(|pair| pair.strip_prefix("notice="))
        .and_then(|raw| urlencoding::decode(&raw.replace('+', " ")).ok().map(|s| s.into_owned()))
        .filter(|s| !s.is_empty())
}

/// Only local paths are followed after login. Browsers read `\` as `/`,
/// so any backslash is refused along with scheme-relative `//host`.
pub fn safe_next(next: Option<&str>) -> String {
    match next {
        Some(path) if path.starts_with('/') && !path.starts_with("//") && !path.contains('\\') => {
            path.to_string()
        }
        _ => "/".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cookie_headers() {
        assert_eq!(
            session_cookie_header("abc", 14),
            "session=abc; Path=/; HttpOnly; SameSite=Lax; Max-Age=1209600"
        );
        assert!(clear_session_cookie().contains("Max-Age=0"));
    }

    #[test]
    fn test_notice_round_trip() {
        let response = redirect_with_notice("/articles?page=2", "Article created successfully!");
        let location = response.headers()[header::LOCATION].to_str().unwrap().to_string();
        assert_eq!(location, "/articles?page=2&notice=Article%20created%20successfully%21");

        let query = location.split_once('?').map(|(_, q)| q);
        assert_eq!(notice_from_query(query).as_deref(), Some("Article created successfully!"));
        assert_eq!(notice_from_query(Some("page=1")), None);
        assert_eq!(notice_from_query(None), None);
    }

    #[test]
    fn test_safe_next() {
        assert_eq!(safe_next(Some("/profile")), "/profile");
        assert_eq!(safe_next(Some("//evil.example")), "/");
        assert_eq!(safe_next(Some("https://evil.example")), "/");
        assert_eq!(safe_next(Some("/\\evil.example")), "/");
        assert_eq!(safe_next(Some("/\\/evil.example")), "/");
        assert_eq!(safe_next(Some("/articles\\..\\x")), "/");
        assert_eq!(safe_next(None), "/");
    }
}
