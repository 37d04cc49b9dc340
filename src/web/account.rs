//! Login, logout, registration, profile and password reset pages

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    response::Response,
    Form,
};
use serde::{Deserialize, Serialize};
use tera::Context as TeraContext;

use super::session::{
    clear_session_cookie, redirect_with_cookie, redirect_with_notice, safe_next,
    session_cookie_header, PageContext,
};
use super::templates::CurrentUser;
use super::views::{content_cards, form_errors, FormErrors};
use super::WebError;
use crate::api::middleware::session_cookie;
use crate::api::AppState;
use crate::models::{Capability, ContentKind, ListParams, UpdateUserInput, UserRole, MAX_PAGE_SIZE};
use crate::services::{RegisterInput, ServiceError, SubscribedContent, SubscriptionList};

const BAD_LOGIN: &str = "Please enter a correct username and password.";

#[derive(Debug, Default, Deserialize)]
pub struct NextQuery {
    #[serde(default)]
    pub next: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub next: Option<String>,
}

fn render_login(
    state: &AppState,
    page: &PageContext,
    username: &str,
    next: &str,
    error: Option<&str>,
) -> Result<Response, WebError> {
    let mut ctx = TeraContext::new();
    ctx.insert("username", username);
    ctx.insert("next", next);
    ctx.insert("error", &error);
    page.render(state, "login.html", &ctx)
}

/// GET /login
pub async fn login_form(
    State(state): State<AppState>,
    page: PageContext,
    Query(query): Query<NextQuery>,
) -> Result<Response, WebError> {
    let next = safe_next(query.next.as_deref());
    if page.viewer.is_some() {
        return Ok(redirect_with_notice(&next, "You are already logged in."));
    }
    render_login(&state, &page, "", &next, None)
}

/// POST /login
pub async fn login(
    State(state): State<AppState>,
    page: PageContext,
    Form(form): Form<LoginForm>,
) -> Result<Response, WebError> {
    let next = safe_next(form.next.as_deref());
    match state.user_service.login(&form.username, &form.password).await {
        Ok((session, user)) => {
            tracing::info!("User {} logged in", user.username);
            let cookie = session_cookie_header(&session.id, state.session_ttl_days);
            Ok(redirect_with_cookie(&next, cookie))
        }
        Err(ServiceError::Authentication(_)) => {
            render_login(&state, &page, &form.username, &next, Some(BAD_LOGIN))
        }
        Err(e) => Err(e.into()),
    }
}

/// POST /logout
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(id) = session_cookie(&headers) {
        if let Err(e) = state.user_service.logout(&id).await {
            tracing::warn!("Failed to end session: {}", e);
        }
    }
    redirect_with_cookie("/", clear_session_cookie())
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct RegisterForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing)]
    pub password: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub role: String,
}

fn render_register(
    state: &AppState,
    page: &PageContext,
    form: &RegisterForm,
    errors: &FormErrors,
) -> Result<Response, WebError> {
    let mut ctx = TeraContext::new();
    ctx.insert("form", form);
    ctx.insert("errors", errors);
    page.render(state, "register.html", &ctx)
}

/// GET /register
pub async fn register_form(State(state): State<AppState>, page: PageContext) -> Result<Response, WebError> {
    render_register(&state, &page, &RegisterForm::default(), &FormErrors::new())
}

/// POST /register; signs the new account in
pub async fn register(
    State(state): State<AppState>,
    page: PageContext,
    Form(form): Form<RegisterForm>,
) -> Result<Response, WebError> {
    let role = match form.role.trim() {
        "" => None,
        raw => match raw.parse::<UserRole>() {
            Ok(role) => Some(role),
            Err(_) => {
                let mut errors = FormErrors::new();
                errors.insert("role".into(), format!("\"{}\" is not a valid choice.", raw));
                return render_register(&state, &page, &form, &errors);
            }
        },
    };
    let input = RegisterInput {
        username: form.username.clone(),
        email: form.email.clone(),
        password: form.password.clone(),
        first_name: form.first_name.clone(),
        last_name: form.last_name.clone(),
        role,
    };
    let user = match state.user_service.register(input).await {
        Ok(user) => user,
        Err(e) => {
            let errors = form_errors(e)?;
            return render_register(&state, &page, &form, &errors);
        }
    };

    let (session, _) = state.user_service.login(&user.username, &form.password).await?;
    let cookie = session_cookie_header(&session.id, state.session_ttl_days);
    Ok(redirect_with_cookie(
        &format!("/profile?notice={}", urlencoding::encode("Welcome! Your account is ready.")),
        cookie,
    ))
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ProfileForm {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
}

async fn render_profile(
    state: &AppState,
    page: &PageContext,
    form: &ProfileForm,
    errors: &FormErrors,
) -> Result<Response, WebError> {
    let user = page.member()?;
    let mut ctx = TeraContext::new();
    ctx.insert("user", &CurrentUser::from(user));

    let (subscriptions, feed) = if user.can(Capability::Subscribe) {
        (
            state.subscription_service.list_subscriptions(user).await?,
            state.subscription_service.content(user).await?,
        )
    } else {
        (SubscriptionList::default(), SubscribedContent::default())
    };
    ctx.insert("subscriptions", &subscriptions);
    ctx.insert("feed_articles", &content_cards(state, &feed.articles).await?);
    ctx.insert("feed_newsletters", &content_cards(state, &feed.newsletters).await?);

    let params = ListParams::new(1, MAX_PAGE_SIZE);
    for (kind, key) in [
        (ContentKind::Article, "my_articles"),
        (ContentKind::Newsletter, "my_newsletters"),
    ] {
        let mine = if user.can(Capability::AuthorContent) {
            state.content_service.my_content(user, kind, &params).await?.items
        } else {
            Vec::new()
        };
        ctx.insert(key, &content_cards(state, &mine).await?);
    }

    ctx.insert("form", form);
    ctx.insert("errors", errors);
    page.render(state, "profile.html", &ctx)
}

/// GET /profile
pub async fn profile(State(state): State<AppState>, page: PageContext) -> Result<Response, WebError> {
    let user = page.member()?;
    let form = ProfileForm {
        first_name: user.first_name.clone(),
        last_name: user.last_name.clone(),
        email: user.email.clone(),
    };
    render_profile(&state, &page, &form, &FormErrors::new()).await
}

/// POST /profile
pub async fn update_profile(
    State(state): State<AppState>,
    page: PageContext,
    Form(form): Form<ProfileForm>,
) -> Result<Response, WebError> {
    let user = page.member()?;
    let input = UpdateUserInput {
        email: Some(form.email.clone()),
        first_name: Some(form.first_name.clone()),
        last_name: Some(form.last_name.clone()),
        ..Default::default()
    };
    match state.user_service.update(user, user.id, input).await {
        Ok(_) => Ok(redirect_with_notice("/profile", "Profile updated.")),
        Err(e) => {
            let errors = form_errors(e)?;
            render_profile(&state, &page, &form, &errors).await
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ResetRequestForm {
    #[serde(default)]
    pub email: String,
}

fn render_reset_request(
    state: &AppState,
    page: &PageContext,
    email: &str,
    sent: bool,
    errors: &FormErrors,
) -> Result<Response, WebError> {
    let mut ctx = TeraContext::new();
    ctx.insert("email", email);
    ctx.insert("sent", &sent);
    ctx.insert("errors", errors);
    page.render(state, "password_reset.html", &ctx)
}

/// GET /password-reset
pub async fn password_reset_form(State(state): State<AppState>, page: PageContext) -> Result<Response, WebError> {
    render_reset_request(&state, &page, "", false, &FormErrors::new())
}

/// POST /password-reset; the page never reveals whether the address is known
pub async fn password_reset(
    State(state): State<AppState>,
    page: PageContext,
    Form(form): Form<ResetRequestForm>,
) -> Result<Response, WebError> {
    match state.user_service.request_password_reset(&form.email).await {
        Ok(()) | Err(ServiceError::NotFound(_)) => {
            render_reset_request(&state, &page, &form.email, true, &FormErrors::new())
        }
        Err(e) => {
            let errors = form_errors(e)?;
            render_reset_request(&state, &page, &form.email, false, &errors)
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ResetConfirmForm {
    #[serde(default)]
    pub new_password: String,
}

fn render_reset_confirm(
    state: &AppState,
    page: &PageContext,
    uid: i64,
    token: &str,
    errors: &FormErrors,
) -> Result<Response, WebError> {
    let mut ctx = TeraContext::new();
    ctx.insert("action", &format!("/reset-password/{}/{}/", uid, token));
    ctx.insert("errors", errors);
    page.render(state, "password_reset_confirm.html", &ctx)
}

/// GET /reset-password/{uid}/{token}/
pub async fn password_reset_confirm_form(
    State(state): State<AppState>,
    page: PageContext,
    Path((uid, token)): Path<(i64, String)>,
) -> Result<Response, WebError> {
    render_reset_confirm(&state, &page, uid, &token, &FormErrors::new())
}

/// POST /reset-password/{uid}/{token}/
pub async fn password_reset_confirm(
    State(state): State<AppState>,
    page: PageContext,
    Path((uid, token)): Path<(i64, String)>,
    Form(form): Form<ResetConfirmForm>,
) -> Result<Response, WebError> {
    match state
        .user_service
        .confirm_password_reset(uid, &token, &form.new_password)
        .await
    {
        Ok(()) => Ok(redirect_with_notice(
            "/login",
            "Your password has been reset. Please log in.",
        )),
        Err(e) => {
            let errors = form_errors(e)?;
            render_reset_confirm(&state, &page, uid, &token, &errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::api::testing::{create_user, test_server, PASSWORD};
    use crate::models::UserRole;
    use crate::web::testing::{location, sign_in};
    use axum::http::{header, StatusCode};

    #[tokio::test]
    async fn test_login_sets_cookie_and_follows_next() {
        let (server, _) = test_server().await;
        create_user(&server, "ann", UserRole::Reader).await;

        let response = server
            .post("/login")
            .form(&[("username", "ann"), ("password", "wrong"), ("next", "/profile")])
            .await;
        assert_eq!(response.status_code(), StatusCode::OK);
        assert!(response.text().contains("Please enter a correct username and password."));

        let response = server
            .post("/login")
            .form(&[("username", "ann"), ("password", PASSWORD), ("next", "/profile")])
            .await;
        assert!(response.status_code().is_redirection());
        assert_eq!(location(&response), "/profile");
        let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
        assert!(cookie.starts_with("session="));
        assert!(cookie.contains("HttpOnly"));

        let response = server
            .post("/login")
            .form(&[("username", "ann"), ("password", PASSWORD), ("next", "https://evil.example")])
            .await;
        assert_eq!(location(&response), "/");

        let response = server
            .post("/login")
            .form(&[("username", "ann"), ("password", PASSWORD), ("next", "/\\evil.example")])
            .await;
        assert_eq!(location(&response), "/");
    }

    #[tokio::test]
    async fn test_logout_ends_session() {
        let (server, _) = test_server().await;
        let (name, cookie, _) = sign_in(&server, "ann", UserRole::Reader).await;

        let response = server.get("/profile").add_header(name.clone(), cookie.clone()).await;
        assert_eq!(response.status_code(), StatusCode::OK);

        let response = server.post("/logout").add_header(name.clone(), cookie.clone()).await;
        assert!(response.headers()[header::SET_COOKIE].to_str().unwrap().contains("Max-Age=0"));

        let response = server.get("/profile").add_header(name, cookie).await;
        assert_eq!(location(&response), "/login?next=%2Fprofile");
    }

    #[tokio::test]
    async fn test_logout_requires_post() {
        let (server, _) = test_server().await;
        let (name, cookie, _) = sign_in(&server, "ann", UserRole::Reader).await;

        let response = server.get("/logout").add_header(name.clone(), cookie.clone()).await;
        assert_eq!(response.status_code(), StatusCode::METHOD_NOT_ALLOWED);
        assert!(response.headers().get(header::SET_COOKIE).is_none());

        let response = server.get("/profile").add_header(name, cookie).await;
        assert_eq!(response.status_code(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_register_signs_in() {
        let (server, _) = test_server().await;
        let response = server
            .post("/register")
            .form(&[
                ("username", "kim"),
                ("email", "kim@example.com"),
                ("password", "a-long-passphrase"),
                ("role", "editor"),
            ])
            .await;
        assert_eq!(response.status_code(), StatusCode::OK);
        assert!(response.text().contains("Editor accounts can only be created by an editor."));

        let response = server
            .post("/register")
            .form(&[
                ("username", "kim"),
                ("email", "kim@example.com"),
                ("password", "a-long-passphrase"),
                ("role", "journalist"),
            ])
            .await;
        assert!(location(&response).starts_with("/profile"));
        assert!(response.headers().contains_key(header::SET_COOKIE));
    }

    #[tokio::test]
    async fn test_profile_update() {
        let (server, _) = test_server().await;
        let (name, cookie, user) = sign_in(&server, "ann", UserRole::Reader).await;

        let response = server
            .post("/profile")
            .add_header(name.clone(), cookie.clone())
            .form(&[("first_name", "Ann"), ("last_name", "Lee"), ("email", "not-an-email")])
            .await;
        assert_eq!(response.status_code(), StatusCode::OK);
        assert!(response.text().contains("class=\"error\""));

        let response = server
            .post("/profile")
            .add_header(name, cookie)
            .form(&[("first_name", "Ann"), ("last_name", "Lee"), ("email", "ann@example.org")])
            .await;
        assert!(location(&response).starts_with("/profile?notice="));
        let updated = server.state.user_service.get(user.id).await.unwrap();
        assert_eq!(updated.full_name(), "Ann Lee");
        assert_eq!(updated.email, "ann@example.org");
    }

    #[tokio::test]
    async fn test_password_reset_flow() {
        let (server, mailer) = test_server().await;
        let user = create_user(&server, "ann", UserRole::Reader).await;

        let response = server
            .post("/password-reset")
            .form(&[("email", "nobody@example.com")])
            .await;
        assert!(response.text().contains("a reset link is on its way"));
        assert!(mailer.sent().is_empty());

        server.post("/password-reset").form(&[("email", "ann@example.com")]).await;
        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        let link = sent[0]
            .body
            .lines()
            .find(|l| l.contains("/reset-password/"))
            .unwrap()
            .to_string();
        let path = &link[link.find("/reset-password/").unwrap()..];
        assert!(path.starts_with(&format!("/reset-password/{}/", user.id)));

        let response = server.get(path).await;
        assert_eq!(response.status_code(), StatusCode::OK);

        let response = server
            .post(path)
            .form(&[("new_password", "fresh-passphrase-42")])
            .await;
        assert_eq!(location(&response), "/login?notice=Your%20password%20has%20been%20reset.%20Please%20log%20in.");

        // A used token dies with the old password hash
        let response = server
            .post(path)
            .form(&[("new_password", "another-passphrase-42")])
            .await;
        assert!(response.text().contains("Invalid or expired token."));

        let response = server
            .post("/login")
            .form(&[("username", "ann"), ("password", "fresh-passphrase-42")])
            .await;
        assert!(response.headers().contains_key(header::SET_COOKIE));
    }
}
