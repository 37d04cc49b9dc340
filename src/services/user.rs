//! User service
//!
//! Registration, credentials, bearer tokens, web sessions, password change
//! and reset, and editor-side account management.

use anyhow::Context;
use chrono::Duration;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::sync::Arc;

use super::notify::NotificationService;
use super::password::{hash_password, validate_password, verify_password};
use super::token::{TokenKind, TokenPair, TokenService};
use super::{limit_text, ServiceError, ServiceResult};
use crate::db::repositories::{SessionRepository, UserRepository};
use crate::models::{
    Capability, CreateUserInput, ListParams, PagedResult, Session, UpdateUserInput, User, UserRole,
};

static USERNAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9@.+_-]+$").expect("valid username regex"));
static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email regex"));

const MAX_USERNAME_LENGTH: usize = 150;

/// Self-service sign-up form
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegisterInput {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    /// Reader when absent; editor accounts cannot be self-registered
    #[serde(default)]
    pub role: Option<UserRole>,
}

impl RegisterInput {
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
            password: password.into(),
            ..Default::default()
        }
    }
}

pub struct UserService {
    user_repo: Arc<dyn UserRepository>,
    session_repo: Arc<dyn SessionRepository>,
    tokens: Arc<TokenService>,
    notifier: Arc<NotificationService>,
    session_ttl: Duration,
}

impl UserService {
    pub fn new(
        user_repo: Arc<dyn UserRepository>,
        session_repo: Arc<dyn SessionRepository>,
        tokens: Arc<TokenService>,
        notifier: Arc<NotificationService>,
        session_ttl_days: i64,
    ) -> Self {
        Self {
            user_repo,
            session_repo,
            tokens,
            notifier,
            session_ttl: Duration::days(session_ttl_days),
        }
    }

    // ------------------------------------------------------------------
    // Registration and credentials
    // ------------------------------------------------------------------

    pub async fn register(&self, input: RegisterInput) -> ServiceResult<User> {
        let role = input.role.unwrap_or_default();
        if role == UserRole::Editor {
            return Err(ServiceError::validation(
                "role",
                "Editor accounts can only be created by an editor.",
            ));
        }
        self.create_account(CreateUserInput {
            username: input.username,
            email: input.email,
            password: input.password,
            first_name: input.first_name,
            last_name: input.last_name,
            role: Some(role),
        })
        .await
    }

    async fn create_account(&self, input: CreateUserInput) -> ServiceResult<User> {
        let username = input.username.trim().to_string();
        let email = input.email.trim().to_string();
        validate_username(&username)?;
        validate_email(&email)?;
        if let Some(problem) = validate_password(&input.password, &username).into_iter().next() {
            return Err(ServiceError::validation("password", problem));
        }
        self.ensure_unique(&username, &email, None).await?;

        let password_hash = hash_password(&input.password)?;
        let mut user = User::new(username, email, password_hash, input.role.unwrap_or_default());
        user.first_name = input.first_name;
        user.last_name = input.last_name;

        let created = self
            .user_repo
            .create(&user)
            .await
            .context("Failed to create user")?;
        tracing::info!("Registered user {} as {}", created.username, created.role);
        Ok(created)
    }

    /// Check a username and password pair
    pub async fn authenticate(&self, username: &str, password: &str) -> ServiceResult<User> {
        let invalid =
            || ServiceError::Authentication("No active account found with the given credentials".to_string());

        let user = self
            .user_repo
            .get_by_username(username.trim())
            .await
            .context("Failed to get user by username")?
            .ok_or_else(invalid)?;

        if !verify_password(password, &user.password_hash)? {
            return Err(invalid());
        }
        Ok(user)
    }

    /// Exchange credentials for an access/refresh pair
    pub async fn issue_tokens(&self, username: &str, password: &str) -> ServiceResult<TokenPair> {
        let user = self.authenticate(username, password).await?;
        self.tokens.issue_pair(&user)
    }

    /// Exchange a refresh token for a new access token
    pub async fn refresh_token(&self, refresh: &str) -> ServiceResult<String> {
        let claims = self.tokens.verify(refresh, TokenKind::Refresh)?;
        let user = self.user_from_claims(claims.sub).await?;
        self.tokens.issue(&user, TokenKind::Access)
    }

    /// Resolve a bearer access token to its (still existing) user
    pub async fn user_from_access_token(&self, token: &str) -> ServiceResult<User> {
        let claims = self.tokens.verify(token, TokenKind::Access)?;
        self.user_from_claims(claims.sub).await
    }

    async fn user_from_claims(&self, user_id: i64) -> ServiceResult<User> {
        self.user_repo
            .get_by_id(user_id)
            .await
            .context("Failed to get user by ID")?
            .ok_or_else(|| ServiceError::Authentication("User not found".to_string()))
    }

    // ------------------------------------------------------------------
    // Web sessions
    // ------------------------------------------------------------------

    /// Authenticate and open a web session
    pub async fn login(&self, username: &str, password: &str) -> ServiceResult<(Session, User)> {
        let user = self.authenticate(username, password).await?;
        let session = self
            .session_repo
            .create(&Session::new(user.id, self.session_ttl))
            .await
            .context("Failed to create session")?;
        tracing::debug!("User {} logged in", user.username);
        Ok((session, user))
    }

    pub async fn logout(&self, session_id: &str) -> ServiceResult<()> {
        self.session_repo
            .delete(session_id)
            .await
            .context("Failed to delete session")?;
        Ok(())
    }

    /// The user behind a live session; expired sessions are removed
    pub async fn validate_session(&self, session_id: &str) -> ServiceResult<Option<User>> {
        let session = match self
            .session_repo
            .get_by_id(session_id)
            .await
            .context("Failed to get session")?
        {
            Some(s) => s,
            None => return Ok(None),
        };

        if session.is_expired() {
            if let Err(e) = self.session_repo.delete(session_id).await {
                tracing::warn!("Failed to drop expired session: {:#}", e);
            }
            return Ok(None);
        }

        let user = self
            .user_repo
            .get_by_id(session.user_id)
            .await
            .context("Failed to get user")?;
        Ok(user)
    }

    pub async fn cleanup_expired_sessions(&self) -> ServiceResult<i64> {
        let count = self
            .session_repo
            .delete_expired()
            .await
            .context("Failed to delete expired sessions")?;
        Ok(count)
    }

    // ------------------------------------------------------------------
    // Passwords
    // ------------------------------------------------------------------

    pub async fn change_password(
        &self,
        user: &User,
        old_password: &str,
        new_password: &str,
    ) -> ServiceResult<()> {
        if !verify_password(old_password, &user.password_hash)? {
            return Err(ServiceError::validation(
                "old_password",
                "Old password is incorrect.",
            ));
        }
        self.store_password(user, "new_password", new_password).await
    }

    /// Mail a reset link to the account with `email`
    pub async fn request_password_reset(&self, email: &str) -> ServiceResult<()> {
        let email = email.trim();
        if email.is_empty() {
            return Err(ServiceError::validation("email", "Email is required."));
        }
        let user = self
            .user_repo
            .get_by_email(email)
            .await
            .context("Failed to get user by email")?
            .ok_or_else(|| ServiceError::not_found("User with this email does not exist."))?;

        let token = self.tokens.issue(&user, TokenKind::Reset)?;
        self.notifier.send_password_reset(&user, &token).await;
        Ok(())
    }

    pub async fn confirm_password_reset(
        &self,
        uid: i64,
        token: &str,
        new_password: &str,
    ) -> ServiceResult<()> {
        let invalid = || ServiceError::validation("token", "Invalid or expired token.");
        let user = self
            .user_repo
            .get_by_id(uid)
            .await
            .context("Failed to get user by ID")?
            .ok_or_else(invalid)?;

        if !self.tokens.verify_reset(token, &user) {
            return Err(invalid());
        }
        self.store_password(&user, "new_password", new_password).await?;
        self.session_repo
            .delete_by_user(user.id)
            .await
            .context("Failed to drop sessions")?;
        Ok(())
    }

    async fn store_password(&self, user: &User, field: &str, password: &str) -> ServiceResult<()> {
        if let Some(problem) = validate_password(password, &user.username).into_iter().next() {
            return Err(ServiceError::validation(field, problem));
        }
        let hash = hash_password(password)?;
        self.user_repo
            .set_password(user.id, &hash)
            .await
            .context("Failed to store password")?;
        tracing::info!("Password changed for user {}", user.id);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Account management
    // ------------------------------------------------------------------

    pub async fn list(&self, params: &ListParams) -> ServiceResult<PagedResult<User>> {
        let (items, total) = self.user_repo.list(params).await.context("Failed to list users")?;
        Ok(PagedResult::new(items, total, params))
    }

    pub async fn get(&self, id: i64) -> ServiceResult<User> {
        self.user_repo
            .get_by_id(id)
            .await
            .context("Failed to get user by ID")?
            .ok_or_else(|| ServiceError::not_found("User not found."))
    }

    /// Every user with the named role; the role is required
    pub async fn by_role(&self, role: Option<&str>) -> ServiceResult<Vec<User>> {
        let role = match role.map(str::trim) {
            Some(r) if !r.is_empty() => r,
            _ => return Err(ServiceError::validation("role", "Role parameter is required.")),
        };
        let role: UserRole = role
            .parse()
            .map_err(|_| ServiceError::validation("role", format!("\"{}\" is not a valid choice.", role)))?;
        let users = self
            .user_repo
            .all_with_role(role)
            .await
            .context("Failed to list users by role")?;
        Ok(users)
    }

    /// Create an account with any role; editors only
    pub async fn create(&self, requester: &User, input: CreateUserInput) -> ServiceResult<User> {
        if !requester.can(Capability::ManageUsers) {
            return Err(ServiceError::permission("Only editors can create users."));
        }
        self.create_account(input).await
    }

    /// Profile edits by the user themselves, anything (role included) by an editor
    pub async fn update(
        &self,
        requester: &User,
        id: i64,
        input: UpdateUserInput,
    ) -> ServiceResult<User> {
        let is_manager = requester.can(Capability::ManageUsers);
        if requester.id != id && !is_manager {
            return Err(ServiceError::permission(
                "You do not have permission to perform this action.",
            ));
        }
        if input.role.is_some() && !is_manager {
            return Err(ServiceError::permission("Only editors can change roles."));
        }

        let mut user = self.get(id).await?;
        if let Some(username) = input.username {
            let username = username.trim().to_string();
            validate_username(&username)?;
            user.username = username;
        }
        if let Some(email) = input.email {
            let email = email.trim().to_string();
            validate_email(&email)?;
            user.email = email;
        }
        if let Some(first_name) = input.first_name {
            limit_text("first_name", &first_name, 150)?;
            user.first_name = first_name;
        }
        if let Some(last_name) = input.last_name {
            limit_text("last_name", &last_name, 150)?;
            user.last_name = last_name;
        }
        if let Some(role) = input.role {
            user.role = role;
        }
        self.ensure_unique(&user.username, &user.email, Some(user.id)).await?;

        let updated = self
            .user_repo
            .update(&user)
            .await
            .context("Failed to update user")?;
        Ok(updated)
    }

    pub async fn delete(&self, requester: &User, id: i64) -> ServiceResult<()> {
        if !requester.can(Capability::ManageUsers) {
            return Err(ServiceError::permission("Only editors can delete users."));
        }
        if !self.user_repo.delete(id).await.context("Failed to delete user")? {
            return Err(ServiceError::not_found("User not found."));
        }
        tracing::info!("User {} deleted by {}", id, requester.username);
        Ok(())
    }

    /// Reject a username or email already held by another account
    async fn ensure_unique(&self, username: &str, email: &str, except: Option<i64>) -> ServiceResult<()> {
        let other = |found: Option<User>| found.map_or(false, |u| Some(u.id) != except);

        if other(
            self.user_repo
                .get_by_username(username)
                .await
                .context("Failed to check username")?,
        ) {
            return Err(ServiceError::validation(
                "username",
                "A user with that username already exists.",
            ));
        }
        if other(
            self.user_repo
                .get_by_email(email)
                .await
                .context("Failed to check email")?,
        ) {
            return Err(ServiceError::validation(
                "email",
                "A user with that email already exists.",
            ));
        }
        Ok(())
    }
}

fn validate_username(username: &str) -> ServiceResult<()> {
    if username.is_empty() {
        return Err(ServiceError::validation("username", "This field may not be blank."));
    }
    limit_text("username", username, MAX_USERNAME_LENGTH)?;
    if !USERNAME_RE.is_match(username) {
        return Err(ServiceError::validation(
            "username",
            "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.",
        ));
    }
    Ok(())
}

fn validate_email(email: &str) -> ServiceResult<()> {
    if email.is_empty() {
        return Err(ServiceError::validation("email", "This field may not be blank."));
    }
    if !EMAIL_RE.is_match(email) {
        return Err(ServiceError::validation("email", "Enter a valid email address."));
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::testing::{register, user_service};
    use super::*;
    use crate::db::repositories::test_support::setup_pool;
    use crate::db::repositories::SqlxSessionRepository;

    fn field_of(err: ServiceError) -> String {
        match err {
            ServiceError::Validation { field, .. } => field,
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_register_defaults_to_reader() {
        let pool = setup_pool().await;
        let (service, _) = user_service(&pool);

        let user = service
            .register(RegisterInput::new("ann", "ann@example.com", "s3cret-pass"))
            .await
            .unwrap();
        assert_eq!(user.role, UserRole::Reader);
        assert!(user.password_hash.starts_with("$argon2id$"));
    }

    #[tokio::test]
    async fn test_register_validation() {
        let pool = setup_pool().await;
        let (service, _) = user_service(&pool);

        let err = service
            .register(RegisterInput::new("bad name", "x@example.com", "s3cret-pass"))
            .await
            .unwrap_err();
        assert_eq!(field_of(err), "username");

        let err = service
            .register(RegisterInput::new("ann", "not-an-email", "s3cret-pass"))
            .await
            .unwrap_err();
        assert_eq!(field_of(err), "email");

        let err = service
            .register(RegisterInput::new("ann", "ann@example.com", "12345678"))
            .await
            .unwrap_err();
        assert_eq!(field_of(err), "password");

        let mut editor = RegisterInput::new("ed", "ed@example.com", "s3cret-pass");
        editor.role = Some(UserRole::Editor);
        assert_eq!(field_of(service.register(editor).await.unwrap_err()), "role");
    }

    #[tokio::test]
    async fn test_register_duplicates_rejected() {
        let pool = setup_pool().await;
        let (service, _) = user_service(&pool);
        register(&service, "ann", UserRole::Reader).await;

        let err = service
            .register(RegisterInput::new("ann", "other@example.com", "s3cret-pass"))
            .await
            .unwrap_err();
        assert_eq!(field_of(err), "username");

        let err = service
            .register(RegisterInput::new("anna", "ann@example.com", "s3cret-pass"))
            .await
            .unwrap_err();
        assert_eq!(field_of(err), "email");
    }

    #[tokio::test]
    async fn test_tokens_and_refresh() {
        let pool = setup_pool().await;
        let (service, _) = user_service(&pool);
        let ann = register(&service, "ann", UserRole::Reader).await;

        assert!(matches!(
            service.issue_tokens("ann", "wrong-pass").await,
            Err(ServiceError::Authentication(_))
        ));

        let pair = service.issue_tokens("ann", "s3cret-pass").await.unwrap();
        assert_eq!(service.user_from_access_token(&pair.access).await.unwrap().id, ann.id);

        let access = service.refresh_token(&pair.refresh).await.unwrap();
        assert_eq!(service.user_from_access_token(&access).await.unwrap().id, ann.id);
        assert!(service.refresh_token(&pair.access).await.is_err());
        assert!(service.user_from_access_token(&pair.refresh).await.is_err());
    }

    #[tokio::test]
    async fn test_session_lifecycle() {
        let pool = setup_pool().await;
        let (service, _) = user_service(&pool);
        let ann = register(&service, "ann", UserRole::Reader).await;

        let (session, user) = service.login("ann", "s3cret-pass").await.unwrap();
        assert_eq!(user.id, ann.id);
        assert_eq!(
            service.validate_session(&session.id).await.unwrap().map(|u| u.id),
            Some(ann.id)
        );

        service.logout(&session.id).await.unwrap();
        assert!(service.validate_session(&session.id).await.unwrap().is_none());
        assert!(service.validate_session("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_session_is_dropped() {
        let pool = setup_pool().await;
        let (service, _) = user_service(&pool);
        let ann = register(&service, "ann", UserRole::Reader).await;

        let sessions = SqlxSessionRepository::new(pool.clone());
        let expired = Session::new(ann.id, Duration::seconds(-10));
        sessions.create(&expired).await.unwrap();

        assert!(service.validate_session(&expired.id).await.unwrap().is_none());
        assert!(sessions.get_by_id(&expired.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_change_password() {
        let pool = setup_pool().await;
        let (service, _) = user_service(&pool);
        let ann = register(&service, "ann", UserRole::Reader).await;

        let err = service.change_password(&ann, "nope", "brand-new-pass").await.unwrap_err();
        assert_eq!(field_of(err), "old_password");
        let err = service.change_password(&ann, "s3cret-pass", "short").await.unwrap_err();
        assert_eq!(field_of(err), "new_password");

        service.change_password(&ann, "s3cret-pass", "brand-new-pass").await.unwrap();
        assert!(service.authenticate("ann", "brand-new-pass").await.is_ok());
        assert!(service.authenticate("ann", "s3cret-pass").await.is_err());
    }

    #[tokio::test]
    async fn test_password_reset_flow() {
        let pool = setup_pool().await;
        let (service, mailer) = user_service(&pool);
        let ann = register(&service, "ann", UserRole::Reader).await;

        assert_eq!(field_of(service.request_password_reset(" ").await.unwrap_err()), "email");
        assert!(matches!(
            service.request_password_reset("nobody@example.com").await,
            Err(ServiceError::NotFound(_))
        ));

        service.request_password_reset("ann@example.com").await.unwrap();
        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        let marker = format!("/reset-password/{}/", ann.id);
        let start = sent[0].body.find(&marker).unwrap() + marker.len();
        let token = sent[0].body[start..].split('/').next().unwrap().to_string();

        assert!(service.confirm_password_reset(ann.id, "garbage", "brand-new-pass").await.is_err());
        service
            .confirm_password_reset(ann.id, &token, "brand-new-pass")
            .await
            .unwrap();
        assert!(service.authenticate("ann", "brand-new-pass").await.is_ok());

        // The password changed, so the same token no longer works
        let err = service
            .confirm_password_reset(ann.id, &token, "another-pass-1")
            .await
            .unwrap_err();
        assert_eq!(field_of(err), "token");
    }

    #[tokio::test]
    async fn test_by_role() {
        let pool = setup_pool().await;
        let (service, _) = user_service(&pool);
        register(&service, "ann", UserRole::Reader).await;
        register(&service, "jo", UserRole::Journalist).await;

        assert_eq!(field_of(service.by_role(None).await.unwrap_err()), "role");
        assert_eq!(field_of(service.by_role(Some("pilot")).await.unwrap_err()), "role");
        let journalists = service.by_role(Some("journalist")).await.unwrap();
        assert_eq!(journalists.len(), 1);
        assert_eq!(journalists[0].username, "jo");
    }

    #[tokio::test]
    async fn test_update_permissions() {
        let pool = setup_pool().await;
        let (service, _) = user_service(&pool);
        let ann = register(&service, "ann", UserRole::Reader).await;
        let bob = register(&service, "bob", UserRole::Reader).await;
        let ed = register(&service, "ed", UserRole::Editor).await;

        let rename = UpdateUserInput {
            first_name: Some("Ann".into()),
            ..Default::default()
        };
        assert_eq!(service.update(&ann, ann.id, rename.clone()).await.unwrap().first_name, "Ann");
        assert!(matches!(
            service.update(&bob, ann.id, rename).await,
            Err(ServiceError::PermissionDenied(_))
        ));

        let promote = UpdateUserInput {
            role: Some(UserRole::Journalist),
            ..Default::default()
        };
        assert!(matches!(
            service.update(&ann, ann.id, promote.clone()).await,
            Err(ServiceError::PermissionDenied(_))
        ));
        assert_eq!(
            service.update(&ed, ann.id, promote).await.unwrap().role,
            UserRole::Journalist
        );

        let steal = UpdateUserInput {
            email: Some("bob@example.com".into()),
            ..Default::default()
        };
        assert_eq!(field_of(service.update(&ann, ann.id, steal).await.unwrap_err()), "email");
    }

    #[tokio::test]
    async fn test_editor_create_and_delete() {
        let pool = setup_pool().await;
        let (service, _) = user_service(&pool);
        let ann = register(&service, "ann", UserRole::Reader).await;
        let ed = register(&service, "ed", UserRole::Editor).await;

        let input = CreateUserInput {
            username: "ed2".into(),
            email: "ed2@example.com".into(),
            password: "s3cret-pass".into(),
            role: Some(UserRole::Editor),
            ..Default::default()
        };
        assert!(matches!(
            service.create(&ann, input.clone()).await,
            Err(ServiceError::PermissionDenied(_))
        ));
        let ed2 = service.create(&ed, input).await.unwrap();
        assert_eq!(ed2.role, UserRole::Editor);

        assert!(matches!(service.delete(&ann, ed2.id).await, Err(ServiceError::PermissionDenied(_))));
        service.delete(&ed, ed2.id).await.unwrap();
        assert!(matches!(service.delete(&ed, ed2.id).await, Err(ServiceError::NotFound(_))));
        assert!(matches!(service.get(ed2.id).await, Err(ServiceError::NotFound(_))));
    }
}
