//! Bearer tokens
//!
//! HS256 JWTs of three kinds: short-lived access tokens, longer-lived refresh
//! tokens, and password reset tokens. A reset token carries a fingerprint of
//! the password hash it was issued against, so it stops working as soon as
//! the password changes.

use anyhow::Context;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::{ServiceError, ServiceResult};
use crate::config::AuthConfig;
use crate::models::{User, UserRole};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
    Reset,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: i64,
    pub username: String,
    pub role: UserRole,
    pub kind: TokenKind,
    pub iat: i64,
    pub exp: i64,
    /// Password hash fingerprint, reset tokens only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fp: Option<String>,
}

/// The pair handed out on login
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
    reset_ttl: Duration,
}

impl TokenService {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            access_ttl: Duration::minutes(config.access_ttl_minutes),
            refresh_ttl: Duration::days(config.refresh_ttl_days),
            reset_ttl: Duration::hours(config.reset_ttl_hours),
        }
    }

    pub fn issue_pair(&self, user: &User) -> ServiceResult<TokenPair> {
        Ok(TokenPair {
            access: self.issue(user, TokenKind::Access)?,
            refresh: self.issue(user, TokenKind::Refresh)?,
        })
    }

    pub fn issue(&self, user: &User, kind: TokenKind) -> ServiceResult<String> {
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
            TokenKind::Reset => self.reset_ttl,
        };
        let fp = (kind == TokenKind::Reset).then(|| fingerprint(&user.password_hash));
        self.sign(user, kind, ttl, fp)
    }

    fn sign(
        &self,
        user: &User,
        kind: TokenKind,
        ttl: Duration,
        fp: Option<String>,
    ) -> ServiceResult<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: user.id,
            username: user.username.clone(),
            role: user.role,
            kind,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            fp,
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .context("Failed to sign token")?;
        Ok(token)
    }

    /// Decode and check a token of the expected kind
    pub fn verify(&self, token: &str, expected: TokenKind) -> ServiceResult<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        let claims = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|e| {
                tracing::debug!("Rejected token: {}", e);
                ServiceError::Authentication("Token is invalid or expired".to_string())
            })?
            .claims;

        if claims.kind != expected {
            return Err(ServiceError::Authentication(
                "Token is invalid or expired".to_string(),
            ));
        }
        Ok(claims)
    }

    /// Check a reset token against the user it claims to be for
    pub fn verify_reset(&self, token: &str, user: &User) -> bool {
        match self.verify(token, TokenKind::Reset) {
            Ok(claims) => {
                claims.sub == user.id
                    && claims.fp.as_deref() == Some(fingerprint(&user.password_hash).as_str())
            }
            Err(_) => false,
        }
    }
}

/// Short digest identifying a password hash without revealing it
fn fingerprint(password_hash: &str) -> String {
    let digest = Sha256::digest(password_hash.as_bytes());
    format!("{:x}", digest)[..32].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> TokenService {
        TokenService::new(&AuthConfig {
            jwt_secret: "test-secret".into(),
            ..AuthConfig::default()
        })
    }

    fn user() -> User {
        let mut user = User::new("alice".into(), "a@example.com".into(), "$argon2id$old".into(), UserRole::Journalist);
        user.id = 7;
        user
    }

    #[test]
    fn test_pair_round_trip() {
        let tokens = service();
        let pair = tokens.issue_pair(&user()).unwrap();

        let claims = tokens.verify(&pair.access, TokenKind::Access).unwrap();
        assert_eq!(claims.sub, 7);
        assert_eq!(claims.role, UserRole::Journalist);
        assert!(claims.fp.is_none());

        assert!(tokens.verify(&pair.refresh, TokenKind::Refresh).is_ok());
    }

    #[test]
    fn test_kinds_are_not_interchangeable() {
        let tokens = service();
        let pair = tokens.issue_pair(&user()).unwrap();
        assert!(tokens.verify(&pair.access, TokenKind::Refresh).is_err());
        assert!(tokens.verify(&pair.refresh, TokenKind::Access).is_err());
    }

    #[test]
    fn test_expired_and_foreign_tokens_rejected() {
        let tokens = service();
        let expired = tokens
            .sign(&user(), TokenKind::Access, Duration::minutes(-5), None)
            .unwrap();
        assert!(matches!(
            tokens.verify(&expired, TokenKind::Access),
            Err(ServiceError::Authentication(_))
        ));

        let other = TokenService::new(&AuthConfig {
            jwt_secret: "other-secret".into(),
            ..AuthConfig::default()
        });
        let foreign = other.issue(&user(), TokenKind::Access).unwrap();
        assert!(tokens.verify(&foreign, TokenKind::Access).is_err());
        assert!(tokens.verify("not-a-jwt", TokenKind::Access).is_err());
    }

    #[test]
    fn test_reset_token_dies_with_password_change() {
        let tokens = service();
        let mut user = user();
        let token = tokens.issue(&user, TokenKind::Reset).unwrap();
        assert!(tokens.verify_reset(&token, &user));

        let mut someone_else = user.clone();
        someone_else.id = 8;
        assert!(!tokens.verify_reset(&token, &someone_else));

        user.password_hash = "$argon2id$new".into();
        assert!(!tokens.verify_reset(&token, &user));
    }
}
