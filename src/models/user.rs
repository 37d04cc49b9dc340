//! User model and the role capability gate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::ParseEnumError;

/// A registered account. The single `role` decides what the user may do.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    /// Password hash (argon2)
    #[serde(skip_serializing)]
    pub password_hash: String,
    #[sqlx(try_from = "String")]
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Create a new, unsaved user. The password must already be hashed.
    pub fn new(username: String, email: String, password_hash: String, role: UserRole) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            username,
            email,
            first_name: String::new(),
            last_name: String::new(),
            password_hash,
            role,
            created_at: now,
            updated_at: now,
        }
    }

    /// "First Last", trimmed; empty when neither name is set
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    /// Full name, falling back to the username
    pub fn display_name(&self) -> String {
        let full = self.full_name();
        if full.is_empty() {
            self.username.clone()
        } else {
            full
        }
    }

    pub fn is_editor(&self) -> bool {
        self.role == UserRole::Editor
    }

    pub fn can(&self, capability: Capability) -> bool {
        self.role.can(capability)
    }

    /// Ownership rule for articles, newsletters and comments:
    /// the author or any editor.
    pub fn can_modify(&self, author_id: i64) -> bool {
        self.id == author_id || self.role.can(Capability::ManageAllContent)
    }
}

/// Mutually exclusive user roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    #[default]
    Reader,
    Journalist,
    Editor,
}

/// Everything a role may be allowed to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Read published and approved content
    ReadPublished,
    Comment,
    /// Follow publishers and journalists
    Subscribe,
    /// Create articles and newsletters
    AuthorContent,
    /// See one's own unpublished content
    ViewOwnDrafts,
    /// Publish one's own approved content
    PublishOwn,
    ApproveContent,
    /// Edit, delete, publish and view anyone's content
    ManageAllContent,
    ManagePublishers,
    ManageCategories,
    ManageStaff,
    ManageUsers,
}

impl UserRole {
    pub const ALL: [UserRole; 3] = [UserRole::Reader, UserRole::Journalist, UserRole::Editor];

    /// Pure capability check; no per-resource state is consulted.
    pub fn can(self, capability: Capability) -> bool {
        use Capability::*;
        match self {
            UserRole::Reader => matches!(capability, ReadPublished | Comment | Subscribe),
            UserRole::Journalist => matches!(
                capability,
                ReadPublished | Comment | AuthorContent | ViewOwnDrafts | PublishOwn
            ),
            UserRole::Editor => !matches!(capability, Subscribe),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Reader => "reader",
            UserRole::Journalist => "journalist",
            UserRole::Editor => "editor",
        }
    }

    /// Human label used by the web pages
    pub fn label(&self) -> &'static str {
        match self {
            UserRole::Reader => "Reader",
            UserRole::Journalist => "Journalist",
            UserRole::Editor => "Editor",
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserRole {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "reader" => Ok(UserRole::Reader),
            "journalist" => Ok(UserRole::Journalist),
            "editor" => Ok(UserRole::Editor),
            _ => Err(ParseEnumError::new("role", s)),
        }
    }
}

impl TryFrom<String> for UserRole {
    type Error = ParseEnumError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Input for creating a user (before password hashing)
#[derive(Debug, Clone, Default)]
pub struct CreateUserInput {
    pub username: String,
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    /// Defaults to reader
    pub role: Option<UserRole>,
}

/// Partial update of a user
#[derive(Debug, Clone, Default)]
pub struct UpdateUserInput {
    pub username: Option<String>,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    /// Only editors may change roles
    pub role: Option<UserRole>,
}

impl UpdateUserInput {
    pub fn is_empty(&self) -> bool {
        self.username.is_none()
            && self.email.is_none()
            && self.first_name.is_none()
            && self.last_name.is_none()
            && self.role.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn user(id: i64, role: UserRole) -> User {
        let mut u = User::new(format!("user{}", id), format!("u{}@example.com", id), "hash".into(), role);
        u.id = id;
        u
    }

    #[test]
    fn test_role_parse_and_display() {
        for role in UserRole::ALL {
            assert_eq!(role.to_string().parse::<UserRole>().unwrap(), role);
        }
        assert_eq!("EDITOR".parse::<UserRole>().unwrap(), UserRole::Editor);
        assert!("admin".parse::<UserRole>().is_err());
    }

    #[test]
    fn test_default_role_is_reader() {
        assert_eq!(UserRole::default(), UserRole::Reader);
    }

    #[test]
    fn test_only_readers_subscribe() {
        assert!(UserRole::Reader.can(Capability::Subscribe));
        assert!(!UserRole::Journalist.can(Capability::Subscribe));
        assert!(!UserRole::Editor.can(Capability::Subscribe));
    }

    #[test]
    fn test_journalist_capabilities() {
        let role = UserRole::Journalist;
        assert!(role.can(Capability::AuthorContent));
        assert!(role.can(Capability::PublishOwn));
        assert!(!role.can(Capability::ApproveContent));
        assert!(!role.can(Capability::ManagePublishers));
    }

    #[test]
    fn test_full_name() {
        let mut u = user(1, UserRole::Reader);
        assert_eq!(u.full_name(), "");
        assert_eq!(u.display_name(), "user1");
        u.first_name = "Ada".into();
        assert_eq!(u.full_name(), "Ada");
        u.last_name = "Lovelace".into();
        assert_eq!(u.display_name(), "Ada Lovelace");
    }

    fn role_strategy() -> impl Strategy<Value = UserRole> {
        prop_oneof![
            Just(UserRole::Reader),
            Just(UserRole::Journalist),
            Just(UserRole::Editor)
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        #[test]
        fn only_editors_approve(role in role_strategy()) {
            prop_assert_eq!(role.can(Capability::ApproveContent), role == UserRole::Editor);
            prop_assert_eq!(role.can(Capability::ManageUsers), role == UserRole::Editor);
        }

        #[test]
        fn every_role_reads_and_comments(role in role_strategy()) {
            prop_assert!(role.can(Capability::ReadPublished));
            prop_assert!(role.can(Capability::Comment));
        }

        #[test]
        fn ownership_rule(user_id in 1i64..100, author_id in 1i64..100, role in role_strategy()) {
            let u = user(user_id, role);
            let expected = user_id == author_id || role == UserRole::Editor;
            prop_assert_eq!(u.can_modify(author_id), expected);
        }
    }
}
