//! Publishers and their staff

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{ParseEnumError, UserRole};

/// A news organization that owns content and staff
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Publisher {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// Input for creating or replacing a publisher
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PublisherInput {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// Role a user holds inside one publisher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StaffRole {
    Editor,
    Journalist,
}

impl StaffRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            StaffRole::Editor => "editor",
            StaffRole::Journalist => "journalist",
        }
    }

    /// The account role a user needs to hold this staff role
    pub fn required_user_role(&self) -> UserRole {
        match self {
            StaffRole::Editor => UserRole::Editor,
            StaffRole::Journalist => UserRole::Journalist,
        }
    }

    /// Staff role matching an account role, if that role can be staff at all
    pub fn for_user_role(role: UserRole) -> Option<Self> {
        match role {
            UserRole::Editor => Some(StaffRole::Editor),
            UserRole::Journalist => Some(StaffRole::Journalist),
            UserRole::Reader => None,
        }
    }
}

impl fmt::Display for StaffRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StaffRole {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "editor" => Ok(StaffRole::Editor),
            "journalist" => Ok(StaffRole::Journalist),
            _ => Err(ParseEnumError::new("staff role", s)),
        }
    }
}

impl TryFrom<String> for StaffRole {
    type Error = ParseEnumError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Membership of a user in a publisher's staff
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PublisherStaff {
    pub id: i64,
    pub publisher_id: i64,
    pub user_id: i64,
    #[sqlx(try_from = "String")]
    pub role: StaffRole,
    pub joined_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staff_role_matches_user_role() {
        assert_eq!(StaffRole::Editor.required_user_role(), UserRole::Editor);
        assert_eq!(StaffRole::for_user_role(UserRole::Journalist), Some(StaffRole::Journalist));
        assert_eq!(StaffRole::for_user_role(UserRole::Reader), None);
    }

    #[test]
    fn test_staff_role_parse() {
        assert_eq!("Editor".parse::<StaffRole>().unwrap(), StaffRole::Editor);
        assert!("reader".parse::<StaffRole>().is_err());
    }
}
