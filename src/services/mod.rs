//! Services layer - business rules
//!
//! Services sit between the HTTP surfaces and the repositories. They apply
//! the role capability gate, ownership checks, the editorial workflow and
//! input validation, and report failures through one shared [`ServiceError`].

pub mod category;
pub mod comment;
pub mod content;
pub mod notify;
pub mod password;
pub mod publisher;
pub mod subscription;
pub mod token;
pub mod user;

pub use category::{CategoryPatch, CategoryService};
pub use comment::CommentService;
pub use content::ContentService;
pub use notify::{
    mailer_from_config, LogMailer, Mailer, NotificationService, OutgoingEmail, SmtpMailer,
};
pub use password::{hash_password, validate_password, verify_password};
pub use publisher::{PublisherPatch, PublisherService, StaffMember};
pub use subscription::{
    JournalistSummary, PublisherSummary, SubscribedContent, SubscriptionList, SubscriptionService,
};
pub use token::{Claims, TokenKind, TokenPair, TokenService};
pub use user::{RegisterInput, UserService};

use crate::models::{TargetError, WorkflowError};

/// Field name used for errors that belong to no single input field
pub const NON_FIELD_ERRORS: &str = "non_field_errors";

/// Every way a service operation can fail
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Missing or invalid credentials
    #[error("{0}")]
    Authentication(String),

    /// Authenticated, but the role or ownership rule forbids it
    #[error("{0}")]
    PermissionDenied(String),

    /// Input rejected; `field` names the offending input
    #[error("{field}: {message}")]
    Validation { field: String, message: String },

    /// The target is not in a state that allows the operation
    #[error("{0}")]
    Precondition(String),

    /// The operation would duplicate an existing record
    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ServiceError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        ServiceError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn permission(message: impl Into<String>) -> Self {
        ServiceError::PermissionDenied(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ServiceError::NotFound(message.into())
    }
}

impl From<WorkflowError> for ServiceError {
    fn from(err: WorkflowError) -> Self {
        if err.is_permission() {
            ServiceError::PermissionDenied(err.to_string())
        } else {
            ServiceError::Precondition(err.to_string())
        }
    }
}

impl From<TargetError> for ServiceError {
    fn from(err: TargetError) -> Self {
        ServiceError::validation(NON_FIELD_ERRORS, err.to_string())
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Reject an empty (after trimming) required text field
pub(crate) fn require_text(field: &str, value: &str) -> ServiceResult<()> {
    if value.trim().is_empty() {
        return Err(ServiceError::validation(field, "This field may not be blank."));
    }
    Ok(())
}

/// Reject text longer than `max` characters
pub(crate) fn limit_text(field: &str, value: &str, max: usize) -> ServiceResult<()> {
    if value.chars().count() > max {
        return Err(ServiceError::validation(
            field,
            format!("Ensure this field has no more than {} characters.", max),
        ));
    }
    Ok(())
}
