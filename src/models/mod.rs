//! Data models
//!
//! Entities stored by the repositories, the inputs services accept, and the
//! pure domain rules that sit on them: the role capability gate, the
//! approval/publication workflow, and subscription targets.

mod category;
mod comment;
mod content;
mod pagination;
mod publisher;
mod session;
mod subscription;
mod user;

pub use category::{Category, CategoryInput};
pub use comment::Comment;
pub use content::{
    Content, ContentKind, ContentQuery, ContentState, CreateContentInput, UpdateContentInput,
    Visibility, WorkflowError,
};
pub use pagination::{ListParams, PagedResult, MAX_PAGE_SIZE};
pub use publisher::{Publisher, PublisherInput, PublisherStaff, StaffRole};
pub use session::Session;
pub use subscription::{Subscription, SubscriptionTarget, TargetError};
pub use user::{Capability, CreateUserInput, UpdateUserInput, User, UserRole};

/// A stored or submitted value that does not name a known variant
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid {kind}: {value}")]
pub struct ParseEnumError {
    kind: &'static str,
    value: String,
}

impl ParseEnumError {
    pub fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}
