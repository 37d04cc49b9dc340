//! Articles and newsletters
//!
//! Both kinds share one record shape and one editorial workflow:
//!
//! ```text
//! Draft --approve (editor)--> Approved --publish (author or editor)--> Published
//! ```
//!
//! No transition skips a state and none reverses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{Capability, ParseEnumError, User};

/// Which table a piece of content lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Article,
    Newsletter,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Article => "article",
            ContentKind::Newsletter => "newsletter",
        }
    }

    pub fn table(&self) -> &'static str {
        match self {
            ContentKind::Article => "articles",
            ContentKind::Newsletter => "newsletters",
        }
    }

    /// "Article" / "Newsletter"
    pub fn label(&self) -> &'static str {
        match self {
            ContentKind::Article => "Article",
            ContentKind::Newsletter => "Newsletter",
        }
    }

    /// Only articles carry a category and an image
    pub fn has_category(&self) -> bool {
        matches!(self, ContentKind::Article)
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentKind {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "article" => Ok(ContentKind::Article),
            "newsletter" => Ok(ContentKind::Newsletter),
            _ => Err(ParseEnumError::new("content kind", s)),
        }
    }
}

impl TryFrom<String> for ContentKind {
    type Error = ParseEnumError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Position in the editorial workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentState {
    Draft,
    Approved,
    Published,
}

impl ContentState {
    /// Derive the state from the stored flags. Returns `None` for the
    /// impossible combination published-but-not-approved.
    pub fn from_flags(is_approved: bool, is_published: bool) -> Option<Self> {
        match (is_approved, is_published) {
            (false, false) => Some(ContentState::Draft),
            (true, false) => Some(ContentState::Approved),
            (true, true) => Some(ContentState::Published),
            (false, true) => None,
        }
    }
}

/// Reasons a workflow transition is refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum WorkflowError {
    #[error("Only editors can approve content.")]
    NotEditor,
    #[error("Only the author or an editor can publish this content.")]
    NotAllowedToPublish,
    #[error("Content is already approved.")]
    AlreadyApproved,
    #[error("Content must be approved before publishing.")]
    NotApproved,
    #[error("Content is already published.")]
    AlreadyPublished,
}

impl WorkflowError {
    /// Permission failures as opposed to state preconditions
    pub fn is_permission(&self) -> bool {
        matches!(self, WorkflowError::NotEditor | WorkflowError::NotAllowedToPublish)
    }
}

/// An article or a newsletter
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Content {
    pub id: i64,
    #[sqlx(try_from = "String")]
    pub kind: ContentKind,
    pub title: String,
    #[sqlx(rename = "content")]
    #[serde(rename = "content")]
    pub body: String,
    pub author_id: i64,
    pub publisher_id: Option<i64>,
    /// Always `None` for newsletters
    pub category_id: Option<i64>,
    /// Image reference (URL or path); always `None` for newsletters
    pub image: Option<String>,
    pub is_independent: bool,
    pub is_approved: bool,
    pub approved_by: Option<i64>,
    pub approval_date: Option<DateTime<Utc>>,
    pub is_published: bool,
    pub published_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Content {
    pub fn state(&self) -> ContentState {
        // The schema forbids published-but-unapproved; treat it as published.
        ContentState::from_flags(self.is_approved, self.is_published)
            .unwrap_or(ContentState::Published)
    }

    /// Published and approved, i.e. visible to everyone
    pub fn is_public(&self) -> bool {
        self.is_published && self.is_approved
    }

    /// Whether `viewer` may see this item at all
    pub fn is_visible_to(&self, viewer: Option<&User>) -> bool {
        if self.is_public() {
            return true;
        }
        match viewer {
            Some(user) if user.can(Capability::ManageAllContent) => true,
            Some(user) => user.can(Capability::ViewOwnDrafts) && user.id == self.author_id,
            None => false,
        }
    }

    /// Check that `actor` may move this item from Draft to Approved
    pub fn check_approve(&self, actor: &User) -> Result<(), WorkflowError> {
        if !actor.can(Capability::ApproveContent) {
            return Err(WorkflowError::NotEditor);
        }
        match self.state() {
            ContentState::Draft => Ok(()),
            ContentState::Approved | ContentState::Published => Err(WorkflowError::AlreadyApproved),
        }
    }

    /// Check that `actor` may move this item from Approved to Published
    pub fn check_publish(&self, actor: &User) -> Result<(), WorkflowError> {
        let is_author = actor.id == self.author_id && actor.can(Capability::PublishOwn);
        if !is_author && !actor.can(Capability::ManageAllContent) {
            return Err(WorkflowError::NotAllowedToPublish);
        }
        match self.state() {
            ContentState::Draft => Err(WorkflowError::NotApproved),
            ContentState::Approved => Ok(()),
            ContentState::Published => Err(WorkflowError::AlreadyPublished),
        }
    }

    /// Apply the approval in memory
    pub fn approve(&mut self, actor: &User, now: DateTime<Utc>) -> Result<(), WorkflowError> {
        self.check_approve(actor)?;
        self.is_approved = true;
        self.approved_by = Some(actor.id);
        self.approval_date = Some(now);
        Ok(())
    }

    /// Apply the publication in memory
    pub fn publish(&mut self, actor: &User, now: DateTime<Utc>) -> Result<(), WorkflowError> {
        self.check_publish(actor)?;
        self.is_published = true;
        self.published_date = Some(now);
        Ok(())
    }
}

/// Who is looking, reduced to what the listing query needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    /// Published and approved only
    Public,
    /// Public items plus everything authored by this user
    PublicOrAuthor(i64),
    /// Everything
    All,
}

impl Visibility {
    pub fn for_viewer(viewer: Option<&User>) -> Self {
        match viewer {
            Some(user) if user.can(Capability::ManageAllContent) => Visibility::All,
            Some(user) if user.can(Capability::ViewOwnDrafts) => Visibility::PublicOrAuthor(user.id),
            _ => Visibility::Public,
        }
    }
}

/// Listing filter for content queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentQuery {
    pub visibility: Visibility,
    pub author_id: Option<i64>,
    pub publisher_id: Option<i64>,
    pub category_id: Option<i64>,
    /// `Some(false)` lists items waiting for approval
    pub approved: Option<bool>,
}

impl ContentQuery {
    pub fn visible_to(viewer: Option<&User>) -> Self {
        Self {
            visibility: Visibility::for_viewer(viewer),
            author_id: None,
            publisher_id: None,
            category_id: None,
            approved: None,
        }
    }

    pub fn authored_by(author_id: i64) -> Self {
        Self {
            author_id: Some(author_id),
            ..Self::visible_to(None).with_visibility(Visibility::All)
        }
    }

    pub fn pending() -> Self {
        Self {
            approved: Some(false),
            ..Self::visible_to(None).with_visibility(Visibility::All)
        }
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn in_category(mut self, category_id: Option<i64>) -> Self {
        self.category_id = category_id;
        self
    }
}

/// Input for creating content. `author_id` comes from the requester.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateContentInput {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub publisher_id: Option<i64>,
    #[serde(default)]
    pub category_id: Option<i64>,
    #[serde(default)]
    pub image: Option<String>,
    /// Defaults to "no publisher given"
    #[serde(default)]
    pub is_independent: Option<bool>,
}

/// Partial update. For nullable references the outer `Option` means
/// "field present", the inner one the new value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateContentInput {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub publisher_id: Option<Option<i64>>,
    #[serde(default, deserialize_with = "present")]
    pub category_id: Option<Option<i64>>,
    #[serde(default, deserialize_with = "present")]
    pub image: Option<Option<String>>,
    #[serde(default)]
    pub is_independent: Option<bool>,
}

/// Distinguish an explicit `null` from an absent field
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
