//! Content service
//!
//! Articles and newsletters through one code path, parameterized by
//! [`ContentKind`]. Visibility follows the viewer's role, mutations follow the
//! ownership rule, and approval/publication run the editorial state machine
//! with compare-and-set writes so a concurrent loser gets a precondition error.

use anyhow::Context;
use chrono::Utc;
use std::sync::Arc;

use super::notify::NotificationService;
use super::{limit_text, require_text, ServiceError, ServiceResult};
use crate::db::repositories::{
    CategoryRepository, ContentRepository, PublisherRepository, UserRepository,
};
use crate::models::{
    Capability, Content, ContentKind, ContentQuery, CreateContentInput, ListParams, PagedResult,
    UpdateContentInput, User, WorkflowError,
};

const MAX_TITLE_LENGTH: usize = 200;
const NOT_ALLOWED: &str = "You do not have permission to perform this action.";

pub struct ContentService {
    content_repo: Arc<dyn ContentRepository>,
    publisher_repo: Arc<dyn PublisherRepository>,
    category_repo: Arc<dyn CategoryRepository>,
    user_repo: Arc<dyn UserRepository>,
    notifier: Arc<NotificationService>,
}

impl ContentService {
    pub fn new(
        content_repo: Arc<dyn ContentRepository>,
        publisher_repo: Arc<dyn PublisherRepository>,
        category_repo: Arc<dyn CategoryRepository>,
        user_repo: Arc<dyn UserRepository>,
        notifier: Arc<NotificationService>,
    ) -> Self {
        Self {
            content_repo,
            publisher_repo,
            category_repo,
            user_repo,
            notifier,
        }
    }

    /// Create a draft authored by the requester
    pub async fn create(
        &self,
        requester: &User,
        kind: ContentKind,
        input: CreateContentInput,
    ) -> ServiceResult<Content> {
        if !requester.can(Capability::AuthorContent) {
            return Err(ServiceError::permission(format!(
                "Only journalists and editors can create {}s.",
                kind
            )));
        }

        validate_title(&input.title)?;
        require_text("content", &input.content)?;
        self.check_publisher(input.publisher_id).await?;
        self.check_category_fields(kind, input.category_id, input.image.as_deref())
            .await?;

        let now = Utc::now();
        let draft = Content {
            id: 0,
            kind,
            title: input.title.trim().to_string(),
            body: input.content,
            author_id: requester.id,
            publisher_id: input.publisher_id,
            category_id: input.category_id,
            image: input.image.filter(|s| !s.trim().is_empty()),
            is_independent: input.is_independent.unwrap_or(input.publisher_id.is_none()),
            is_approved: false,
            approved_by: None,
            approval_date: None,
            is_published: false,
            published_date: None,
            created_at: now,
            updated_at: now,
        };

        let content = self
            .content_repo
            .create(&draft)
            .await
            .with_context(|| format!("Failed to create {}", kind))?;
        tracing::info!("{} {} drafted by {}", kind.label(), content.id, requester.username);
        Ok(content)
    }

    /// One item, if the viewer may see it
    pub async fn get(
        &self,
        viewer: Option<&User>,
        kind: ContentKind,
        id: i64,
    ) -> ServiceResult<Content> {
        let content = self.load(kind, id).await?;
        if !content.is_visible_to(viewer) {
            return Err(not_found(kind));
        }
        Ok(content)
    }

    /// Everything the viewer may see, newest first
    pub async fn list(
        &self,
        viewer: Option<&User>,
        kind: ContentKind,
        category_id: Option<i64>,
        params: &ListParams,
    ) -> ServiceResult<PagedResult<Content>> {
        let query = ContentQuery::visible_to(viewer).in_category(category_id);
        self.query(kind, &query, params).await
    }

    pub async fn update(
        &self,
        requester: &User,
        kind: ContentKind,
        id: i64,
        input: UpdateContentInput,
    ) -> ServiceResult<Content> {
        let mut content = self.get(Some(requester), kind, id).await?;
        if !requester.can_modify(content.author_id) {
            return Err(ServiceError::permission(NOT_ALLOWED));
        }

        if let Some(title) = input.title {
            validate_title(&title)?;
            content.title = title.trim().to_string();
        }
        if let Some(body) = input.content {
            require_text("content", &body)?;
            content.body = body;
        }
        if let Some(publisher_id) = input.publisher_id {
            self.check_publisher(publisher_id).await?;
            content.publisher_id = publisher_id;
        }
        if let Some(category_id) = input.category_id {
            self.check_category_fields(kind, category_id, None).await?;
            content.category_id = category_id;
        }
        if let Some(image) = input.image {
            self.check_category_fields(kind, None, image.as_deref()).await?;
            content.image = image.filter(|s| !s.trim().is_empty());
        }
        if let Some(is_independent) = input.is_independent {
            content.is_independent = is_independent;
        }

        Ok(self
            .content_repo
            .update(&content)
            .await
            .with_context(|| format!("Failed to update {}", kind))?)
    }

    pub async fn delete(&self, requester: &User, kind: ContentKind, id: i64) -> ServiceResult<()> {
        let content = self.get(Some(requester), kind, id).await?;
        if !requester.can_modify(content.author_id) {
            return Err(ServiceError::permission(NOT_ALLOWED));
        }
        self.content_repo
            .delete(kind, id)
            .await
            .with_context(|| format!("Failed to delete {}", kind))?;
        tracing::info!("{} {} deleted by {}", kind.label(), id, requester.username);
        Ok(())
    }

    /// Draft -> Approved; editors only
    pub async fn approve(&self, requester: &User, kind: ContentKind, id: i64) -> ServiceResult<Content> {
        if !requester.can(Capability::ApproveContent) {
            return Err(WorkflowError::NotEditor.into());
        }
        let content = self.load(kind, id).await?;
        content.check_approve(requester)?;

        let now = Utc::now();
        let won = self
            .content_repo
            .approve(kind, id, requester.id, now)
            .await
            .with_context(|| format!("Failed to approve {}", kind))?;
        if !won {
            return Err(WorkflowError::AlreadyApproved.into());
        }
        tracing::info!("{} {} approved by {}", kind.label(), id, requester.username);
        self.load(kind, id).await
    }

    /// Approved -> Published; the author or an editor. Subscribers are notified.
    pub async fn publish(&self, requester: &User, kind: ContentKind, id: i64) -> ServiceResult<Content> {
        let content = self.load(kind, id).await?;
        if !content.is_visible_to(Some(requester)) {
            return Err(not_found(kind));
        }
        content.check_publish(requester)?;

        let now = Utc::now();
        let won = self
            .content_repo
            .publish(kind, id, now)
            .await
            .with_context(|| format!("Failed to publish {}", kind))?;
        if !won {
            let current = self.load(kind, id).await?;
            let err = if current.is_published {
                WorkflowError::AlreadyPublished
            } else {
                WorkflowError::NotApproved
            };
            return Err(err.into());
        }
        tracing::info!("{} {} published by {}", kind.label(), id, requester.username);

        let published = self.load(kind, id).await?;
        self.notify(&published).await;
        Ok(published)
    }

    /// The requester's own items, drafts included
    pub async fn my_content(
        &self,
        requester: &User,
        kind: ContentKind,
        params: &ListParams,
    ) -> ServiceResult<PagedResult<Content>> {
        self.query(kind, &ContentQuery::authored_by(requester.id), params).await
    }

    /// Items waiting for an editor
    pub async fn pending_approval(
        &self,
        requester: &User,
        kind: ContentKind,
        params: &ListParams,
    ) -> ServiceResult<PagedResult<Content>> {
        if !requester.can(Capability::ApproveContent) {
            return Err(ServiceError::permission("Only editors can view pending content."));
        }
        self.query(kind, &ContentQuery::pending(), params).await
    }

    async fn query(
        &self,
        kind: ContentKind,
        query: &ContentQuery,
        params: &ListParams,
    ) -> ServiceResult<PagedResult<Content>> {
        let (items, total) = self
            .content_repo
            .list(kind, query, params)
            .await
            .with_context(|| format!("Failed to list {}s", kind))?;
        Ok(PagedResult::new(items, total, params))
    }

    async fn load(&self, kind: ContentKind, id: i64) -> ServiceResult<Content> {
        self.content_repo
            .get_by_id(kind, id)
            .await
            .with_context(|| format!("Failed to get {}", kind))?
            .ok_or_else(|| not_found(kind))
    }

    async fn notify(&self, content: &Content) {
        match self.user_repo.get_by_id(content.author_id).await {
            Ok(Some(author)) => {
                self.notifier.notify_published(content, &author).await;
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("Skipping notification for {} {}: {:#}", content.kind, content.id, e),
        }
    }

    async fn check_publisher(&self, publisher_id: Option<i64>) -> ServiceResult<()> {
        let Some(id) = publisher_id else {
            return Ok(());
        };
        let exists = self
            .publisher_repo
            .get_by_id(id)
            .await
            .context("Failed to check publisher")?
            .is_some();
        if !exists {
            return Err(ServiceError::validation("publisher_id", missing_object(id)));
        }
        Ok(())
    }

    /// Categories and images exist on articles only
    async fn check_category_fields(
        &self,
        kind: ContentKind,
        category_id: Option<i64>,
        image: Option<&str>,
    ) -> ServiceResult<()> {
        if !kind.has_category() {
            if category_id.is_some() {
                return Err(ServiceError::validation("category_id", "Newsletters have no category."));
            }
            if image.is_some_and(|s| !s.trim().is_empty()) {
                return Err(ServiceError::validation("image", "Newsletters have no image."));
            }
            return Ok(());
        }

        if let Some(id) = category_id {
            let exists = self
                .category_repo
                .get_by_id(id)
                .await
                .context("Failed to check category")?
                .is_some();
            if !exists {
                return Err(ServiceError::validation("category_id", missing_object(id)));
            }
        }
        if let Some(image) = image {
            limit_text("image", image, 255)?;
        }
        Ok(())
    }
}

fn validate_title(title: &str) -> ServiceResult<()> {
    require_text("title", title)?;
    limit_text("title", title.trim(), MAX_TITLE_LENGTH)
}

fn missing_object(id: i64) -> String {
    format!("Invalid pk \"{}\" - object does not exist.", id)
}

fn not_found(kind: ContentKind) -> ServiceError {
    ServiceError::not_found(format!("{} not found.", kind.label()))
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::db::repositories::{
        SqlxCategoryRepository, SqlxContentRepository, SqlxPublisherRepository, SqlxUserRepository,
    };
    use crate::db::DynDatabasePool;
    use crate::services::notify::testing::{recording_notifier, RecordingMailer};

    pub fn content_service(pool: &DynDatabasePool) -> (ContentService, Arc<RecordingMailer>) {
        let (notifier, mailer) = recording_notifier(pool);
        let service = ContentService::new(
            SqlxContentRepository::boxed(pool.clone()),
            SqlxPublisherRepository::boxed(pool.clone()),
            SqlxCategoryRepository::boxed(pool.clone()),
            SqlxUserRepository::boxed(pool.clone()),
            notifier,
        );
        (service, mailer)
    }

    pub fn draft(title: &str) -> CreateContentInput {
        CreateContentInput {
            title: title.into(),
            content: "Body text".into(),
            ..Default::default()
        }
    }
}
