//! Comment service
//!
//! Comments hang off articles and are only as visible as their article.

use anyhow::Context;
use std::sync::Arc;

use super::{require_text, ServiceError, ServiceResult};
use crate::db::repositories::{CommentRepository, ContentRepository};
use crate::models::{Capability, Comment, ContentKind, ListParams, PagedResult, User, Visibility};

pub struct CommentService {
    repo: Arc<dyn CommentRepository>,
    content_repo: Arc<dyn ContentRepository>,
}

impl CommentService {
    pub fn new(repo: Arc<dyn CommentRepository>, content_repo: Arc<dyn ContentRepository>) -> Self {
        Self { repo, content_repo }
    }

    /// Comment on an article the requester can see
    pub async fn create(&self, requester: &User, article_id: i64, content: &str) -> ServiceResult<Comment> {
        if !requester.can(Capability::Comment) {
            return Err(ServiceError::permission("You cannot comment."));
        }
        require_text("content", content)?;

        let article = self
            .content_repo
            .get_by_id(ContentKind::Article, article_id)
            .await
            .context("Failed to get article")?
            .filter(|a| a.is_visible_to(Some(requester)))
            .ok_or_else(|| ServiceError::not_found("Article not found."))?;

        let comment = self
            .repo
            .create(article.id, requester.id, content.trim())
            .await
            .context("Failed to create comment")?;
        tracing::debug!("Comment {} on article {} by {}", comment.id, article.id, requester.username);
        Ok(comment)
    }

    pub async fn get(&self, viewer: Option<&User>, id: i64) -> ServiceResult<Comment> {
        let comment = self
            .repo
            .get_by_id(id)
            .await
            .context("Failed to get comment")?
            .ok_or_else(|| ServiceError::not_found("Comment not found."))?;

        let article_visible = self
            .content_repo
            .get_by_id(ContentKind::Article, comment.article_id)
            .await
            .context("Failed to get article")?
            .is_some_and(|a| a.is_visible_to(viewer));
        if !article_visible {
            return Err(ServiceError::not_found("Comment not found."));
        }
        Ok(comment)
    }

    /// Comments on visible articles, optionally for one article, newest first
    pub async fn list(
        &self,
        viewer: Option<&User>,
        article_id: Option<i64>,
        params: &ListParams,
    ) -> ServiceResult<PagedResult<Comment>> {
        let (items, total) = self
            .repo
            .list(Visibility::for_viewer(viewer), article_id, params)
            .await
            .context("Failed to list comments")?;
        Ok(PagedResult::new(items, total, params))
    }

    pub async fn update(&self, requester: &User, id: i64, content: &str) -> ServiceResult<Comment> {
        let comment = self.get(Some(requester), id).await?;
        if !requester.can_modify(comment.author_id) {
            return Err(ServiceError::permission("You can only edit your own comments."));
        }
        require_text("content", content)?;
        self.repo
            .update(id, content.trim())
            .await
            .context("Failed to update comment")?
            .ok_or_else(|| ServiceError::not_found("Comment not found."))
    }

    pub async fn delete(&self, requester: &User, id: i64) -> ServiceResult<()> {
        let comment = self.get(Some(requester), id).await?;
        if !requester.can_modify(comment.author_id) {
            return Err(ServiceError::permission("You can only delete your own comments."));
        }
        self.repo.delete(id).await.context("Failed to delete comment")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::{insert_article, insert_user, setup_pool};
    use crate::db::repositories::{SqlxCommentRepository, SqlxContentRepository, SqlxUserRepository, UserRepository};
    use crate::db::DynDatabasePool;
    use crate::models::UserRole;

    async fn user(pool: &DynDatabasePool, name: &str, role: UserRole) -> User {
        let id = insert_user(pool, name, role).await;
        SqlxUserRepository::new(pool.clone()).get_by_id(id).await.unwrap().unwrap()
    }

    fn service(pool: &DynDatabasePool) -> CommentService {
        CommentService::new(
            SqlxCommentRepository::boxed(pool.clone()),
            SqlxContentRepository::boxed(pool.clone()),
        )
    }

    #[tokio::test]
    async fn test_comment_on_visible_articles_only() {
        let pool = setup_pool().await;
        let ann = user(&pool, "ann", UserRole::Reader).await;
        let jo = user(&pool, "jo", UserRole::Journalist).await;
        let public = insert_article(&pool, jo.id, true).await;
        let draft = insert_article(&pool, jo.id, false).await;
        let comments = service(&pool);

        let comment = comments.create(&ann, public, "  Great piece ").await.unwrap();
        assert_eq!(comment.content, "Great piece");
        assert_eq!(comment.author_id, ann.id);

        assert!(matches!(comments.create(&ann, draft, "Early!").await, Err(ServiceError::NotFound(_))));
        assert!(matches!(comments.create(&ann, public, "   ").await, Err(ServiceError::Validation { .. })));
        // The author sees their own draft and may comment on it
        assert!(comments.create(&jo, draft, "Note to self").await.is_ok());

        let params = ListParams::default();
        assert_eq!(comments.list(Some(&ann), None, &params).await.unwrap().total, 1);
        assert_eq!(comments.list(Some(&jo), None, &params).await.unwrap().total, 2);
        assert_eq!(comments.list(None, Some(public), &params).await.unwrap().total, 1);
    }

    #[tokio::test]
    async fn test_edit_and_delete_ownership() {
        let pool = setup_pool().await;
        let ann = user(&pool, "ann", UserRole::Reader).await;
        let bob = user(&pool, "bob", UserRole::Reader).await;
        let ed = user(&pool, "ed", UserRole::Editor).await;
        let article = insert_article(&pool, ed.id, true).await;
        let comments = service(&pool);
        let comment = comments.create(&ann, article, "First").await.unwrap();

        assert!(matches!(
            comments.update(&bob, comment.id, "Hijack").await,
            Err(ServiceError::PermissionDenied(_))
        ));
        assert_eq!(comments.update(&ann, comment.id, "Edited").await.unwrap().content, "Edited");

        assert!(matches!(comments.delete(&bob, comment.id).await, Err(ServiceError::PermissionDenied(_))));
        comments.delete(&ed, comment.id).await.unwrap();
        assert!(matches!(comments.get(Some(&ann), comment.id).await, Err(ServiceError::NotFound(_))));
    }
}
