//! Comment repository

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

use crate::db::{with_pool, DynDatabasePool, LastInsertId};
use crate::models::{Comment, ListParams, Visibility};

const COMMENT_COLUMNS: &str = "c.id, c.article_id, c.author_id, c.content, c.created_at, c.updated_at";

#[async_trait]
pub trait CommentRepository: Send + Sync {
    async fn create(&self, article_id: i64, author_id: i64, content: &str) -> Result<Comment>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Comment>>;

    /// Newest-first page of comments on articles the viewer can see,
    /// optionally restricted to one article
    async fn list(
        &self,
        visibility: Visibility,
        article_id: Option<i64>,
        params: &ListParams,
    ) -> Result<(Vec<Comment>, i64)>;

    async fn update(&self, id: i64, content: &str) -> Result<Option<Comment>>;

    async fn delete(&self, id: i64) -> Result<bool>;
}

pub struct SqlxCommentRepository {
    pool: DynDatabasePool,
}

impl SqlxCommentRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn CommentRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl CommentRepository for SqlxCommentRepository {
    async fn create(&self, article_id: i64, author_id: i64, content: &str) -> Result<Comment> {
        let now = Utc::now();
        let id = with_pool!(self.pool, |db| {
            sqlx::query(
                r#"
                INSERT INTO comments (article_id, author_id, content, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(article_id)
            .bind(author_id)
            .bind(content)
            .bind(now)
            .bind(now)
            .execute(db)
            .await
            .context("Failed to create comment")?
            .last_id()
        });

        Ok(Comment {
            id,
            article_id,
            author_id,
            content: content.to_string(),
            created_at: now,
            updated_at: now,
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Comment>> {
        let sql = format!("SELECT {} FROM comments c WHERE c.id = ?", COMMENT_COLUMNS);
        with_pool!(self.pool, |db| {
            sqlx::query_as::<_, Comment>(&sql)
                .bind(id)
                .fetch_optional(db)
                .await
                .context("Failed to get comment by ID")
        })
    }

    async fn list(
        &self,
        visibility: Visibility,
        article_id: Option<i64>,
        params: &ListParams,
    ) -> Result<(Vec<Comment>, i64)> {
        let mut conditions = Vec::new();
        let mut binds = Vec::new();
        match visibility {
            Visibility::Public => {
                conditions.push("a.is_published = 1 AND a.is_approved = 1".to_string())
            }
            Visibility::PublicOrAuthor(user_id) => {
                conditions.push(
                    "((a.is_published = 1 AND a.is_approved = 1) OR a.author_id = ?)".to_string(),
                );
                binds.push(user_id);
            }
            Visibility::All => {}
        }
        if let Some(article_id) = article_id {
            conditions.push("c.article_id = ?".to_string());
            binds.push(article_id);
        }
        let filter = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let from = format!("FROM comments c JOIN articles a ON a.id = c.article_id {}", filter);
        let count_sql = format!("SELECT COUNT(*) {}", from);
        let list_sql = format!(
            "SELECT {} {} ORDER BY c.created_at DESC, c.id DESC LIMIT ? OFFSET ?",
            COMMENT_COLUMNS, from
        );

        with_pool!(self.pool, |db| {
            let mut count = sqlx::query_scalar::<_, i64>(&count_sql);
            for value in &binds {
                count = count.bind(*value);
            }
            let total = count
                .fetch_one(db)
                .await
                .context("Failed to count comments")?;

            let mut rows = sqlx::query_as::<_, Comment>(&list_sql);
            for value in &binds {
                rows = rows.bind(*value);
            }
            let comments = rows
                .bind(params.limit())
                .bind(params.offset())
                .fetch_all(db)
                .await
                .context("Failed to list comments")?;
            Ok((comments, total))
        })
    }

    async fn update(&self, id: i64, content: &str) -> Result<Option<Comment>> {
        let updated = with_pool!(self.pool, |db| {
            sqlx::query("UPDATE comments SET content = ?, updated_at = ? WHERE id = ?")
                .bind(content)
                .bind(Utc::now())
                .bind(id)
                .execute(db)
                .await
                .context("Failed to update comment")?
                .rows_affected()
        });
        if updated == 0 {
            return Ok(None);
        }
        self.get_by_id(id).await
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        with_pool!(self.pool, |db| {
            let result = sqlx::query("DELETE FROM comments WHERE id = ?")
                .bind(id)
                .execute(db)
                .await
                .context("Failed to delete comment")?;
            Ok(result.rows_affected() > 0)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::{insert_article, insert_user, setup_pool};
    use crate::models::UserRole;

    #[tokio::test]
    async fn test_comment_crud() {
        let pool = setup_pool().await;
        let author = insert_user(&pool, "jo", UserRole::Journalist).await;
        let reader = insert_user(&pool, "rea", UserRole::Reader).await;
        let article = insert_article(&pool, author, true).await;
        let repo = SqlxCommentRepository::new(pool);

        let comment = repo.create(article, reader, "Great piece").await.unwrap();
        assert!(comment.id > 0);

        let updated = repo.update(comment.id, "Great piece!").await.unwrap().unwrap();
        assert_eq!(updated.content, "Great piece!");
        assert!(repo.update(comment.id + 1, "x").await.unwrap().is_none());

        assert!(repo.delete(comment.id).await.unwrap());
        assert!(repo.get_by_id(comment.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_respects_article_visibility() {
        let pool = setup_pool().await;
        let author = insert_user(&pool, "jo", UserRole::Journalist).await;
        let reader = insert_user(&pool, "rea", UserRole::Reader).await;
        let public = insert_article(&pool, author, true).await;
        let draft = insert_article(&pool, author, false).await;
        let repo = SqlxCommentRepository::new(pool);

        repo.create(public, reader, "one").await.unwrap();
        repo.create(public, reader, "two").await.unwrap();
        repo.create(draft, author, "note to self").await.unwrap();

        let params = ListParams::default();
        let (items, total) = repo.list(Visibility::Public, None, &params).await.unwrap();
        assert_eq!(total, 2);
        assert_eq!(items[0].content, "two");

        let (_, total) = repo.list(Visibility::PublicOrAuthor(author), None, &params).await.unwrap();
        assert_eq!(total, 3);

        let (_, total) = repo.list(Visibility::All, Some(draft), &params).await.unwrap();
        assert_eq!(total, 1);
    }
}
