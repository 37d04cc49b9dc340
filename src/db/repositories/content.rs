//! Content repository
//!
//! Articles and newsletters live in separate tables with the same shape
//! (newsletters lack `category_id` and `image`). One implementation serves
//! both, keyed by [`ContentKind`].
//!
//! Workflow writes are conditional: an approval only lands on a row that is
//! still unapproved, a publication only on one that is approved and not yet
//! published. Callers learn from the returned flag whether they won.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::db::{with_pool, DynDatabasePool, LastInsertId};
use crate::models::{Content, ContentKind, ContentQuery, ListParams, Visibility};

#[async_trait]
pub trait ContentRepository: Send + Sync {
    /// Insert a new draft. Workflow fields on `content` are ignored.
    async fn create(&self, content: &Content) -> Result<Content>;

    async fn get_by_id(&self, kind: ContentKind, id: i64) -> Result<Option<Content>>;

    /// Page of items matching `query`, newest first, plus the total count
    async fn list(
        &self,
        kind: ContentKind,
        query: &ContentQuery,
        params: &ListParams,
    ) -> Result<(Vec<Content>, i64)>;

    /// Save editable fields (title, body, references, independence)
    async fn update(&self, content: &Content) -> Result<Content>;

    async fn delete(&self, kind: ContentKind, id: i64) -> Result<bool>;

    /// Mark an unapproved item approved. `false` when it was already approved or missing.
    async fn approve(
        &self,
        kind: ContentKind,
        id: i64,
        editor_id: i64,
        at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Mark an approved, unpublished item published. `false` when the precondition failed.
    async fn publish(&self, kind: ContentKind, id: i64, at: DateTime<Utc>) -> Result<bool>;

    /// Published items by followed journalists or from followed publishers
    async fn list_for_subscriber(&self, kind: ContentKind, subscriber_id: i64) -> Result<Vec<Content>>;
}

pub struct SqlxContentRepository {
    pool: DynDatabasePool,
}

impl SqlxContentRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ContentRepository> {
        Arc::new(Self::new(pool))
    }
}

/// Select list producing rows that decode into [`Content`]
fn select_columns(kind: ContentKind) -> String {
    let extra = if kind.has_category() {
        "category_id, image"
    } else {
        "NULL AS category_id, NULL AS image"
    };
    format!(
        "id, '{}' AS kind, title, content, author_id, publisher_id, {}, is_independent, \
         is_approved, approved_by, approval_date, is_published, published_date, created_at, updated_at",
        kind.as_str(),
        extra
    )
}

/// WHERE clause for a listing query and the ids to bind, in order
fn build_filter(kind: ContentKind, query: &ContentQuery) -> (String, Vec<i64>) {
    let mut conditions: Vec<String> = Vec::new();
    let mut binds = Vec::new();

    match query.visibility {
        Visibility::Public => conditions.push("(is_published = 1 AND is_approved = 1)".into()),
        Visibility::PublicOrAuthor(user_id) => {
            conditions.push("((is_published = 1 AND is_approved = 1) OR author_id = ?)".into());
            binds.push(user_id);
        }
        Visibility::All => {}
    }
    if let Some(author_id) = query.author_id {
        conditions.push("author_id = ?".into());
        binds.push(author_id);
    }
    if let Some(publisher_id) = query.publisher_id {
        conditions.push("publisher_id = ?".into());
        binds.push(publisher_id);
    }
    if let Some(category_id) = query.category_id {
        if kind.has_category() {
            conditions.push("category_id = ?".into());
            binds.push(category_id);
        } else {
            conditions.push("1 = 0".into());
        }
    }
    if let Some(approved) = query.approved {
        conditions.push(format!("is_approved = {}", if approved { 1 } else { 0 }));
    }

    if conditions.is_empty() {
        (String::new(), binds)
    } else {
        (format!("WHERE {}", conditions.join(" AND ")), binds)
    }
}

#[async_trait]
impl ContentRepository for SqlxContentRepository {
    async fn create(&self, content: &Content) -> Result<Content> {
        let kind = content.kind;
        let now = Utc::now();
        let sql = if kind.has_category() {
            format!(
                "INSERT INTO {} (title, content, author_id, publisher_id, category_id, image, \
                 is_independent, is_approved, is_published, created_at, updated_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, 0, 0, ?, ?)",
                kind.table()
            )
        } else {
            format!(
                "INSERT INTO {} (title, content, author_id, publisher_id, \
                 is_independent, is_approved, is_published, created_at, updated_at) \
                 VALUES (?, ?, ?, ?, ?, 0, 0, ?, ?)",
                kind.table()
            )
        };

        let id = with_pool!(self.pool, |db| {
            let mut query = sqlx::query(&sql)
                .bind(&content.title)
                .bind(&content.body)
                .bind(content.author_id)
                .bind(content.publisher_id);
            if kind.has_category() {
                query = query
                    .bind(content.category_id)
                    .bind(content.image.as_deref());
            }
            query
                .bind(content.is_independent)
                .bind(now)
                .bind(now)
                .execute(db)
                .await
                .with_context(|| format!("Failed to create {}", kind))?
                .last_id()
        });

        tracing::debug!("Created {} {}", kind, id);
        self.get_by_id(kind, id)
            .await?
            .with_context(|| format!("{} {} missing after insert", kind.label(), id))
    }

    async fn get_by_id(&self, kind: ContentKind, id: i64) -> Result<Option<Content>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE id = ?",
            select_columns(kind),
            kind.table()
        );
        with_pool!(self.pool, |db| {
            sqlx::query_as::<_, Content>(&sql)
                .bind(id)
                .fetch_optional(db)
                .await
                .with_context(|| format!("Failed to get {} by ID", kind))
        })
    }

    async fn list(
        &self,
        kind: ContentKind,
        query: &ContentQuery,
        params: &ListParams,
    ) -> Result<(Vec<Content>, i64)> {
        let (filter, binds) = build_filter(kind, query);
        let count_sql = format!("SELECT COUNT(*) FROM {} {}", kind.table(), filter);
        let list_sql = format!(
            "SELECT {} FROM {} {} ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
            select_columns(kind),
            kind.table(),
            filter
        );

        with_pool!(self.pool, |db| {
            let mut count = sqlx::query_scalar::<_, i64>(&count_sql);
            for value in &binds {
                count = count.bind(*value);
            }
            let total = count
                .fetch_one(db)
                .await
                .with_context(|| format!("Failed to count {}s", kind))?;

            let mut rows = sqlx::query_as::<_, Content>(&list_sql);
            for value in &binds {
                rows = rows.bind(*value);
            }
            let items = rows
                .bind(params.limit())
                .bind(params.offset())
                .fetch_all(db)
                .await
                .with_context(|| format!("Failed to list {}s", kind))?;

            Ok((items, total))
        })
    }

    async fn update(&self, content: &Content) -> Result<Content> {
        let kind = content.kind;
        let now = Utc::now();
        let sql = if kind.has_category() {
            format!(
                "UPDATE {} SET title = ?, content = ?, publisher_id = ?, category_id = ?, image = ?, \
                 is_independent = ?, updated_at = ? WHERE id = ?",
                kind.table()
            )
        } else {
            format!(
                "UPDATE {} SET title = ?, content = ?, publisher_id = ?, \
                 is_independent = ?, updated_at = ? WHERE id = ?",
                kind.table()
            )
        };

        with_pool!(self.pool, |db| {
            let mut query = sqlx::query(&sql)
                .bind(&content.title)
                .bind(&content.body)
                .bind(content.publisher_id);
            if kind.has_category() {
                query = query
                    .bind(content.category_id)
                    .bind(content.image.as_deref());
            }
            query
                .bind(content.is_independent)
                .bind(now)
                .bind(content.id)
                .execute(db)
                .await
                .with_context(|| format!("Failed to update {}", kind))?;
            Ok::<(), anyhow::Error>(())
        })?;

        Ok(Content {
            updated_at: now,
            ..content.clone()
        })
    }

    async fn delete(&self, kind: ContentKind, id: i64) -> Result<bool> {
        let sql = format!("DELETE FROM {} WHERE id = ?", kind.table());
        with_pool!(self.pool, |db| {
            let result = sqlx::query(&sql)
                .bind(id)
                .execute(db)
                .await
                .with_context(|| format!("Failed to delete {}", kind))?;
            Ok(result.rows_affected() > 0)
        })
    }

    async fn approve(
        &self,
        kind: ContentKind,
        id: i64,
        editor_id: i64,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let sql = format!(
            "UPDATE {} SET is_approved = 1, approved_by = ?, approval_date = ?, updated_at = ? \
             WHERE id = ? AND is_approved = 0",
            kind.table()
        );
        with_pool!(self.pool, |db| {
            let result = sqlx::query(&sql)
                .bind(editor_id)
                .bind(at)
                .bind(at)
                .bind(id)
                .execute(db)
                .await
                .with_context(|| format!("Failed to approve {}", kind))?;
            Ok(result.rows_affected() == 1)
        })
    }

    async fn publish(&self, kind: ContentKind, id: i64, at: DateTime<Utc>) -> Result<bool> {
        let sql = format!(
            "UPDATE {} SET is_published = 1, published_date = ?, updated_at = ? \
             WHERE id = ? AND is_approved = 1 AND is_published = 0",
            kind.table()
        );
        with_pool!(self.pool, |db| {
            let result = sqlx::query(&sql)
                .bind(at)
                .bind(at)
                .bind(id)
                .execute(db)
                .await
                .with_context(|| format!("Failed to publish {}", kind))?;
            Ok(result.rows_affected() == 1)
        })
    }

    async fn list_for_subscriber(&self, kind: ContentKind, subscriber_id: i64) -> Result<Vec<Content>> {
        let sql = format!(
            r#"
            SELECT {} FROM {}
            WHERE is_published = 1 AND is_approved = 1 AND (
                author_id IN (
                    SELECT journalist_id FROM subscriptions
                    WHERE subscriber_id = ? AND journalist_id IS NOT NULL
                )
                OR publisher_id IN (
                    SELECT publisher_id FROM subscriptions
                    WHERE subscriber_id = ? AND publisher_id IS NOT NULL
                )
            )
            ORDER BY created_at DESC, id DESC
            "#,
            select_columns(kind),
            kind.table()
        );
        with_pool!(self.pool, |db| {
            sqlx::query_as::<_, Content>(&sql)
                .bind(subscriber_id)
                .bind(subscriber_id)
                .fetch_all(db)
                .await
                .with_context(|| format!("Failed to list subscribed {}s", kind))
        })
    }
}
