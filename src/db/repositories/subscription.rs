//! Subscription repository

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

use crate::db::{with_pool, DynDatabasePool, LastInsertId};
use crate::models::{Publisher, Subscription, SubscriptionTarget, User};

#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    async fn create(&self, subscriber_id: i64, target: SubscriptionTarget) -> Result<Subscription>;

    async fn find(
        &self,
        subscriber_id: i64,
        target: SubscriptionTarget,
    ) -> Result<Option<Subscription>>;

    async fn delete(&self, subscriber_id: i64, target: SubscriptionTarget) -> Result<bool>;

    async fn list_for_subscriber(&self, subscriber_id: i64) -> Result<Vec<Subscription>>;

    /// Publishers the subscriber follows, by name
    async fn followed_publishers(&self, subscriber_id: i64) -> Result<Vec<Publisher>>;

    /// Journalists the subscriber follows, by username
    async fn followed_journalists(&self, subscriber_id: i64) -> Result<Vec<User>>;

    /// Distinct emails of everyone following the author or the publisher
    async fn subscriber_emails(&self, author_id: i64, publisher_id: Option<i64>)
        -> Result<Vec<String>>;
}

pub struct SqlxSubscriptionRepository {
    pool: DynDatabasePool,
}

impl SqlxSubscriptionRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SubscriptionRepository> {
        Arc::new(Self::new(pool))
    }
}

/// Column to match for a target, and its id
fn target_column(target: SubscriptionTarget) -> (&'static str, i64) {
    match target {
        SubscriptionTarget::Publisher(id) => ("publisher_id", id),
        SubscriptionTarget::Journalist(id) => ("journalist_id", id),
    }
}

#[async_trait]
impl SubscriptionRepository for SqlxSubscriptionRepository {
    async fn create(&self, subscriber_id: i64, target: SubscriptionTarget) -> Result<Subscription> {
        let (publisher_id, journalist_id) = target.columns();
        let now = Utc::now();
        let id = with_pool!(self.pool, |db| {
            sqlx::query(
                r#"
                INSERT INTO subscriptions (subscriber_id, publisher_id, journalist_id, created_at)
                VALUES (?, ?, ?, ?)
                "#,
            )
            .bind(subscriber_id)
            .bind(publisher_id)
            .bind(journalist_id)
            .bind(now)
            .execute(db)
            .await
            .context("Failed to create subscription")?
            .last_id()
        });

        Ok(Subscription {
            id,
            subscriber_id,
            publisher_id,
            journalist_id,
            created_at: now,
        })
    }

    async fn find(
        &self,
        subscriber_id: i64,
        target: SubscriptionTarget,
    ) -> Result<Option<Subscription>> {
        let (column, target_id) = target_column(target);
        let sql = format!(
            "SELECT id, subscriber_id, publisher_id, journalist_id, created_at \
             FROM subscriptions WHERE subscriber_id = ? AND {} = ?",
            column
        );
        with_pool!(self.pool, |db| {
            sqlx::query_as::<_, Subscription>(&sql)
                .bind(subscriber_id)
                .bind(target_id)
                .fetch_optional(db)
                .await
                .context("Failed to find subscription")
        })
    }

    async fn delete(&self, subscriber_id: i64, target: SubscriptionTarget) -> Result<bool> {
        let (column, target_id) = target_column(target);
        let sql = format!(
            "DELETE FROM subscriptions WHERE subscriber_id = ? AND {} = ?",
            column
        );
        with_pool!(self.pool, |db| {
            let result = sqlx::query(&sql)
                .bind(subscriber_id)
                .bind(target_id)
                .execute(db)
                .await
                .context("Failed to delete subscription")?;
            Ok(result.rows_affected() > 0)
        })
    }

    async fn list_for_subscriber(&self, subscriber_id: i64) -> Result<Vec<Subscription>> {
        with_pool!(self.pool, |db| {
            sqlx::query_as::<_, Subscription>(
                r#"
                SELECT id, subscriber_id, publisher_id, journalist_id, created_at
                FROM subscriptions
                WHERE subscriber_id = ?
                ORDER BY created_at DESC, id DESC
                "#,
            )
            .bind(subscriber_id)
            .fetch_all(db)
            .await
            .context("Failed to list subscriptions")
        })
    }

    async fn followed_publishers(&self, subscriber_id: i64) -> Result<Vec<Publisher>> {
        with_pool!(self.pool, |db| {
            sqlx::query_as::<_, Publisher>(
                r#"
                SELECT p.id, p.name, p.description, p.created_at
                FROM publishers p
                JOIN subscriptions s ON s.publisher_id = p.id
                WHERE s.subscriber_id = ?
                ORDER BY p.name, p.id
                "#,
            )
            .bind(subscriber_id)
            .fetch_all(db)
            .await
            .context("Failed to list followed publishers")
        })
    }

    async fn followed_journalists(&self, subscriber_id: i64) -> Result<Vec<User>> {
        with_pool!(self.pool, |db| {
            sqlx::query_as::<_, User>(
                r#"
                SELECT u.id, u.username, u.email, u.first_name, u.last_name, u.password_hash,
                       u.role, u.created_at, u.updated_at
                FROM users u
                JOIN subscriptions s ON s.journalist_id = u.id
                WHERE s.subscriber_id = ?
                ORDER BY u.username
                "#,
            )
            .bind(subscriber_id)
            .fetch_all(db)
            .await
            .context("Failed to list followed journalists")
        })
    }

    async fn subscriber_emails(
        &self,
        author_id: i64,
        publisher_id: Option<i64>,
    ) -> Result<Vec<String>> {
        with_pool!(self.pool, |db| {
            sqlx::query_scalar::<_, String>(
                r#"
                SELECT DISTINCT u.email
                FROM users u
                JOIN subscriptions s ON s.subscriber_id = u.id
                WHERE (s.journalist_id = ? OR s.publisher_id = ?) AND u.email <> ''
                ORDER BY u.email
                "#,
            )
            .bind(author_id)
            .bind(publisher_id)
            .fetch_all(db)
            .await
            .context("Failed to collect subscriber emails")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::{insert_publisher, insert_user, setup_pool};
    use crate::models::UserRole;

    #[tokio::test]
    async fn test_create_find_delete() {
        let pool = setup_pool().await;
        let reader = insert_user(&pool, "rea", UserRole::Reader).await;
        let publisher = insert_publisher(&pool, "Daily").await;
        let repo = SqlxSubscriptionRepository::new(pool);
        let target = SubscriptionTarget::Publisher(publisher);

        let sub = repo.create(reader, target).await.unwrap();
        assert_eq!(sub.target(), Ok(target));
        assert!(repo.find(reader, target).await.unwrap().is_some());
        assert!(repo.find(reader, SubscriptionTarget::Journalist(publisher)).await.unwrap().is_none());

        let err = repo.create(reader, target).await.unwrap_err();
        assert!(crate::db::is_unique_violation(&err));

        assert!(repo.delete(reader, target).await.unwrap());
        assert!(!repo.delete(reader, target).await.unwrap());
    }

    #[tokio::test]
    async fn test_followed_lists_and_emails() {
        let pool = setup_pool().await;
        let ann = insert_user(&pool, "ann", UserRole::Reader).await;
        let bob = insert_user(&pool, "bob", UserRole::Reader).await;
        let jo = insert_user(&pool, "jo", UserRole::Journalist).await;
        let daily = insert_publisher(&pool, "Daily").await;
        let repo = SqlxSubscriptionRepository::new(pool);

        repo.create(ann, SubscriptionTarget::Journalist(jo)).await.unwrap();
        repo.create(ann, SubscriptionTarget::Publisher(daily)).await.unwrap();
        repo.create(bob, SubscriptionTarget::Publisher(daily)).await.unwrap();

        assert_eq!(repo.list_for_subscriber(ann).await.unwrap().len(), 2);
        assert_eq!(repo.followed_publishers(ann).await.unwrap()[0].name, "Daily");
        assert_eq!(repo.followed_journalists(ann).await.unwrap()[0].username, "jo");
        assert!(repo.followed_journalists(bob).await.unwrap().is_empty());

        let emails = repo.subscriber_emails(jo, Some(daily)).await.unwrap();
        assert_eq!(emails, ["ann@example.com", "bob@example.com"]);
        let emails = repo.subscriber_emails(jo, None).await.unwrap();
        assert_eq!(emails, ["ann@example.com"]);
    }
}
