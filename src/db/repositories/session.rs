//! Session repository
//!
//! Server-side sessions backing the web UI cookie.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

use crate::db::{with_pool, DynDatabasePool};
use crate::models::Session;

#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn create(&self, session: &Session) -> Result<Session>;

    /// Get session by ID (the cookie token)
    async fn get_by_id(&self, id: &str) -> Result<Option<Session>>;

    async fn delete(&self, id: &str) -> Result<()>;

    async fn delete_by_user(&self, user_id: i64) -> Result<()>;

    /// Delete expired sessions, returning how many were removed
    async fn delete_expired(&self) -> Result<i64>;
}

pub struct SqlxSessionRepository {
    pool: DynDatabasePool,
}

impl SqlxSessionRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SessionRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl SessionRepository for SqlxSessionRepository {
    async fn create(&self, session: &Session) -> Result<Session> {
        with_pool!(self.pool, |db| {
            sqlx::query(
                r#"
                INSERT INTO sessions (id, user_id, expires_at, created_at)
                VALUES (?, ?, ?, ?)
                "#,
            )
            .bind(&session.id)
            .bind(session.user_id)
            .bind(session.expires_at)
            .bind(session.created_at)
            .execute(db)
            .await
            .context("Failed to create session")?;
            Ok(session.clone())
        })
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Session>> {
        with_pool!(self.pool, |db| {
            sqlx::query_as::<_, Session>(
                "SELECT id, user_id, expires_at, created_at FROM sessions WHERE id = ?",
            )
            .bind(id)
            .fetch_optional(db)
            .await
            .context("Failed to get session by ID")
        })
    }

    async fn delete(&self, id: &str) -> Result<()> {
        with_pool!(self.pool, |db| {
            sqlx::query("DELETE FROM sessions WHERE id = ?")
                .bind(id)
                .execute(db)
                .await
                .context("Failed to delete session")?;
            Ok(())
        })
    }

    async fn delete_by_user(&self, user_id: i64) -> Result<()> {
        with_pool!(self.pool, |db| {
            sqlx::query("DELETE FROM sessions WHERE user_id = ?")
                .bind(user_id)
                .execute(db)
                .await
                .context("Failed to delete sessions by user")?;
            Ok(())
        })
    }

    async fn delete_expired(&self) -> Result<i64> {
        let now = Utc::now();
        with_pool!(self.pool, |db| {
            let result = sqlx::query("DELETE FROM sessions WHERE expires_at < ?")
                .bind(now)
                .execute(db)
                .await
                .context("Failed to delete expired sessions")?;
            Ok(result.rows_affected() as i64)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::{insert_user, setup_pool};
    use crate::models::UserRole;
    use chrono::Duration;

    #[tokio::test]
    async fn test_create_get_delete_session() {
        let pool = setup_pool().await;
        let user_id = insert_user(&pool, "alice", UserRole::Reader).await;
        let repo = SqlxSessionRepository::new(pool);

        let session = Session::new(user_id, Duration::days(7));
        repo.create(&session).await.unwrap();

        let found = repo.get_by_id(&session.id).await.unwrap().expect("Session not found");
        assert_eq!(found.user_id, user_id);
        assert!(!found.is_expired());

        repo.delete(&session.id).await.unwrap();
        assert!(repo.get_by_id(&session.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_expired_and_by_user() {
        let pool = setup_pool().await;
        let user_id = insert_user(&pool, "alice", UserRole::Reader).await;
        let repo = SqlxSessionRepository::new(pool);

        let live = Session::new(user_id, Duration::days(1));
        let stale = Session::new(user_id, Duration::hours(-1));
        repo.create(&live).await.unwrap();
        repo.create(&stale).await.unwrap();

        assert_eq!(repo.delete_expired().await.unwrap(), 1);
        assert!(repo.get_by_id(&live.id).await.unwrap().is_some());

        repo.delete_by_user(user_id).await.unwrap();
        assert!(repo.get_by_id(&live.id).await.unwrap().is_none());
    }
}
