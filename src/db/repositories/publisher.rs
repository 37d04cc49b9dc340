//! Publisher repository
//!
//! Publishers and the staff links that attach editors and journalists to them.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

use crate::db::{with_pool, DynDatabasePool, LastInsertId};
use crate::models::{ListParams, Publisher, PublisherStaff, StaffRole, User};

#[async_trait]
pub trait PublisherRepository: Send + Sync {
    async fn create(&self, name: &str, description: &str) -> Result<Publisher>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Publisher>>;

    /// Page of publishers ordered by name, plus the total count
    async fn list(&self, params: &ListParams) -> Result<(Vec<Publisher>, i64)>;

    async fn all(&self) -> Result<Vec<Publisher>>;

    async fn update(&self, publisher: &Publisher) -> Result<Publisher>;

    async fn delete(&self, id: i64) -> Result<bool>;

    /// Link `user_id` to the publisher unless a link already exists.
    /// Returns the stored link and whether it was created by this call.
    async fn add_staff(
        &self,
        publisher_id: i64,
        user_id: i64,
        role: StaffRole,
    ) -> Result<(PublisherStaff, bool)>;

    async fn get_staff(&self, publisher_id: i64, user_id: i64) -> Result<Option<PublisherStaff>>;

    /// Staff links with their users, editors first
    async fn list_staff(&self, publisher_id: i64) -> Result<Vec<(PublisherStaff, User)>>;

    async fn remove_staff(&self, publisher_id: i64, user_id: i64) -> Result<bool>;
}

pub struct SqlxPublisherRepository {
    pool: DynDatabasePool,
}

impl SqlxPublisherRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn PublisherRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl PublisherRepository for SqlxPublisherRepository {
    async fn create(&self, name: &str, description: &str) -> Result<Publisher> {
        let now = Utc::now();
        let id = with_pool!(self.pool, |db| {
            sqlx::query("INSERT INTO publishers (name, description, created_at) VALUES (?, ?, ?)")
                .bind(name)
                .bind(description)
                .bind(now)
                .execute(db)
                .await
                .context("Failed to create publisher")?
                .last_id()
        });

        Ok(Publisher {
            id,
            name: name.to_string(),
            description: description.to_string(),
            created_at: now,
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Publisher>> {
        with_pool!(self.pool, |db| {
            sqlx::query_as::<_, Publisher>(
                "SELECT id, name, description, created_at FROM publishers WHERE id = ?",
            )
            .bind(id)
            .fetch_optional(db)
            .await
            .context("Failed to get publisher by ID")
        })
    }

    async fn list(&self, params: &ListParams) -> Result<(Vec<Publisher>, i64)> {
        with_pool!(self.pool, |db| {
            let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM publishers")
                .fetch_one(db)
                .await
                .context("Failed to count publishers")?;
            let publishers = sqlx::query_as::<_, Publisher>(
                "SELECT id, name, description, created_at FROM publishers ORDER BY name, id LIMIT ? OFFSET ?",
            )
            .bind(params.limit())
            .bind(params.offset())
            .fetch_all(db)
            .await
            .context("Failed to list publishers")?;
            Ok((publishers, total))
        })
    }

    async fn all(&self) -> Result<Vec<Publisher>> {
        with_pool!(self.pool, |db| {
            sqlx::query_as::<_, Publisher>(
                "SELECT id, name, description, created_at FROM publishers ORDER BY name, id",
            )
            .fetch_all(db)
            .await
            .context("Failed to list publishers")
        })
    }

    async fn update(&self, publisher: &Publisher) -> Result<Publisher> {
        with_pool!(self.pool, |db| {
            sqlx::query("UPDATE publishers SET name = ?, description = ? WHERE id = ?")
                .bind(&publisher.name)
                .bind(&publisher.description)
                .bind(publisher.id)
                .execute(db)
                .await
                .context("Failed to update publisher")?;
            Ok(publisher.clone())
        })
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        with_pool!(self.pool, |db| {
            let result = sqlx::query("DELETE FROM publishers WHERE id = ?")
                .bind(id)
                .execute(db)
                .await
                .context("Failed to delete publisher")?;
            Ok(result.rows_affected() > 0)
        })
    }

    async fn add_staff(
        &self,
        publisher_id: i64,
        user_id: i64,
        role: StaffRole,
    ) -> Result<(PublisherStaff, bool)> {
        if let Some(existing) = self.get_staff(publisher_id, user_id).await? {
            return Ok((existing, false));
        }

        let now = Utc::now();
        let inserted = with_pool!(self.pool, |db| {
            sqlx::query(
                "INSERT INTO publisher_staff (publisher_id, user_id, role, joined_at) VALUES (?, ?, ?, ?)",
            )
            .bind(publisher_id)
            .bind(user_id)
            .bind(role.as_str())
            .bind(now)
            .execute(db)
            .await
            .map(|_| ())
            .context("Failed to add staff member")
        });

        let created = match inserted {
            Ok(()) => true,
            // Lost a race with a concurrent insert of the same link
            Err(e) if crate::db::is_unique_violation(&e) => false,
            Err(e) => return Err(e),
        };

        let link = self
            .get_staff(publisher_id, user_id)
            .await?
            .context("Staff link missing after insert")?;
        Ok((link, created))
    }

    async fn get_staff(&self, publisher_id: i64, user_id: i64) -> Result<Option<PublisherStaff>> {
        with_pool!(self.pool, |db| {
            sqlx::query_as::<_, PublisherStaff>(
                r#"
                SELECT id, publisher_id, user_id, role, joined_at
                FROM publisher_staff
                WHERE publisher_id = ? AND user_id = ?
                "#,
            )
            .bind(publisher_id)
            .bind(user_id)
            .fetch_optional(db)
            .await
            .context("Failed to get staff member")
        })
    }

    async fn list_staff(&self, publisher_id: i64) -> Result<Vec<(PublisherStaff, User)>> {
        let links = with_pool!(self.pool, |db| {
            sqlx::query_as::<_, PublisherStaff>(
                r#"
                SELECT id, publisher_id, user_id, role, joined_at
                FROM publisher_staff
                WHERE publisher_id = ?
                ORDER BY role, joined_at, id
                "#,
            )
            .bind(publisher_id)
            .fetch_all(db)
            .await
            .context("Failed to list staff")?
        });

        let users = with_pool!(self.pool, |db| {
            sqlx::query_as::<_, User>(
                r#"
                SELECT u.id, u.username, u.email, u.first_name, u.last_name, u.password_hash,
                       u.role, u.created_at, u.updated_at
                FROM users u
                JOIN publisher_staff s ON s.user_id = u.id
                WHERE s.publisher_id = ?
                "#,
            )
            .bind(publisher_id)
            .fetch_all(db)
            .await
            .context("Failed to load staff users")?
        });

        Ok(links
            .into_iter()
            .filter_map(|link| {
                let user = users.iter().find(|u| u.id == link.user_id)?.clone();
                Some((link, user))
            })
            .collect())
    }

    async fn remove_staff(&self, publisher_id: i64, user_id: i64) -> Result<bool> {
        with_pool!(self.pool, |db| {
            let result =
                sqlx::query("DELETE FROM publisher_staff WHERE publisher_id = ? AND user_id = ?")
                    .bind(publisher_id)
                    .bind(user_id)
                    .execute(db)
                    .await
                    .context("Failed to remove staff member")?;
            Ok(result.rows_affected() > 0)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::{insert_user, setup_pool};
    use crate::models::UserRole;

    #[tokio::test]
    async fn test_publisher_crud() {
        let pool = setup_pool().await;
        let repo = SqlxPublisherRepository::new(pool);

        let daily = repo.create("The Daily", "Morning news").await.unwrap();
        repo.create("Acme Times", "").await.unwrap();

        let (page, total) = repo.list(&ListParams::default()).await.unwrap();
        assert_eq!(total, 2);
        assert_eq!(page[0].name, "Acme Times");

        let renamed = Publisher {
            name: "The Evening".into(),
            ..daily.clone()
        };
        repo.update(&renamed).await.unwrap();
        assert_eq!(repo.get_by_id(daily.id).await.unwrap().unwrap().name, "The Evening");

        assert!(repo.delete(daily.id).await.unwrap());
        assert!(repo.get_by_id(daily.id).await.unwrap().is_none());
        assert_eq!(repo.all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_add_staff_is_get_or_create() {
        let pool = setup_pool().await;
        let editor = insert_user(&pool, "ed", UserRole::Editor).await;
        let journalist = insert_user(&pool, "jo", UserRole::Journalist).await;
        let repo = SqlxPublisherRepository::new(pool);
        let publisher = repo.create("The Daily", "").await.unwrap();

        let (link, created) = repo.add_staff(publisher.id, editor, StaffRole::Editor).await.unwrap();
        assert!(created);
        assert_eq!(link.role, StaffRole::Editor);

        let (again, created) = repo.add_staff(publisher.id, editor, StaffRole::Editor).await.unwrap();
        assert!(!created);
        assert_eq!(again.id, link.id);

        repo.add_staff(publisher.id, journalist, StaffRole::Journalist).await.unwrap();
        let staff = repo.list_staff(publisher.id).await.unwrap();
        assert_eq!(staff.len(), 2);
        assert_eq!(staff[0].0.role, StaffRole::Editor);
        assert_eq!(staff[1].1.username, "jo");

        assert!(repo.remove_staff(publisher.id, journalist).await.unwrap());
        assert!(!repo.remove_staff(publisher.id, journalist).await.unwrap());
        assert_eq!(repo.list_staff(publisher.id).await.unwrap().len(), 1);
    }
}
