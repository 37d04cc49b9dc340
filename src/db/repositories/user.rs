//! User repository
//!
//! Persistence for accounts, including the relationship cleanup that must
//! accompany a role change.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

use crate::db::{with_pool, DynDatabasePool, LastInsertId};
use crate::models::{ListParams, StaffRole, User, UserRole};

const USER_COLUMNS: &str =
    "id, username, email, first_name, last_name, password_hash, role, created_at, updated_at";

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, user: &User) -> Result<User>;

    async fn get_by_id(&self, id: i64) -> Result<Option<User>>;

    async fn get_by_username(&self, username: &str) -> Result<Option<User>>;

    async fn get_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Save profile fields and role.
    ///
    /// When the role changes, relationships the new role may not hold are
    /// removed in the same transaction.
    async fn update(&self, user: &User) -> Result<User>;

    async fn set_password(&self, id: i64, password_hash: &str) -> Result<()>;

    async fn delete(&self, id: i64) -> Result<bool>;

    async fn count(&self) -> Result<i64>;

    /// Page of users ordered by username, plus the total count
    async fn list(&self, params: &ListParams) -> Result<(Vec<User>, i64)>;

    async fn list_by_role(&self, role: UserRole, params: &ListParams) -> Result<(Vec<User>, i64)>;

    /// Every user holding `role`, ordered by username
    async fn all_with_role(&self, role: UserRole) -> Result<Vec<User>>;
}

pub struct SqlxUserRepository {
    pool: DynDatabasePool,
}

impl SqlxUserRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }

    async fn fetch_one_by(&self, column: &str, value: &str) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE {} = ?", USER_COLUMNS, column);
        with_pool!(self.pool, |db| {
            sqlx::query_as::<_, User>(&sql)
                .bind(value)
                .fetch_optional(db)
                .await
                .with_context(|| format!("Failed to get user by {}", column))
        })
    }
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create(&self, user: &User) -> Result<User> {
        let now = Utc::now();
        let id = with_pool!(self.pool, |db| {
            sqlx::query(
                r#"
                INSERT INTO users (username, email, first_name, last_name, password_hash, role, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&user.username)
            .bind(&user.email)
            .bind(&user.first_name)
            .bind(&user.last_name)
            .bind(&user.password_hash)
            .bind(user.role.as_str())
            .bind(now)
            .bind(now)
            .execute(db)
            .await
            .context("Failed to create user")?
            .last_id()
        });

        Ok(User {
            id,
            created_at: now,
            updated_at: now,
            ..user.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS);
        with_pool!(self.pool, |db| {
            sqlx::query_as::<_, User>(&sql)
                .bind(id)
                .fetch_optional(db)
                .await
                .context("Failed to get user by ID")
        })
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<User>> {
        self.fetch_one_by("username", username).await
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        self.fetch_one_by("email", email).await
    }

    async fn update(&self, user: &User) -> Result<User> {
        let now = Utc::now();
        with_pool!(self.pool, |db| {
            let mut tx = db.begin().await.context("Failed to begin transaction")?;

            let previous: Option<String> = sqlx::query_scalar("SELECT role FROM users WHERE id = ?")
                .bind(user.id)
                .fetch_optional(&mut *tx)
                .await
                .context("Failed to read current role")?;
            let previous = match previous {
                Some(role) => role.parse::<UserRole>()?,
                None => anyhow::bail!("User {} does not exist", user.id),
            };

            sqlx::query(
                r#"
                UPDATE users
                SET username = ?, email = ?, first_name = ?, last_name = ?, role = ?, updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(&user.username)
            .bind(&user.email)
            .bind(&user.first_name)
            .bind(&user.last_name)
            .bind(user.role.as_str())
            .bind(now)
            .bind(user.id)
            .execute(&mut *tx)
            .await
            .context("Failed to update user")?;

            if previous != user.role {
                if previous == UserRole::Reader {
                    sqlx::query("DELETE FROM subscriptions WHERE subscriber_id = ?")
                        .bind(user.id)
                        .execute(&mut *tx)
                        .await
                        .context("Failed to remove subscriptions held by user")?;
                }
                if previous == UserRole::Journalist {
                    sqlx::query("DELETE FROM subscriptions WHERE journalist_id = ?")
                        .bind(user.id)
                        .execute(&mut *tx)
                        .await
                        .context("Failed to remove subscriptions to journalist")?;
                }
                match StaffRole::for_user_role(user.role) {
                    Some(staff_role) => {
                        sqlx::query("DELETE FROM publisher_staff WHERE user_id = ? AND role <> ?")
                            .bind(user.id)
                            .bind(staff_role.as_str())
                            .execute(&mut *tx)
                            .await
                            .context("Failed to remove mismatched staff links")?;
                    }
                    None => {
                        sqlx::query("DELETE FROM publisher_staff WHERE user_id = ?")
                            .bind(user.id)
                            .execute(&mut *tx)
                            .await
                            .context("Failed to remove staff links")?;
                    }
                }
                tracing::info!(
                    "User {} changed role from {} to {}",
                    user.id,
                    previous,
                    user.role
                );
            }

            tx.commit().await.context("Failed to commit user update")?;
            Ok::<(), anyhow::Error>(())
        })?;

        Ok(User {
            updated_at: now,
            ..user.clone()
        })
    }

    async fn set_password(&self, id: i64, password_hash: &str) -> Result<()> {
        with_pool!(self.pool, |db| {
            sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?")
                .bind(password_hash)
                .bind(Utc::now())
                .bind(id)
                .execute(db)
                .await
                .context("Failed to update password")?;
            Ok(())
        })
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        with_pool!(self.pool, |db| {
            let result = sqlx::query("DELETE FROM users WHERE id = ?")
                .bind(id)
                .execute(db)
                .await
                .context("Failed to delete user")?;
            Ok(result.rows_affected() > 0)
        })
    }

    async fn count(&self) -> Result<i64> {
        with_pool!(self.pool, |db| {
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
                .fetch_one(db)
                .await
                .context("Failed to count users")
        })
    }

    async fn list(&self, params: &ListParams) -> Result<(Vec<User>, i64)> {
        let sql = format!(
            "SELECT {} FROM users ORDER BY username LIMIT ? OFFSET ?",
            USER_COLUMNS
        );
        let total = self.count().await?;
        let users = with_pool!(self.pool, |db| {
            sqlx::query_as::<_, User>(&sql)
                .bind(params.limit())
                .bind(params.offset())
                .fetch_all(db)
                .await
                .context("Failed to list users")?
        });
        Ok((users, total))
    }

    async fn list_by_role(&self, role: UserRole, params: &ListParams) -> Result<(Vec<User>, i64)> {
        let sql = format!(
            "SELECT {} FROM users WHERE role = ? ORDER BY username LIMIT ? OFFSET ?",
            USER_COLUMNS
        );
        with_pool!(self.pool, |db| {
            let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE role = ?")
                .bind(role.as_str())
                .fetch_one(db)
                .await
                .context("Failed to count users by role")?;
            let users = sqlx::query_as::<_, User>(&sql)
                .bind(role.as_str())
                .bind(params.limit())
                .bind(params.offset())
                .fetch_all(db)
                .await
                .context("Failed to list users by role")?;
            Ok((users, total))
        })
    }

    async fn all_with_role(&self, role: UserRole) -> Result<Vec<User>> {
        let sql = format!(
            "SELECT {} FROM users WHERE role = ? ORDER BY username",
            USER_COLUMNS
        );
        with_pool!(self.pool, |db| {
            sqlx::query_as::<_, User>(&sql)
                .bind(role.as_str())
                .fetch_all(db)
                .await
                .context("Failed to list users by role")
        })
    }
}
