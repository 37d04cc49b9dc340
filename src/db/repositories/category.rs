//! Category repository

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;

use crate::db::{with_pool, DynDatabasePool, LastInsertId};
use crate::models::{Category, ListParams};

#[async_trait]
pub trait CategoryRepository: Send + Sync {
    async fn create(&self, name: &str, description: &str) -> Result<Category>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Category>>;

    async fn get_by_name(&self, name: &str) -> Result<Option<Category>>;

    /// Page of categories ordered by name, plus the total count
    async fn list(&self, params: &ListParams) -> Result<(Vec<Category>, i64)>;

    async fn all(&self) -> Result<Vec<Category>>;

    async fn update(&self, category: &Category) -> Result<Category>;

    /// Delete a category, detaching its articles first
    async fn delete(&self, id: i64) -> Result<bool>;
}

pub struct SqlxCategoryRepository {
    pool: DynDatabasePool,
}

impl SqlxCategoryRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn CategoryRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl CategoryRepository for SqlxCategoryRepository {
    async fn create(&self, name: &str, description: &str) -> Result<Category> {
        let id = with_pool!(self.pool, |db| {
            sqlx::query("INSERT INTO categories (name, description) VALUES (?, ?)")
                .bind(name)
                .bind(description)
                .execute(db)
                .await
                .context("Failed to create category")?
                .last_id()
        });

        Ok(Category {
            id,
            name: name.to_string(),
            description: description.to_string(),
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Category>> {
        with_pool!(self.pool, |db| {
            sqlx::query_as::<_, Category>("SELECT id, name, description FROM categories WHERE id = ?")
                .bind(id)
                .fetch_optional(db)
                .await
                .context("Failed to get category by ID")
        })
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<Category>> {
        with_pool!(self.pool, |db| {
            sqlx::query_as::<_, Category>(
                "SELECT id, name, description FROM categories WHERE name = ?",
            )
            .bind(name)
            .fetch_optional(db)
            .await
            .context("Failed to get category by name")
        })
    }

    async fn list(&self, params: &ListParams) -> Result<(Vec<Category>, i64)> {
        with_pool!(self.pool, |db| {
            let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM categories")
                .fetch_one(db)
                .await
                .context("Failed to count categories")?;
            let categories = sqlx::query_as::<_, Category>(
                "SELECT id, name, description FROM categories ORDER BY name LIMIT ? OFFSET ?",
            )
            .bind(params.limit())
            .bind(params.offset())
            .fetch_all(db)
            .await
            .context("Failed to list categories")?;
            Ok((categories, total))
        })
    }

    async fn all(&self) -> Result<Vec<Category>> {
        with_pool!(self.pool, |db| {
            sqlx::query_as::<_, Category>("SELECT id, name, description FROM categories ORDER BY name")
                .fetch_all(db)
                .await
                .context("Failed to list categories")
        })
    }

    async fn update(&self, category: &Category) -> Result<Category> {
        with_pool!(self.pool, |db| {
            sqlx::query("UPDATE categories SET name = ?, description = ? WHERE id = ?")
                .bind(&category.name)
                .bind(&category.description)
                .bind(category.id)
                .execute(db)
                .await
                .context("Failed to update category")?;
            Ok(category.clone())
        })
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        with_pool!(self.pool, |db| {
            let mut tx = db.begin().await.context("Failed to begin transaction")?;

            sqlx::query("UPDATE articles SET category_id = NULL WHERE category_id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await
                .context("Failed to detach articles from category")?;

            let result = sqlx::query("DELETE FROM categories WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await
                .context("Failed to delete category")?;

            tx.commit().await.context("Failed to commit category delete")?;
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
    async fn test_category_crud() {
        let pool = setup_pool().await;
        let repo = SqlxCategoryRepository::new(pool);

        let sports = repo.create("Sports", "Games").await.unwrap();
        repo.create("Politics", "").await.unwrap();

        let (all, total) = repo.list(&ListParams::default()).await.unwrap();
        assert_eq!(total, 2);
        assert_eq!(all[0].name, "Politics");
        assert!(repo.get_by_name("Sports").await.unwrap().is_some());

        let renamed = Category {
            name: "Sport".into(),
            ..sports.clone()
        };
        repo.update(&renamed).await.unwrap();
        assert_eq!(repo.get_by_id(sports.id).await.unwrap().unwrap().name, "Sport");
    }

    #[tokio::test]
    async fn test_duplicate_name_rejected() {
        let pool = setup_pool().await;
        let repo = SqlxCategoryRepository::new(pool);
        repo.create("Sports", "").await.unwrap();
        let err = repo.create("Sports", "again").await.unwrap_err();
        assert!(crate::db::is_unique_violation(&err));
    }

    #[tokio::test]
    async fn test_delete_detaches_articles() {
        let pool = setup_pool().await;
        let author = insert_user(&pool, "jo", UserRole::Journalist).await;
        let repo = SqlxCategoryRepository::new(pool.clone());
        let category = repo.create("Sports", "").await.unwrap();
        let db = pool.as_sqlite().unwrap();
        sqlx::query("INSERT INTO articles (title, content, author_id, category_id) VALUES ('t', 'c', ?, ?)")
            .bind(author)
            .bind(category.id)
            .execute(db)
            .await
            .unwrap();

        assert!(repo.delete(category.id).await.unwrap());

        let (count, detached): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), SUM(CASE WHEN category_id IS NULL THEN 1 ELSE 0 END) FROM articles",
        )
        .fetch_one(db)
        .await
        .unwrap();
        assert_eq!((count, detached), (1, 1));
        assert!(!repo.delete(category.id).await.unwrap());
    }
}
