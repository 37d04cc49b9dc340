//! Database repositories
//!
//! One repository per aggregate. Each is an `#[async_trait]` trait plus a
//! `Sqlx*Repository` implementation over [`DynDatabasePool`](crate::db::DynDatabasePool).

pub mod category;
pub mod comment;
pub mod content;
pub mod publisher;
pub mod session;
pub mod subscription;
pub mod user;

pub use category::{CategoryRepository, SqlxCategoryRepository};
pub use comment::{CommentRepository, SqlxCommentRepository};
pub use content::{ContentRepository, SqlxContentRepository};
pub use publisher::{PublisherRepository, SqlxPublisherRepository};
pub use session::{SessionRepository, SqlxSessionRepository};
pub use subscription::{SqlxSubscriptionRepository, SubscriptionRepository};
pub use user::{SqlxUserRepository, UserRepository};

#[cfg(test)]
pub(crate) mod test_support {
    //! Fixtures shared by repository and service tests

    use crate::db::{create_test_pool, migrations, DynDatabasePool};
    use crate::models::UserRole;

    /// In-memory database with every migration applied
    pub async fn setup_pool() -> DynDatabasePool {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        pool
    }

    /// Insert a user with email `<username>@example.com`
    pub async fn insert_user(pool: &DynDatabasePool, username: &str, role: UserRole) -> i64 {
        sqlx::query("INSERT INTO users (username, email, password_hash, role) VALUES (?, ?, 'x', ?)")
            .bind(username)
            .bind(format!("{}@example.com", username))
            .bind(role.as_str())
            .execute(pool.as_sqlite().expect("sqlite pool"))
            .await
            .expect("Failed to insert user")
            .last_insert_rowid()
    }

    pub async fn insert_publisher(pool: &DynDatabasePool, name: &str) -> i64 {
        sqlx::query("INSERT INTO publishers (name, description) VALUES (?, '')")
            .bind(name)
            .execute(pool.as_sqlite().expect("sqlite pool"))
            .await
            .expect("Failed to insert publisher")
            .last_insert_rowid()
    }

    /// Insert an article; `public` makes it approved and published
    pub async fn insert_article(pool: &DynDatabasePool, author_id: i64, public: bool) -> i64 {
        sqlx::query(
            "INSERT INTO articles (title, content, author_id, is_approved, is_published) VALUES ('t', 'c', ?, ?, ?)",
        )
        .bind(author_id)
        .bind(public)
        .bind(public)
        .execute(pool.as_sqlite().expect("sqlite pool"))
        .await
        .expect("Failed to insert article")
        .last_insert_rowid()
    }
}
