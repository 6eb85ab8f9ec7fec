//! Shared fixtures for repository and API tests.

use crate::entities::User;
use crate::migrations::MIGRATOR;
use crate::repos::UserRepository;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

/// Fresh in-memory database with the full schema applied.
///
/// A single connection keeps every query on the same in-memory instance.
pub async fn create_test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("connect to in-memory sqlite");

    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await
        .expect("enable foreign keys");

    MIGRATOR.run(&pool).await.expect("run migrations");
    pool
}

/// Insert a user whose token is derived from the display name
/// (`Alice` authenticates with `token-alice`).
pub async fn seed_user(pool: &SqlitePool, display_name: &str) -> User {
    let token = format!("token-{}", display_name.to_lowercase());
    UserRepository::new(pool.clone())
        .create(display_name, None, &token)
        .await
        .expect("seed user")
}
