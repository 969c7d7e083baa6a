// /////////////////////////////////////////////////////////////////////////////
// Elspeth
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! SQLite schema helpers shared by the Landscape implementation.
//!
//! Applies migrations on start-up so integration tests and services see a
//! consistent database.

use sqlx::migrate::MigrateDatabase;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tracing::{debug, info};

/// Runs pending migrations against the provided SQLite pool.
pub async fn ensure_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    debug!("Ensuring Landscape schema is up to date");

    // Run migrations - sqlx will automatically track what's been applied
    sqlx::migrate!("../migrations").run(pool).await?;

    info!("Landscape schema is up to date");
    Ok(())
}

/// Creates a new SQLite database file if it doesn't exist.
///
/// SqlitePool::connect() fails when the file is absent unless connect
/// options request creation; calling this first keeps the connect path
/// uniform.
pub async fn create_database_if_missing(database_url: &str) -> Result<(), sqlx::Error> {
    if !sqlx::Sqlite::database_exists(database_url).await? {
        debug!("Database does not exist, creating: {}", database_url);
        sqlx::Sqlite::create_database(database_url).await?;
        info!("Created new SQLite database: {}", database_url);
    } else {
        debug!("Database already exists: {}", database_url);
    }
    Ok(())
}

/// Initializes a database with schema (convenience for startup and tests).
///
/// Accepts `sqlite://<path>` URLs and `sqlite::memory:`. In-memory pools
/// are capped at one connection; each SQLite in-memory connection is its
/// own database, so a larger pool would hand out empty databases.
pub async fn initialize_database(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let pool = if database_url == "sqlite::memory:" {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect(database_url)
            .await?
    } else {
        create_database_if_missing(database_url).await?;
        SqlitePool::connect(database_url).await?
    };

    ensure_schema(&pool).await?;

    Ok(pool)
}

/// Normalizes a configured landscape path into a sqlx SQLite URL.
///
/// - `:memory:` or `sqlite::memory:` → `sqlite::memory:`
/// - `sqlite://...` passes through
/// - anything else is treated as a file path
pub fn database_url(landscape_path: &str) -> String {
    if landscape_path == ":memory:" || landscape_path == "sqlite::memory:" {
        "sqlite::memory:".to_string()
    } else if landscape_path.starts_with("sqlite:") {
        landscape_path.to_string()
    } else {
        format!("sqlite://{}", landscape_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_normalization() {
        assert_eq!(database_url(":memory:"), "sqlite::memory:");
        assert_eq!(database_url("sqlite::memory:"), "sqlite::memory:");
        assert_eq!(database_url("sqlite://a.db"), "sqlite://a.db");
        assert_eq!(database_url("data/landscape.db"), "sqlite://data/landscape.db");
    }

    #[tokio::test]
    async fn in_memory_database_initializes_schema() {
        let pool = initialize_database("sqlite::memory:").await.unwrap();

        let count: i32 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='runs'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();

        assert_eq!(count, 1, "runs table should exist");
    }

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let pool = initialize_database("sqlite::memory:").await.unwrap();
        ensure_schema(&pool).await.unwrap();
        ensure_schema(&pool).await.unwrap();
    }
}
