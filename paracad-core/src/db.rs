//! Postgres pool helpers and schema bootstrap for the snippet store.

use crate::config::DatabaseConfig;
use sqlx::{postgres::PgPoolOptions, PgPool};

pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.url)
        .await
}

pub async fn health_check(pool: &PgPool) -> Result<String, sqlx::Error> {
    let row: (String,) = sqlx::query_as("SELECT version()").fetch_one(pool).await?;
    Ok(row.0)
}

pub async fn check_pgvector(pool: &PgPool) -> Result<String, sqlx::Error> {
    let row: (String,) =
        sqlx::query_as("SELECT extversion FROM pg_extension WHERE extname = 'vector'")
            .fetch_one(pool)
            .await?;
    Ok(row.0)
}

/// Create the `vector` extension and the snippets table if they do not exist.
///
/// The embedding column dimension is fixed at creation time from the
/// configured embedding backend; changing the backend dimension requires
/// `reset_schema`.
pub async fn ensure_schema(pool: &PgPool, dimensions: u32) -> Result<(), sqlx::Error> {
    sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
        .execute(pool)
        .await?;

    let ddl = format!(
        r#"
        CREATE TABLE IF NOT EXISTS snippets (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            title TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            category TEXT NOT NULL DEFAULT 'general',
            tags JSONB NOT NULL DEFAULT '[]'::jsonb,
            parameters JSONB NOT NULL DEFAULT '{{}}'::jsonb,
            code TEXT NOT NULL,
            document TEXT NOT NULL,
            embedding vector({dimensions}),
            model_name TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#
    );
    sqlx::query(&ddl).execute(pool).await?;

    Ok(())
}

/// Drop and recreate the snippets table. Destructive.
pub async fn reset_schema(pool: &PgPool, dimensions: u32) -> Result<(), sqlx::Error> {
    sqlx::query("DROP TABLE IF EXISTS snippets")
        .execute(pool)
        .await?;
    ensure_schema(pool, dimensions).await
}
