use anyhow::Result;
use sqlx::SqlitePool;

/// Bumped whenever the stored text format changes. Older indexes are
/// dropped and rebuilt from the log.
pub const SCHEMA_VERSION: i64 = 2;

/// Create the full-text search schema if it does not exist yet.
///
/// `indexed_captures` lists the log records already pushed into
/// `captures_fts`, so a partially built index can be caught up instead of
/// rebuilt. `captures_fts` holds lowercased copies of the searchable fields
/// under the trigram tokenizer, so `MATCH` is a substring test.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    let version: i64 = sqlx::query_scalar("PRAGMA user_version")
        .fetch_one(pool)
        .await?;
    if version < SCHEMA_VERSION {
        if version > 0 {
            tracing::info!(from = version, to = SCHEMA_VERSION, "dropping outdated fts5 index");
        }
        sqlx::query("DROP TABLE IF EXISTS captures_fts")
            .execute(pool)
            .await?;
        sqlx::query("DROP TABLE IF EXISTS indexed_captures")
            .execute(pool)
            .await?;
    }

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS indexed_captures (
            id TEXT PRIMARY KEY,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // FTS5 CREATE is not idempotent natively, so we check first
    let fts_exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='captures_fts'",
    )
    .fetch_one(pool)
    .await?;

    if !fts_exists {
        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE captures_fts USING fts5(
                id UNINDEXED,
                file_name,
                origin_title,
                origin_url,
                note,
                tokenize = 'trigram'
            )
            "#,
        )
        .execute(pool)
        .await?;
    }

    if version < SCHEMA_VERSION {
        sqlx::query(&format!("PRAGMA user_version = {}", SCHEMA_VERSION))
            .execute(pool)
            .await?;
    }

    Ok(())
}
