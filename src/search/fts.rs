//! SQLite FTS5 search backend.
//!
//! The index lives in `search.sqlite` next to the capture log and is a pure
//! derivative of it. Opening the backend catches the index up with the log
//! (or rebuilds it when it holds ids the log does not), so deleting the file
//! is always safe.
//!
//! FTS narrows the candidate set; the shared [`rank`] function re-checks
//! every candidate and orders them, keeping results identical to the scan
//! backend.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use super::{rank, SearchBackend, SearchOutcome, SearchQuery};
use crate::db;
use crate::migrate;
use crate::models::CaptureRecord;
use crate::store::{log, RecordStore};

pub const DB_FILE: &str = "search.sqlite";

/// Trigram tokens need at least this many characters to be matchable.
const MIN_MATCH_CHARS: usize = 3;

pub struct Fts5Backend {
    pool: SqlitePool,
}

impl Fts5Backend {
    pub const NAME: &'static str = "fts5";

    pub fn db_path(store: &RecordStore) -> PathBuf {
        store.dir().join(DB_FILE)
    }

    /// Open the index for `store` and bring it up to date with the log.
    pub async fn open(store: &RecordStore, busy_timeout: Duration) -> Result<Self> {
        let pool = db::connect(&Self::db_path(store), busy_timeout).await?;
        migrate::run_migrations(&pool)
            .await
            .context("Failed to create fts5 schema")?;

        let backend = Self { pool };
        backend.sync(store).await?;
        Ok(backend)
    }

    /// Index every log record not yet present. Rebuilds from scratch if the
    /// index knows ids the log does not.
    async fn sync(&self, store: &RecordStore) -> Result<()> {
        let indexed: Vec<String> = sqlx::query_scalar("SELECT id FROM indexed_captures")
            .fetch_all(&self.pool)
            .await?;
        let indexed: HashSet<String> = indexed.into_iter().collect();

        let unknown: Vec<&String> = indexed
            .iter()
            .filter(|id| store.position(id).is_none())
            .collect();
        let stale = !unknown.is_empty() && has_foreign_ids(store, &unknown)?;
        let missing: Vec<&CaptureRecord> = if stale {
            store.records().iter().collect()
        } else {
            store
                .records()
                .iter()
                .filter(|r| !indexed.contains(&r.id))
                .collect()
        };

        if !stale && missing.is_empty() {
            return Ok(());
        }

        let mut conn = self.pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        let result: Result<usize> = async {
            if stale {
                tracing::warn!("fts5 index holds unknown records, rebuilding");
                sqlx::query("DELETE FROM captures_fts")
                    .execute(&mut *conn)
                    .await?;
                sqlx::query("DELETE FROM indexed_captures")
                    .execute(&mut *conn)
                    .await?;
            }

            let mut added = 0;
            for record in &missing {
                // Another process may have indexed it since we looked.
                let inserted = sqlx::query(
                    "INSERT OR IGNORE INTO indexed_captures (id, created_at) VALUES (?, ?)",
                )
                .bind(&record.id)
                .bind(record.created_at)
                .execute(&mut *conn)
                .await?
                .rows_affected();
                if inserted == 0 {
                    continue;
                }

                // Stored pre-lowered so matching folds case exactly like `score`.
                let fields = record.searchable_fields();
                sqlx::query(
                    r#"
                    INSERT INTO captures_fts (id, file_name, origin_title, origin_url, note)
                    VALUES (?, ?, ?, ?, ?)
                    "#,
                )
                .bind(&record.id)
                .bind(fields[0].to_lowercase())
                .bind(fields[1].to_lowercase())
                .bind(fields[2].to_lowercase())
                .bind(fields[3].to_lowercase())
                .execute(&mut *conn)
                .await?;
                added += 1;
            }
            Ok(added)
        }
        .await;

        match result {
            Ok(added) => {
                sqlx::query("COMMIT").execute(&mut *conn).await?;
                tracing::debug!(added, "fts5 index synced");
                Ok(())
            }
            Err(e) => {
                if let Err(rollback) = sqlx::query("ROLLBACK").execute(&mut *conn).await {
                    tracing::debug!(error = %rollback, "fts5 rollback failed");
                }
                Err(e)
            }
        }
    }

    /// Candidate record ids for `keywords`: a superset of the true matches.
    async fn candidates(&self, keywords: &[String]) -> Result<Vec<String>> {
        let (sql, binds) = build_candidate_query(keywords);
        let mut query = sqlx::query_scalar::<_, String>(&sql);
        for value in binds {
            query = query.bind(value);
        }
        Ok(query.fetch_all(&self.pool).await?)
    }
}

/// Whether any of `unknown` is absent from the log on disk too.
///
/// Ids written by a concurrent capture after `store` was loaded are not
/// foreign: [`rank`] ignores them and the index stays valid.
fn has_foreign_ids(store: &RecordStore, unknown: &[&String]) -> Result<bool> {
    let fresh = log::read_log(&store.log_path())?;
    let ids: HashSet<&str> = fresh.records.iter().map(|r| r.id.as_str()).collect();
    Ok(unknown.iter().any(|id| !ids.contains(id.as_str())))
}

/// Build the narrowing query.
///
/// The indexed columns hold lowercased text and keywords arrive lowercased,
/// so both sides share Rust's case folding. Keywords of at least three
/// characters become a trigram phrase in one `MATCH` expression; shorter
/// ones use `instr`.
fn build_candidate_query(keywords: &[String]) -> (String, Vec<String>) {
    let mut phrases = Vec::new();
    let mut clauses = Vec::new();
    let mut binds = Vec::new();

    for keyword in keywords {
        if keyword.chars().count() >= MIN_MATCH_CHARS {
            phrases.push(format!("\"{}\"", keyword.replace('"', "\"\"")));
        } else {
            clauses.push(
                "(instr(file_name, ?) > 0 OR instr(origin_title, ?) > 0 \
                 OR instr(origin_url, ?) > 0 OR instr(note, ?) > 0)"
                    .to_string(),
            );
            for _ in 0..4 {
                binds.push(keyword.clone());
            }
        }
    }

    let mut conditions = Vec::new();
    let mut all_binds = Vec::new();
    if !phrases.is_empty() {
        conditions.push("captures_fts MATCH ?".to_string());
        all_binds.push(phrases.join(" AND "));
    }
    conditions.extend(clauses);
    all_binds.extend(binds);

    let mut sql = "SELECT id FROM captures_fts".to_string();
    if !conditions.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&conditions.join(" AND "));
    }
    (sql, all_binds)
}

#[async_trait]
impl SearchBackend for Fts5Backend {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn query(&self, store: &RecordStore, query: &SearchQuery) -> Result<SearchOutcome> {
        let keywords = query.keywords();
        if keywords.is_empty() {
            return Ok(rank(store, std::iter::empty(), query, Self::NAME));
        }

        let ids = self.candidates(&keywords).await?;
        let positions: Vec<usize> = ids.iter().filter_map(|id| store.position(id)).collect();
        Ok(rank(store, positions, query, Self::NAME))
    }
}
