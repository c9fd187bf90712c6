//! Keyword search over capture records.
//!
//! Search is a capability ([`SearchBackend`]) with two implementations:
//!
//! | Backend | Name | Notes |
//! |---------|------|-------|
//! | [`scan::ScanBackend`] | `scan` | linear scan of the store, always available |
//! | [`fts::Fts5Backend`] | `fts5` | SQLite FTS5 (trigram) index derived from the log |
//!
//! Both share one matching and ranking definition, so the backend name in
//! the response is diagnostic only:
//!
//! 1. The query is split on whitespace into lowercase keywords.
//! 2. A record matches when every keyword is a substring of at least one of
//!    `file_name`, `origin_title`, `origin_url`, `note` (case-insensitive).
//! 3. Relevance is the number of `(keyword, field)` hits.
//! 4. Sort by relevance (desc), then newest first.
//! 5. `count` is the number of matches before truncating to `limit`.
//!
//! An empty query returns the most recent records and `count` equal to the
//! total number of records.

pub mod fts;
pub mod scan;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use crate::config::Config;
use crate::models::CaptureRecord;
use crate::store::index::newest_first;
use crate::store::RecordStore;

use self::fts::Fts5Backend;
use self::scan::ScanBackend;

/// A single search invocation.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub text: String,
    pub limit: usize,
}

impl SearchQuery {
    pub fn new(text: &str, limit: usize) -> Self {
        Self {
            text: text.to_string(),
            limit,
        }
    }

    /// Lowercased whitespace-separated keywords. Empty for a blank query.
    pub fn keywords(&self) -> Vec<String> {
        self.text
            .split_whitespace()
            .map(|k| k.to_lowercase())
            .collect()
    }
}

/// Ranked results plus the total number of matches.
#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
    pub results: Vec<CaptureRecord>,
    pub count: usize,
    pub backend: &'static str,
}

/// A keyword search implementation.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Short identifier reported in responses.
    fn name(&self) -> &'static str;

    /// Run `query` against the records of `store`.
    async fn query(&self, store: &RecordStore, query: &SearchQuery) -> Result<SearchOutcome>;
}

/// Relevance of `record` for `keywords`, or `None` if some keyword hits no
/// field.
pub fn score(record: &CaptureRecord, keywords: &[String]) -> Option<usize> {
    let fields: Vec<String> = record
        .searchable_fields()
        .iter()
        .map(|f| f.to_lowercase())
        .collect();

    let mut total = 0;
    for keyword in keywords {
        let hits = fields.iter().filter(|f| f.contains(keyword.as_str())).count();
        if hits == 0 {
            return None;
        }
        total += hits;
    }
    Some(total)
}

/// Score the records at `positions`, order them, and truncate.
///
/// Every backend funnels its candidates through here so ranking and `count`
/// cannot drift between them.
pub fn rank<I>(
    store: &RecordStore,
    positions: I,
    query: &SearchQuery,
    backend: &'static str,
) -> SearchOutcome
where
    I: IntoIterator<Item = usize>,
{
    let keywords = query.keywords();
    if keywords.is_empty() {
        return recent(store, query, backend);
    }

    let records = store.records();
    let mut scored: Vec<(usize, usize)> = positions
        .into_iter()
        .filter_map(|pos| {
            let record = records.get(pos)?;
            score(record, &keywords).map(|s| (s, pos))
        })
        .collect();
    scored.sort_by(|a, b| {
        b.0.cmp(&a.0)
            .then_with(|| newest_first((a.1, &records[a.1]), (b.1, &records[b.1])))
    });
    scored.dedup_by_key(|(_, pos)| *pos);

    let count = scored.len();
    let results = scored
        .into_iter()
        .take(query.limit)
        .map(|(_, pos)| records[pos].clone())
        .collect();

    SearchOutcome {
        results,
        count,
        backend,
    }
}

fn recent(store: &RecordStore, query: &SearchQuery, backend: &'static str) -> SearchOutcome {
    SearchOutcome {
        results: store.recent(query.limit),
        count: store.len(),
        backend,
    }
}

/// Pick the configured backend, falling back to `scan` when the full-text
/// index cannot be opened.
pub async fn select_backend(config: &Config, store: &RecordStore) -> Box<dyn SearchBackend> {
    match config.search.backend.as_str() {
        "scan" => Box::new(ScanBackend),
        _ => match Fts5Backend::open(store, config.store.lock_timeout()).await {
            Ok(backend) => Box::new(backend),
            Err(e) => {
                tracing::warn!(error = %format!("{:#}", e), "fts5 unavailable, using scan backend");
                Box::new(ScanBackend)
            }
        },
    }
}

/// Run a search with the configured backend. A failing full-text query is
/// retried on the scan backend.
pub async fn run_search(
    config: &Config,
    store: &RecordStore,
    query: &SearchQuery,
) -> Result<SearchOutcome> {
    let backend = select_backend(config, store).await;
    match backend.query(store, query).await {
        Ok(outcome) => Ok(outcome),
        Err(e) if backend.name() != ScanBackend::NAME => {
            tracing::warn!(
                backend = backend.name(),
                error = %format!("{:#}", e),
                "search backend failed, retrying with scan"
            );
            ScanBackend.query(store, query).await
        }
        Err(e) => Err(e),
    }
}

/// Bring the derived full-text index up to date after a capture.
///
/// Never fails the capture: the index catches up on the next search anyway.
pub async fn index_new_capture(config: &Config, store: &RecordStore) {
    if config.search.backend == "scan" {
        return;
    }
    if let Err(e) = Fts5Backend::open(store, config.store.lock_timeout()).await {
        tracing::warn!(error = %format!("{:#}", e), "could not update fts5 index");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, title: &str, url: &str, note: Option<&str>) -> CaptureRecord {
        CaptureRecord {
            id: name.to_string(),
            created_at: 0,
            file_hash: "h".to_string(),
            file_name: name.to_string(),
            file_size_bytes: 0,
            file_path_at_capture: format!("/dl/{}", name),
            origin_title: title.to_string(),
            origin_url: url.to_string(),
            note: note.map(str::to_string),
            browser: "safari".to_string(),
            source_app: "test".to_string(),
            mime_type: None,
        }
    }

    fn kw(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn test_keywords_lowercased_and_split() {
        let q = SearchQuery::new("  Rust  PAPER\tdraft ", 5);
        assert_eq!(q.keywords(), vec!["rust", "paper", "draft"]);
        assert!(SearchQuery::new("   ", 5).keywords().is_empty());
    }

    #[test]
    fn test_score_substring_case_insensitive() {
        let r = record("Report.PDF", "Quarterly Results", "https://corp.example/q3", None);
        assert_eq!(score(&r, &kw(&["report"])), Some(1));
        assert_eq!(score(&r, &kw(&["sult"])), Some(1));
        assert_eq!(score(&r, &kw(&["example"])), Some(1));
    }

    #[test]
    fn test_score_requires_every_keyword() {
        let r = record("a.pdf", "Rust book", "https://x.test", Some("research"));
        assert_eq!(score(&r, &kw(&["rust", "research"])), Some(2));
        assert_eq!(score(&r, &kw(&["rust", "python"])), None);
    }

    #[test]
    fn test_score_counts_field_hits() {
        let r = record("rust.pdf", "Rust book", "https://rust-lang.org", Some("rust notes"));
        assert_eq!(score(&r, &kw(&["rust"])), Some(4));
    }

    #[test]
    fn test_path_is_not_searched() {
        let r = record("a.pdf", "t", "https://x.test", None);
        assert_eq!(score(&r, &kw(&["dl"])), None);
    }
}
