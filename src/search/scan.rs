//! Linear-scan search backend.
//!
//! Considers every record in the store. Needs nothing beyond the log, so it
//! is the guaranteed fallback when the full-text index is unavailable.

use anyhow::Result;
use async_trait::async_trait;

use super::{rank, SearchBackend, SearchOutcome, SearchQuery};
use crate::store::RecordStore;

pub struct ScanBackend;

impl ScanBackend {
    pub const NAME: &'static str = "scan";
}

#[async_trait]
impl SearchBackend for ScanBackend {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn query(&self, store: &RecordStore, query: &SearchQuery) -> Result<SearchOutcome> {
        Ok(rank(store, 0..store.len(), query, Self::NAME))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewCapture;
    use std::time::Duration;
    use tempfile::TempDir;

    fn capture(name: &str, title: &str, note: Option<&str>) -> NewCapture {
        NewCapture {
            file_hash: format!("hash-{}", name),
            file_name: name.to_string(),
            file_size_bytes: 1,
            file_path_at_capture: format!("/dl/{}", name),
            origin_title: title.to_string(),
            origin_url: format!("https://example.com/{}", name),
            note: note.map(str::to_string),
            browser: "safari".to_string(),
            source_app: "test".to_string(),
            mime_type: None,
        }
    }

    fn store_with(captures: Vec<NewCapture>) -> (TempDir, RecordStore) {
        let tmp = TempDir::new().unwrap();
        let mut store =
            RecordStore::open_at(tmp.path(), Duration::from_secs(5), Duration::from_millis(5))
                .unwrap();
        for c in captures {
            store.append(c).unwrap();
        }
        (tmp, store)
    }

    #[tokio::test]
    async fn test_note_match() {
        let (_tmp, store) = store_with(vec![
            capture("a.pdf", "Paper", Some("research")),
            capture("b.txt", "Other", None),
        ]);
        let out = ScanBackend
            .query(&store, &SearchQuery::new("research", 20))
            .await
            .unwrap();
        assert_eq!(out.count, 1);
        assert_eq!(out.results[0].file_name, "a.pdf");
        assert_eq!(out.backend, "scan");
    }

    #[tokio::test]
    async fn test_empty_query_returns_recent() {
        let (_tmp, store) = store_with(vec![
            capture("1.bin", "one", None),
            capture("2.bin", "two", None),
            capture("3.bin", "three", None),
        ]);
        let out = ScanBackend.query(&store, &SearchQuery::new("", 2)).await.unwrap();
        assert_eq!(out.count, 3);
        let names: Vec<&str> = out.results.iter().map(|r| r.file_name.as_str()).collect();
        assert_eq!(names, vec!["3.bin", "2.bin"]);
    }

    #[tokio::test]
    async fn test_count_before_truncation_and_ties_newest_first() {
        let (_tmp, store) = store_with(vec![
            capture("a.bin", "Shared topic", None),
            capture("b.bin", "Shared topic", None),
            capture("c.bin", "Shared topic", None),
        ]);
        let out = ScanBackend
            .query(&store, &SearchQuery::new("topic", 2))
            .await
            .unwrap();
        assert_eq!(out.count, 3);
        let names: Vec<&str> = out.results.iter().map(|r| r.file_name.as_str()).collect();
        assert_eq!(names, vec!["c.bin", "b.bin"]);
    }

    #[tokio::test]
    async fn test_higher_relevance_ranks_first() {
        let (_tmp, store) = store_with(vec![
            capture("rust-book.pdf", "Rust", Some("rust")),
            capture("misc.pdf", "Rust", None),
        ]);
        let out = ScanBackend.query(&store, &SearchQuery::new("rust", 20)).await.unwrap();
        assert_eq!(out.count, 2);
        assert_eq!(out.results[0].file_name, "rust-book.pdf");
    }

    #[tokio::test]
    async fn test_no_match() {
        let (_tmp, store) = store_with(vec![capture("a.pdf", "Paper", None)]);
        let out = ScanBackend.query(&store, &SearchQuery::new("zzz", 20)).await.unwrap();
        assert_eq!(out.count, 0);
        assert!(out.results.is_empty());
    }
}
