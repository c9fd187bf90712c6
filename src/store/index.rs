//! Secondary index `file_hash → [record id]`, newest first.
//!
//! Persisted as a single JSON document replaced atomically (temp file in the
//! same directory, fsync, rename), so readers see either the old or the new
//! index and never a partial one. The index records how many log entries it
//! covers and the id of the last one; any mismatch with the log means it is
//! stale and gets rebuilt from the log.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::io::{ErrorKind, Write};
use std::path::Path;

use crate::models::CaptureRecord;

const INDEX_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashIndex {
    version: u32,
    /// Number of log records this index was built from.
    record_count: usize,
    /// Id of the last log record covered.
    last_id: Option<String>,
    by_hash: BTreeMap<String, Vec<String>>,
}

/// Newest-first order: `created_at` descending, then log position descending.
pub fn newest_first(a: (usize, &CaptureRecord), b: (usize, &CaptureRecord)) -> Ordering {
    b.1.created_at
        .cmp(&a.1.created_at)
        .then_with(|| b.0.cmp(&a.0))
}

impl HashIndex {
    /// Build the index from the log, the source of truth.
    pub fn rebuild(records: &[CaptureRecord]) -> Self {
        let mut groups: BTreeMap<String, Vec<(usize, &CaptureRecord)>> = BTreeMap::new();
        for (pos, record) in records.iter().enumerate() {
            groups
                .entry(record.file_hash.clone())
                .or_default()
                .push((pos, record));
        }

        let by_hash = groups
            .into_iter()
            .map(|(hash, mut entries)| {
                entries.sort_by(|a, b| newest_first(*a, *b));
                let ids = entries.into_iter().map(|(_, r)| r.id.clone()).collect();
                (hash, ids)
            })
            .collect();

        Self {
            version: INDEX_VERSION,
            record_count: records.len(),
            last_id: records.last().map(|r| r.id.clone()),
            by_hash,
        }
    }

    /// Whether this index describes exactly `records`.
    pub fn covers(&self, records: &[CaptureRecord]) -> bool {
        self.version == INDEX_VERSION
            && self.record_count == records.len()
            && self.last_id.as_deref() == records.last().map(|r| r.id.as_str())
    }

    /// Add the record just appended at the end of the log.
    ///
    /// `created_at_of` resolves an existing id to its timestamp. The new
    /// record has the highest log position, so it goes ahead of every entry
    /// not strictly newer than it.
    pub fn insert<F>(&mut self, record: &CaptureRecord, created_at_of: F)
    where
        F: Fn(&str) -> Option<i64>,
    {
        let ids = self.by_hash.entry(record.file_hash.clone()).or_default();
        let at = ids
            .iter()
            .position(|id| created_at_of(id).map_or(true, |ts| ts <= record.created_at))
            .unwrap_or(ids.len());
        ids.insert(at, record.id.clone());
        self.record_count += 1;
        self.last_id = Some(record.id.clone());
    }

    /// Record ids for `hash`, newest first.
    pub fn ids(&self, hash: &str) -> &[String] {
        self.by_hash.get(hash).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn record_count(&self) -> usize {
        self.record_count
    }

    /// Load a persisted index. Missing or unreadable files yield `None`; the
    /// caller rebuilds.
    pub fn load(path: &Path) -> Option<Self> {
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "cannot read index");
                return None;
            }
        };
        match serde_json::from_slice::<HashIndex>(&bytes) {
            Ok(index) => Some(index),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "corrupt index, will rebuild");
                None
            }
        }
    }

    /// Atomically replace the index file at `path`.
    pub fn persist(&self, path: &Path) -> Result<()> {
        let dir = path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("index path has no parent: {}", path.display()))?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .with_context(|| format!("Failed to create temp index in {}", dir.display()))?;
        serde_json::to_writer(&mut tmp, self).context("Failed to serialize index")?;
        tmp.flush()?;
        tmp.as_file().sync_all().context("Failed to flush index")?;
        tmp.persist(path)
            .map_err(|e| e.error)
            .with_context(|| format!("Failed to replace index: {}", path.display()))?;
        sync_dir(dir);
        Ok(())
    }
}

/// Flush a directory entry update (the rename) to disk. Best effort.
fn sync_dir(dir: &Path) {
    #[cfg(unix)]
    {
        if let Err(e) = std::fs::File::open(dir).and_then(|d| d.sync_all()) {
            tracing::debug!(dir = %dir.display(), error = %e, "directory sync failed");
        }
    }
    #[cfg(not(unix))]
    let _ = dir;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn rec(id: &str, hash: &str, created_at: i64) -> CaptureRecord {
        CaptureRecord {
            id: id.to_string(),
            created_at,
            file_hash: hash.to_string(),
            file_name: format!("{}.bin", id),
            file_size_bytes: 1,
            file_path_at_capture: format!("/tmp/{}.bin", id),
            origin_title: "t".to_string(),
            origin_url: "https://example.com".to_string(),
            note: None,
            browser: "safari".to_string(),
            source_app: "test".to_string(),
            mime_type: None,
        }
    }

    #[test]
    fn test_rebuild_orders_newest_first() {
        let records = vec![
            rec("a", "h1", 100),
            rec("b", "h2", 150),
            rec("c", "h1", 300),
            rec("d", "h1", 200),
        ];
        let index = HashIndex::rebuild(&records);
        assert_eq!(index.ids("h1"), ["c", "d", "a"]);
        assert_eq!(index.ids("h2"), ["b"]);
        assert!(index.ids("nope").is_empty());
        assert!(index.covers(&records));
    }

    #[test]
    fn test_same_second_later_position_first() {
        let records = vec![rec("a", "h", 100), rec("b", "h", 100)];
        let index = HashIndex::rebuild(&records);
        assert_eq!(index.ids("h"), ["b", "a"]);
    }

    #[test]
    fn test_insert_matches_rebuild() {
        let mut records = vec![rec("a", "h", 100), rec("b", "h", 300)];
        let mut index = HashIndex::rebuild(&records);

        // Clock stepped backwards: new record is older than "b".
        let new = rec("c", "h", 200);
        let lookup: std::collections::HashMap<String, i64> = records
            .iter()
            .map(|r| (r.id.clone(), r.created_at))
            .collect();
        index.insert(&new, |id| lookup.get(id).copied());
        records.push(new);

        assert_eq!(index, HashIndex::rebuild(&records));
        assert_eq!(index.ids("h"), ["b", "c", "a"]);
    }

    #[test]
    fn test_covers_detects_stale() {
        let records = vec![rec("a", "h", 100)];
        let index = HashIndex::rebuild(&records);
        let more = vec![rec("a", "h", 100), rec("b", "h", 101)];
        assert!(!index.covers(&more));
        let swapped = vec![rec("z", "h", 100)];
        assert!(!index.covers(&swapped));
    }

    #[test]
    fn test_persist_and_load() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("captures.index.json");
        let index = HashIndex::rebuild(&[rec("a", "h", 1)]);
        index.persist(&path).unwrap();
        assert_eq!(HashIndex::load(&path), Some(index));
    }

    #[test]
    fn test_load_corrupt_is_none() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("captures.index.json");
        std::fs::write(&path, b"{\"version\": 1, \"by_ha").unwrap();
        assert_eq!(HashIndex::load(&path), None);
        assert_eq!(HashIndex::load(&tmp.path().join("missing.json")), None);
    }
}
