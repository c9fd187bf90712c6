//! Durable, content-addressed record store.
//!
//! The store directory holds three files:
//!
//! | File | Role |
//! |------|------|
//! | `captures.jsonl` | append-only log, the source of truth |
//! | `captures.index.json` | `file_hash → [id]` index, rebuildable from the log |
//! | `captures.lock` | cross-process write lock |
//!
//! On open the log is loaded into an in-memory arena (log position = index
//! into [`RecordStore::records`]) and the persisted index is checked against
//! it; a missing, corrupt, or stale index is rebuilt rather than trusted.
//!
//! [`RecordStore::append`] takes the lock, re-reads the log to pick up
//! concurrent writers, appends and fsyncs one line, then atomically replaces
//! the index. Records are never rewritten or removed.

pub mod index;
pub mod lock;
pub mod log;

use anyhow::{Context, Result};
use chrono::Utc;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

use crate::config::StoreConfig;
use crate::models::{CaptureRecord, NewCapture};

use self::index::{newest_first, HashIndex};
use self::lock::StoreLock;

pub const LOG_FILE: &str = "captures.jsonl";
pub const INDEX_FILE: &str = "captures.index.json";
pub const LOCK_FILE: &str = "captures.lock";

/// Records for one content hash, newest first.
#[derive(Debug, Clone)]
pub struct HashMatches {
    pub records: Vec<CaptureRecord>,
    pub count: usize,
}

pub struct RecordStore {
    dir: PathBuf,
    records: Vec<CaptureRecord>,
    positions: HashMap<String, usize>,
    index: HashIndex,
    committed_len: u64,
    lock_timeout: Duration,
    lock_poll: Duration,
}

impl RecordStore {
    pub fn open(config: &StoreConfig) -> Result<Self> {
        Self::open_at(&config.dir, config.lock_timeout(), config.lock_poll())
    }

    pub fn open_at(dir: &Path, lock_timeout: Duration, lock_poll: Duration) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create store directory: {}", dir.display()))?;

        let mut store = Self {
            dir: dir.to_path_buf(),
            records: Vec::new(),
            positions: HashMap::new(),
            index: HashIndex::rebuild(&[]),
            committed_len: 0,
            lock_timeout,
            lock_poll,
        };
        store.reload()?;
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn log_path(&self) -> PathBuf {
        self.dir.join(LOG_FILE)
    }

    pub fn index_path(&self) -> PathBuf {
        self.dir.join(INDEX_FILE)
    }

    fn lock_path(&self) -> PathBuf {
        self.dir.join(LOCK_FILE)
    }

    /// Re-read the log and reconcile the index against it. Returns true if
    /// the in-memory index had to be rebuilt.
    fn reload(&mut self) -> Result<bool> {
        let contents = log::read_log(&self.log_path())?;
        self.records = contents.records;
        self.committed_len = contents.committed_len;
        self.positions = self
            .records
            .iter()
            .enumerate()
            .map(|(pos, r)| (r.id.clone(), pos))
            .collect();

        match HashIndex::load(&self.index_path()) {
            Some(index) if index.covers(&self.records) => {
                self.index = index;
                Ok(false)
            }
            Some(index) => {
                tracing::warn!(
                    indexed = index.record_count(),
                    logged = self.records.len(),
                    "index out of date with log, rebuilding"
                );
                self.index = HashIndex::rebuild(&self.records);
                Ok(true)
            }
            None => {
                if !self.records.is_empty() {
                    tracing::warn!("index missing, rebuilding from log");
                }
                self.index = HashIndex::rebuild(&self.records);
                Ok(true)
            }
        }
    }

    /// Persist a new capture and return the stored record.
    ///
    /// The log line is fsynced before the index is replaced; if the process
    /// dies in between, or the replace fails, the next open sees a stale
    /// index and rebuilds it.
    pub fn append(&mut self, capture: NewCapture) -> Result<CaptureRecord> {
        let _lock = StoreLock::acquire(&self.lock_path(), self.lock_timeout, self.lock_poll)?;

        self.reload()?;

        let record = capture.into_record(Uuid::now_v7().to_string(), Utc::now().timestamp());
        self.committed_len = log::append_record(&self.log_path(), self.committed_len, &record)?;

        let positions = &self.positions;
        let records = &self.records;
        self.index.insert(&record, |id| {
            positions.get(id).map(|pos| records[*pos].created_at)
        });
        self.positions.insert(record.id.clone(), self.records.len());
        self.records.push(record.clone());

        // The record is durable at this point; a stale index is rebuilt on
        // the next open, so failing here would only invite a duplicate retry.
        if let Err(e) = self.index.persist(&self.index_path()) {
            tracing::warn!(
                path = %self.index_path().display(),
                error = %format!("{:#}", e),
                "failed to persist index, it will be rebuilt from the log"
            );
        }

        tracing::info!(
            id = %record.id,
            file_hash = %record.file_hash,
            records = self.records.len(),
            "capture appended"
        );
        Ok(record)
    }

    /// All records sharing `hash`, newest first. Unknown hashes yield an
    /// empty result.
    pub fn find_by_hash(&self, hash: &str) -> HashMatches {
        let records: Vec<CaptureRecord> = self
            .index
            .ids(hash)
            .iter()
            .filter_map(|id| self.get(id).cloned())
            .collect();
        let count = records.len();
        HashMatches { records, count }
    }

    /// Records in log order; a record's position is its index here.
    pub fn records(&self) -> &[CaptureRecord] {
        &self.records
    }

    pub fn get(&self, id: &str) -> Option<&CaptureRecord> {
        self.positions.get(id).map(|pos| &self.records[*pos])
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.positions.get(id).copied()
    }

    /// Up to `limit` records, newest first.
    pub fn recent(&self, limit: usize) -> Vec<CaptureRecord> {
        let mut entries: Vec<(usize, &CaptureRecord)> = self.records.iter().enumerate().collect();
        entries.sort_by(|a, b| newest_first(*a, *b));
        entries
            .into_iter()
            .take(limit)
            .map(|(_, r)| r.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
