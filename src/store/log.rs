//! The append-only capture log: one JSON record per `\n`-terminated line.
//!
//! A line is committed only once its terminating newline is on disk. A
//! trailing fragment without one is a write cut short by a crash: readers
//! ignore it and the next append truncates it away.

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::io::{ErrorKind, Seek, SeekFrom, Write};
use std::path::Path;

use crate::models::CaptureRecord;

/// Committed contents of the log.
#[derive(Debug, Default)]
pub struct LogContents {
    /// Records in log order.
    pub records: Vec<CaptureRecord>,
    /// Byte length of the committed prefix (through the last newline).
    pub committed_len: u64,
    /// True when bytes past `committed_len` were found and ignored.
    pub torn_tail: bool,
}

/// Read every committed record. A missing log is an empty log.
pub fn read_log(path: &Path) -> Result<LogContents> {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(LogContents::default()),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read capture log: {}", path.display()))
        }
    };

    let committed_len = bytes
        .iter()
        .rposition(|b| *b == b'\n')
        .map(|i| i + 1)
        .unwrap_or(0);
    let torn_tail = committed_len < bytes.len();
    if torn_tail {
        tracing::warn!(
            path = %path.display(),
            bytes = bytes.len() - committed_len,
            "ignoring incomplete trailing log entry"
        );
    }

    let mut records = Vec::new();
    for (line_no, line) in bytes[..committed_len].split(|b| *b == b'\n').enumerate() {
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        match serde_json::from_slice::<CaptureRecord>(line) {
            Ok(record) => records.push(record),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    line = line_no + 1,
                    error = %e,
                    "skipping unparsable log entry"
                );
            }
        }
    }

    Ok(LogContents {
        records,
        committed_len: committed_len as u64,
        torn_tail,
    })
}

/// Append `record` after the committed prefix and fsync.
///
/// Anything past `committed_len` is discarded first. Must be called with the
/// store lock held. Returns the new committed length.
pub fn append_record(path: &Path, committed_len: u64, record: &CaptureRecord) -> Result<u64> {
    let mut line = serde_json::to_vec(record).context("Failed to serialize capture record")?;
    line.push(b'\n');

    let mut file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .read(true)
        .write(true)
        .open(path)
        .with_context(|| format!("Failed to open capture log: {}", path.display()))?;

    let on_disk = file.metadata()?.len();
    if on_disk > committed_len {
        file.set_len(committed_len)
            .context("Failed to truncate incomplete log entry")?;
    }
    file.seek(SeekFrom::Start(committed_len))?;
    file.write_all(&line)
        .with_context(|| format!("Failed to append to capture log: {}", path.display()))?;
    file.sync_all().context("Failed to flush capture log")?;

    Ok(committed_len + line.len() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(id: &str) -> CaptureRecord {
        CaptureRecord {
            id: id.to_string(),
            created_at: 1_700_000_000,
            file_hash: "ab".repeat(32),
            file_name: "a.pdf".to_string(),
            file_size_bytes: 3,
            file_path_at_capture: "/tmp/a.pdf".to_string(),
            origin_title: "Title\nwith newline".to_string(),
            origin_url: "https://example.com".to_string(),
            note: None,
            browser: "safari".to_string(),
            source_app: "test".to_string(),
            mime_type: Some("application/pdf".to_string()),
        }
    }

    #[test]
    fn test_missing_log_is_empty() {
        let tmp = TempDir::new().unwrap();
        let contents = read_log(&tmp.path().join("captures.jsonl")).unwrap();
        assert!(contents.records.is_empty());
        assert_eq!(contents.committed_len, 0);
        assert!(!contents.torn_tail);
    }

    #[test]
    fn test_append_then_read() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("captures.jsonl");
        let len = append_record(&path, 0, &record("1")).unwrap();
        let len = append_record(&path, len, &record("2")).unwrap();

        let contents = read_log(&path).unwrap();
        assert_eq!(contents.committed_len, len);
        let ids: Vec<&str> = contents.records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2"]);
        assert_eq!(contents.records[0], record("1"));
    }

    #[test]
    fn test_torn_tail_ignored_then_truncated() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("captures.jsonl");
        let len = append_record(&path, 0, &record("1")).unwrap();

        // Simulate a crash halfway through the second write.
        let full = serde_json::to_vec(&record("2")).unwrap();
        let mut f = OpenOptions::new().append(true).open(&path).unwrap();
        f.write_all(&full[..full.len() / 2]).unwrap();
        drop(f);

        let contents = read_log(&path).unwrap();
        assert!(contents.torn_tail);
        assert_eq!(contents.records.len(), 1);
        assert_eq!(contents.committed_len, len);

        append_record(&path, contents.committed_len, &record("3")).unwrap();
        let contents = read_log(&path).unwrap();
        assert!(!contents.torn_tail);
        let ids: Vec<&str> = contents.records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "3"]);
    }

    #[test]
    fn test_garbage_line_skipped() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("captures.jsonl");
        let len = append_record(&path, 0, &record("1")).unwrap();
        let mut f = OpenOptions::new().append(true).open(&path).unwrap();
        f.write_all(b"{not json}\n").unwrap();
        drop(f);
        append_record(&path, len + 11, &record("2")).unwrap();

        let contents = read_log(&path).unwrap();
        assert_eq!(contents.records.len(), 2);
    }
}
