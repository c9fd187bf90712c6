//! Recent-download resolution.
//!
//! Picks the file a capture refers to: the newest regular file directly
//! inside the downloads directory whose mtime falls in `[now - within, now]`.
//! Hidden entries and partial-download artifacts are skipped. Ties on mtime
//! go to the file name that sorts last (byte-wise, descending).
//!
//! Browsers touch a download several times while finishing it, so each
//! candidate must also hold its size and mtime across a few short polls
//! before it is accepted.

use anyhow::Result;
use std::cmp::Ordering;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use walkdir::WalkDir;

use crate::config::CaptureConfig;
use crate::error::{CtxError, ErrorCode};

/// Suffixes browsers use for downloads still in flight.
const PARTIAL_SUFFIXES: &[&str] = &[".download", ".part", ".crdownload", ".tmp", ".partial"];

/// How long a candidate must stay unchanged before it is accepted.
#[derive(Debug, Clone, Copy)]
pub struct Stability {
    pub checks: u32,
    pub interval: Duration,
}

impl Stability {
    pub fn from_config(config: &CaptureConfig) -> Self {
        Self {
            checks: config.stability_checks,
            interval: config.stability_interval(),
        }
    }

    /// Accept the newest candidate without polling.
    pub fn disabled() -> Self {
        Self {
            checks: 0,
            interval: Duration::ZERO,
        }
    }
}

/// The file a capture resolved to. Contents are never read here.
#[derive(Debug, Clone)]
pub struct ResolvedDownload {
    /// Canonical absolute path.
    pub path: PathBuf,
    pub file_name: String,
    /// Modification time, seconds since the epoch.
    pub modified_at: i64,
    pub size_bytes: u64,
}

#[derive(Debug)]
struct Candidate {
    path: PathBuf,
    name: OsString,
    modified: SystemTime,
}

/// Select the most recently modified settled download inside `dir`.
///
/// Fails with `NO_RECENT_DOWNLOAD` when nothing qualifies (including a
/// missing directory) and `DOWNLOAD_NOT_STABLE` when every candidate is
/// still being written.
pub fn find_recent_download(
    dir: &Path,
    within: Duration,
    stability: &Stability,
) -> Result<ResolvedDownload> {
    let no_recent = || -> anyhow::Error {
        CtxError::new(
            ErrorCode::NoRecentDownload,
            format!(
                "No file created in Downloads within last {} seconds.",
                within.as_secs()
            ),
        )
        .with_detail("downloads_dir", dir.display().to_string())
        .into()
    };

    if !dir.is_dir() {
        tracing::debug!(dir = %dir.display(), "downloads directory missing");
        return Err(no_recent());
    }

    let now = SystemTime::now();
    let cutoff = now.checked_sub(within).unwrap_or(UNIX_EPOCH);
    let mut candidates = scan_candidates(dir, cutoff);

    if candidates.is_empty() {
        return Err(no_recent());
    }

    candidates.sort_by(compare_candidates);
    tracing::debug!(count = candidates.len(), "download candidates in window");

    for candidate in &candidates {
        match settle(&candidate.path, stability) {
            Some(meta) => return resolve(candidate, meta),
            None => {
                tracing::debug!(path = %candidate.path.display(), "candidate not stable");
            }
        }
    }

    Err(CtxError::new(ErrorCode::DownloadNotStable, "Download not stable yet.")
        .with_detail("downloads_dir", dir.display().to_string())
        .into())
}

fn scan_candidates(dir: &Path, cutoff: SystemTime) -> Vec<Candidate> {
    let mut candidates = Vec::new();

    let walker = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(false);
    for entry in walker {
        // Entries can vanish between listing and stat; skip them.
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::debug!(error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_os_string();
        if is_hidden_or_partial(&name.to_string_lossy()) {
            continue;
        }
        let modified = match entry.metadata().ok().and_then(|m| m.modified().ok()) {
            Some(m) => m,
            None => continue,
        };
        // Clock read at stat time: a file mid-write carries a fresh mtime.
        if modified < cutoff || modified > SystemTime::now() {
            continue;
        }
        candidates.push(Candidate {
            path: entry.into_path(),
            name,
            modified,
        });
    }

    candidates
}

/// Newest first; equal mtimes fall back to file name, descending.
fn compare_candidates(a: &Candidate, b: &Candidate) -> Ordering {
    b.modified.cmp(&a.modified).then_with(|| b.name.cmp(&a.name))
}

fn is_hidden_or_partial(name: &str) -> bool {
    let lower = name.to_lowercase();
    lower.starts_with('.') || PARTIAL_SUFFIXES.iter().any(|s| lower.ends_with(s))
}

/// Poll the file until it has held still for `stability.checks` intervals.
/// Returns the final metadata, or `None` if it changed or disappeared.
fn settle(path: &Path, stability: &Stability) -> Option<std::fs::Metadata> {
    let mut previous = std::fs::metadata(path).ok()?;
    for _ in 0..stability.checks {
        std::thread::sleep(stability.interval);
        let current = std::fs::metadata(path).ok()?;
        if current.len() != previous.len() || current.modified().ok() != previous.modified().ok() {
            return None;
        }
        previous = current;
    }
    Some(previous)
}

fn resolve(candidate: &Candidate, meta: std::fs::Metadata) -> Result<ResolvedDownload> {
    let path = std::fs::canonicalize(&candidate.path).map_err(|e| {
        CtxError::new(ErrorCode::FileUnreadable, "Resolved download disappeared.")
            .with_detail("path", candidate.path.display().to_string())
            .with_detail("reason", e.to_string())
    })?;
    let modified = meta.modified().unwrap_or(candidate.modified);

    Ok(ResolvedDownload {
        file_name: candidate.name.to_string_lossy().to_string(),
        path,
        modified_at: epoch_secs(modified),
        size_bytes: meta.len(),
    })
}

fn epoch_secs(t: SystemTime) -> i64 {
    t.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
