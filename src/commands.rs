//! The three operations exposed on the command line.
//!
//! Each returns a serializable payload that becomes the `data` member of the
//! envelope, or an error that [`crate::error::classify`] turns into the
//! `error` member. [`dispatch`] does the wrapping.

use anyhow::Result;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::{self, Config};
use crate::downloads::{self, Stability};
use crate::envelope::Envelope;
use crate::error::{classify, CtxError, ErrorCode};
use crate::hashing;
use crate::models::{CaptureRecord, NewCapture};
use crate::search::{self, SearchQuery};
use crate::store::RecordStore;

/// Inputs to `capture`. Unset options fall back to the `[capture]` config.
#[derive(Debug, Clone, Default)]
pub struct CaptureArgs {
    pub downloads_dir: Option<PathBuf>,
    pub within_secs: Option<u64>,
    pub origin_title: String,
    pub origin_url: String,
    pub source_app: String,
    pub note: Option<String>,
    pub browser: Option<String>,
}

#[derive(Debug, Clone)]
pub enum Command {
    Capture(CaptureArgs),
    Lookup { path: PathBuf, limit: Option<usize> },
    Search { query: String, limit: Option<usize> },
}

#[derive(Debug, Serialize)]
pub struct CapturePayload {
    pub capture: CaptureRecord,
}

#[derive(Debug, Serialize)]
pub struct LookupPayload {
    pub file_hash: String,
    pub records: Vec<CaptureRecord>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct SearchPayload {
    pub query: String,
    pub backend: &'static str,
    pub results: Vec<CaptureRecord>,
    pub count: usize,
}

/// Outcome of one invocation: the envelope line for stdout and the process
/// exit code.
#[derive(Debug)]
pub struct Response {
    pub line: String,
    pub exit_code: i32,
}

impl Response {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            line: Envelope::success(data).to_line(),
            exit_code: 0,
        }
    }

    /// Exit code 2 for internal failures, 1 for anything the caller can act
    /// on.
    pub fn failure(err: CtxError) -> Self {
        let exit_code = if err.code == ErrorCode::Internal { 2 } else { 1 };
        Self {
            line: Envelope::<()>::failure(err).to_line(),
            exit_code,
        }
    }
}

/// Run `command` against the store described by `config`.
pub async fn dispatch(config: &Config, command: Command) -> Response {
    let result = match command {
        Command::Capture(args) => capture(config, args).await.map(Response::success),
        Command::Lookup { path, limit } => lookup(config, &path, limit).map(Response::success),
        Command::Search { query, limit } => {
            search(config, &query, limit).await.map(Response::success)
        }
    };

    match result {
        Ok(response) => response,
        Err(e) => {
            let err = classify(&e);
            if err.code == ErrorCode::Internal {
                tracing::error!(error = %format!("{:#}", e), "command failed");
            } else {
                tracing::debug!(code = %err.code, message = %err.message, "command failed");
            }
            Response::failure(err)
        }
    }
}

/// Record the newest settled download together with its browser context.
pub async fn capture(config: &Config, args: CaptureArgs) -> Result<CapturePayload> {
    let origin_title = args.origin_title.trim();
    let origin_url = args.origin_url.trim();
    if origin_title.is_empty() || origin_url.is_empty() {
        return Err(CtxError::new(
            ErrorCode::ContextUnavailable,
            "Browser title or URL unavailable.",
        )
        .with_detail("origin_title_present", !origin_title.is_empty())
        .with_detail("origin_url_present", !origin_url.is_empty())
        .into());
    }

    let downloads_dir = match &args.downloads_dir {
        Some(dir) => config::absolutize(dir)?,
        None => config.capture.downloads_dir.clone(),
    };
    let within = Duration::from_secs(args.within_secs.unwrap_or(config.capture.within_secs));
    let stability = Stability::from_config(&config.capture);

    let download = downloads::find_recent_download(&downloads_dir, within, &stability)?;
    let file_hash = hashing::sha256_file(&download.path)?;
    let mime_type = mime_guess::from_path(&download.path)
        .first()
        .map(|m| m.essence_str().to_string());

    let new = NewCapture {
        file_hash,
        file_name: download.file_name,
        file_size_bytes: download.size_bytes,
        file_path_at_capture: download.path.display().to_string(),
        origin_title: origin_title.to_string(),
        origin_url: origin_url.to_string(),
        note: args.note.filter(|n| !n.trim().is_empty()),
        browser: args
            .browser
            .filter(|b| !b.trim().is_empty())
            .unwrap_or_else(|| config.capture.browser.clone()),
        source_app: args.source_app,
        mime_type,
    };

    let mut store = RecordStore::open(&config.store)?;
    let capture = store.append(new)?;
    search::index_new_capture(config, &store).await;

    Ok(CapturePayload { capture })
}

/// Every capture whose content hash equals the file at `path`.
///
/// `count` is the number of matches before `limit` is applied.
pub fn lookup(
    config: &Config,
    path: &std::path::Path,
    limit: Option<usize>,
) -> Result<LookupPayload> {
    let path = config::absolutize(path)?;
    let file_hash = hashing::sha256_file(&path)?;

    let store = RecordStore::open(&config.store)?;
    let matches = store.find_by_hash(&file_hash);
    let mut records = matches.records;
    if let Some(limit) = limit {
        records.truncate(limit);
    }

    Ok(LookupPayload {
        file_hash,
        records,
        count: matches.count,
    })
}

/// Keyword search over the store with the configured backend.
pub async fn search(config: &Config, text: &str, limit: Option<usize>) -> Result<SearchPayload> {
    let store = RecordStore::open(&config.store)?;
    let query = SearchQuery::new(text, limit.unwrap_or(config.search.default_limit));
    let outcome = search::run_search(config, &store, &query).await?;

    Ok(SearchPayload {
        query: text.to_string(),
        backend: outcome.backend,
        results: outcome.results,
        count: outcome.count,
    })
}
