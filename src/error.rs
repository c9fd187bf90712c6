//! Structured failures surfaced through the JSON envelope.
//!
//! Internally everything returns [`anyhow::Result`]. Failures the caller is
//! expected to act on are raised as a [`CtxError`] carrying an
//! [`ErrorCode`]; the dispatcher downcasts to recover it and maps any other
//! error to [`ErrorCode::Internal`].

use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;

/// Machine-readable error code, serialized as `SCREAMING_SNAKE_CASE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// No file in the downloads directory falls inside the window.
    NoRecentDownload,
    /// Candidates exist but their size or mtime is still changing.
    DownloadNotStable,
    /// I/O failure while hashing a file.
    FileUnreadable,
    /// The store lock could not be acquired within the bound.
    StoreLocked,
    /// Browser title or URL missing.
    ContextUnavailable,
    /// Command-line arguments could not be parsed.
    BadArguments,
    /// Configuration file unreadable or invalid.
    ConfigInvalid,
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::NoRecentDownload => "NO_RECENT_DOWNLOAD",
            ErrorCode::DownloadNotStable => "DOWNLOAD_NOT_STABLE",
            ErrorCode::FileUnreadable => "FILE_UNREADABLE",
            ErrorCode::StoreLocked => "STORE_LOCKED",
            ErrorCode::ContextUnavailable => "CONTEXT_UNAVAILABLE",
            ErrorCode::BadArguments => "BAD_ARGUMENTS",
            ErrorCode::ConfigInvalid => "CONFIG_INVALID",
            ErrorCode::Internal => "INTERNAL",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure with a stable code, a human-readable message, and optional
/// key/value details (paths, OS error text).
#[derive(Debug, Clone, thiserror::Error)]
#[error("{code}: {message}")]
pub struct CtxError {
    pub code: ErrorCode,
    pub message: String,
    pub details: Map<String, Value>,
}

impl CtxError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: Map::new(),
        }
    }

    /// Attach a detail entry.
    pub fn with_detail(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }
}

/// Recover the [`CtxError`] behind an [`anyhow::Error`], or wrap an
/// unexpected failure as [`ErrorCode::Internal`].
pub fn classify(err: &anyhow::Error) -> CtxError {
    if let Some(ctx) = err.downcast_ref::<CtxError>() {
        return ctx.clone();
    }
    CtxError::new(ErrorCode::Internal, "Unexpected failure.")
        .with_detail("reason", format!("{:#}", err))
}
