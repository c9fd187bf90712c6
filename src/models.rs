//! Core data models.
//!
//! A [`CaptureRecord`] is written once and never changed. [`NewCapture`] is
//! everything the caller knows before the store assigns identity and time.

use serde::{Deserialize, Serialize};

/// One persisted capture: a file's content identity plus the browsing
/// context it was downloaded from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureRecord {
    /// UUIDv7, unique and ordered by creation time.
    pub id: String,
    /// Seconds since the Unix epoch.
    pub created_at: i64,
    /// Lowercase hex SHA-256 of the file bytes.
    pub file_hash: String,
    pub file_name: String,
    pub file_size_bytes: u64,
    pub file_path_at_capture: String,
    pub origin_title: String,
    pub origin_url: String,
    pub note: Option<String>,
    pub browser: String,
    pub source_app: String,
    pub mime_type: Option<String>,
}

/// Capture fields supplied before the store assigns `id` and `created_at`.
#[derive(Debug, Clone)]
pub struct NewCapture {
    pub file_hash: String,
    pub file_name: String,
    pub file_size_bytes: u64,
    pub file_path_at_capture: String,
    pub origin_title: String,
    pub origin_url: String,
    pub note: Option<String>,
    pub browser: String,
    pub source_app: String,
    pub mime_type: Option<String>,
}

impl NewCapture {
    /// Stamp identity and creation time, producing the immutable record.
    pub fn into_record(self, id: String, created_at: i64) -> CaptureRecord {
        CaptureRecord {
            id,
            created_at,
            file_hash: self.file_hash,
            file_name: self.file_name,
            file_size_bytes: self.file_size_bytes,
            file_path_at_capture: self.file_path_at_capture,
            origin_title: self.origin_title,
            origin_url: self.origin_url,
            note: self.note,
            browser: self.browser,
            source_app: self.source_app,
            mime_type: self.mime_type,
        }
    }
}

impl CaptureRecord {
    /// The text fields keyword search runs over, in a fixed order.
    pub fn searchable_fields(&self) -> [&str; 4] {
        [
            self.file_name.as_str(),
            self.origin_title.as_str(),
            self.origin_url.as_str(),
            self.note.as_deref().unwrap_or(""),
        ]
    }
}
