//! The JSON envelope every invocation writes to stdout.
//!
//! ```json
//! { "schema_version": 1, "ok": true,  "data": { ... }, "error": null }
//! { "schema_version": 1, "ok": false, "data": null,
//!   "error": { "code": "NO_RECENT_DOWNLOAD", "message": "...", "details": {} } }
//! ```
//!
//! Exactly one of `data` and `error` is non-null. Both keys are always
//! present.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{CtxError, ErrorCode};

pub const SCHEMA_VERSION: u32 = 1;

/// Last-resort output if serializing an envelope itself fails.
const FALLBACK: &str = r#"{"schema_version":1,"ok":false,"data":null,"error":{"code":"INTERNAL","message":"Failed to serialize response.","details":{}}}"#;

#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub schema_version: u32,
    pub ok: bool,
    pub data: Option<T>,
    pub error: Option<ErrorBody>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
    pub details: Map<String, Value>,
}

impl From<CtxError> for ErrorBody {
    fn from(err: CtxError) -> Self {
        Self {
            code: err.code,
            message: err.message,
            details: err.details,
        }
    }
}

impl<T: Serialize> Envelope<T> {
    pub fn success(data: T) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(err: CtxError) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            ok: false,
            data: None,
            error: Some(err.into()),
        }
    }

    /// Single-line JSON rendering. Never fails: serialization errors are
    /// replaced by a fixed `INTERNAL` envelope.
    pub fn to_line(&self) -> String {
        match serde_json::to_string(self) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize envelope");
                FALLBACK.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_shape() {
        let line = Envelope::success(json!({"count": 0})).to_line();
        let v: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(v["schema_version"], 1);
        assert_eq!(v["ok"], true);
        assert_eq!(v["data"]["count"], 0);
        assert!(v["error"].is_null());
        assert!(v.as_object().unwrap().contains_key("error"));
    }

    #[test]
    fn test_failure_shape() {
        let err = CtxError::new(ErrorCode::StoreLocked, "busy").with_detail("timeout_ms", 5000);
        let line = Envelope::<Value>::failure(err).to_line();
        let v: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(v["ok"], false);
        assert!(v["data"].is_null());
        assert!(v.as_object().unwrap().contains_key("data"));
        assert_eq!(v["error"]["code"], "STORE_LOCKED");
        assert_eq!(v["error"]["message"], "busy");
        assert_eq!(v["error"]["details"]["timeout_ms"], 5000);
    }

    #[test]
    fn test_fallback_is_valid_json() {
        let v: Value = serde_json::from_str(FALLBACK).unwrap();
        assert_eq!(v["error"]["code"], "INTERNAL");
        assert_eq!(v["schema_version"], SCHEMA_VERSION);
    }

    #[test]
    fn test_single_line() {
        let line = Envelope::success(json!({"note": "multi\nline"})).to_line();
        assert!(!line.contains('\n'));
    }
}
