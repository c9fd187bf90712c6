//! Invocation configuration.
//!
//! Built once per process from an optional TOML file and passed explicitly to
//! every component. Every key has a default, so a missing file is not an
//! error: the menu-bar front-end never passes `--config`.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{CtxError, ErrorCode};

/// Environment variable naming a config file when `--config` is absent.
pub const CONFIG_ENV: &str = "CTX_CONFIG";
/// Environment variable overriding `store.dir`.
pub const STORE_DIR_ENV: &str = "CTX_STORE_DIR";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub search: SearchConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_store_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
    #[serde(default = "default_lock_poll_ms")]
    pub lock_poll_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: default_store_dir(),
            lock_timeout_ms: default_lock_timeout_ms(),
            lock_poll_ms: default_lock_poll_ms(),
        }
    }
}

fn default_store_dir() -> PathBuf {
    PathBuf::from("~/Library/Application Support/Ctx")
}
fn default_lock_timeout_ms() -> u64 {
    5_000
}
fn default_lock_poll_ms() -> u64 {
    25
}

#[derive(Debug, Deserialize, Clone)]
pub struct CaptureConfig {
    #[serde(default = "default_downloads_dir")]
    pub downloads_dir: PathBuf,
    #[serde(default = "default_within_secs")]
    pub within_secs: u64,
    #[serde(default = "default_browser")]
    pub browser: String,
    #[serde(default = "default_stability_checks")]
    pub stability_checks: u32,
    #[serde(default = "default_stability_interval_ms")]
    pub stability_interval_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            downloads_dir: default_downloads_dir(),
            within_secs: default_within_secs(),
            browser: default_browser(),
            stability_checks: default_stability_checks(),
            stability_interval_ms: default_stability_interval_ms(),
        }
    }
}

fn default_downloads_dir() -> PathBuf {
    PathBuf::from("~/Downloads")
}
fn default_within_secs() -> u64 {
    60
}
fn default_browser() -> String {
    "safari".to_string()
}
fn default_stability_checks() -> u32 {
    2
}
fn default_stability_interval_ms() -> u64 {
    350
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default = "default_limit")]
    pub default_limit: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            default_limit: default_limit(),
        }
    }
}

fn default_backend() -> String {
    "auto".to_string()
}
fn default_limit() -> usize {
    20
}

impl StoreConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn lock_poll(&self) -> Duration {
        Duration::from_millis(self.lock_poll_ms.max(1))
    }
}

impl CaptureConfig {
    pub fn stability_interval(&self) -> Duration {
        Duration::from_millis(self.stability_interval_ms)
    }
}

/// Resolve and load the configuration for this invocation.
///
/// Precedence for the file: explicit `path`, then `CTX_CONFIG`, then none
/// (built-in defaults). `CTX_STORE_DIR` always wins for `store.dir`.
pub fn load(path: Option<&Path>) -> Result<Config> {
    let env_path = std::env::var_os(CONFIG_ENV)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from);

    let mut config = match path.map(Path::to_path_buf).or(env_path) {
        Some(p) => load_config(&p)?,
        None => Config::default(),
    };

    if let Some(dir) = std::env::var_os(STORE_DIR_ENV).filter(|v| !v.is_empty()) {
        config.store.dir = PathBuf::from(dir);
    }

    config.store.dir = expand_tilde(&config.store.dir);
    config.capture.downloads_dir = expand_tilde(&config.capture.downloads_dir);

    validate(&config)?;
    Ok(config)
}

/// Parse a TOML config file. Missing keys take their defaults.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        CtxError::new(
            ErrorCode::ConfigInvalid,
            format!("Failed to read config file: {}", path.display()),
        )
        .with_detail("reason", e.to_string())
    })?;

    let config: Config = toml::from_str(&content).map_err(|e| {
        CtxError::new(ErrorCode::ConfigInvalid, "Failed to parse config file")
            .with_detail("path", path.display().to_string())
            .with_detail("reason", e.to_string())
    })?;

    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    let invalid = |msg: &str| -> anyhow::Error { CtxError::new(ErrorCode::ConfigInvalid, msg).into() };

    if config.store.lock_timeout_ms == 0 {
        return Err(invalid("store.lock_timeout_ms must be > 0"));
    }
    if config.search.default_limit < 1 {
        return Err(invalid("search.default_limit must be >= 1"));
    }
    match config.search.backend.as_str() {
        "auto" | "fts5" | "scan" => {}
        other => {
            return Err(invalid(&format!(
                "Unknown search backend: '{}'. Must be auto, fts5, or scan.",
                other
            )))
        }
    }
    Ok(())
}

/// Expand `~` at the start of a path to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    if s.starts_with("~/") || s == "~" {
        if let Some(home) = home_dir() {
            return home.join(s.strip_prefix("~/").unwrap_or(""));
        }
    }
    path.to_path_buf()
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}

/// Make `path` absolute against the current directory without touching the
/// filesystem.
pub fn absolutize(path: &Path) -> Result<PathBuf> {
    let expanded = expand_tilde(path);
    if expanded.is_absolute() {
        return Ok(expanded);
    }
    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    Ok(cwd.join(expanded))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::classify;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.capture.within_secs, 60);
        assert_eq!(cfg.capture.downloads_dir, PathBuf::from("~/Downloads"));
        assert_eq!(cfg.search.default_limit, 20);
        assert_eq!(cfg.search.backend, "auto");
        assert_eq!(cfg.store.lock_timeout_ms, 5_000);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("ctx.toml");
        std::fs::write(&path, "[store]\ndir = \"/var/tmp/ctx\"\n").unwrap();

        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.store.dir, PathBuf::from("/var/tmp/ctx"));
        assert_eq!(cfg.store.lock_poll_ms, 25);
        assert_eq!(cfg.capture.stability_checks, 2);
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let mut cfg = Config::default();
        cfg.search.backend = "tantivy".to_string();
        let err = validate(&cfg).unwrap_err();
        assert_eq!(classify(&err).code, ErrorCode::ConfigInvalid);
    }

    #[test]
    fn test_zero_lock_timeout_rejected() {
        let mut cfg = Config::default();
        cfg.store.lock_timeout_ms = 0;
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn test_missing_file_is_config_invalid() {
        let tmp = TempDir::new().unwrap();
        let err = load_config(&tmp.path().join("nope.toml")).unwrap_err();
        assert_eq!(classify(&err).code, ErrorCode::ConfigInvalid);
    }

    #[test]
    fn test_absolutize_relative() {
        let abs = absolutize(Path::new("some/file.txt")).unwrap();
        assert!(abs.is_absolute());
        assert!(abs.ends_with("some/file.txt"));
    }
}
