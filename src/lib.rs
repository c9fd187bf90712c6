//! # ctx-core
//!
//! A content-addressed store linking downloaded files to the browser page
//! that produced them.
//!
//! A capture resolves the newest settled file in the downloads directory,
//! hashes it with SHA-256, and appends a record pairing the hash with the
//! page title and URL. Because records are keyed by content, a later lookup
//! finds them regardless of where the file was moved or what it was renamed.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────┐   ┌───────────────────────────┐
//! │ downloads  │──▶│ hashing  │──▶│ store                      │
//! │ (resolve)  │   │ (sha256) │   │ captures.jsonl (truth)     │
//! └────────────┘   └──────────┘   │ captures.index.json (hash) │
//!                                 └─────────────┬─────────────┘
//!                                               │
//!                       ┌───────────────────────┤
//!                       ▼                       ▼
//!                 ┌──────────┐           ┌──────────────┐
//!                 │  lookup  │           │ search       │
//!                 │ (by hash)│           │ scan / fts5  │
//!                 └──────────┘           └──────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`commands`] | `capture`, `lookup`, `search` and envelope dispatch |
//! | [`config`] | TOML configuration and env overrides |
//! | [`db`] | SQLite connection for the full-text index |
//! | [`downloads`] | Newest-download resolution with stability check |
//! | [`envelope`] | JSON response envelope |
//! | [`error`] | Error codes and classification |
//! | [`hashing`] | Streaming SHA-256 of file contents |
//! | [`migrate`] | Full-text index schema |
//! | [`models`] | Capture record types |
//! | [`search`] | Keyword search backends |
//! | [`store`] | Append-only record store |

pub mod commands;
pub mod config;
pub mod db;
pub mod downloads;
pub mod envelope;
pub mod error;
pub mod hashing;
pub mod migrate;
pub mod models;
pub mod search;
pub mod store;
