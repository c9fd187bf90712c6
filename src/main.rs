//! # ctx-core CLI
//!
//! Links a downloaded file to the browser tab it came from, and finds that
//! context again later from the file's bytes alone.
//!
//! Every invocation prints exactly one JSON envelope line to stdout (see
//! [`ctx_core::envelope`]). Diagnostics go to stderr, filtered by `CTX_LOG`.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ctx-core capture` | Record the newest download with its page title and URL |
//! | `ctx-core lookup --path <file>` | Find captures of this exact file content |
//! | `ctx-core search --q "<query>"` | Keyword search over captures |
//!
//! ## Exit codes
//!
//! `0` success, `1` structured error (`ok: false`), `2` internal error.
//!
//! ## Examples
//!
//! ```bash
//! ctx-core capture --downloads-dir ~/Downloads --within 60 \
//!     --origin-title "Q3 Report" --origin-url https://corp.example/q3 \
//!     --source-app "Shortcut: Capture Download" --note finance
//!
//! ctx-core lookup --path ~/Downloads/report.pdf
//!
//! ctx-core search --q "quarterly report" --limit 5
//! ```

use clap::error::ErrorKind;
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use ctx_core::commands::{self, CaptureArgs, Command, Response};
use ctx_core::config;
use ctx_core::error::{classify, CtxError, ErrorCode};

/// Env var holding the tracing filter for stderr diagnostics.
const LOG_ENV: &str = "CTX_LOG";

/// ctx-core: content-addressed download context store.
#[derive(Parser)]
#[command(
    name = "ctx-core",
    about = "Link downloaded files to the browser page that produced them",
    version,
    long_about = "ctx-core records, for each download, the page title and URL of the browser \
    tab it came from, keyed by the SHA-256 of the file's content. Lookups work no matter \
    where the file has since been moved or what it has been renamed to."
)]
struct Cli {
    /// Path to a TOML configuration file.
    ///
    /// Falls back to `CTX_CONFIG`, then built-in defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record the newest settled download with its browser context.
    Capture {
        /// Directory to scan (non-recursive). Defaults to `capture.downloads_dir`.
        #[arg(long)]
        downloads_dir: Option<PathBuf>,

        /// Recency window in seconds. Defaults to `capture.within_secs`.
        #[arg(long)]
        within: Option<u64>,

        /// Title of the frontmost browser tab.
        #[arg(long)]
        origin_title: String,

        /// URL of the frontmost browser tab.
        #[arg(long)]
        origin_url: String,

        /// Label for the invoking tool.
        #[arg(long)]
        source_app: String,

        /// Free-text note stored with the capture.
        #[arg(long)]
        note: Option<String>,

        /// Browser name. Defaults to `capture.browser`.
        #[arg(long)]
        browser: Option<String>,
    },

    /// Find every capture of the file at `--path`, by content hash.
    Lookup {
        #[arg(long)]
        path: PathBuf,

        /// Maximum number of records to return. `count` is unaffected.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Keyword search over file names, titles, URLs, and notes.
    Search {
        /// Query text. Empty returns the most recent captures.
        #[arg(long)]
        q: String,

        /// Maximum number of results. Defaults to `search.default_limit`.
        #[arg(long)]
        limit: Option<usize>,
    },
}

impl From<Commands> for Command {
    fn from(cmd: Commands) -> Self {
        match cmd {
            Commands::Capture {
                downloads_dir,
                within,
                origin_title,
                origin_url,
                source_app,
                note,
                browser,
            } => Command::Capture(CaptureArgs {
                downloads_dir,
                within_secs: within,
                origin_title,
                origin_url,
                source_app,
                note,
                browser,
            }),
            Commands::Lookup { path, limit } => Command::Lookup { path, limit },
            Commands::Search { q, limit } => Command::Search { query: q, limit },
        }
    }
}

fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn emit(response: &Response) -> ExitCode {
    let mut stdout = std::io::stdout().lock();
    if let Err(e) = writeln!(stdout, "{}", response.line).and_then(|_| stdout.flush()) {
        tracing::error!(error = %e, "failed to write response");
        return ExitCode::from(2);
    }
    ExitCode::from(response.exit_code as u8)
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => match e.kind() {
            ErrorKind::DisplayHelp
            | ErrorKind::DisplayVersion
            | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                let _ = e.print();
                return ExitCode::SUCCESS;
            }
            _ => {
                let message = e.kind().to_string();
                let err = CtxError::new(ErrorCode::BadArguments, "Invalid arguments.")
                    .with_detail("kind", message)
                    .with_detail("reason", e.render().to_string().trim().to_string());
                return emit(&Response::failure(err));
            }
        },
    };

    let config = match config::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => return emit(&Response::failure(classify(&e))),
    };

    let response = commands::dispatch(&config, cli.command.into()).await;
    emit(&response)
}
