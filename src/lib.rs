//! # dsmig
//!
//! Control-file driven scheduler for bulk mainframe dataset migration.
//!
//! ## Design Philosophy
//!
//! dsmig is designed to be:
//! - **Resumable** - Every dataset's progress lives in one delimited control file; a run
//!   picks up where the last one stopped
//! - **Faithful** - Rows a run does not touch are written back byte for byte
//! - **Pluggable** - Retrieval and conversion are traits; the shipped adapters drive the
//!   system `ftp` client and the `dsmigin` tool chain
//!
//! ## Quick Start
//!
//! ```no_run
//! use dsmig::{Config, Coordinator, DsmiginConverter, FtpTransfer, PhaseSet, SelectionOptions};
//! use std::path::Path;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_file(Path::new("dsmig.json"))?;
//!     let transfer = FtpTransfer::from_config(&config.transfer, &config.retry)?;
//!     let converter = DsmiginConverter::from_config(&config.conversion, &config.workspace)?;
//!     let coordinator = Coordinator::new(config, Arc::new(transfer), Arc::new(converter));
//!
//!     let summary = coordinator
//!         .execute(
//!             Path::new("datasets.csv"),
//!             PhaseSet::both(),
//!             SelectionOptions::default(),
//!             &CancellationToken::new(),
//!         )
//!         .await?;
//!     std::process::exit(summary.exit_code());
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Decode/load collaborator
pub mod conversion;
/// Run coordinator
pub mod coordinator;
/// Error types
pub mod error;
/// Phase executors
pub mod executor;
/// Per-dataset record model
pub mod record;
/// Retry logic with exponential backoff
pub mod retry;
/// Row selection per phase
pub mod selection;
/// Control file statistics
pub mod statistics;
/// Control file store
pub mod store;
/// Transfer collaborator
pub mod transfer;
/// Flag, layout and phase types
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use conversion::{
    ConvertMode, ConvertReport, Converter, DsmiginConverter, LayoutDescription,
    UnavailableConverter,
};
pub use coordinator::{Coordinator, RunSummary};
pub use error::{Error, Result, RowError, ToExitCode};
pub use executor::{OutcomeKind, RowOutcome};
pub use record::{Layout, PhaseState, Record};
pub use selection::{SelectionOptions, SkipReason};
pub use statistics::CatalogStats;
pub use store::ControlFile;
pub use transfer::{FetchReport, FtpTransfer, LayoutHints, Transfer, UnavailableTransfer};
pub use types::{ConvertFlag, Phase, PhaseSet, RetrieveFlag};

/// Cancel `token` when a termination signal arrives.
///
/// Spawns a task that waits for SIGTERM or SIGINT (Ctrl+C elsewhere). Rows not yet
/// dispatched are then skipped and calls in flight are interrupted, while the control file
/// is still persisted.
pub fn cancel_on_signal(token: tokio_util::sync::CancellationToken) {
    tokio::spawn(async move {
        tokio::select! {
            signal = wait_for_signal() => {
                tracing::warn!(signal, "cancelling run, completed rows will still be saved");
                token.cancel();
            }
            _ = token.cancelled() => {}
        }
    });
}

/// Resolves with the name of the first termination signal; never resolves if no handler
/// could be installed
#[cfg(unix)]
async fn wait_for_signal() -> &'static str {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration can fail in restricted environments such as containers
    let mut terminate = signal(SignalKind::terminate())
        .inspect_err(|e| tracing::warn!(error = %e, "SIGTERM handler unavailable"))
        .ok();
    let mut interrupt = signal(SignalKind::interrupt())
        .inspect_err(|e| tracing::warn!(error = %e, "SIGINT handler unavailable"))
        .ok();

    match (terminate.as_mut(), interrupt.as_mut()) {
        (Some(term), Some(int)) => tokio::select! {
            _ = term.recv() => "SIGTERM",
            _ = int.recv() => "SIGINT",
        },
        (Some(term), None) => {
            term.recv().await;
            "SIGTERM"
        }
        (None, Some(int)) => {
            int.recv().await;
            "SIGINT"
        }
        (None, None) => wait_for_ctrl_c().await,
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> &'static str {
    wait_for_ctrl_c().await
}

async fn wait_for_ctrl_c() -> &'static str {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "cannot listen for Ctrl+C, run cannot be interrupted");
        std::future::pending::<()>().await;
    }
    "ctrl-c"
}
