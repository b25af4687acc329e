//! # channel-ingest
//!
//! Archives the videos of one channel into an object store.
//!
//! A run lists the channel's video identifiers, feeds them through a bounded
//! queue to a fixed pool of workers, and for each identifier:
//!
//! 1. fetches the merged media file and its info JSON with yt-dlp (retrying
//!    transient failures with exponential backoff),
//! 2. waits for both artifacts to be visible locally,
//! 3. uploads the media file, then the metadata file,
//! 4. deletes the local copies.
//!
//! A failure in one video never affects the others; it is counted in the
//! [`RunReport`] and its local files are left in place.
//!
//! ## Quick Start
//!
//! ```no_run
//! use channel_ingest::{ChannelIngest, Config, run_until_signal};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let ingest = ChannelIngest::from_config(config).await?;
//!
//!     // Subscribe to events
//!     let mut events = ingest.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let report = run_until_signal(&ingest).await;
//!     println!("{} published, {} failed", report.done, report.failed);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Artifact fetching through yt-dlp
pub mod fetcher;
/// Top-level run orchestration
pub mod ingest;
/// Channel enumeration
pub mod listing;
/// Per-video task state machine
pub mod pipeline;
/// Worker pool
pub mod pool;
/// Channel producer
pub mod producer;
/// Object store publishing
pub mod publisher;
/// Retry logic with exponential backoff
pub mod retry;
/// External tool invocation
pub mod tool;
/// Core types and events
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, Result};
pub use fetcher::{ArtifactFetcher, YtDlpFetcher};
pub use ingest::ChannelIngest;
pub use listing::{ChannelLister, YtDlpLister};
pub use publisher::{ArtifactPublisher, ObjectStorePublisher};
pub use types::{Event, RunReport, TaskOutcome, TaskState, VideoId};

use tokio_util::sync::CancellationToken;

/// Helper function to perform one run with graceful signal handling.
///
/// A termination signal cancels the run: the producer stops enqueueing,
/// in-flight tasks are interrupted and idle workers exit. The report of
/// the (possibly partial) run is returned either way.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
pub async fn run_until_signal(ingest: &ChannelIngest) -> RunReport {
    let cancel = CancellationToken::new();
    let run = ingest.run(cancel.clone());
    tokio::pin!(run);

    tokio::select! {
        report = &mut run => report,
        _ = wait_for_signal() => {
            tracing::info!("Shutdown requested, cancelling run");
            cancel.cancel();
            run.await
        }
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Received SIGINT signal (Ctrl+C)");
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
            std::future::pending::<()>().await;
        }
    }
}
