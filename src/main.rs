//! `channel-ingest` binary: archive one channel per invocation
//!
//! Configuration comes from `INGEST_*` environment variables (and `.env`).
//! Log verbosity follows `RUST_LOG` (default `info`).

use channel_ingest::{ChannelIngest, Config, run_until_signal};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let ingest = match Config::from_env() {
        Ok(config) => match ChannelIngest::from_config(config).await {
            Ok(ingest) => ingest,
            Err(e) => {
                tracing::error!(error = %e, code = e.code(), "startup failed");
                return ExitCode::FAILURE;
            }
        },
        Err(e) => {
            tracing::error!(error = %e, code = e.code(), "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let report = run_until_signal(&ingest).await;
    tracing::info!(
        channel = %ingest.config().channel.channel,
        enqueued = report.enqueued,
        done = report.done,
        failed = report.failed,
        "ingest complete"
    );

    // Per-video failures are reported above, not through the exit status
    ExitCode::SUCCESS
}
