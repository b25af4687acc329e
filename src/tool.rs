//! External tool discovery and invocation shared by the fetcher and the lister

use crate::config::ToolsConfig;
use crate::error::{Error, Result};
use std::path::PathBuf;
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// Executable name searched for in PATH
pub const YT_DLP: &str = "yt-dlp";

/// Number of trailing stderr bytes kept in error messages
const STDERR_TAIL_BYTES: usize = 2048;

/// Resolve the yt-dlp binary from an explicit path or PATH
pub fn locate_yt_dlp(tools: &ToolsConfig) -> Result<PathBuf> {
    if let Some(path) = &tools.yt_dlp_path {
        return Ok(path.clone());
    }
    if !tools.search_path {
        return Err(Error::config(
            "yt_dlp_path is not set and PATH search is disabled",
            "yt_dlp_path",
        ));
    }
    which::which(YT_DLP)
        .map_err(|e| Error::config(format!("{YT_DLP} not found in PATH: {e}"), "yt_dlp_path"))
}

/// Run a prepared command to completion, honoring a deadline and a cancel token
///
/// The child is killed if the deadline passes or the token fires. A non-zero
/// exit becomes [`Error::ToolInvocation`] carrying the tail of stderr.
pub(crate) async fn run_tool(
    mut command: Command,
    tool: &str,
    operation: &'static str,
    deadline: Option<Duration>,
    cancel: &CancellationToken,
) -> Result<Output> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let run = command.output();
    let output = tokio::select! {
        result = async {
            let output = match deadline {
                Some(after) => tokio::time::timeout(after, run)
                    .await
                    .map_err(|_| Error::Timeout { operation, after })?,
                None => run.await,
            };
            output.map_err(|e| Error::ToolInvocation {
                tool: tool.to_string(),
                message: format!("failed to execute: {e}"),
            })
        } => result?,
        _ = cancel.cancelled() => return Err(Error::Cancelled),
    };

    if !output.status.success() {
        return Err(Error::ToolInvocation {
            tool: tool.to_string(),
            message: format!("{}: {}", output.status, stderr_tail(&output.stderr)),
        });
    }

    Ok(output)
}

/// Last [`STDERR_TAIL_BYTES`] of diagnostic output, trimmed and lossily decoded
fn stderr_tail(stderr: &[u8]) -> String {
    let start = stderr.len().saturating_sub(STDERR_TAIL_BYTES);
    String::from_utf8_lossy(&stderr[start..]).trim().to_string()
}
