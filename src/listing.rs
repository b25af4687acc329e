//! Channel enumeration through the external download tool

use crate::config::ToolsConfig;
use crate::error::{Error, Result};
use crate::tool::{YT_DLP, locate_yt_dlp, run_tool};
use crate::types::VideoId;
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// Enumerates the identifiers of a channel's videos
#[async_trait]
pub trait ChannelLister: Send + Sync {
    /// List up to `limit` identifiers for the channel at `channel_url`
    ///
    /// Implementations may return more than `limit`; the producer enforces the cap.
    async fn list(
        &self,
        channel_url: &str,
        limit: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<VideoId>>;
}

/// [`ChannelLister`] backed by `yt-dlp --flat-playlist --get-id`
#[derive(Debug, Clone)]
pub struct YtDlpLister {
    binary_path: PathBuf,
}

impl YtDlpLister {
    /// Create a lister with an explicit binary path
    pub fn new(binary_path: PathBuf) -> Self {
        Self { binary_path }
    }

    /// Create a lister, locating yt-dlp from the config or PATH
    pub fn from_config(tools: &ToolsConfig) -> Result<Self> {
        Ok(Self::new(locate_yt_dlp(tools)?))
    }
}

#[async_trait]
impl ChannelLister for YtDlpLister {
    async fn list(
        &self,
        channel_url: &str,
        limit: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<VideoId>> {
        let mut command = Command::new(&self.binary_path);
        command
            .arg("--flat-playlist")
            .arg("--get-id")
            .arg("--ignore-errors")
            .arg("--playlist-end")
            .arg(limit.to_string())
            .arg(channel_url);

        let output = run_tool(command, YT_DLP, "listing", None, cancel)
            .await
            .map_err(|e| match e {
                Error::Cancelled => Error::Cancelled,
                other => Error::Listing(other.to_string()),
            })?;

        Ok(parse_listing(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Parse newline-delimited identifiers, skipping blank lines
pub fn parse_listing(stdout: &str) -> Vec<VideoId> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(VideoId::from)
        .collect()
}
