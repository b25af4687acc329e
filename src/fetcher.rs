//! Artifact fetching through the external download tool

use crate::config::ToolsConfig;
use crate::error::{Error, Result};
use crate::tool::{YT_DLP, locate_yt_dlp, run_tool};
use crate::types::{LocalArtifact, VideoId};
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// Downloads one video's media and metadata to local storage
///
/// A fetch makes exactly one attempt; retrying is composed on top by the
/// pipeline. Every tool failure is reported as a single opaque
/// [`Error::ToolInvocation`].
#[async_trait]
pub trait ArtifactFetcher: Send + Sync {
    /// Local paths where `fetch` places the artifacts for `id`
    fn artifact(&self, id: &VideoId) -> LocalArtifact;

    /// Run one download attempt for `id`
    async fn fetch(&self, id: &VideoId, cancel: &CancellationToken) -> Result<()>;
}

/// [`ArtifactFetcher`] that shells out to yt-dlp
///
/// Invocation: `yt-dlp -f bestvideo+bestaudio --merge-output-format <fmt>
/// --write-info-json --output <work_dir>/<id>.%(ext)s <url>`.
#[derive(Debug, Clone)]
pub struct YtDlpFetcher {
    binary_path: PathBuf,
    work_dir: PathBuf,
    merge_format: String,
    video_base_url: String,
    timeout: Option<Duration>,
}

impl YtDlpFetcher {
    /// Create a fetcher with an explicit binary path
    pub fn new(binary_path: PathBuf, tools: &ToolsConfig) -> Self {
        Self {
            binary_path,
            work_dir: tools.work_dir.clone(),
            merge_format: tools.merge_format.clone(),
            video_base_url: tools.video_base_url.clone(),
            timeout: tools.fetch_timeout,
        }
    }

    /// Create a fetcher, locating yt-dlp from the config or PATH
    pub fn from_config(tools: &ToolsConfig) -> Result<Self> {
        Ok(Self::new(locate_yt_dlp(tools)?, tools))
    }

    /// Watch URL for `id`, with the identifier query-escaped
    pub fn video_url(&self, id: &VideoId) -> Result<url::Url> {
        url::Url::parse_with_params(&self.video_base_url, &[("v", id.as_str())]).map_err(|e| {
            Error::config(
                format!("invalid video base URL {:?}: {e}", self.video_base_url),
                "video_base_url",
            )
        })
    }

    fn args(&self, id: &VideoId) -> Result<Vec<OsString>> {
        let mut template = self.work_dir.clone().into_os_string();
        template.push(std::path::MAIN_SEPARATOR_STR);
        template.push(id.as_str());
        template.push(".%(ext)s");

        Ok(vec![
            "-f".into(),
            "bestvideo+bestaudio".into(),
            "--merge-output-format".into(),
            self.merge_format.clone().into(),
            "--write-info-json".into(),
            "--no-progress".into(),
            "--output".into(),
            template,
            self.video_url(id)?.as_str().into(),
        ])
    }
}

#[async_trait]
impl ArtifactFetcher for YtDlpFetcher {
    fn artifact(&self, id: &VideoId) -> LocalArtifact {
        LocalArtifact::for_video(&self.work_dir, id, &self.merge_format)
    }

    async fn fetch(&self, id: &VideoId, cancel: &CancellationToken) -> Result<()> {
        tokio::fs::create_dir_all(&self.work_dir).await?;

        let mut command = Command::new(&self.binary_path);
        command.args(self.args(id)?);

        tracing::debug!(video_id = %id, binary = ?self.binary_path, "starting download");
        let output = run_tool(command, YT_DLP, "fetch", self.timeout, cancel).await?;
        tracing::debug!(
            video_id = %id,
            stdout_bytes = output.stdout.len(),
            "download tool exited successfully"
        );
        Ok(())
    }
}
