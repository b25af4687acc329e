//! In-process stand-ins for yt-dlp and the channel listing

use async_trait::async_trait;
use channel_ingest::types::LocalArtifact;
use channel_ingest::{ArtifactFetcher, ChannelLister, Config, Error, Result, VideoId};
use std::collections::HashSet;
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Config with a tiny retry/poll schedule rooted at `work_dir`
pub fn fast_config(work_dir: &Path, pool_size: usize) -> Config {
    let mut config = Config::default();
    config.channel.channel = "integration".to_string();
    config.storage.bucket = "archive".to_string();
    config.tools.work_dir = work_dir.to_path_buf();
    config.pool.pool_size = pool_size;
    config.pool.queue_capacity = 2;
    config.retry.max_attempts = NonZeroU32::new(2).unwrap();
    config.retry.base_delay = Duration::from_millis(1);
    config.retry.max_delay = Duration::from_millis(5);
    config.artifact_wait.poll_interval = Duration::from_millis(2);
    config.artifact_wait.max_polls = 2;
    config
}

/// Fetcher that writes both artifacts after a short delay
///
/// Tracks how many fetches run at once so tests can check the pool bound.
pub struct FakeFetcher {
    work_dir: PathBuf,
    delay: Duration,
    broken: HashSet<String>,
    active: AtomicUsize,
    max_active: AtomicUsize,
    calls: AtomicUsize,
}

impl FakeFetcher {
    pub fn new(work_dir: &Path) -> Self {
        Self {
            work_dir: work_dir.to_path_buf(),
            delay: Duration::from_millis(10),
            broken: HashSet::new(),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    /// Every fetch of `id` exits non-zero
    pub fn broken(mut self, id: &str) -> Self {
        self.broken.insert(id.to_string());
        self
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ArtifactFetcher for FakeFetcher {
    fn artifact(&self, id: &VideoId) -> LocalArtifact {
        LocalArtifact::for_video(&self.work_dir, id, "mp4")
    }

    async fn fetch(&self, id: &VideoId, _cancel: &CancellationToken) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(self.delay).await;
        let result = if self.broken.contains(id.as_str()) {
            Err(Error::ToolInvocation {
                tool: "yt-dlp".to_string(),
                message: "exit status: 1: ERROR: Video unavailable".to_string(),
            })
        } else {
            let artifact = self.artifact(id);
            tokio::fs::write(&artifact.media, format!("media:{id}")).await?;
            tokio::fs::write(
                &artifact.metadata,
                format!(r#"{{"id":"{id}","title":"Integration {id}"}}"#),
            )
            .await?;
            Ok(())
        };

        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Lister returning a fixed identifier list, or failing
pub struct FakeLister {
    ids: Option<Vec<VideoId>>,
}

impl FakeLister {
    pub fn ids(ids: impl IntoIterator<Item = String>) -> Self {
        Self {
            ids: Some(ids.into_iter().map(VideoId::from).collect()),
        }
    }

    pub fn numbered(count: usize) -> Self {
        Self::ids((0..count).map(|i| format!("vid{i:03}")))
    }

    pub fn failing() -> Self {
        Self { ids: None }
    }
}

#[async_trait]
impl ChannelLister for FakeLister {
    async fn list(
        &self,
        _channel_url: &str,
        _limit: usize,
        _cancel: &CancellationToken,
    ) -> Result<Vec<VideoId>> {
        self.ids
            .clone()
            .ok_or_else(|| Error::Listing("ERROR: channel does not exist".to_string()))
    }
}
