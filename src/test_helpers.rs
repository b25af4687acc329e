//! Shared test doubles for the pipeline, pool, producer and runner tests.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use crate::config::Config;
use crate::error::{Error, Result};
use crate::fetcher::ArtifactFetcher;
use crate::listing::ChannelLister;
use crate::publisher::{ArtifactPublisher, upload_within};
use crate::types::{LocalArtifact, RemoteKey, VideoId};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Config tuned for tests: tiny backoff and polling, small pool.
pub(crate) fn test_config(work_dir: &Path) -> Config {
    let mut config = Config::default();
    config.channel.channel = "testchannel".to_string();
    config.storage.bucket = "test-bucket".to_string();
    config.tools.work_dir = work_dir.to_path_buf();
    config.pool.pool_size = 3;
    config.pool.queue_capacity = 4;
    config.retry.max_attempts = NonZeroU32::new(5).unwrap();
    config.retry.base_delay = Duration::from_millis(1);
    config.retry.max_delay = Duration::from_millis(20);
    config.artifact_wait.poll_interval = Duration::from_millis(5);
    config.artifact_wait.max_polls = 3;
    config
}

/// How the scripted fetcher behaves for one identifier.
#[derive(Clone, Debug)]
pub(crate) struct FetchPlan {
    /// Attempts that fail before one succeeds (u32::MAX = always fail)
    pub failures: u32,
    /// Write the media file on success
    pub write_media: bool,
    /// Write the metadata file on success
    pub write_metadata: bool,
    /// Write metadata that is not valid JSON
    pub corrupt_metadata: bool,
}

impl Default for FetchPlan {
    fn default() -> Self {
        Self {
            failures: 0,
            write_media: true,
            write_metadata: true,
            corrupt_metadata: false,
        }
    }
}

/// Fetcher that writes artifacts into a work dir according to per-id plans.
pub(crate) struct ScriptedFetcher {
    work_dir: PathBuf,
    plans: HashMap<String, FetchPlan>,
    calls: Mutex<HashMap<String, u32>>,
    delay: Duration,
}

impl ScriptedFetcher {
    pub(crate) fn new(work_dir: &Path) -> Self {
        Self {
            work_dir: work_dir.to_path_buf(),
            plans: HashMap::new(),
            calls: Mutex::new(HashMap::new()),
            delay: Duration::ZERO,
        }
    }

    pub(crate) fn with_plan(mut self, id: &str, plan: FetchPlan) -> Self {
        self.plans.insert(id.to_string(), plan);
        self
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn calls(&self, id: &str) -> u32 {
        self.calls.lock().unwrap().get(id).copied().unwrap_or(0)
    }

    pub(crate) fn total_calls(&self) -> u32 {
        self.calls.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl ArtifactFetcher for ScriptedFetcher {
    fn artifact(&self, id: &VideoId) -> LocalArtifact {
        LocalArtifact::for_video(&self.work_dir, id, "mp4")
    }

    async fn fetch(&self, id: &VideoId, cancel: &CancellationToken) -> Result<()> {
        let attempt = {
            let mut calls = self.calls.lock().unwrap();
            let count = calls.entry(id.as_str().to_string()).or_insert(0);
            *count += 1;
            *count
        };
        if !self.delay.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(self.delay) => {}
                _ = cancel.cancelled() => return Err(Error::Cancelled),
            }
        }

        let plan = self.plans.get(id.as_str()).cloned().unwrap_or_default();
        if attempt <= plan.failures {
            return Err(Error::ToolInvocation {
                tool: "fake-yt-dlp".to_string(),
                message: format!("exit status: 1: attempt {attempt} failed"),
            });
        }

        let artifact = self.artifact(id);
        tokio::fs::create_dir_all(&self.work_dir).await?;
        if plan.write_media {
            tokio::fs::write(&artifact.media, format!("media:{id}")).await?;
        }
        if plan.write_metadata {
            let json = if plan.corrupt_metadata {
                "{ not json".to_string()
            } else {
                format!(r#"{{"id":"{id}","title":"Video {id}","duration":12.5}}"#)
            };
            tokio::fs::write(&artifact.metadata, json).await?;
        }
        Ok(())
    }
}

/// Publisher that records uploads in memory and fails configured keys.
#[derive(Default)]
pub(crate) struct RecordingPublisher {
    uploads: Mutex<Vec<(String, Vec<u8>)>>,
    fail_keys: HashSet<String>,
    stall_deadline: Option<Duration>,
    attempts: AtomicUsize,
}

impl RecordingPublisher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn failing_on(mut self, key: &str) -> Self {
        self.fail_keys.insert(key.to_string());
        self
    }

    /// Every upload hangs until the given deadline expires
    pub(crate) fn stalling(mut self, deadline: Duration) -> Self {
        self.stall_deadline = Some(deadline);
        self
    }

    pub(crate) fn keys(&self) -> Vec<String> {
        self.uploads
            .lock()
            .unwrap()
            .iter()
            .map(|(k, _)| k.clone())
            .collect()
    }

    pub(crate) fn bytes(&self, key: &str) -> Option<Vec<u8>> {
        self.uploads
            .lock()
            .unwrap()
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, b)| b.clone())
    }

    pub(crate) fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ArtifactPublisher for RecordingPublisher {
    async fn publish(
        &self,
        path: &Path,
        key: &RemoteKey,
        _cancel: &CancellationToken,
    ) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(deadline) = self.stall_deadline {
            return upload_within(key, Some(deadline), async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            })
            .await;
        }
        if self.fail_keys.contains(key.as_str()) {
            return Err(Error::Upload {
                key: key.to_string(),
                message: "simulated store rejection".to_string(),
            });
        }
        let data = tokio::fs::read(path).await?;
        self.uploads
            .lock()
            .unwrap()
            .push((key.as_str().to_string(), data));
        Ok(())
    }
}

/// Lister returning a fixed set of identifiers, or an error.
pub(crate) struct StaticLister {
    result: std::result::Result<Vec<String>, String>,
    delay: Duration,
    pub(crate) requested_limit: Mutex<Option<usize>>,
}

impl StaticLister {
    pub(crate) fn with_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            result: Ok(ids.into_iter().map(Into::into).collect()),
            delay: Duration::ZERO,
            requested_limit: Mutex::new(None),
        }
    }

    pub(crate) fn failing(message: &str) -> Self {
        Self {
            result: Err(message.to_string()),
            delay: Duration::ZERO,
            requested_limit: Mutex::new(None),
        }
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl ChannelLister for StaticLister {
    async fn list(
        &self,
        _channel_url: &str,
        limit: usize,
        _cancel: &CancellationToken,
    ) -> Result<Vec<VideoId>> {
        *self.requested_limit.lock().unwrap() = Some(limit);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match &self.result {
            Ok(ids) => Ok(ids.iter().map(|id| VideoId::from(id.as_str())).collect()),
            Err(message) => Err(Error::Listing(message.clone())),
        }
    }
}
