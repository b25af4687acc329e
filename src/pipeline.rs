//! Per-video task pipeline
//!
//! Each dequeued identifier walks the state machine
//! `Fetching → WaitingForArtifacts → PublishingMedia → PublishingMetadata →
//! CleaningUp → Done`, dropping into `Failed` from any step. A failed task
//! leaves its local files in place so they can be inspected or re-run.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::fetcher::ArtifactFetcher;
use crate::publisher::ArtifactPublisher;
use crate::retry::retry_with_backoff;
use crate::types::{
    ArtifactKind, Event, LocalArtifact, RemoteKey, TaskOutcome, TaskState, VideoId, VideoMetadata,
};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// An error tagged with the pipeline step it occurred in
struct StageError {
    stage: TaskState,
    error: Error,
}

fn at(stage: TaskState) -> impl FnOnce(Error) -> StageError {
    move |error| StageError { stage, error }
}

/// Runs the full fetch → publish → cleanup chain for one identifier
///
/// Shared read-only by every worker; holds no per-task state.
pub struct VideoPipeline {
    config: Arc<Config>,
    fetcher: Arc<dyn ArtifactFetcher>,
    publisher: Arc<dyn ArtifactPublisher>,
    event_tx: broadcast::Sender<Event>,
    cancel: CancellationToken,
}

impl VideoPipeline {
    /// Assemble a pipeline from its collaborators
    pub fn new(
        config: Arc<Config>,
        fetcher: Arc<dyn ArtifactFetcher>,
        publisher: Arc<dyn ArtifactPublisher>,
        event_tx: broadcast::Sender<Event>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            fetcher,
            publisher,
            event_tx,
            cancel,
        }
    }

    /// Process one identifier to a terminal outcome
    ///
    /// Never panics on task failure and never propagates an error: the result
    /// is reported as [`TaskOutcome::Failed`] with the step it failed in.
    pub async fn process(&self, id: &VideoId) -> TaskOutcome {
        match self.advance(id).await {
            Ok(()) => {
                self.enter(id, TaskState::Done);
                TaskOutcome::Done
            }
            Err(StageError { stage, error }) => {
                self.enter(id, TaskState::Failed);
                TaskOutcome::Failed {
                    stage,
                    error: error.to_string(),
                }
            }
        }
    }

    async fn advance(&self, id: &VideoId) -> std::result::Result<(), StageError> {
        self.enter(id, TaskState::Fetching);
        self.fetch_with_retry(id)
            .await
            .map_err(at(TaskState::Fetching))?;

        let artifact = self.fetcher.artifact(id);

        self.enter(id, TaskState::WaitingForArtifacts);
        self.wait_for_media(id, &artifact.media)
            .await
            .map_err(at(TaskState::WaitingForArtifacts))?;
        // A missing metadata file after a clean fetch is not worth waiting for
        if !path_exists(&artifact.metadata).await {
            return Err(StageError {
                stage: TaskState::WaitingForArtifacts,
                error: Error::ArtifactMissing {
                    path: artifact.metadata.clone(),
                },
            });
        }
        self.log_metadata(id, &artifact.metadata).await;

        let media_key = self.remote_key(id, ArtifactKind::Media);
        let metadata_key = self.remote_key(id, ArtifactKind::Metadata);

        self.enter(id, TaskState::PublishingMedia);
        self.publish_with_retry(id, &artifact.media, &media_key)
            .await
            .map_err(at(TaskState::PublishingMedia))?;

        self.enter(id, TaskState::PublishingMetadata);
        if let Err(error) = self
            .publish_with_retry(id, &artifact.metadata, &metadata_key)
            .await
        {
            // No rollback: the media object stays in the store
            warn!(
                video_id = %id,
                orphaned_key = %media_key,
                "metadata upload failed after media upload succeeded"
            );
            return Err(StageError {
                stage: TaskState::PublishingMetadata,
                error,
            });
        }

        self.enter(id, TaskState::CleaningUp);
        cleanup(id, &artifact).await;
        Ok(())
    }

    async fn fetch_with_retry(&self, id: &VideoId) -> Result<()> {
        self.retrying(id, || self.fetcher.fetch(id, &self.cancel))
            .await
    }

    async fn publish_with_retry(&self, id: &VideoId, path: &Path, key: &RemoteKey) -> Result<()> {
        self.retrying(id, || self.publisher.publish(path, key, &self.cancel))
            .await
    }

    /// Run `operation` under the retry budget, reporting each scheduled retry
    ///
    /// Only errors classified retryable are repeated; an upload rejected by
    /// the store fails on the first attempt.
    async fn retrying<F, Fut>(&self, id: &VideoId, operation: F) -> Result<()>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        retry_with_backoff(
            &self.config.retry,
            &self.cancel,
            |attempt, delay, error: &Error| {
                self.event_tx
                    .send(Event::RetryScheduled {
                        id: id.clone(),
                        attempt,
                        delay_ms: delay.as_millis() as u64,
                        error: error.to_string(),
                    })
                    .ok();
            },
            operation,
        )
        .await
    }

    /// Poll until the media file is visible, up to `max_polls` checks
    async fn wait_for_media(&self, id: &VideoId, media: &Path) -> Result<()> {
        let wait = &self.config.artifact_wait;
        for poll in 1..=wait.max_polls {
            if path_exists(media).await {
                debug!(video_id = %id, poll, "media file visible");
                return Ok(());
            }
            if poll < wait.max_polls {
                tokio::select! {
                    _ = tokio::time::sleep(wait.poll_interval) => {}
                    _ = self.cancel.cancelled() => return Err(Error::Cancelled),
                }
            }
        }
        Err(Error::ArtifactMissing {
            path: media.to_path_buf(),
        })
    }

    async fn log_metadata(&self, id: &VideoId, metadata: &Path) {
        match read_metadata(metadata).await {
            Ok(meta) => info!(
                video_id = %id,
                title = %meta.title,
                upload_date = meta.upload_date.as_deref().unwrap_or("unknown"),
                duration_secs = meta.duration.unwrap_or_default(),
                "fetched video"
            ),
            Err(e) => warn!(video_id = %id, error = %e, "could not parse metadata file"),
        }
    }

    fn remote_key(&self, id: &VideoId, kind: ArtifactKind) -> RemoteKey {
        let storage = &self.config.storage;
        let prefix = match kind {
            ArtifactKind::Media => &storage.media_prefix,
            ArtifactKind::Metadata => &storage.metadata_prefix,
        };
        RemoteKey::new(prefix, id, kind, &self.config.tools.merge_format)
    }

    fn enter(&self, id: &VideoId, state: TaskState) {
        debug!(video_id = %id, %state, "task state changed");
        self.event_tx
            .send(Event::TaskStateChanged {
                id: id.clone(),
                state,
            })
            .ok();
    }
}

async fn path_exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

async fn read_metadata(path: &Path) -> Result<VideoMetadata> {
    let raw = tokio::fs::read(path).await?;
    Ok(serde_json::from_slice(&raw)?)
}

/// Remove both local artifacts; failures are logged and otherwise ignored
async fn cleanup(id: &VideoId, artifact: &LocalArtifact) {
    for path in [&artifact.media, &artifact.metadata] {
        match tokio::fs::remove_file(path).await {
            Ok(()) => debug!(video_id = %id, ?path, "deleted local artifact"),
            Err(e) => warn!(video_id = %id, ?path, error = %e, "failed to delete local artifact"),
        }
    }
}
