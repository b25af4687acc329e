//! Core types and events

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Opaque identifier of one video within the source channel
///
/// Identifiers are not required to be unique within a run; duplicates are
/// processed as independent tasks.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VideoId(String);

impl VideoId {
    /// Wrap a raw identifier token
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw identifier token
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VideoId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for VideoId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// The two artifacts produced for every video
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Merged audio+video container
    Media,
    /// The tool's info JSON
    Metadata,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactKind::Media => f.write_str("media"),
            ArtifactKind::Metadata => f.write_str("metadata"),
        }
    }
}

/// Suffix the download tool appends to the metadata file
pub const METADATA_SUFFIX: &str = "info.json";

/// Local paths of one video's artifacts
///
/// Both paths are derived from the identifier alone, so concurrent tasks for
/// different identifiers never touch the same file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalArtifact {
    /// Merged media file, e.g. `<work_dir>/<id>.mp4`
    pub media: PathBuf,
    /// Metadata file, e.g. `<work_dir>/<id>.info.json`
    pub metadata: PathBuf,
}

impl LocalArtifact {
    /// Expected artifact locations for `id` under `work_dir`
    pub fn for_video(work_dir: &Path, id: &VideoId, media_format: &str) -> Self {
        Self {
            media: work_dir.join(format!("{}.{}", id.as_str(), media_format)),
            metadata: work_dir.join(format!("{}.{}", id.as_str(), METADATA_SUFFIX)),
        }
    }

    /// Path of the artifact of the given kind
    pub fn path(&self, kind: ArtifactKind) -> &Path {
        match kind {
            ArtifactKind::Media => &self.media,
            ArtifactKind::Metadata => &self.metadata,
        }
    }
}

/// Object store key for one artifact
///
/// Media and metadata live under distinct prefixes, and the file name embeds
/// the identifier, so keys are unique per (identifier, kind).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RemoteKey(String);

impl RemoteKey {
    /// Build the key `<prefix>/<id>.<ext>` for an artifact
    pub fn new(prefix: &str, id: &VideoId, kind: ArtifactKind, media_format: &str) -> Self {
        let ext = match kind {
            ArtifactKind::Media => media_format,
            ArtifactKind::Metadata => METADATA_SUFFIX,
        };
        let prefix = prefix.trim_matches('/');
        if prefix.is_empty() {
            Self(format!("{}.{}", id.as_str(), ext))
        } else {
            Self(format!("{}/{}.{}", prefix, id.as_str(), ext))
        }
    }

    /// Key as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RemoteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Step of the per-video pipeline
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Running the download tool (with retries)
    Fetching,
    /// Polling for the media file to become visible
    WaitingForArtifacts,
    /// Uploading the media file
    PublishingMedia,
    /// Uploading the metadata file
    PublishingMetadata,
    /// Removing local artifacts
    CleaningUp,
    /// Both artifacts published and local copies removed
    Done,
    /// The task was abandoned
    Failed,
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskState::Fetching => "fetching",
            TaskState::WaitingForArtifacts => "waiting_for_artifacts",
            TaskState::PublishingMedia => "publishing_media",
            TaskState::PublishingMetadata => "publishing_metadata",
            TaskState::CleaningUp => "cleaning_up",
            TaskState::Done => "done",
            TaskState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Terminal result of one task
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Published and cleaned up
    Done,
    /// Abandoned at `stage`
    Failed {
        /// State the task was in when it failed
        stage: TaskState,
        /// Error description
        error: String,
    },
}

impl TaskOutcome {
    /// Whether the task reached `Done`
    pub fn is_done(&self) -> bool {
        matches!(self, TaskOutcome::Done)
    }
}

/// Aggregate counts for one run
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    /// Identifiers the producer put on the queue
    pub enqueued: usize,
    /// Tasks that reached `Done`
    pub done: usize,
    /// Tasks that reached `Failed`
    pub failed: usize,
}

impl RunReport {
    /// Tasks that reached a terminal state
    pub fn completed(&self) -> usize {
        self.done + self.failed
    }
}

/// Subset of the tool's info JSON that is logged after a fetch
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
    /// Video identifier as reported by the tool
    #[serde(default)]
    pub id: String,
    /// Video title
    #[serde(default)]
    pub title: String,
    /// Upload date in `YYYYMMDD` form
    #[serde(default)]
    pub upload_date: Option<String>,
    /// Duration in seconds
    #[serde(default)]
    pub duration: Option<f64>,
    /// Selected format description
    #[serde(default)]
    pub format: Option<String>,
}

/// Lifecycle events broadcast to subscribers
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// The producer put an identifier on the queue
    Enqueued {
        /// Identifier enqueued
        id: VideoId,
    },
    /// The producer closed the queue
    ProducerFinished {
        /// Number of identifiers enqueued
        enqueued: usize,
    },
    /// A worker dequeued an identifier
    TaskStarted {
        /// Worker index
        worker_id: usize,
        /// Identifier being processed
        id: VideoId,
    },
    /// A task moved to a new pipeline step
    TaskStateChanged {
        /// Identifier being processed
        id: VideoId,
        /// New state
        state: TaskState,
    },
    /// A fetch or publish attempt failed and will be retried after `delay_ms`
    RetryScheduled {
        /// Identifier being processed
        id: VideoId,
        /// 1-based number of the attempt that failed
        attempt: u32,
        /// Backoff before the next attempt
        delay_ms: u64,
        /// Error from the failed attempt
        error: String,
    },
    /// A task reached `Done`
    TaskCompleted {
        /// Worker index
        worker_id: usize,
        /// Identifier processed
        id: VideoId,
    },
    /// A task reached `Failed`
    TaskFailed {
        /// Worker index
        worker_id: usize,
        /// Identifier processed
        id: VideoId,
        /// State the task failed in
        stage: TaskState,
        /// Error description
        error: String,
    },
    /// A worker observed the closed, drained queue and exited
    WorkerExited {
        /// Worker index
        worker_id: usize,
    },
    /// Every worker exited and the producer finished
    RunFinished {
        /// Aggregate counts
        report: RunReport,
    },
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_artifact_paths_are_keyed_by_identifier() {
        let artifact = LocalArtifact::for_video(Path::new("/work"), &"dQw4w9WgXcQ".into(), "mp4");
        assert_eq!(artifact.media, PathBuf::from("/work/dQw4w9WgXcQ.mp4"));
        assert_eq!(
            artifact.metadata,
            PathBuf::from("/work/dQw4w9WgXcQ.info.json")
        );
        assert_eq!(artifact.path(ArtifactKind::Media), artifact.media.as_path());
    }

    #[test]
    fn remote_keys_use_distinct_prefixes_per_kind() {
        let id = VideoId::new("abc123");
        let media = RemoteKey::new("mp4", &id, ArtifactKind::Media, "mp4");
        let meta = RemoteKey::new("json/", &id, ArtifactKind::Metadata, "mp4");
        assert_eq!(media.as_str(), "mp4/abc123.mp4");
        assert_eq!(meta.as_str(), "json/abc123.info.json");
        assert_ne!(media, meta);
    }

    #[test]
    fn remote_keys_differ_across_identifiers() {
        let a = RemoteKey::new("mp4", &"a".into(), ArtifactKind::Media, "mp4");
        let b = RemoteKey::new("mp4", &"b".into(), ArtifactKind::Media, "mp4");
        assert_ne!(a, b);
    }

    #[test]
    fn remote_key_without_prefix_is_bare_filename() {
        let key = RemoteKey::new("", &"x".into(), ArtifactKind::Metadata, "mp4");
        assert_eq!(key.as_str(), "x.info.json");
    }

    #[test]
    fn video_metadata_tolerates_missing_fields() {
        let meta: VideoMetadata =
            serde_json::from_str(r#"{"id":"abc","title":"Stream","extra":1}"#).unwrap();
        assert_eq!(meta.id, "abc");
        assert_eq!(meta.title, "Stream");
        assert!(meta.duration.is_none());
    }

    #[test]
    fn event_serializes_with_type_tag() {
        let event = Event::TaskStarted {
            worker_id: 3,
            id: "abc".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "task_started");
        assert_eq!(json["id"], "abc");
    }

    #[test]
    fn run_report_completed_sums_outcomes() {
        let report = RunReport {
            enqueued: 5,
            done: 3,
            failed: 2,
        };
        assert_eq!(report.completed(), 5);
    }
}
