//! Configuration types for channel-ingest
//!
//! A [`Config`] is built once before the run starts (from a file, from the
//! environment, or in code) and then shared read-only as `Arc<Config>` by the
//! producer and every worker.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Source channel and enumeration limits
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Channel handle to archive (without the leading `@`)
    #[serde(default)]
    pub channel: String,

    /// Maximum number of identifiers enqueued per run (default: 100)
    #[serde(default = "default_max_videos")]
    pub max_videos: usize,

    /// Wall-clock budget for the channel listing call (default: 60 seconds)
    #[serde(default = "default_listing_timeout", with = "duration_serde")]
    pub listing_timeout: Duration,

    /// Listing URL template; `{channel}` is replaced by the channel handle
    #[serde(default = "default_channel_url_template")]
    pub channel_url_template: String,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            channel: String::new(),
            max_videos: default_max_videos(),
            listing_timeout: default_listing_timeout(),
            channel_url_template: default_channel_url_template(),
        }
    }
}

impl ChannelConfig {
    /// URL handed to the listing tool for this channel
    pub fn channel_url(&self) -> String {
        self.channel_url_template.replace("{channel}", &self.channel)
    }
}

/// Worker pool sizing
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Number of concurrent workers (default: 10)
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// Capacity of the identifier queue between producer and workers (default: 100)
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            pool_size: default_pool_size(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

/// External download tool settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Path to the yt-dlp executable (auto-detected if None)
    #[serde(default)]
    pub yt_dlp_path: Option<PathBuf>,

    /// Whether to search PATH for yt-dlp if no explicit path is set (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,

    /// Local working directory for artifacts (default: "./work")
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    /// Container format the tool merges streams into (default: "mp4")
    #[serde(default = "default_merge_format")]
    pub merge_format: String,

    /// Base watch URL; the identifier is appended as the `v` query parameter
    #[serde(default = "default_video_base_url")]
    pub video_base_url: String,

    /// Deadline for a single fetch attempt (None = unbounded)
    #[serde(default, with = "optional_duration_serde")]
    pub fetch_timeout: Option<Duration>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            yt_dlp_path: None,
            search_path: true,
            work_dir: default_work_dir(),
            merge_format: default_merge_format(),
            video_base_url: default_video_base_url(),
            fetch_timeout: None,
        }
    }
}

/// Destination object store settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Destination bucket
    #[serde(default)]
    pub bucket: String,

    /// Region override (falls back to the AWS environment when None)
    #[serde(default)]
    pub region: Option<String>,

    /// Custom endpoint for S3-compatible providers (e.g., "http://localhost:9000")
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Key prefix for media objects (default: "mp4")
    #[serde(default = "default_media_prefix")]
    pub media_prefix: String,

    /// Key prefix for metadata objects (default: "json")
    #[serde(default = "default_metadata_prefix")]
    pub metadata_prefix: String,

    /// Deadline for a single upload (None = unbounded)
    #[serde(default, with = "optional_duration_serde")]
    pub upload_timeout: Option<Duration>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            region: None,
            endpoint: None,
            media_prefix: default_media_prefix(),
            metadata_prefix: default_metadata_prefix(),
            upload_timeout: None,
        }
    }
}

/// Retry behavior for the fetch and publish steps
///
/// The delay after failed attempt `i` (0-indexed) is `base_delay * 2^i`,
/// capped at `max_delay`. There is no jitter.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total number of attempts, including the first (default: 5)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: NonZeroU32,

    /// Base unit of the exponential backoff (default: 1 second)
    #[serde(default = "default_base_delay", with = "duration_serde")]
    pub base_delay: Duration,

    /// Upper bound for a single backoff delay (default: 300 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay: default_base_delay(),
            max_delay: default_max_delay(),
        }
    }
}

/// Polling for artifacts that become visible after the tool exits
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ArtifactWaitConfig {
    /// Interval between existence checks (default: 1 second)
    #[serde(default = "default_poll_interval", with = "duration_serde")]
    pub poll_interval: Duration,

    /// Number of existence checks before giving up (default: 10)
    #[serde(default = "default_max_polls")]
    pub max_polls: u32,
}

impl Default for ArtifactWaitConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            max_polls: default_max_polls(),
        }
    }
}

/// Main configuration for a channel ingest run
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Source channel and enumeration limits
    #[serde(default)]
    pub channel: ChannelConfig,

    /// Worker pool sizing
    #[serde(default)]
    pub pool: PoolConfig,

    /// External download tool settings
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Destination object store
    #[serde(default)]
    pub storage: StorageConfig,

    /// Fetch and publish retry behavior
    #[serde(default)]
    pub retry: RetryConfig,

    /// Artifact visibility polling
    #[serde(default)]
    pub artifact_wait: ArtifactWaitConfig,
}

impl Config {
    /// Load configuration from the process environment (and `.env` if present)
    ///
    /// Required: `INGEST_CHANNEL`, `INGEST_BUCKET`. See [`Config::from_lookup`]
    /// for the optional keys.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    ///
    /// Unset keys keep their defaults; set keys that fail to parse are errors.
    ///
    /// Optional keys: `INGEST_MAX_VIDEOS`, `INGEST_LISTING_TIMEOUT_SECS`,
    /// `INGEST_POOL_SIZE`, `INGEST_QUEUE_CAPACITY`, `INGEST_YT_DLP_PATH`,
    /// `INGEST_WORK_DIR`, `INGEST_FETCH_TIMEOUT_SECS`, `INGEST_S3_REGION`,
    /// `INGEST_S3_ENDPOINT`, `INGEST_MEDIA_PREFIX`, `INGEST_METADATA_PREFIX`,
    /// `INGEST_UPLOAD_TIMEOUT_SECS`, `INGEST_RETRY_ATTEMPTS`,
    /// `INGEST_RETRY_BASE_DELAY_SECS`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();

        config.channel.channel = lookup("INGEST_CHANNEL")
            .ok_or_else(|| Error::config("channel is not set", "INGEST_CHANNEL"))?;
        config.storage.bucket = lookup("INGEST_BUCKET")
            .ok_or_else(|| Error::config("bucket is not set", "INGEST_BUCKET"))?;

        if let Some(v) = parse_var(&lookup, "INGEST_MAX_VIDEOS")? {
            config.channel.max_videos = v;
        }
        if let Some(secs) = parse_var(&lookup, "INGEST_LISTING_TIMEOUT_SECS")? {
            config.channel.listing_timeout = Duration::from_secs(secs);
        }
        if let Some(v) = parse_var(&lookup, "INGEST_POOL_SIZE")? {
            config.pool.pool_size = v;
        }
        if let Some(v) = parse_var(&lookup, "INGEST_QUEUE_CAPACITY")? {
            config.pool.queue_capacity = v;
        }
        if let Some(path) = lookup("INGEST_YT_DLP_PATH") {
            config.tools.yt_dlp_path = Some(PathBuf::from(path));
        }
        if let Some(dir) = lookup("INGEST_WORK_DIR") {
            config.tools.work_dir = PathBuf::from(dir);
        }
        if let Some(secs) = parse_var(&lookup, "INGEST_FETCH_TIMEOUT_SECS")? {
            config.tools.fetch_timeout = Some(Duration::from_secs(secs));
        }
        config.storage.region = lookup("INGEST_S3_REGION");
        config.storage.endpoint = lookup("INGEST_S3_ENDPOINT");
        if let Some(prefix) = lookup("INGEST_MEDIA_PREFIX") {
            config.storage.media_prefix = prefix;
        }
        if let Some(prefix) = lookup("INGEST_METADATA_PREFIX") {
            config.storage.metadata_prefix = prefix;
        }
        if let Some(secs) = parse_var(&lookup, "INGEST_UPLOAD_TIMEOUT_SECS")? {
            config.storage.upload_timeout = Some(Duration::from_secs(secs));
        }
        if let Some(v) = parse_var(&lookup, "INGEST_RETRY_ATTEMPTS")? {
            config.retry.max_attempts = v;
        }
        if let Some(secs) = parse_var(&lookup, "INGEST_RETRY_BASE_DELAY_SECS")? {
            config.retry.base_delay = Duration::from_secs(secs);
        }

        config.validate()?;
        Ok(config)
    }

    /// Check cross-field invariants that serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.channel.channel.trim().is_empty() {
            return Err(Error::config("channel must not be empty", "channel"));
        }
        if self.channel.max_videos == 0 {
            return Err(Error::config("max_videos must be at least 1", "max_videos"));
        }
        if self.storage.bucket.trim().is_empty() {
            return Err(Error::config("bucket must not be empty", "bucket"));
        }
        if self.pool.pool_size == 0 {
            return Err(Error::config("pool_size must be at least 1", "pool_size"));
        }
        if self.pool.queue_capacity == 0 {
            return Err(Error::config(
                "queue_capacity must be at least 1",
                "queue_capacity",
            ));
        }
        if self.artifact_wait.max_polls == 0 {
            return Err(Error::config("max_polls must be at least 1", "max_polls"));
        }
        if normalize_prefix(&self.storage.media_prefix)
            == normalize_prefix(&self.storage.metadata_prefix)
        {
            return Err(Error::config(
                "media_prefix and metadata_prefix must differ",
                "metadata_prefix",
            ));
        }
        Ok(())
    }
}

fn normalize_prefix(prefix: &str) -> &str {
    prefix.trim_matches('/')
}

fn parse_var<F, T>(lookup: &F, key: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| Error::config(format!("invalid value {raw:?}: {e}"), key)),
    }
}

const DEFAULT_MAX_ATTEMPTS: NonZeroU32 = match NonZeroU32::new(5) {
    Some(n) => n,
    None => panic!("default retry budget must be non-zero"),
};

fn default_max_videos() -> usize {
    100
}

fn default_listing_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_channel_url_template() -> String {
    "https://www.youtube.com/@{channel}/videos".to_string()
}

fn default_pool_size() -> usize {
    10
}

fn default_queue_capacity() -> usize {
    100
}

fn default_true() -> bool {
    true
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("./work")
}

fn default_merge_format() -> String {
    "mp4".to_string()
}

fn default_video_base_url() -> String {
    "https://www.youtube.com/watch".to_string()
}

fn default_media_prefix() -> String {
    "mp4".to_string()
}

fn default_metadata_prefix() -> String {
    "json".to_string()
}

fn default_max_attempts() -> NonZeroU32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_base_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(300)
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_max_polls() -> u32 {
    10
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Optional Duration serialization helper
mod optional_duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Option::<u64>::deserialize(deserializer)?;
        Ok(secs.map(Duration::from_secs))
    }
}
