//! Artifact publishing to an object store

use crate::config::StorageConfig;
use crate::error::{Error, Result};
use crate::types::RemoteKey;
use async_trait::async_trait;
use object_store::ObjectStore;
use object_store::aws::AmazonS3Builder;
use object_store::buffered::BufWriter;
use object_store::path::Path as ObjectPath;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

/// Uploads one local file to the destination store
#[async_trait]
pub trait ArtifactPublisher: Send + Sync {
    /// Upload the file at `path` under `key`
    async fn publish(&self, path: &Path, key: &RemoteKey, cancel: &CancellationToken)
    -> Result<()>;
}

/// [`ArtifactPublisher`] over any [`ObjectStore`]
///
/// The store handle is stateless and shared by every worker.
#[derive(Clone)]
pub struct ObjectStorePublisher {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    timeout: Option<Duration>,
}

impl ObjectStorePublisher {
    /// Wrap an existing store; `bucket` is only used for logging
    pub fn new(store: Arc<dyn ObjectStore>, bucket: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            timeout: None,
        }
    }

    /// Bound every upload by `timeout` (None = unbounded)
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build an S3 publisher from the environment plus explicit settings
    ///
    /// Credentials come from the standard `AWS_*` environment variables.
    pub fn s3(storage: &StorageConfig) -> Result<Self> {
        let mut builder = AmazonS3Builder::from_env().with_bucket_name(storage.bucket.clone());

        if let Some(region) = &storage.region {
            builder = builder.with_region(region.clone());
        }
        if let Some(endpoint) = &storage.endpoint {
            let allow_http = endpoint.starts_with("http://");
            builder = builder
                .with_endpoint(endpoint.clone())
                .with_allow_http(allow_http);
        }

        let store = builder
            .build()
            .map_err(|e| Error::config(format!("invalid S3 settings: {e}"), "storage"))?;

        Ok(Self::new(Arc::new(store), storage.bucket.clone()).with_timeout(storage.upload_timeout))
    }

    /// Stream the file at `path` into the store under `key`
    ///
    /// Bytes go through a [`BufWriter`], which switches to a multipart upload
    /// once its buffer fills, so memory per upload stays bounded. The pending
    /// upload is aborted on failure.
    async fn put(&self, path: &Path, key: &RemoteKey) -> Result<u64> {
        let mut file = tokio::fs::File::open(path)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => Error::ArtifactMissing {
                    path: path.to_path_buf(),
                },
                _ => Error::Io(e),
            })?;
        let mut writer = BufWriter::new(self.store.clone(), ObjectPath::from(key.as_str()));

        let result = upload_within(key, self.timeout, async {
            let size = tokio::io::copy(&mut file, &mut writer).await?;
            writer.shutdown().await?;
            Ok::<_, std::io::Error>(size)
        })
        .await;

        if result.is_err()
            && let Err(e) = writer.abort().await
        {
            tracing::debug!(key = %key, error = %e, "failed to abort pending upload");
        }
        result
    }
}

/// Run an upload body under an optional deadline
///
/// Every failure of the store write, a missed deadline included, is reported
/// as [`Error::Upload`] so it is never retried.
pub(crate) async fn upload_within<F, T>(
    key: &RemoteKey,
    deadline: Option<Duration>,
    upload: F,
) -> Result<T>
where
    F: Future<Output = std::io::Result<T>>,
{
    let result = match deadline {
        Some(after) => tokio::time::timeout(after, upload)
            .await
            .map_err(|_| Error::Upload {
                key: key.to_string(),
                message: format!("timed out after {after:?}"),
            })?,
        None => upload.await,
    };
    result.map_err(|e| Error::Upload {
        key: key.to_string(),
        message: e.to_string(),
    })
}

impl std::fmt::Debug for ObjectStorePublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStorePublisher")
            .field("store", &self.store.to_string())
            .field("bucket", &self.bucket)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[async_trait]
impl ArtifactPublisher for ObjectStorePublisher {
    async fn publish(
        &self,
        path: &Path,
        key: &RemoteKey,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let start = std::time::Instant::now();

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            result = self.put(path, key) => result,
        };
        let size = result.inspect_err(|e| {
            tracing::error!(
                error = %e,
                bucket = %self.bucket,
                key = %key,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "upload failed"
            );
        })?;

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "upload successful"
        );
        Ok(())
    }
}
