//! Top-level runner wiring producer, queue and worker pool together

use crate::config::Config;
use crate::error::Result;
use crate::fetcher::{ArtifactFetcher, YtDlpFetcher};
use crate::listing::{ChannelLister, YtDlpLister};
use crate::pipeline::VideoPipeline;
use crate::pool::WorkerPool;
use crate::producer::Producer;
use crate::publisher::{ArtifactPublisher, ObjectStorePublisher};
use crate::types::{Event, RunReport};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

/// Capacity of the event broadcast channel
///
/// Slow subscribers that fall further behind than this see `Lagged`.
const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// One channel ingest run: list, fetch, publish, clean up
///
/// Holds the validated configuration and the three external collaborators.
/// Call [`ChannelIngest::run`] to perform a run; it can be called again for
/// another pass over the same channel.
pub struct ChannelIngest {
    config: Arc<Config>,
    fetcher: Arc<dyn ArtifactFetcher>,
    publisher: Arc<dyn ArtifactPublisher>,
    lister: Arc<dyn ChannelLister>,
    event_tx: broadcast::Sender<Event>,
}

impl ChannelIngest {
    /// Create a runner with explicit collaborators
    ///
    /// Fails if `config` does not validate.
    pub fn new(
        config: Config,
        fetcher: Arc<dyn ArtifactFetcher>,
        publisher: Arc<dyn ArtifactPublisher>,
        lister: Arc<dyn ChannelLister>,
    ) -> Result<Self> {
        config.validate()?;
        let (event_tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Self {
            config: Arc::new(config),
            fetcher,
            publisher,
            lister,
            event_tx,
        })
    }

    /// Create a runner using yt-dlp and an S3-compatible store
    ///
    /// Locates the yt-dlp binary, creates the work directory and builds the
    /// store client. Any failure here is a startup error.
    pub async fn from_config(config: Config) -> Result<Self> {
        config.validate()?;
        tokio::fs::create_dir_all(&config.tools.work_dir).await?;

        let fetcher = YtDlpFetcher::from_config(&config.tools)?;
        let lister = YtDlpLister::from_config(&config.tools)?;
        let publisher = ObjectStorePublisher::s3(&config.storage)?;

        tracing::info!(
            channel = %config.channel.channel,
            bucket = %config.storage.bucket,
            work_dir = ?config.tools.work_dir,
            pool_size = config.pool.pool_size,
            "channel ingest configured"
        );

        Self::new(
            config,
            Arc::new(fetcher),
            Arc::new(publisher),
            Arc::new(lister),
        )
    }

    /// Subscribe to lifecycle events
    ///
    /// Events sent before subscribing are not replayed.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// The validated configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Perform one run and wait for it to finish
    ///
    /// Workers are started before the producer so that processing overlaps
    /// listing. Returns once the producer has closed the queue and every
    /// worker has exited. Per-video failures are counted in the report,
    /// never returned as errors. Cancelling `cancel` stops the producer,
    /// interrupts in-flight tasks and lets idle workers exit.
    pub async fn run(&self, cancel: CancellationToken) -> RunReport {
        let (tx, rx) = mpsc::channel(self.config.pool.queue_capacity);

        let pipeline = Arc::new(VideoPipeline::new(
            self.config.clone(),
            self.fetcher.clone(),
            self.publisher.clone(),
            self.event_tx.clone(),
            cancel.clone(),
        ));
        let pool = WorkerPool::spawn(
            self.config.pool.pool_size,
            rx,
            pipeline,
            self.event_tx.clone(),
            cancel.clone(),
        );

        let producer = Producer::new(
            self.lister.clone(),
            self.config.clone(),
            self.event_tx.clone(),
            cancel,
        )
        .spawn(tx);

        let stats = pool.join().await;
        let enqueued = match producer.await {
            Ok(enqueued) => enqueued,
            Err(e) => {
                tracing::error!(error = %e, "producer task failed");
                stats.done + stats.failed
            }
        };

        let report = RunReport {
            enqueued,
            done: stats.done,
            failed: stats.failed,
        };
        tracing::info!(
            enqueued = report.enqueued,
            done = report.done,
            failed = report.failed,
            "run finished"
        );
        self.event_tx.send(Event::RunFinished { report }).ok();
        report
    }
}
