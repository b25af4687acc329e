//! Channel producer: lists a channel and feeds the work queue

use crate::config::Config;
use crate::listing::ChannelLister;
use crate::types::{Event, VideoId};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Lists the configured channel and enqueues up to `max_videos` identifiers
///
/// The queue is closed exactly once, when [`Producer::run`] returns and the
/// sender it owns is dropped.
pub struct Producer {
    lister: Arc<dyn ChannelLister>,
    config: Arc<Config>,
    event_tx: broadcast::Sender<Event>,
    cancel: CancellationToken,
}

impl Producer {
    /// Create a producer for the channel named in `config`
    pub fn new(
        lister: Arc<dyn ChannelLister>,
        config: Arc<Config>,
        event_tx: broadcast::Sender<Event>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            lister,
            config,
            event_tx,
            cancel,
        }
    }

    /// Run the producer on its own task; resolves to the number enqueued
    pub fn spawn(self, tx: mpsc::Sender<VideoId>) -> JoinHandle<usize> {
        tokio::spawn(async move { self.run(tx).await })
    }

    /// List the channel, enqueue identifiers in order, then close the queue
    ///
    /// A listing failure or timeout is logged and treated as an empty channel.
    /// Enqueueing waits while the queue is full and stops early on
    /// cancellation or if every worker has gone away.
    pub async fn run(&self, tx: mpsc::Sender<VideoId>) -> usize {
        let ids = self.list().await;
        let limit = self.config.channel.max_videos;

        let mut enqueued = 0;
        for id in ids.into_iter().take(limit) {
            let sent = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    info!(enqueued, "producer cancelled");
                    break;
                }
                sent = tx.send(id.clone()) => sent,
            };
            if sent.is_err() {
                warn!(video_id = %id, "work queue closed by consumers, stopping producer");
                break;
            }
            enqueued += 1;
            self.event_tx.send(Event::Enqueued { id }).ok();
        }

        drop(tx);
        info!(
            channel = %self.config.channel.channel,
            enqueued,
            "producer finished, queue closed"
        );
        self.event_tx
            .send(Event::ProducerFinished { enqueued })
            .ok();
        enqueued
    }

    async fn list(&self) -> Vec<VideoId> {
        let channel = &self.config.channel;
        let url = channel.channel_url();
        info!(channel = %channel.channel, %url, limit = channel.max_videos, "listing channel");

        match tokio::time::timeout(
            channel.listing_timeout,
            self.lister.list(&url, channel.max_videos, &self.cancel),
        )
        .await
        {
            Ok(Ok(ids)) => {
                info!(count = ids.len(), "channel listed");
                ids
            }
            Ok(Err(e)) => {
                warn!(%url, error = %e, "channel listing failed, nothing to ingest");
                Vec::new()
            }
            Err(_) => {
                warn!(
                    %url,
                    timeout_secs = channel.listing_timeout.as_secs(),
                    "channel listing timed out, nothing to ingest"
                );
                Vec::new()
            }
        }
    }
}
