//! Fixed-size worker pool draining the work queue
//!
//! All workers share one receiver behind a mutex; whichever worker holds the
//! lock takes the next identifier, so each queued item is processed by
//! exactly one worker. A worker exits when the queue is closed and empty, or
//! when the run is cancelled.

use crate::pipeline::VideoPipeline;
use crate::types::{Event, TaskOutcome, VideoId};
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Receiving half of the work queue, shared by every worker
type SharedReceiver = Arc<Mutex<mpsc::Receiver<VideoId>>>;

/// Per-worker task counts, summed by [`WorkerPool::join`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// Tasks that reached `Done`
    pub done: usize,
    /// Tasks that reached `Failed`
    pub failed: usize,
}

impl WorkerStats {
    fn record(&mut self, outcome: &TaskOutcome) {
        if outcome.is_done() {
            self.done += 1;
        } else {
            self.failed += 1;
        }
    }

    fn merge(self, other: WorkerStats) -> WorkerStats {
        WorkerStats {
            done: self.done + other.done,
            failed: self.failed + other.failed,
        }
    }
}

/// Handles to a running set of workers
pub struct WorkerPool {
    handles: Vec<JoinHandle<WorkerStats>>,
}

impl WorkerPool {
    /// Start `size` workers consuming `rx`
    ///
    /// Workers are running before this returns, so they can start on the
    /// first identifier as soon as the producer sends it.
    pub fn spawn(
        size: usize,
        rx: mpsc::Receiver<VideoId>,
        pipeline: Arc<VideoPipeline>,
        event_tx: broadcast::Sender<Event>,
        cancel: CancellationToken,
    ) -> Self {
        let rx: SharedReceiver = Arc::new(Mutex::new(rx));
        let handles = (0..size)
            .map(|worker_id| {
                tokio::spawn(worker_loop(
                    worker_id,
                    rx.clone(),
                    pipeline.clone(),
                    event_tx.clone(),
                    cancel.clone(),
                ))
            })
            .collect();

        info!(pool_size = size, "worker pool started");
        Self { handles }
    }

    /// Number of workers started
    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Wait for every worker to exit and sum their counts
    ///
    /// A worker that panicked is logged and contributes nothing.
    pub async fn join(self) -> WorkerStats {
        join_all(self.handles)
            .await
            .into_iter()
            .enumerate()
            .fold(WorkerStats::default(), |total, (worker_id, result)| {
                match result {
                    Ok(stats) => total.merge(stats),
                    Err(e) => {
                        error!(worker_id, error = %e, "worker task failed");
                        total
                    }
                }
            })
    }
}

/// Take the next identifier, or None once the queue is drained or the run is cancelled
async fn next_item(rx: &SharedReceiver, cancel: &CancellationToken) -> Option<VideoId> {
    let mut guard = tokio::select! {
        biased;
        _ = cancel.cancelled() => return None,
        guard = rx.lock() => guard,
    };
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        id = guard.recv() => id,
    }
}

async fn worker_loop(
    worker_id: usize,
    rx: SharedReceiver,
    pipeline: Arc<VideoPipeline>,
    event_tx: broadcast::Sender<Event>,
    cancel: CancellationToken,
) -> WorkerStats {
    let mut stats = WorkerStats::default();
    debug!(worker_id, "worker started");

    while let Some(id) = next_item(&rx, &cancel).await {
        info!(worker_id, video_id = %id, "processing video");
        event_tx
            .send(Event::TaskStarted {
                worker_id,
                id: id.clone(),
            })
            .ok();

        let outcome = pipeline.process(&id).await;
        stats.record(&outcome);

        match outcome {
            TaskOutcome::Done => {
                info!(worker_id, video_id = %id, "video published");
                event_tx
                    .send(Event::TaskCompleted { worker_id, id })
                    .ok();
            }
            TaskOutcome::Failed { stage, error } => {
                warn!(worker_id, video_id = %id, %stage, %error, "video failed");
                event_tx
                    .send(Event::TaskFailed {
                        worker_id,
                        id,
                        stage,
                        error,
                    })
                    .ok();
            }
        }
    }

    debug!(
        worker_id,
        done = stats.done,
        failed = stats.failed,
        "worker exiting"
    );
    event_tx.send(Event::WorkerExited { worker_id }).ok();
    stats
}
