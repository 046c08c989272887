//! Asynchronous outcome recording.
//!
//! Records flow through a bounded channel into a single recorder task, so
//! persistence latency never sits on the hot response path. The recorder
//! keeps rolling per-flow success rates and republishes a snapshot the
//! refiner reads for its tie-break. On a full queue the record is dropped
//! with a warning; losing a feedback sample must never stall a reply.

use crate::persistence::FeedbackSink;
use hermes_core::config::FeedbackConfig;
use hermes_core::feedback::{FlowStats, PerformanceRecord};
use std::sync::{Arc, RwLock};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Cheap cloneable handle for submitting records.
#[derive(Clone)]
pub struct FeedbackHandle {
    tx: mpsc::Sender<PerformanceRecord>,
    stats: Arc<RwLock<FlowStats>>,
}

impl FeedbackHandle {
    /// Non-blocking submit. Drops the record when the queue is full.
    pub fn record(&self, record: PerformanceRecord) {
        if let Err(err) = self.tx.try_send(record) {
            warn!(error = %err, "feedback queue full, dropping record");
        }
    }

    /// Rolling success rate for a flow, from the latest published snapshot.
    pub fn success_rate(&self, flow_id: &str) -> f32 {
        self.stats
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .success_rate(flow_id)
    }

    /// Snapshot of the current stats for ranking.
    pub fn stats_snapshot(&self) -> FlowStats {
        self.stats
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

async fn consume(
    record: PerformanceRecord,
    stats: &RwLock<FlowStats>,
    sink: &dyn FeedbackSink,
) {
    {
        let mut guard = stats.write().unwrap_or_else(|e| e.into_inner());
        guard.observe(&record);
    }
    debug!(
        flow = %record.flow_id,
        success = record.success,
        latency_secs = record.latency_secs,
        "feedback recorded"
    );
    if let Err(err) = sink.append(&record).await {
        warn!(error = %err, "feedback sink write failed, continuing");
    }
}

/// The recorder task plus its handle.
pub struct FeedbackRecorder {
    handle: FeedbackHandle,
    worker: JoinHandle<()>,
    stop_tx: oneshot::Sender<()>,
}

impl FeedbackRecorder {
    /// Spawn the recorder. `sink` receives every record for persistence;
    /// sink failures are logged and otherwise ignored.
    pub fn spawn(cfg: FeedbackConfig, sink: Arc<dyn FeedbackSink>) -> Self {
        let (tx, mut rx) = mpsc::channel::<PerformanceRecord>(cfg.queue_depth.max(1));
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let stats = Arc::new(RwLock::new(FlowStats::new(cfg.stats_window)));
        let stats_writer = stats.clone();

        let worker = tokio::spawn(async move {
            loop {
                tokio::select! {
                    // Stop signal (or the recorder being dropped): close the
                    // queue so stray live handles cannot keep us alive, drain
                    // what was already submitted, and exit.
                    _ = &mut stop_rx => {
                        rx.close();
                        while let Some(record) = rx.recv().await {
                            consume(record, &stats_writer, sink.as_ref()).await;
                        }
                        break;
                    }
                    maybe = rx.recv() => match maybe {
                        Some(record) => consume(record, &stats_writer, sink.as_ref()).await,
                        None => break,
                    },
                }
            }
        });

        Self { handle: FeedbackHandle { tx, stats }, worker, stop_tx }
    }

    pub fn handle(&self) -> FeedbackHandle {
        self.handle.clone()
    }

    /// Stop accepting new records, drain the queue, and wait for the worker.
    /// Completes even while clones of the handle are still held elsewhere.
    pub async fn shutdown(self) {
        let FeedbackRecorder { handle, worker, stop_tx } = self;
        drop(handle);
        let _ = stop_tx.send(());
        if let Err(err) = worker.await {
            warn!(error = %err, "feedback recorder task failed");
        }
    }
}
