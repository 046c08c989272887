//! Execution surfaces for non-direct strategies: a bounded background worker
//! pool and the streaming subscription manager.
//!
//! Job submission is non-blocking; a saturated queue rejects with a capacity
//! error instead of queueing unbounded. Every job carries a deadline, and a
//! timed-out job still delivers a degraded message to the user. Subscriptions
//! are long-lived tasks with an explicit cancellation handle, a per-user cap,
//! and idle/lifetime auto-expiry.

use crate::feedback::FeedbackHandle;
use crate::persistence::BoxFuture;
use hermes_core::config::DispatchConfig;
use hermes_core::feedback::PerformanceRecord;
use hermes_core::EngineError;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

/// Where finished work goes. The host implements this to push a chat message.
pub trait DeliverySink: Send + Sync {
    fn deliver(&self, user_id: &str, flow_ref: &str, message: &str);
}

/// A queued unit of background work.
pub struct JobRequest {
    pub job_id: String,
    pub user_id: String,
    /// Flow identifier for feedback, normally the intent name
    pub flow_id: String,
    pub deadline: Duration,
}

impl JobRequest {
    pub fn new(user_id: impl Into<String>, flow_id: impl Into<String>, deadline: Duration) -> Self {
        Self {
            job_id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            flow_id: flow_id.into(),
            deadline,
        }
    }
}

/// The work itself, produced by the engine when the job is submitted.
pub type JobWork = BoxFuture<'static, anyhow::Result<String>>;

struct QueuedJob {
    request: JobRequest,
    work: JobWork,
}

/// Bounded worker pool for Background and Hybrid jobs.
pub struct JobPool {
    tx: mpsc::Sender<QueuedJob>,
    workers: Vec<JoinHandle<()>>,
    queue_depth: usize,
}

impl JobPool {
    pub fn spawn(
        cfg: DispatchConfig,
        sink: Arc<dyn DeliverySink>,
        feedback: FeedbackHandle,
    ) -> Self {
        let depth = cfg.background_queue_depth.max(1);
        let (tx, rx) = mpsc::channel::<QueuedJob>(depth);
        let rx = Arc::new(Mutex::new(rx));

        let workers = (0..cfg.background_workers.max(1))
            .map(|worker_id| {
                let rx = rx.clone();
                let sink = sink.clone();
                let feedback = feedback.clone();
                tokio::spawn(async move {
                    loop {
                        let job = { rx.lock().await.recv().await };
                        let Some(job) = job else { break };
                        run_job(worker_id, job, sink.as_ref(), &feedback).await;
                    }
                })
            })
            .collect();

        Self { tx, workers, queue_depth: depth }
    }

    /// Non-blocking submit. Returns the job id, or `QueueFull` when the pool
    /// is saturated.
    pub fn submit(&self, request: JobRequest, work: JobWork) -> Result<String, EngineError> {
        let job_id = request.job_id.clone();
        self.tx
            .try_send(QueuedJob { request, work })
            .map_err(|_| EngineError::QueueFull { capacity: self.queue_depth })?;
        Ok(job_id)
    }

    /// Close the queue and wait for in-flight jobs.
    pub async fn shutdown(self) {
        drop(self.tx);
        for worker in self.workers {
            if let Err(err) = worker.await {
                warn!(error = %err, "background worker failed");
            }
        }
    }
}

async fn run_job(
    worker_id: usize,
    job: QueuedJob,
    sink: &dyn DeliverySink,
    feedback: &FeedbackHandle,
) {
    let QueuedJob { request, work } = job;
    let started = Instant::now();
    let outcome = tokio::time::timeout(request.deadline, work).await;
    let latency = started.elapsed().as_secs_f64();

    match outcome {
        Ok(Ok(answer)) => {
            sink.deliver(&request.user_id, &request.job_id, &answer);
            feedback.record(PerformanceRecord::new(&request.flow_id, latency, true));
        }
        Ok(Err(err)) => {
            warn!(worker_id, job_id = %request.job_id, error = %err, "background job failed");
            sink.deliver(
                &request.user_id,
                &request.job_id,
                "I couldn't finish that request. Please try again in a bit.",
            );
            feedback.record(
                PerformanceRecord::new(&request.flow_id, latency, false).with_error("provider"),
            );
        }
        Err(_) => {
            warn!(worker_id, job_id = %request.job_id, "background job timed out");
            sink.deliver(
                &request.user_id,
                &request.job_id,
                "That took longer than expected, so I stopped. Try narrowing the request.",
            );
            feedback.record(
                PerformanceRecord::new(&request.flow_id, latency, false).with_error("timeout"),
            );
        }
    }
}

/// Cancellation handle for one subscription.
pub struct CancellationHandle {
    cancel_tx: watch::Sender<bool>,
}

impl CancellationHandle {
    pub fn cancel(&self) {
        let _ = self.cancel_tx.send(true);
    }
}

struct Subscription {
    user_id: String,
    handle: CancellationHandle,
    watchdog: JoinHandle<()>,
    last_activity: Arc<Mutex<Instant>>,
}

/// Tracks standing streaming subscriptions with caps and expiry.
pub struct SubscriptionManager {
    cfg: DispatchConfig,
    subs: Mutex<HashMap<String, Subscription>>,
    sink: Arc<dyn DeliverySink>,
}

impl SubscriptionManager {
    pub fn new(cfg: DispatchConfig, sink: Arc<dyn DeliverySink>) -> Arc<Self> {
        Arc::new(Self { cfg, subs: Mutex::new(HashMap::new()), sink })
    }

    /// Register a subscription for a user. Enforces the per-user cap and
    /// spawns the idle/lifetime watchdog.
    pub async fn register(
        self: &Arc<Self>,
        user_id: &str,
        description: &str,
    ) -> Result<String, EngineError> {
        let mut subs = self.subs.lock().await;
        let active = subs.values().filter(|s| s.user_id == user_id).count();
        if active >= self.cfg.max_subscriptions_per_user {
            return Err(EngineError::SubscriptionLimit {
                user_id: user_id.to_string(),
                max: self.cfg.max_subscriptions_per_user,
            });
        }

        let subscription_id = Uuid::new_v4().to_string();
        let (cancel_tx, mut cancel_rx) = watch::channel(false);
        let last_activity = Arc::new(Mutex::new(Instant::now()));

        let watchdog = {
            let manager = self.clone();
            let sub_id = subscription_id.clone();
            let user = user_id.to_string();
            let last_activity = last_activity.clone();
            let idle = Duration::from_secs(self.cfg.subscription_idle_secs.max(1));
            let lifetime = Duration::from_secs(self.cfg.subscription_max_lifetime_secs.max(1));
            tokio::spawn(async move {
                let born = Instant::now();
                let tick = idle.min(lifetime) / 4;
                loop {
                    tokio::select! {
                        changed = cancel_rx.changed() => {
                            if changed.is_err() || *cancel_rx.borrow() {
                                info!(subscription_id = %sub_id, "subscription cancelled");
                                break;
                            }
                        }
                        _ = tokio::time::sleep(tick.max(Duration::from_millis(10))) => {
                            let idle_for = last_activity.lock().await.elapsed();
                            if idle_for >= idle || born.elapsed() >= lifetime {
                                info!(subscription_id = %sub_id, "subscription expired");
                                manager.sink.deliver(
                                    &user,
                                    &sub_id,
                                    "Your alert expired. Set it up again if you still need it.",
                                );
                                break;
                            }
                        }
                    }
                }
                manager.subs.lock().await.remove(&sub_id);
            })
        };

        info!(user_id, subscription_id = %subscription_id, description, "subscription registered");
        subs.insert(
            subscription_id.clone(),
            Subscription {
                user_id: user_id.to_string(),
                handle: CancellationHandle { cancel_tx },
                watchdog,
                last_activity,
            },
        );
        Ok(subscription_id)
    }

    /// Record activity on a subscription, resetting its idle clock.
    pub async fn touch(&self, subscription_id: &str) -> Result<(), EngineError> {
        let subs = self.subs.lock().await;
        match subs.get(subscription_id) {
            Some(sub) => {
                *sub.last_activity.lock().await = Instant::now();
                Ok(())
            }
            None => Err(EngineError::SubscriptionUnknown(subscription_id.to_string())),
        }
    }

    /// Cancel a subscription explicitly.
    pub async fn cancel(&self, subscription_id: &str) -> Result<(), EngineError> {
        let subs = self.subs.lock().await;
        match subs.get(subscription_id) {
            Some(sub) => {
                sub.handle.cancel();
                Ok(())
            }
            None => Err(EngineError::SubscriptionUnknown(subscription_id.to_string())),
        }
    }

    pub async fn active_for_user(&self, user_id: &str) -> usize {
        self.subs
            .lock()
            .await
            .values()
            .filter(|s| s.user_id == user_id)
            .count()
    }

    /// Cancel everything, for shutdown.
    pub async fn shutdown(&self) {
        let watchdogs: Vec<JoinHandle<()>> = {
            let mut subs = self.subs.lock().await;
            subs.drain()
                .map(|(_, sub)| {
                    sub.handle.cancel();
                    sub.watchdog
                })
                .collect()
        };
        for watchdog in watchdogs {
            let _ = watchdog.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feedback::FeedbackRecorder;
    use crate::persistence::NullBackend;
    use hermes_core::config::FeedbackConfig;
    use std::sync::Mutex as StdMutex;

    struct RecordingSink {
        delivered: StdMutex<Vec<(String, String)>>,
    }

    impl RecordingSink {
        fn new() -> Arc<Self> {
            Arc::new(Self { delivered: StdMutex::new(Vec::new()) })
        }
        fn messages(&self) -> Vec<(String, String)> {
            self.delivered.lock().unwrap().clone()
        }
    }

    impl DeliverySink for RecordingSink {
        fn deliver(&self, user_id: &str, _flow_ref: &str, message: &str) {
            self.delivered
                .lock()
                .unwrap()
                .push((user_id.to_string(), message.to_string()));
        }
    }

    fn test_cfg() -> DispatchConfig {
        DispatchConfig {
            background_workers: 2,
            background_queue_depth: 4,
            max_subscriptions_per_user: 2,
            subscription_idle_secs: 1,
            subscription_max_lifetime_secs: 10,
        }
    }

    fn recorder_pair() -> (FeedbackRecorder, FeedbackHandle) {
        let recorder = FeedbackRecorder::spawn(FeedbackConfig::default(), Arc::new(NullBackend));
        let handle = recorder.handle();
        (recorder, handle)
    }

    #[tokio::test]
    async fn test_job_runs_and_delivers() {
        let (recorder, feedback) = recorder_pair();
        let sink = RecordingSink::new();
        let pool = JobPool::spawn(test_cfg(), sink.clone(), feedback);
        let request = JobRequest::new("alice", "research", Duration::from_secs(5));
        pool.submit(request, Box::pin(async { Ok("report ready".to_string()) }))
            .unwrap();
        pool.shutdown().await;
        let messages = sink.messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].1.contains("report ready"));
        recorder.shutdown().await;
    }

    #[tokio::test]
    async fn test_queue_full_rejected() {
        let (recorder, feedback) = recorder_pair();
        let cfg = DispatchConfig { background_workers: 1, background_queue_depth: 1, ..test_cfg() };
        let sink = RecordingSink::new();
        let pool = JobPool::spawn(cfg, sink, feedback);

        // Stall the single worker, then overfill the queue.
        let slow = || -> JobWork {
            Box::pin(async {
                tokio::time::sleep(Duration::from_millis(500)).await;
                Ok("done".to_string())
            })
        };
        let mut rejected = 0;
        for _ in 0..10 {
            let request = JobRequest::new("bob", "research", Duration::from_secs(5));
            if matches!(
                pool.submit(request, slow()),
                Err(EngineError::QueueFull { .. })
            ) {
                rejected += 1;
            }
        }
        assert!(rejected > 0);
        pool.shutdown().await;
        recorder.shutdown().await;
    }

    #[tokio::test]
    async fn test_timed_out_job_still_delivers() {
        let (recorder, feedback) = recorder_pair();
        let sink = RecordingSink::new();
        let pool = JobPool::spawn(test_cfg(), sink.clone(), feedback);
        let request = JobRequest::new("carol", "research", Duration::from_millis(20));
        pool.submit(
            request,
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok("never".to_string())
            }),
        )
        .unwrap();
        pool.shutdown().await;
        let messages = sink.messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].1.contains("longer than expected"));
        recorder.shutdown().await;
    }

    #[tokio::test]
    async fn test_subscription_cap_per_user() {
        let manager = SubscriptionManager::new(test_cfg(), RecordingSink::new());
        manager.register("dave", "btc alert").await.unwrap();
        manager.register("dave", "eth alert").await.unwrap();
        let err = manager.register("dave", "sol alert").await.unwrap_err();
        assert!(matches!(err, EngineError::SubscriptionLimit { .. }));
        // Other users unaffected.
        assert!(manager.register("erin", "btc alert").await.is_ok());
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_cancel_frees_slot() {
        let manager = SubscriptionManager::new(test_cfg(), RecordingSink::new());
        let id = manager.register("frank", "alert").await.unwrap();
        manager.cancel(&id).await.unwrap();
        // Watchdog removal is async; wait for it.
        for _ in 0..50 {
            if manager.active_for_user("frank").await == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(manager.active_for_user("frank").await, 0);
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_unknown_subscription() {
        let manager = SubscriptionManager::new(test_cfg(), RecordingSink::new());
        assert!(matches!(
            manager.cancel("nope").await,
            Err(EngineError::SubscriptionUnknown(_))
        ));
        assert!(matches!(
            manager.touch("nope").await,
            Err(EngineError::SubscriptionUnknown(_))
        ));
    }

    #[tokio::test]
    async fn test_idle_expiry_notifies_user() {
        let sink = RecordingSink::new();
        let manager = SubscriptionManager::new(test_cfg(), sink.clone());
        manager.register("gina", "alert").await.unwrap();
        // Idle timeout is 1s in the test config.
        for _ in 0..100 {
            if manager.active_for_user("gina").await == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert_eq!(manager.active_for_user("gina").await, 0);
        assert!(sink.messages().iter().any(|(_, m)| m.contains("expired")));
    }
}
