//! Shared admission control for metered external calls.
//!
//! Token-bucket over a trailing window: every prospective call estimates its
//! token cost, and the gateway admits it only if the cost fits under the
//! budget together with everything admitted in the trailing window. Pruning
//! expired entries and reserving happen as one step under the lock, so
//! concurrent callers can never over-admit.

use hermes_core::config::RateBudgetConfig;
use hermes_core::EngineError;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

struct WindowState {
    /// (admitted_at, token_cost), oldest first
    entries: VecDeque<(Instant, u64)>,
    used: u64,
}

/// Shared, lock-guarded rate budget. One instance per engine, all users.
pub struct RateGateway {
    state: Mutex<WindowState>,
    cfg: RateBudgetConfig,
}

impl RateGateway {
    pub fn new(cfg: RateBudgetConfig) -> Self {
        Self {
            state: Mutex::new(WindowState { entries: VecDeque::new(), used: 0 }),
            cfg,
        }
    }

    fn window(&self) -> Duration {
        Duration::from_secs(self.cfg.window_secs)
    }

    fn prune(&self, state: &mut WindowState, now: Instant) {
        let window = self.window();
        while let Some((at, cost)) = state.entries.front().copied() {
            if now.duration_since(at) >= window {
                state.entries.pop_front();
                state.used -= cost;
            } else {
                break;
            }
        }
    }

    /// Atomically check and reserve `cost` tokens.
    ///
    /// On rejection the error carries how long until enough budget frees up,
    /// so callers can retry after a bounded backoff or degrade to a cached
    /// answer. Never silently drops.
    pub async fn try_admit(&self, cost: u64) -> Result<(), EngineError> {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        self.prune(&mut state, now);

        if state.used + cost <= self.cfg.max_tokens_per_window {
            state.entries.push_back((now, cost));
            state.used += cost;
            debug!(cost, used = state.used, "rate budget admitted");
            return Ok(());
        }

        // Walk the window to find when enough entries expire for `cost`.
        let needed = (state.used + cost).saturating_sub(self.cfg.max_tokens_per_window);
        let mut freed = 0u64;
        let mut retry_after = self.window();
        for (at, entry_cost) in state.entries.iter() {
            freed += entry_cost;
            if freed >= needed {
                retry_after = self.window().saturating_sub(now.duration_since(*at));
                break;
            }
        }
        warn!(cost, used = state.used, "rate budget exhausted");
        Err(EngineError::BudgetExhausted { retry_after })
    }

    /// Tokens currently available in the trailing window.
    pub async fn available(&self) -> u64 {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        self.prune(&mut state, now);
        self.cfg.max_tokens_per_window.saturating_sub(state.used)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway(budget: u64, window_secs: u64) -> RateGateway {
        RateGateway::new(RateBudgetConfig { max_tokens_per_window: budget, window_secs })
    }

    #[tokio::test]
    async fn test_admits_within_budget() {
        let gw = gateway(100, 60);
        assert!(gw.try_admit(40).await.is_ok());
        assert!(gw.try_admit(60).await.is_ok());
        assert_eq!(gw.available().await, 0);
    }

    #[tokio::test]
    async fn test_rejects_over_budget() {
        let gw = gateway(100, 60);
        assert!(gw.try_admit(80).await.is_ok());
        let err = gw.try_admit(30).await.unwrap_err();
        assert!(matches!(err, EngineError::BudgetExhausted { .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_slides() {
        let gw = gateway(100, 60);
        assert!(gw.try_admit(100).await.is_ok());
        assert!(gw.try_admit(1).await.is_err());

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(gw.try_admit(100).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_is_bounded_by_window() {
        let gw = gateway(100, 60);
        assert!(gw.try_admit(100).await.is_ok());
        tokio::time::advance(Duration::from_secs(20)).await;
        match gw.try_admit(50).await {
            Err(EngineError::BudgetExhausted { retry_after }) => {
                assert!(retry_after <= Duration::from_secs(60));
                // The only reservation expires 40s from now.
                assert!(retry_after >= Duration::from_secs(39));
            }
            other => panic!("expected BudgetExhausted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_oversized_cost_always_rejected() {
        let gw = gateway(100, 60);
        let err = gw.try_admit(101).await.unwrap_err();
        assert!(matches!(err, EngineError::BudgetExhausted { .. }));
        // Budget untouched by the rejected call.
        assert_eq!(gw.available().await, 100);
    }

    #[tokio::test]
    async fn test_concurrent_admissions_never_exceed_budget() {
        use std::sync::atomic::{AtomicU64, Ordering};
        use std::sync::Arc;

        let gw = Arc::new(gateway(1_000, 60));
        let admitted = Arc::new(AtomicU64::new(0));
        let mut handles = Vec::new();
        for _ in 0..50 {
            let gw = gw.clone();
            let admitted = admitted.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..10 {
                    if gw.try_admit(37).await.is_ok() {
                        admitted.fetch_add(37, Ordering::SeqCst);
                    }
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert!(admitted.load(Ordering::SeqCst) <= 1_000);
    }
}
