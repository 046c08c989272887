//! Error types for the Hermes engine.

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("rate budget exhausted, retry in {retry_after:?}")]
    BudgetExhausted { retry_after: Duration },

    #[error("external provider error: {0}")]
    Provider(String),

    #[error("timed out during {stage}")]
    Timeout { stage: &'static str },

    #[error("background queue full (capacity {capacity})")]
    QueueFull { capacity: usize },

    #[error("subscription limit reached for user {user_id} (max {max})")]
    SubscriptionLimit { user_id: String, max: usize },

    #[error("unknown subscription {0}")]
    SubscriptionUnknown(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    /// Whether the caller can reasonably retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::BudgetExhausted { .. }
                | EngineError::QueueFull { .. }
                | EngineError::Timeout { .. }
        )
    }

    /// Suggested wait before retrying, when one is known.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            EngineError::BudgetExhausted { retry_after } => Some(*retry_after),
            _ => None,
        }
    }
}
