//! Analysis results and routing decisions shared between the engine and its
//! callers.

use crate::entity::ExtractedEntity;
use crate::intent::IntentCandidate;
use crate::sentiment::SentimentProfile;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How a request should be fulfilled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingStrategy {
    /// Answer inline from built-ins or a fast lookup
    Direct,
    /// Enqueue a job, deliver the result later
    Background,
    /// Register a standing subscription that pushes events
    Streaming,
    /// Immediate partial answer plus a deeper background job
    Hybrid,
}

impl RoutingStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Background => "background",
            Self::Streaming => "streaming",
            Self::Hybrid => "hybrid",
        }
    }
}

impl std::fmt::Display for RoutingStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Concrete routing outcome handed to the caller after execution planning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RoutingDecision {
    /// Reply text is ready now
    Direct { answer: String },
    /// Work was enqueued; the executor will call back with `job_id`
    Background { job_id: String },
    /// A standing subscription was registered
    Streaming { subscription_id: String },
    /// Partial answer now, full result later under `job_id`
    Hybrid { immediate_answer: String, job_id: String },
}

impl RoutingDecision {
    pub fn strategy(&self) -> RoutingStrategy {
        match self {
            Self::Direct { .. } => RoutingStrategy::Direct,
            Self::Background { .. } => RoutingStrategy::Background,
            Self::Streaming { .. } => RoutingStrategy::Streaming,
            Self::Hybrid { .. } => RoutingStrategy::Hybrid,
        }
    }

    pub fn job_id(&self) -> Option<&str> {
        match self {
            Self::Background { job_id } | Self::Hybrid { job_id, .. } => Some(job_id),
            _ => None,
        }
    }
}

/// Optional request metadata supplied by the chat-platform handler.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestMetadata {
    /// Platform channel / chat id, opaque to the engine
    pub channel: Option<String>,
    /// True when the message arrived as an explicit command (e.g. "/price")
    pub is_command: bool,
    /// Free-form key/value hints
    pub extra: HashMap<String, String>,
}

/// Primary output of `Engine::analyze`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentAnalysis {
    pub primary_intent: IntentCandidate,
    /// Up to two runners-up, highest confidence first
    pub secondary_intents: Vec<IntentCandidate>,
    pub sentiment: SentimentProfile,
    pub entities: Vec<ExtractedEntity>,
    pub user_id: String,
    pub overall_confidence: f32,
    pub strategy: RoutingStrategy,
    /// Urgency score that drove routing, kept for observability
    pub urgency: f32,
    /// Complexity score that drove routing
    pub complexity: f32,
    pub estimated_response_secs: f32,
    pub required_permissions: Vec<String>,
}
