//! Performance records and rolling per-flow statistics.
//!
//! Records are write-once; aggregation happens in [`FlowStats`], a bounded
//! rolling window so old outcomes age out of the success rate. The engine's
//! recorder task owns the stats; this module is pure so it can be tested
//! without the channel machinery.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// Outcome of one routed workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceRecord {
    /// Flow identifier, normally the intent name
    pub flow_id: String,
    pub latency_secs: f64,
    pub success: bool,
    pub error_kind: Option<String>,
    /// Optional explicit user satisfaction in [0, 1]
    pub satisfaction: Option<f32>,
    pub recorded_at: DateTime<Utc>,
}

impl PerformanceRecord {
    pub fn new(flow_id: impl Into<String>, latency_secs: f64, success: bool) -> Self {
        Self {
            flow_id: flow_id.into(),
            latency_secs,
            success,
            error_kind: None,
            satisfaction: None,
            recorded_at: Utc::now(),
        }
    }

    pub fn with_error(mut self, kind: impl Into<String>) -> Self {
        self.error_kind = Some(kind.into());
        self
    }

    pub fn with_satisfaction(mut self, score: f32) -> Self {
        self.satisfaction = Some(score.clamp(0.0, 1.0));
        self
    }
}

/// Rolling outcome window for one flow.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct FlowWindow {
    outcomes: VecDeque<bool>,
    total_latency_secs: f64,
    observed: u64,
}

/// Rolling per-flow success statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowStats {
    window: usize,
    flows: HashMap<String, FlowWindow>,
}

impl FlowStats {
    pub fn new(window: usize) -> Self {
        Self { window: window.max(1), flows: HashMap::new() }
    }

    pub fn observe(&mut self, record: &PerformanceRecord) {
        let flow = self.flows.entry(record.flow_id.clone()).or_default();
        flow.outcomes.push_back(record.success);
        if flow.outcomes.len() > self.window {
            flow.outcomes.pop_front();
        }
        flow.total_latency_secs += record.latency_secs;
        flow.observed += 1;
    }

    /// Success rate over the rolling window. Unknown flows report 0.5 so new
    /// flows neither win nor lose ties against established ones.
    pub fn success_rate(&self, flow_id: &str) -> f32 {
        match self.flows.get(flow_id) {
            Some(flow) if !flow.outcomes.is_empty() => {
                let wins = flow.outcomes.iter().filter(|s| **s).count() as f32;
                wins / flow.outcomes.len() as f32
            }
            _ => 0.5,
        }
    }

    /// Mean latency over everything observed for a flow.
    pub fn mean_latency_secs(&self, flow_id: &str) -> Option<f64> {
        self.flows.get(flow_id).filter(|f| f.observed > 0).map(|f| {
            f.total_latency_secs / f.observed as f64
        })
    }

    pub fn observed(&self, flow_id: &str) -> u64 {
        self.flows.get(flow_id).map(|f| f.observed).unwrap_or(0)
    }
}
