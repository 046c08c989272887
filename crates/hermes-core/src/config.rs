//! Engine configuration.
//!
//! Every empirically-chosen constant in the pipeline lives here as an
//! overridable default, so behavior tuning never means code edits. The
//! defaults preserve the shipped behavior; tests pin the monotonic relations
//! rather than the exact numbers.

use crate::intent::IntentCategory;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub classifier: ClassifierConfig,
    pub context: ContextConfig,
    pub routing: RoutingConfig,
    pub rate_budget: RateBudgetConfig,
    pub dispatch: DispatchConfig,
    pub feedback: FeedbackConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            classifier: ClassifierConfig::default(),
            context: ContextConfig::default(),
            routing: RoutingConfig::default(),
            rate_budget: RateBudgetConfig::default(),
            dispatch: DispatchConfig::default(),
            feedback: FeedbackConfig::default(),
        }
    }
}

/// Scoring and calibration knobs for the multi-layer classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Weight of the pattern layer in the combined score
    pub pattern_weight: f32,
    /// Weight of the semantic layer in the combined score
    pub semantic_weight: f32,
    /// Candidates below this combined score are discarded
    pub candidate_floor: f32,
    /// Below this best score the result downgrades to the generic fallback
    pub acceptance_threshold: f32,
    /// Confidence assigned to the generic fallback
    pub fallback_confidence: f32,
    /// Boost for short (<= short_message_tokens) messages classified Simple
    pub short_message_boost: f32,
    pub short_message_tokens: usize,
    /// Calibration boost for exactly one clear indicator keyword
    pub single_indicator_boost: f32,
    /// Calibration boost for two or more clear indicator keywords
    pub multi_indicator_boost: f32,
    /// Hard cap applied when hedging words are present
    pub hedging_cap: f32,
    /// Floor applied when any non-trivial score survived
    pub confidence_floor: f32,
    /// Jaccard similarity needed for the fuzzy fallback to accept
    pub fuzzy_threshold: f32,
    /// Confidence assigned to fuzzy-matched intents
    pub fuzzy_confidence: f32,
    /// Confidence delta within which historical success rate breaks ties
    pub tie_break_delta: f32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            pattern_weight: 0.6,
            semantic_weight: 0.4,
            candidate_floor: 0.1,
            acceptance_threshold: 0.3,
            fallback_confidence: 0.55,
            short_message_boost: 0.05,
            short_message_tokens: 3,
            single_indicator_boost: 0.1,
            multi_indicator_boost: 0.15,
            hedging_cap: 0.5,
            confidence_floor: 0.5,
            fuzzy_threshold: 0.3,
            fuzzy_confidence: 0.6,
            tie_break_delta: 0.05,
        }
    }
}

/// Conversation context sizing and boost weights.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Rolling window of recent turns kept per user
    pub max_recent_turns: usize,
    /// Mentioned-entity keys kept per user (oldest pruned first)
    pub max_mentioned_entities: usize,
    /// Whole contexts kept before LRU eviction of idle users
    pub max_tracked_users: usize,
    /// Boost when the candidate continues the session topic
    pub topic_continuity_boost: f32,
    /// Boost per previously mentioned entity reused in this message
    pub entity_reuse_boost: f32,
    /// Boost when the same intent appeared in the recent turns
    pub repeated_intent_boost: f32,
    /// Cap on the total context boost
    pub max_total_boost: f32,
    /// How many recent turns count for the repeated-intent boost
    pub repeated_intent_window: usize,
    /// Preference weights saturate here
    pub max_preference_weight: f32,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_recent_turns: 20,
            max_mentioned_entities: 50,
            max_tracked_users: 1024,
            topic_continuity_boost: 0.1,
            entity_reuse_boost: 0.05,
            repeated_intent_boost: 0.1,
            max_total_boost: 0.3,
            repeated_intent_window: 5,
            max_preference_weight: 5.0,
        }
    }
}

/// Strategy-selection thresholds and escalation gates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Complexity above this sends Immediate intents off the direct path
    pub complexity_very_high: f32,
    /// Complexity above this is eligible for Background
    pub complexity_high: f32,
    /// Urgency at or above this is "elevated" for Hybrid selection
    pub urgency_elevated: f32,
    /// Minimum confidence before an Immediate intent may escalate
    pub escalation_threshold_immediate: f32,
    /// Minimum confidence before a Complex intent may escalate
    pub escalation_threshold_complex: f32,
    /// Deadline for any external call on the direct path, in milliseconds
    pub direct_timeout_ms: u64,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            complexity_very_high: 0.8,
            complexity_high: 0.6,
            urgency_elevated: 0.5,
            escalation_threshold_immediate: 0.6,
            escalation_threshold_complex: 0.8,
            direct_timeout_ms: 4_000,
        }
    }
}

impl RoutingConfig {
    /// Escalation threshold for a category, or None when the category never
    /// escalates.
    pub fn escalation_threshold(&self, category: IntentCategory) -> Option<f32> {
        match category {
            IntentCategory::Immediate => Some(self.escalation_threshold_immediate),
            IntentCategory::Complex => Some(self.escalation_threshold_complex),
            IntentCategory::Simple | IntentCategory::Streaming => None,
        }
    }
}

/// Trailing-window token budget for metered external calls.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateBudgetConfig {
    pub max_tokens_per_window: u64,
    pub window_secs: u64,
}

impl Default for RateBudgetConfig {
    fn default() -> Self {
        Self { max_tokens_per_window: 90_000, window_secs: 60 }
    }
}

/// Worker-pool and subscription sizing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DispatchConfig {
    pub background_workers: usize,
    pub background_queue_depth: usize,
    pub max_subscriptions_per_user: usize,
    pub subscription_idle_secs: u64,
    pub subscription_max_lifetime_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            background_workers: 4,
            background_queue_depth: 64,
            max_subscriptions_per_user: 5,
            subscription_idle_secs: 900,
            subscription_max_lifetime_secs: 86_400,
        }
    }
}

/// Feedback recorder sizing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FeedbackConfig {
    pub queue_depth: usize,
    /// Rolling window of records kept per flow for the success rate
    pub stats_window: usize,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self { queue_depth: 256, stats_window: 100 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        let cfg = EngineConfig::default();
        assert!((cfg.classifier.pattern_weight + cfg.classifier.semantic_weight - 1.0).abs() < 1e-6);
        assert!(cfg.classifier.candidate_floor < cfg.classifier.acceptance_threshold);
        assert!(cfg.routing.complexity_high < cfg.routing.complexity_very_high);
        assert!(cfg.context.max_total_boost >= cfg.context.topic_continuity_boost);
    }

    #[test]
    fn test_escalation_thresholds() {
        let routing = RoutingConfig::default();
        assert!(routing.escalation_threshold(IntentCategory::Simple).is_none());
        assert!(routing.escalation_threshold(IntentCategory::Streaming).is_none());
        assert_eq!(routing.escalation_threshold(IntentCategory::Immediate), Some(0.6));
        assert_eq!(routing.escalation_threshold(IntentCategory::Complex), Some(0.8));
    }

    #[test]
    fn test_serde_round_trip() {
        let cfg = EngineConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.rate_budget.window_secs, cfg.rate_budget.window_secs);
        assert_eq!(back.dispatch.background_workers, cfg.dispatch.background_workers);
    }
}
