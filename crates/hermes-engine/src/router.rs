//! Routing strategy selection.
//!
//! Combines the refined primary intent with an urgency score (time-sensitive
//! vocabulary, urgency sentiment, time-typed entities) and a complexity score
//! (indicator keyword density, entity count, message length) into one of the
//! four strategies. The decision table is threshold-driven from
//! `RoutingConfig`; the escalation gate decides whether a declined built-in
//! may fall through to the metered gateway.

use crate::classifier::tokenize;
use hermes_core::config::RoutingConfig;
use hermes_core::entity::{EntityKind, ExtractedEntity};
use hermes_core::intent::{clamp01, IntentCandidate, IntentCategory};
use hermes_core::sentiment::SentimentProfile;
use hermes_core::RoutingStrategy;

const TIME_SENSITIVE_WORDS: &[&str] = &[
    "now", "urgent", "urgently", "immediately", "asap", "quick", "quickly",
    "fast", "hurry", "today", "right away",
];

const COMPLEXITY_INDICATORS: &[&str] = &[
    "analyze", "analysis", "research", "compare", "comparison", "audit",
    "strategy", "arbitrage", "whale", "detailed", "comprehensive", "deep",
    "across", "correlate", "historical",
];

/// The selector's output, kept for observability on the analysis.
#[derive(Debug, Clone, Copy)]
pub struct RoutePlan {
    pub strategy: RoutingStrategy,
    pub urgency: f32,
    pub complexity: f32,
}

/// Urgency in [0, 1] from vocabulary, sentiment, and time-typed entities.
pub fn urgency_score(
    text: &str,
    sentiment: &SentimentProfile,
    entities: &[ExtractedEntity],
) -> f32 {
    let lower = text.to_lowercase();
    let word_hits = TIME_SENSITIVE_WORDS
        .iter()
        .filter(|w| lower.contains(*w))
        .count() as f32;

    let time_entities = entities
        .iter()
        .filter(|e| matches!(e.kind, EntityKind::Duration | EntityKind::Timeframe))
        .count() as f32;

    clamp01(0.3 * word_hits + 0.4 * sentiment.urgency() + 0.15 * time_entities)
}

/// Complexity in [0, 1] from the intent estimate, indicator density, entity
/// count, and message length.
pub fn complexity_score(
    text: &str,
    primary: &IntentCandidate,
    entities: &[ExtractedEntity],
) -> f32 {
    let tokens = tokenize(text);
    if tokens.is_empty() {
        return primary.estimated_complexity;
    }

    let lower = text.to_lowercase();
    let indicator_hits = COMPLEXITY_INDICATORS
        .iter()
        .filter(|w| lower.contains(*w))
        .count() as f32;
    let indicator_density = (indicator_hits / tokens.len() as f32).min(0.5);

    let entity_factor = (entities.len() as f32 * 0.05).min(0.2);
    let length_factor = (tokens.len() as f32 / 100.0).min(0.2);

    clamp01(
        0.5 * primary.estimated_complexity
            + 1.2 * indicator_density
            + entity_factor
            + length_factor,
    )
}

/// The decision table. Monotone in urgency: raising urgency with complexity
/// held fixed never moves a decision from Direct to Background.
pub fn select_strategy(
    category: IntentCategory,
    urgency: f32,
    complexity: f32,
    cfg: &RoutingConfig,
) -> RoutingStrategy {
    match category {
        IntentCategory::Streaming => RoutingStrategy::Streaming,
        IntentCategory::Simple => RoutingStrategy::Direct,
        IntentCategory::Immediate => {
            if complexity >= cfg.complexity_very_high {
                if urgency >= cfg.urgency_elevated {
                    RoutingStrategy::Hybrid
                } else {
                    RoutingStrategy::Background
                }
            } else {
                RoutingStrategy::Direct
            }
        }
        IntentCategory::Complex => {
            if complexity >= cfg.complexity_high {
                if urgency >= cfg.urgency_elevated {
                    RoutingStrategy::Hybrid
                } else {
                    RoutingStrategy::Background
                }
            } else {
                RoutingStrategy::Direct
            }
        }
    }
}

/// Whether a declined built-in may escalate to the metered gateway.
/// Simple and Streaming never escalate; the rest gate on the category's
/// confidence/complexity threshold.
pub fn escalation_allowed(
    primary: &IntentCandidate,
    complexity: f32,
    cfg: &RoutingConfig,
) -> bool {
    if !primary.category.allows_escalation() {
        return false;
    }
    match cfg.escalation_threshold(primary.category) {
        Some(threshold) => primary.confidence.max(complexity) >= threshold,
        None => false,
    }
}

/// Full plan for one analyzed message.
pub fn plan(
    text: &str,
    primary: &IntentCandidate,
    sentiment: &SentimentProfile,
    entities: &[ExtractedEntity],
    cfg: &RoutingConfig,
) -> RoutePlan {
    let urgency = urgency_score(text, sentiment, entities);
    let complexity = complexity_score(text, primary, entities);
    RoutePlan {
        strategy: select_strategy(primary.category, urgency, complexity, cfg),
        urgency,
        complexity,
    }
}
