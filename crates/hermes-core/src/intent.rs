//! Intent categories, candidates, and the declarative intent table.
//!
//! Classification logic lives in `hermes-engine`; this module holds the data
//! it runs on. Each [`IntentDefinition`] declares trigger phrases with
//! weights, three keyword tiers for semantic scoring, and routing metadata
//! (complexity, cost, required resources). Keeping the table separate from
//! the scoring code lets both be unit-tested independently.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// Routing-relevant category of an intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentCategory {
    /// Conversational, answerable locally with no data fetch (greeting, help)
    Simple,
    /// Quick factual lookup the user expects an instant answer to
    Immediate,
    /// Multi-step research or analysis that may take real time
    Complex,
    /// Standing request for ongoing updates (alerts, monitoring)
    Streaming,
}

impl IntentCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Immediate => "immediate",
            Self::Complex => "complex",
            Self::Streaming => "streaming",
        }
    }

    /// Whether this category may ever fall through to a metered external call.
    /// Simple and Streaming never escalate.
    pub fn allows_escalation(&self) -> bool {
        matches!(self, Self::Immediate | Self::Complex)
    }
}

impl std::fmt::Display for IntentCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Clamp a score into [0, 1]. Confidence values must never leave this range.
pub fn clamp01(x: f32) -> f32 {
    x.clamp(0.0, 1.0)
}

/// One scored interpretation of a message. Created fresh per request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentCandidate {
    pub name: String,
    pub category: IntentCategory,
    pub confidence: f32,
    /// Phrases and keywords that contributed to the score
    pub matched_evidence: Vec<String>,
    /// Named external resources a full answer would need
    pub required_resources: Vec<String>,
    /// 0..1, drives routing complexity
    pub estimated_complexity: f32,
    /// Rough wall-clock estimate for fulfilling this intent
    pub estimated_cost_secs: f32,
}

impl IntentCandidate {
    /// Build a candidate from its definition with a given confidence.
    pub fn from_definition(def: &IntentDefinition, confidence: f32) -> Self {
        Self {
            name: def.name.to_string(),
            category: def.category,
            confidence: clamp01(confidence),
            matched_evidence: Vec::new(),
            required_resources: def.required_resources.iter().map(|s| s.to_string()).collect(),
            estimated_complexity: def.estimated_complexity,
            estimated_cost_secs: def.estimated_cost_secs,
        }
    }

    /// The generic catch-all used when nothing else scores. Never absent from
    /// an analysis: callers rely on a non-null primary intent.
    pub fn fallback(confidence: f32) -> Self {
        Self {
            name: FALLBACK_INTENT.to_string(),
            category: IntentCategory::Simple,
            confidence: clamp01(confidence),
            matched_evidence: Vec::new(),
            required_resources: Vec::new(),
            estimated_complexity: 0.1,
            estimated_cost_secs: 1.0,
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.name == FALLBACK_INTENT
    }
}

/// Name of the generic catch-all intent.
pub const FALLBACK_INTENT: &str = "general_query";

/// Keyword tiers for semantic scoring. High-tier words are near-definitive
/// for the intent, low-tier words are weak hints.
#[derive(Debug, Clone)]
pub struct KeywordTiers {
    pub high: &'static [&'static str],
    pub medium: &'static [&'static str],
    pub low: &'static [&'static str],
}

/// Declarative definition of one intent.
#[derive(Debug, Clone)]
pub struct IntentDefinition {
    pub name: &'static str,
    pub category: IntentCategory,
    /// Trigger phrases with weights; matched as lowercase substrings.
    /// Longer phrases carry more specificity on top of the declared weight.
    pub triggers: &'static [(&'static str, f32)],
    pub keywords: KeywordTiers,
    pub required_resources: &'static [&'static str],
    pub estimated_complexity: f32,
    pub estimated_cost_secs: f32,
}

impl IntentDefinition {
    /// All distinct vocabulary tokens for this intent, used by the fuzzy
    /// fallback's token-set similarity.
    pub fn vocabulary_tokens(&self) -> Vec<&'static str> {
        let mut tokens: Vec<&'static str> = Vec::new();
        for (phrase, _) in self.triggers {
            tokens.extend(phrase.split_whitespace());
        }
        tokens.extend(self.keywords.high);
        tokens.extend(self.keywords.medium);
        tokens.extend(self.keywords.low);
        tokens.sort_unstable();
        tokens.dedup();
        tokens
    }
}

/// The built-in intent table. Loaded once; immutable afterwards.
pub static INTENT_DEFINITIONS: Lazy<Vec<IntentDefinition>> = Lazy::new(|| {
    vec![
        IntentDefinition {
            name: "greeting",
            category: IntentCategory::Simple,
            triggers: &[
                ("hello", 0.8),
                ("hi there", 0.9),
                ("hey", 0.7),
                ("good morning", 0.9),
                ("good evening", 0.9),
                ("gm", 0.6),
            ],
            keywords: KeywordTiers {
                high: &["hello", "hi", "hey", "greetings"],
                medium: &["morning", "evening", "afternoon", "gm", "gn"],
                low: &["welcome", "yo"],
            },
            required_resources: &[],
            estimated_complexity: 0.05,
            estimated_cost_secs: 0.5,
        },
        IntentDefinition {
            name: "help",
            category: IntentCategory::Simple,
            triggers: &[
                ("help", 0.8),
                ("what can you do", 1.0),
                ("how do i use", 0.9),
                ("show commands", 0.9),
            ],
            keywords: KeywordTiers {
                high: &["help", "commands", "usage"],
                medium: &["how", "guide", "tutorial"],
                low: &["explain", "show"],
            },
            required_resources: &[],
            estimated_complexity: 0.05,
            estimated_cost_secs: 0.5,
        },
        IntentDefinition {
            name: "small_talk",
            category: IntentCategory::Simple,
            triggers: &[
                ("how are you", 0.9),
                ("thank you", 0.8),
                ("thanks", 0.7),
                ("who are you", 0.8),
            ],
            keywords: KeywordTiers {
                high: &["thanks", "thank"],
                medium: &["nice", "cool", "great", "awesome"],
                low: &["ok", "okay", "lol"],
            },
            required_resources: &[],
            estimated_complexity: 0.05,
            estimated_cost_secs: 0.5,
        },
        IntentDefinition {
            name: "price_lookup",
            category: IntentCategory::Immediate,
            triggers: &[
                ("price of", 0.9),
                ("price", 0.7),
                ("how much is", 0.9),
                ("current price", 1.0),
                ("worth right now", 0.9),
                ("trading at", 0.9),
            ],
            keywords: KeywordTiers {
                high: &["price", "cost", "worth", "value"],
                medium: &["current", "now", "today", "latest"],
                low: &["much", "check", "quote"],
            },
            required_resources: &["market_data"],
            estimated_complexity: 0.2,
            estimated_cost_secs: 2.0,
        },
        IntentDefinition {
            name: "market_overview",
            category: IntentCategory::Immediate,
            triggers: &[
                ("market overview", 1.0),
                ("market summary", 1.0),
                ("how is the market", 0.9),
                ("top gainers", 0.9),
                ("top losers", 0.9),
                ("market cap", 0.8),
            ],
            keywords: KeywordTiers {
                high: &["market", "overview", "summary"],
                medium: &["gainers", "losers", "trending", "volume"],
                low: &["today", "sentiment", "mood"],
            },
            required_resources: &["market_data"],
            estimated_complexity: 0.3,
            estimated_cost_secs: 3.0,
        },
        IntentDefinition {
            name: "portfolio_query",
            category: IntentCategory::Immediate,
            triggers: &[
                ("my portfolio", 1.0),
                ("my holdings", 1.0),
                ("my balance", 0.9),
                ("profit and loss", 0.9),
                ("pnl", 0.7),
            ],
            keywords: KeywordTiers {
                high: &["portfolio", "holdings", "balance"],
                medium: &["profit", "loss", "pnl", "gains"],
                low: &["my", "own", "have"],
            },
            required_resources: &["portfolio_store"],
            estimated_complexity: 0.3,
            estimated_cost_secs: 2.0,
        },
        IntentDefinition {
            name: "price_alert",
            category: IntentCategory::Streaming,
            triggers: &[
                ("alert me", 1.0),
                ("notify me", 1.0),
                ("keep me updated", 1.0),
                ("let me know when", 1.0),
                ("watch for", 0.8),
                ("monitor", 0.8),
                ("track", 0.7),
            ],
            keywords: KeywordTiers {
                high: &["alert", "notify", "monitor", "watch"],
                medium: &["when", "updated", "track", "follow"],
                low: &["tell", "know", "ping"],
            },
            required_resources: &["market_data", "scheduler"],
            estimated_complexity: 0.4,
            estimated_cost_secs: 5.0,
        },
        IntentDefinition {
            name: "research",
            category: IntentCategory::Complex,
            triggers: &[
                ("deep dive", 1.0),
                ("research", 0.8),
                ("analyze", 0.8),
                ("analysis of", 0.9),
                ("compare", 0.7),
                ("arbitrage", 0.9),
                ("cross-chain", 0.9),
                ("whale movements", 1.0),
                ("whale tracking", 1.0),
                ("on-chain", 0.8),
                ("audit", 0.8),
                ("tokenomics", 0.9),
            ],
            keywords: KeywordTiers {
                high: &["research", "analyze", "analysis", "arbitrage", "audit"],
                medium: &["compare", "fundamentals", "tokenomics", "whale", "liquidity"],
                low: &["why", "explain", "detail", "report"],
            },
            required_resources: &["market_data", "chain_data", "ai_provider"],
            estimated_complexity: 0.8,
            estimated_cost_secs: 30.0,
        },
        IntentDefinition {
            name: "trading_strategy",
            category: IntentCategory::Complex,
            triggers: &[
                ("should i buy", 0.9),
                ("should i sell", 0.9),
                ("trading strategy", 1.0),
                ("entry point", 0.9),
                ("exit point", 0.9),
                ("stop loss", 0.8),
            ],
            keywords: KeywordTiers {
                high: &["strategy", "buy", "sell", "trade"],
                medium: &["entry", "exit", "position", "leverage"],
                low: &["should", "good", "time"],
            },
            required_resources: &["market_data", "ai_provider"],
            estimated_complexity: 0.7,
            estimated_cost_secs: 20.0,
        },
    ]
});

/// Look up a definition by intent name.
pub fn definition(name: &str) -> Option<&'static IntentDefinition> {
    INTENT_DEFINITIONS.iter().find(|d| d.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_names_unique() {
        let mut names: Vec<&str> = INTENT_DEFINITIONS.iter().map(|d| d.name).collect();
        names.sort_unstable();
        let before = names.len();
        names.dedup();
        assert_eq!(before, names.len());
    }

    #[test]
    fn test_every_definition_has_triggers_and_keywords() {
        for def in INTENT_DEFINITIONS.iter() {
            assert!(!def.triggers.is_empty(), "{} has no triggers", def.name);
            assert!(!def.keywords.high.is_empty(), "{} has no high keywords", def.name);
        }
    }

    #[test]
    fn test_escalation_policy() {
        assert!(!IntentCategory::Simple.allows_escalation());
        assert!(!IntentCategory::Streaming.allows_escalation());
        assert!(IntentCategory::Immediate.allows_escalation());
        assert!(IntentCategory::Complex.allows_escalation());
    }

    #[test]
    fn test_fallback_candidate() {
        let c = IntentCandidate::fallback(0.55);
        assert!(c.is_fallback());
        assert_eq!(c.category, IntentCategory::Simple);
        assert!((c.confidence - 0.55).abs() < f32::EPSILON);
    }

    #[test]
    fn test_confidence_clamped() {
        let c = IntentCandidate::fallback(1.7);
        assert!(c.confidence <= 1.0);
        let c = IntentCandidate::fallback(-0.3);
        assert!(c.confidence >= 0.0);
    }

    #[test]
    fn test_vocabulary_tokens_dedup() {
        let def = definition("price_lookup").unwrap();
        let tokens = def.vocabulary_tokens();
        let mut sorted = tokens.clone();
        sorted.dedup();
        assert_eq!(tokens.len(), sorted.len());
        assert!(tokens.contains(&"price"));
    }
}
