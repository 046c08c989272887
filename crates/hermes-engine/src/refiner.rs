//! Business-rule refinement, confidence calibration, and the fuzzy fallback.
//!
//! Rules run in fixed priority order and the first match wins; anything they
//! decide overrides the layered scores. When no rule fires, the
//! highest-scoring candidate (after context boosts and the historical
//! tie-break) becomes primary, downgrading to the generic fallback below the
//! acceptance threshold. Calibration then nudges confidence monotonically:
//! more evidence never lowers it, hedging language caps it.

use crate::classifier::{tokenize, ScoredIntent};
use hermes_core::config::ClassifierConfig;
use hermes_core::feedback::FlowStats;
use hermes_core::intent::{
    clamp01, definition, IntentCandidate, IntentCategory, INTENT_DEFINITIONS,
};
use hermes_core::RequestMetadata;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Hedging words cap confidence regardless of prior score.
const HEDGING_WORDS: &[&str] = &["maybe", "perhaps", "might", "possibly", "unsure", "guess"];

/// Advanced-domain vocabulary that forces the Complex category.
const ADVANCED_KEYWORDS: &[&str] = &[
    "cross-chain", "crosschain", "arbitrage", "whale", "audit", "tokenomics",
    "liquidation", "mev", "on-chain", "onchain", "defi",
];

/// Greeting vocabulary for the forced Simple rule.
const GREETING_WORDS: &[&str] = &["hello", "hi", "hey", "gm", "greetings", "morning", "evening"];

/// Refined classification: one primary plus up to two runners-up.
#[derive(Debug, Clone)]
pub struct RefinedIntent {
    pub primary: IntentCandidate,
    pub secondary: Vec<IntentCandidate>,
}

fn candidate_from(scored: &ScoredIntent, confidence: f32) -> IntentCandidate {
    let mut c = IntentCandidate::from_definition(scored.definition, confidence);
    c.matched_evidence = scored.evidence.clone();
    c
}

/// Looks like "/price btc" or "!help": explicit command syntax.
fn is_command_syntax(text: &str, metadata: &RequestMetadata) -> bool {
    metadata.is_command || matches!(text.trim_start().chars().next(), Some('/') | Some('!'))
}

/// Bare price-query phrasing: a short "<symbol> price" style message.
fn is_bare_price_query(text: &str) -> bool {
    let tokens = tokenize(text);
    tokens.len() <= 3 && tokens.iter().any(|t| t == "price")
}

/// Token-set Jaccard similarity between the message and an intent vocabulary.
fn jaccard(message_tokens: &HashSet<String>, vocabulary: &[&str]) -> f32 {
    if message_tokens.is_empty() || vocabulary.is_empty() {
        return 0.0;
    }
    let vocab: HashSet<String> = vocabulary.iter().map(|w| w.to_lowercase()).collect();
    let intersection = message_tokens.iter().filter(|t| vocab.contains(*t)).count() as f32;
    let union = (message_tokens.len() + vocab.len()) as f32 - intersection;
    if union == 0.0 {
        0.0
    } else {
        intersection / union
    }
}

/// Last-resort matching for input the layered pipeline could not place.
fn fuzzy_fallback(text: &str, cfg: &ClassifierConfig) -> IntentCandidate {
    let tokens: HashSet<String> = tokenize(text).into_iter().collect();
    let mut best: Option<(&'static str, f32)> = None;

    for def in INTENT_DEFINITIONS.iter() {
        let vocab = def.vocabulary_tokens();
        let sim = jaccard(&tokens, &vocab);
        match best {
            Some((_, best_sim)) if sim <= best_sim => {}
            _ if sim > 0.0 => best = Some((def.name, sim)),
            _ => {}
        }
    }

    if let Some((name, sim)) = best {
        if sim > cfg.fuzzy_threshold {
            debug!(intent = name, similarity = sim, "fuzzy fallback matched");
            if let Some(def) = definition(name) {
                return IntentCandidate::from_definition(def, cfg.fuzzy_confidence);
            }
        }
    }
    IntentCandidate::fallback(cfg.fallback_confidence)
}

/// Pick the best candidate after boosts, breaking near-ties with the
/// historical success rate, then name for determinism.
fn rank<'a>(
    scored: &'a [ScoredIntent],
    boosts: &HashMap<String, f32>,
    stats: &FlowStats,
    cfg: &ClassifierConfig,
) -> Vec<(f32, &'a ScoredIntent)> {
    let mut ranked: Vec<(f32, &'a ScoredIntent)> = scored
        .iter()
        .map(|s| {
            let boost = boosts.get(s.definition.name).copied().unwrap_or(0.0);
            (clamp01(s.combined + boost), s)
        })
        .collect();

    ranked.sort_by(|(score_a, a), (score_b, b)| {
        score_b
            .partial_cmp(score_a)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.definition.name.cmp(b.definition.name))
    });

    // Near-tie at the top: prefer the flow with the better track record.
    if ranked.len() >= 2 && (ranked[0].0 - ranked[1].0).abs() <= cfg.tie_break_delta {
        let rate_first = stats.success_rate(ranked[0].1.definition.name);
        let rate_second = stats.success_rate(ranked[1].1.definition.name);
        if rate_second > rate_first {
            ranked.swap(0, 1);
        }
    }
    ranked
}

/// Confidence calibration. Monotone in evidence; hedging caps the result.
fn calibrate(
    mut candidate: IntentCandidate,
    text: &str,
    had_signal: bool,
    cfg: &ClassifierConfig,
) -> IntentCandidate {
    let tokens = tokenize(text);
    let token_set: HashSet<&str> = tokens.iter().map(|s| s.as_str()).collect();

    // Short messages classified Simple get a small boost: there is little
    // room for hidden complexity in three tokens.
    if candidate.category == IntentCategory::Simple && tokens.len() <= cfg.short_message_tokens {
        candidate.confidence += cfg.short_message_boost;
    }

    // Clear-indicator keywords for the chosen intent raise confidence.
    if let Some(def) = definition(&candidate.name) {
        let indicators = def
            .keywords
            .high
            .iter()
            .filter(|w| token_set.contains(&crate::classifier::normalize_word(w).as_str()))
            .count();
        if indicators >= 2 {
            candidate.confidence += cfg.multi_indicator_boost;
        } else if indicators == 1 {
            candidate.confidence += cfg.single_indicator_boost;
        }
    }

    // Hedging language caps everything.
    let text_lower = text.to_lowercase();
    if HEDGING_WORDS.iter().any(|w| text_lower.contains(w)) {
        candidate.confidence = candidate.confidence.min(cfg.hedging_cap);
    }

    if had_signal {
        candidate.confidence = candidate.confidence.max(cfg.confidence_floor);
    }
    candidate.confidence = clamp01(candidate.confidence);
    candidate
}

/// Apply business rules and calibration to the layered scores.
///
/// `boosts` maps intent name to the context boost computed before scoring.
pub fn refine(
    text: &str,
    metadata: &RequestMetadata,
    scored: Vec<ScoredIntent>,
    boosts: &HashMap<String, f32>,
    stats: &FlowStats,
    cfg: &ClassifierConfig,
) -> RefinedIntent {
    let text_lower = text.to_lowercase();
    let had_signal = scored.iter().any(|s| s.combined > cfg.candidate_floor);
    let ranked = rank(&scored, boosts, stats, cfg);

    let secondary: Vec<IntentCandidate> = ranked
        .iter()
        .skip(1)
        .take(2)
        .map(|(score, s)| candidate_from(s, *score))
        .collect();

    // Business rules, fixed priority, first match wins.

    // Rule 1: explicit command syntax.
    if is_command_syntax(text, metadata) {
        let mut primary = match ranked.first() {
            Some((_, s)) => candidate_from(s, 0.95),
            None => IntentCandidate::fallback(0.95),
        };
        primary.category = IntentCategory::Immediate;
        primary.confidence = 0.95;
        return RefinedIntent { primary, secondary };
    }

    // Rule 2: greeting vocabulary.
    let tokens: HashSet<String> = tokenize(&text_lower).into_iter().collect();
    if GREETING_WORDS.iter().any(|w| tokens.contains(*w)) {
        let def = definition("greeting").expect("greeting intent defined");
        let mut primary = IntentCandidate::from_definition(def, 0.9);
        primary.matched_evidence = GREETING_WORDS
            .iter()
            .filter(|w| tokens.contains(**w))
            .map(|w| w.to_string())
            .collect();
        return RefinedIntent {
            primary: calibrate(primary, text, true, cfg),
            secondary,
        };
    }

    // Rule 3: bare price-query phrasing.
    if is_bare_price_query(&text_lower) {
        let def = definition("price_lookup").expect("price_lookup intent defined");
        let primary = IntentCandidate::from_definition(def, 0.9);
        return RefinedIntent {
            primary: calibrate(primary, text, true, cfg),
            secondary,
        };
    }

    // Rule 4: advanced-domain vocabulary forces Complex.
    if ADVANCED_KEYWORDS.iter().any(|w| text_lower.contains(w)) {
        let mut primary = match ranked
            .iter()
            .find(|(_, s)| s.definition.category == IntentCategory::Complex)
        {
            Some((score, s)) => candidate_from(s, (score + 0.2).max(0.85)),
            None => {
                let def = definition("research").expect("research intent defined");
                IntentCandidate::from_definition(def, 0.85)
            }
        };
        primary.category = IntentCategory::Complex;
        primary.confidence = clamp01(primary.confidence.max(0.85));
        return RefinedIntent {
            primary: calibrate(primary, text, true, cfg),
            secondary,
        };
    }

    // No rule fired: take the ranked best, or fall back.
    match ranked.first() {
        Some((score, s)) if *score >= cfg.acceptance_threshold => {
            let primary = calibrate(candidate_from(s, *score), text, had_signal, cfg);
            RefinedIntent { primary, secondary }
        }
        Some(_) | None => {
            let primary = if ranked.is_empty() {
                fuzzy_fallback(text, cfg)
            } else {
                IntentCandidate::fallback(cfg.fallback_confidence)
            };
            // Hedging still caps the fallback.
            let primary = calibrate(primary, text, false, cfg);
            RefinedIntent { primary, secondary }
        }
    }
}
