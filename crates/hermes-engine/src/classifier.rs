//! Multi-layer intent scoring.
//!
//! Two independent layers per intent definition:
//! - Pattern layer: trigger phrases matched as substrings. Longer phrases
//!   carry more specificity, and multiple distinct matches raise the score
//!   beyond a single match, bounded at 1.0.
//! - Semantic layer: three keyword tiers (high/medium/low), normalized by the
//!   maximum achievable score for that intent so scores stay comparable
//!   across intents with different vocabulary sizes.
//!
//! The layers combine as `w_p * pattern + w_s * semantic` (default 0.6/0.4).
//! Only candidates above the configured floor survive; refinement and
//! calibration happen afterwards in `refiner`.

use hermes_core::config::ClassifierConfig;
use hermes_core::intent::{IntentDefinition, KeywordTiers, INTENT_DEFINITIONS};
use std::collections::HashSet;

const TIER_HIGH_WEIGHT: f32 = 1.0;
const TIER_MEDIUM_WEIGHT: f32 = 0.6;
const TIER_LOW_WEIGHT: f32 = 0.3;

/// One intent with raw layer scores, before refinement.
#[derive(Debug, Clone)]
pub struct ScoredIntent {
    pub definition: &'static IntentDefinition,
    pub pattern_score: f32,
    pub semantic_score: f32,
    pub combined: f32,
    pub evidence: Vec<String>,
}

/// Normalize a word: strip punctuation and fold simple plurals.
pub fn normalize_word(word: &str) -> String {
    let cleaned: String = word
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect();
    if cleaned.ends_with('s') && cleaned.len() > 3 {
        cleaned[..cleaned.len() - 1].to_string()
    } else {
        cleaned
    }
}

/// Tokenize into normalized words. Empty tokens are dropped.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(normalize_word)
        .filter(|w| !w.is_empty())
        .collect()
}

/// Pattern-layer score for one definition.
///
/// Each matched trigger contributes `weight * specificity`, where specificity
/// grows with phrase word count. The final score is the best contribution
/// plus a damped share of the rest, clamped to 1.0.
fn pattern_score(def: &IntentDefinition, text_lower: &str) -> (f32, Vec<String>) {
    let mut contributions: Vec<f32> = Vec::new();
    let mut evidence = Vec::new();

    for (phrase, weight) in def.triggers {
        if text_lower.contains(phrase) {
            let words = phrase.split_whitespace().count() as f32;
            let specificity = 0.6 + 0.1 * words.min(4.0);
            contributions.push(weight * specificity);
            evidence.push((*phrase).to_string());
        }
    }

    if contributions.is_empty() {
        return (0.0, evidence);
    }

    contributions.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
    let best = contributions[0];
    let rest: f32 = contributions[1..].iter().sum();
    ((best + 0.2 * rest).min(1.0), evidence)
}

fn tier_hits(tier: &[&str], tokens: &HashSet<String>) -> Vec<String> {
    tier.iter()
        .filter(|w| tokens.contains(&normalize_word(w)))
        .map(|w| (*w).to_string())
        .collect()
}

/// Semantic-layer score for one definition, normalized by the maximum
/// achievable score of its tier table.
fn semantic_score(keywords: &KeywordTiers, tokens: &HashSet<String>) -> (f32, Vec<String>) {
    let high = tier_hits(keywords.high, tokens);
    let medium = tier_hits(keywords.medium, tokens);
    let low = tier_hits(keywords.low, tokens);

    let achieved = high.len() as f32 * TIER_HIGH_WEIGHT
        + medium.len() as f32 * TIER_MEDIUM_WEIGHT
        + low.len() as f32 * TIER_LOW_WEIGHT;

    // Normalize against a saturating maximum: three high hits already count
    // as full evidence, so large vocabularies are not penalized.
    let achievable = (keywords.high.len().min(3) as f32 * TIER_HIGH_WEIGHT
        + keywords.medium.len().min(2) as f32 * TIER_MEDIUM_WEIGHT
        + keywords.low.len().min(2) as f32 * TIER_LOW_WEIGHT)
        .max(1.0);

    let mut evidence = high;
    evidence.extend(medium);
    evidence.extend(low);
    ((achieved / achievable).min(1.0), evidence)
}

/// Score every defined intent against `text`. Candidates below
/// `cfg.candidate_floor` are discarded. Deterministic: output is sorted by
/// combined score descending, ties broken by intent name.
pub fn classify(text: &str, cfg: &ClassifierConfig) -> Vec<ScoredIntent> {
    let text_lower = text.to_lowercase();
    let tokens: HashSet<String> = tokenize(&text_lower).into_iter().collect();

    let mut scored: Vec<ScoredIntent> = Vec::new();
    for def in INTENT_DEFINITIONS.iter() {
        let (p_score, mut p_evidence) = pattern_score(def, &text_lower);
        let (s_score, s_evidence) = semantic_score(&def.keywords, &tokens);
        let combined = cfg.pattern_weight * p_score + cfg.semantic_weight * s_score;
        if combined <= cfg.candidate_floor {
            continue;
        }
        p_evidence.extend(s_evidence);
        p_evidence.dedup();
        scored.push(ScoredIntent {
            definition: def,
            pattern_score: p_score,
            semantic_score: s_score,
            combined,
            evidence: p_evidence,
        });
    }

    scored.sort_by(|a, b| {
        b.combined
            .partial_cmp(&a.combined)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.definition.name.cmp(b.definition.name))
    });
    scored
}
