//! Entity extraction from raw message text.
//!
//! A precompiled table of `(kind, pattern, confidence)` triples evaluated in
//! registration order. Total function: empty or garbage input yields an empty
//! vector, never an error. Matches are normalized through the alias table in
//! `hermes_core::entity` before being returned.

use hermes_core::entity::{normalize_exchange, normalize_symbol, EntityKind, ExtractedEntity};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

struct EntityPattern {
    kind: EntityKind,
    regex: Regex,
    confidence: f32,
}

/// Registration order matters: earlier patterns win span+kind collisions.
static ENTITY_PATTERNS: Lazy<Vec<EntityPattern>> = Lazy::new(|| {
    let table: &[(EntityKind, &str, f32)] = &[
        (
            EntityKind::Cryptocurrency,
            r"(?i)\b(btc|xbt|bitcoin|eth|ethereum|ether|sol|solana|doge|dogecoin|ada|cardano|xrp|ripple|dot|polkadot|matic|polygon|avax|avalanche|link|chainlink|usdt|tether|usdc|bnb|ltc|litecoin)\b",
            0.9,
        ),
        // Uppercase 2-5 letter tickers ("PEPE", "ARB") are weaker evidence.
        (EntityKind::Cryptocurrency, r"\$([A-Z]{2,5})\b", 0.8),
        // No trailing \b: "%" next to whitespace or end of input has no
        // word boundary to anchor on.
        (EntityKind::Percentage, r"(?i)\b(\d+(?:\.\d+)?)\s*(?:%|percent\b)", 0.9),
        (EntityKind::Amount, r"(?i)[$€£]\s?\d[\d,]*(?:\.\d+)?[kmb]?\b", 0.85),
        (EntityKind::Amount, r"(?i)\b\d[\d,]*(?:\.\d+)?\s?(?:usd|dollars?|eur)\b", 0.85),
        (EntityKind::Duration, r"(?i)\b(?:for|in|within|every)\s+\d+\s*(?:seconds?|secs?|minutes?|mins?|hours?|hrs?|days?|weeks?)\b", 0.8),
        (EntityKind::Timeframe, r"(?i)\b(1m|5m|15m|30m|1h|4h|12h|1d|1w|1M|daily|weekly|monthly|hourly)\b", 0.8),
        (EntityKind::WalletAddress, r"\b0x[a-fA-F0-9]{40}\b", 0.95),
        (EntityKind::WalletAddress, r"\b[13][a-km-zA-HJ-NP-Z1-9]{25,34}\b", 0.8),
        (
            EntityKind::Exchange,
            r"(?i)\b(binance|coinbase|kraken|bybit|okx|bitfinex|gemini|uniswap|sushiswap|curve)\b",
            0.85,
        ),
        (EntityKind::Url, r"https?://[^\s]+", 0.9),
    ];
    table
        .iter()
        .map(|(kind, pattern, confidence)| EntityPattern {
            kind: *kind,
            // Patterns are static and covered by tests; a bad literal is a bug.
            regex: Regex::new(pattern).expect("invalid entity pattern"),
            confidence: *confidence,
        })
        .collect()
});

fn normalize(kind: EntityKind, raw: &str) -> String {
    match kind {
        EntityKind::Cryptocurrency => normalize_symbol(raw.trim_start_matches('$')),
        EntityKind::Exchange => normalize_exchange(raw),
        EntityKind::Percentage | EntityKind::Amount => {
            raw.to_lowercase().replace([',', ' '], "")
        }
        EntityKind::Timeframe | EntityKind::Duration => raw.to_lowercase(),
        EntityKind::WalletAddress | EntityKind::Subject | EntityKind::Url => raw.to_string(),
    }
}

/// Extract all entities from `text`. Never fails; `[]` for empty input.
pub fn extract(text: &str) -> Vec<ExtractedEntity> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let mut seen: HashSet<(EntityKind, usize, usize)> = HashSet::new();
    let mut entities = Vec::new();

    for pattern in ENTITY_PATTERNS.iter() {
        for m in pattern.regex.find_iter(text) {
            let key = (pattern.kind, m.start(), m.end());
            if !seen.insert(key) {
                continue;
            }
            let raw = m.as_str().to_string();
            let normalized = normalize(pattern.kind, &raw);
            entities.push(ExtractedEntity {
                kind: pattern.kind,
                raw,
                normalized,
                confidence: pattern.confidence,
                span_start: m.start(),
                span_end: m.end(),
            });
        }
    }

    entities
}
