//! Typed entities extracted from user messages.
//!
//! Entities are produced by the extractor in `hermes-engine` and carried on
//! every `IntentAnalysis`. Normalization is centralized here so that "btc",
//! "Bitcoin" and "BITCOIN" all compare equal downstream.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Entity kinds the extractor knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Cryptocurrency symbol or name ("BTC", "ethereum")
    Cryptocurrency,
    /// Numeric amount, possibly with unit ("1.5", "$300")
    Amount,
    /// Percentage ("5%", "up 12 percent")
    Percentage,
    /// Duration ("for 2 hours", "in 30 minutes")
    Duration,
    /// Market timeframe ("1h", "daily", "weekly")
    Timeframe,
    /// Wallet address (hex or base58-looking token)
    WalletAddress,
    /// Exchange name ("binance", "coinbase")
    Exchange,
    /// Conversation subject used for topic tracking
    Subject,
    /// URL mentioned in the message
    Url,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cryptocurrency => "cryptocurrency",
            Self::Amount => "amount",
            Self::Percentage => "percentage",
            Self::Duration => "duration",
            Self::Timeframe => "timeframe",
            Self::WalletAddress => "wallet_address",
            Self::Exchange => "exchange",
            Self::Subject => "subject",
            Self::Url => "url",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A typed, normalized value extracted from message text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedEntity {
    pub kind: EntityKind,
    /// Verbatim matched text
    pub raw: String,
    /// Canonical form ("bitcoin" -> "BTC")
    pub normalized: String,
    /// Extraction confidence declared by the matching pattern
    pub confidence: f32,
    /// Byte offset of the match start in the source text
    pub span_start: usize,
    /// Byte offset one past the match end
    pub span_end: usize,
}

impl ExtractedEntity {
    /// Key used for deduplication and mention tracking: kind + normalized value.
    pub fn mention_key(&self) -> String {
        format!("{}:{}", self.kind, self.normalized)
    }
}

/// Alias table mapping common names and tickers to canonical symbols.
static SYMBOL_ALIASES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    let mut m = HashMap::new();
    for (alias, canonical) in [
        ("btc", "BTC"),
        ("xbt", "BTC"),
        ("bitcoin", "BTC"),
        ("eth", "ETH"),
        ("ethereum", "ETH"),
        ("ether", "ETH"),
        ("sol", "SOL"),
        ("solana", "SOL"),
        ("doge", "DOGE"),
        ("dogecoin", "DOGE"),
        ("ada", "ADA"),
        ("cardano", "ADA"),
        ("xrp", "XRP"),
        ("ripple", "XRP"),
        ("dot", "DOT"),
        ("polkadot", "DOT"),
        ("matic", "MATIC"),
        ("polygon", "MATIC"),
        ("avax", "AVAX"),
        ("avalanche", "AVAX"),
        ("link", "LINK"),
        ("chainlink", "LINK"),
        ("usdt", "USDT"),
        ("tether", "USDT"),
        ("usdc", "USDC"),
        ("bnb", "BNB"),
        ("ltc", "LTC"),
        ("litecoin", "LTC"),
    ] {
        m.insert(alias, canonical);
    }
    m
});

/// Normalize a cryptocurrency mention to its canonical symbol.
///
/// Unknown symbols are uppercased as-is so they still compare consistently.
pub fn normalize_symbol(raw: &str) -> String {
    let key = raw.trim().to_lowercase();
    match SYMBOL_ALIASES.get(key.as_str()) {
        Some(canonical) => (*canonical).to_string(),
        None => key.to_uppercase(),
    }
}

/// Normalize an exchange mention (lowercased canonical name).
pub fn normalize_exchange(raw: &str) -> String {
    raw.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alias_invariance() {
        assert_eq!(normalize_symbol("btc"), "BTC");
        assert_eq!(normalize_symbol("BITCOIN"), "BTC");
        assert_eq!(normalize_symbol("Bitcoin"), "BTC");
        assert_eq!(normalize_symbol("xbt"), "BTC");
    }

    #[test]
    fn test_unknown_symbol_uppercased() {
        assert_eq!(normalize_symbol("pepe"), "PEPE");
    }

    #[test]
    fn test_mention_key() {
        let e = ExtractedEntity {
            kind: EntityKind::Cryptocurrency,
            raw: "bitcoin".to_string(),
            normalized: "BTC".to_string(),
            confidence: 0.9,
            span_start: 0,
            span_end: 7,
        };
        assert_eq!(e.mention_key(), "cryptocurrency:BTC");
    }
}
