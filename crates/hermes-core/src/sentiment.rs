//! Lexicon-based sentiment scoring.
//!
//! One profile is derived per message. Scoring is purely word-list driven, no
//! model involved: the compound score is the signed fraction of polarity
//! words among all tokens, and emotion scores count hits in small per-emotion
//! lexicons tuned for market chatter (fear/greed vocabulary).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SentimentLabel {
    Positive,
    Negative,
    Neutral,
}

impl SentimentLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Negative => "negative",
            Self::Neutral => "neutral",
        }
    }
}

/// Per-message sentiment profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentimentProfile {
    pub label: SentimentLabel,
    /// Overall polarity in [-1, 1]
    pub compound: f32,
    pub positive: f32,
    pub negative: f32,
    pub neutral: f32,
    /// Emotion intensities in [0, 1], keyed by emotion name
    pub emotions: HashMap<String, f32>,
}

impl SentimentProfile {
    /// Neutral profile for empty or unscorable input.
    pub fn neutral() -> Self {
        Self {
            label: SentimentLabel::Neutral,
            compound: 0.0,
            positive: 0.0,
            negative: 0.0,
            neutral: 1.0,
            emotions: HashMap::new(),
        }
    }

    /// Urgency emotion intensity, used by the routing selector.
    pub fn urgency(&self) -> f32 {
        self.emotions.get("urgency").copied().unwrap_or(0.0)
    }
}

const POSITIVE_WORDS: &[&str] = &[
    "good", "great", "awesome", "nice", "love", "excellent", "bullish", "pump",
    "moon", "profit", "gain", "win", "thanks", "happy", "up",
];

const NEGATIVE_WORDS: &[&str] = &[
    "bad", "terrible", "awful", "hate", "bearish", "dump", "crash", "loss",
    "lose", "scam", "rug", "down", "worried", "angry", "rekt",
];

const EMOTION_LEXICON: &[(&str, &[&str])] = &[
    ("fear", &["afraid", "scared", "worried", "panic", "crash", "fear", "risk"]),
    ("greed", &["moon", "lambo", "rich", "pump", "fomo", "gains", "10x"]),
    ("excitement", &["wow", "amazing", "incredible", "huge", "excited", "finally"]),
    ("confusion", &["confused", "unclear", "understand", "what", "why", "how"]),
    ("urgency", &["now", "urgent", "quick", "quickly", "immediately", "asap", "fast", "hurry"]),
];

/// Score a message. Total function: returns a neutral profile for empty input.
pub fn analyze(text: &str) -> SentimentProfile {
    let tokens: Vec<String> = text
        .to_lowercase()
        .split_whitespace()
        .map(|w| w.chars().filter(|c| c.is_alphanumeric()).collect::<String>())
        .filter(|w| !w.is_empty())
        .collect();

    if tokens.is_empty() {
        return SentimentProfile::neutral();
    }

    let total = tokens.len() as f32;
    let pos_hits = tokens.iter().filter(|t| POSITIVE_WORDS.contains(&t.as_str())).count() as f32;
    let neg_hits = tokens.iter().filter(|t| NEGATIVE_WORDS.contains(&t.as_str())).count() as f32;

    let positive = pos_hits / total;
    let negative = neg_hits / total;
    let neutral = (1.0 - positive - negative).max(0.0);
    let compound = ((pos_hits - neg_hits) / total).clamp(-1.0, 1.0);

    let label = if compound > 0.05 {
        SentimentLabel::Positive
    } else if compound < -0.05 {
        SentimentLabel::Negative
    } else {
        SentimentLabel::Neutral
    };

    let mut emotions = HashMap::new();
    for (emotion, words) in EMOTION_LEXICON {
        let hits = tokens.iter().filter(|t| words.contains(&t.as_str())).count() as f32;
        if hits > 0.0 {
            // Two hits saturate an emotion; one hit registers at half strength.
            emotions.insert(emotion.to_string(), (hits / 2.0).min(1.0));
        }
    }

    SentimentProfile { label, compound, positive, negative, neutral, emotions }
}
