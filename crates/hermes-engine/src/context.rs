//! Per-user conversation context and preference learning.
//!
//! One context per user id, created lazily on the first message. Mutation is
//! serialized per user through an `Arc<tokio::sync::Mutex<_>>` held in an LRU
//! map, so concurrent messages from one user never lose updates while
//! different users never contend. Whole contexts evict LRU once
//! `max_tracked_users` is reached; an evicted user simply starts fresh.
//!
//! Context is read before scoring (to compute ranking boosts) and written
//! after the final decision.

use chrono::{DateTime, Utc};
use hermes_core::config::ContextConfig;
use hermes_core::entity::{EntityKind, ExtractedEntity};
use hermes_core::intent::IntentCategory;
use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// One recorded conversation turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub intent: String,
    pub category: IntentCategory,
    /// First characters of the message, enough for debugging
    pub excerpt: String,
    pub at: DateTime<Utc>,
}

/// A previously mentioned entity with recency bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MentionedEntity {
    pub entity: ExtractedEntity,
    pub mentions: u32,
    pub last_seen: DateTime<Utc>,
}

/// A learned preference with a reinforcement weight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preference {
    pub value: String,
    pub weight: f32,
}

/// Rolling per-user state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationContext {
    pub user_id: String,
    pub recent_turns: VecDeque<ConversationTurn>,
    pub mentioned_entities: HashMap<String, MentionedEntity>,
    /// Last subject-like entity seen (cryptocurrency or explicit subject)
    pub current_topic: Option<String>,
    pub preferences: HashMap<String, Preference>,
    pub session_start: DateTime<Utc>,
    pub last_interaction: DateTime<Utc>,
}

impl ConversationContext {
    pub fn new(user_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            user_id: user_id.into(),
            recent_turns: VecDeque::new(),
            mentioned_entities: HashMap::new(),
            current_topic: None,
            preferences: HashMap::new(),
            session_start: now,
            last_interaction: now,
        }
    }

    /// Ranking boost for one candidate, capped at `cfg.max_total_boost`.
    pub fn boost_for(
        &self,
        intent_name: &str,
        category: IntentCategory,
        message_entities: &[ExtractedEntity],
        cfg: &ContextConfig,
    ) -> f32 {
        let mut boost = 0.0;

        // Topic continuity: the conversation stays in the same category.
        if self
            .recent_turns
            .back()
            .map(|t| t.category == category)
            .unwrap_or(false)
        {
            boost += cfg.topic_continuity_boost;
        }

        // Reused entities tie the message to the running conversation.
        for entity in message_entities {
            if self.mentioned_entities.contains_key(&entity.mention_key()) {
                boost += cfg.entity_reuse_boost;
            }
        }

        // Same intent seen in the recent window.
        if self
            .recent_turns
            .iter()
            .rev()
            .take(cfg.repeated_intent_window)
            .any(|t| t.intent == intent_name)
        {
            boost += cfg.repeated_intent_boost;
        }

        boost.min(cfg.max_total_boost)
    }

    /// Append a turn and fold the message into entities, topic, preferences.
    pub fn record_turn(
        &mut self,
        text: &str,
        intent_name: &str,
        category: IntentCategory,
        entities: &[ExtractedEntity],
        cfg: &ContextConfig,
    ) {
        let now = Utc::now();
        self.last_interaction = now;

        self.recent_turns.push_back(ConversationTurn {
            intent: intent_name.to_string(),
            category,
            excerpt: text.chars().take(80).collect(),
            at: now,
        });
        while self.recent_turns.len() > cfg.max_recent_turns {
            self.recent_turns.pop_front();
        }

        for entity in entities {
            let slot = self
                .mentioned_entities
                .entry(entity.mention_key())
                .or_insert_with(|| MentionedEntity {
                    entity: entity.clone(),
                    mentions: 0,
                    last_seen: now,
                });
            slot.mentions += 1;
            slot.last_seen = now;

            // Topic follows the latest subject-like entity.
            if matches!(entity.kind, EntityKind::Cryptocurrency | EntityKind::Subject) {
                self.current_topic = Some(entity.normalized.clone());
            }

            // Repeated interest in a symbol becomes a preference.
            if entity.kind == EntityKind::Cryptocurrency && slot.mentions >= 2 {
                self.reinforce_preference(
                    format!("interest:{}", entity.normalized),
                    entity.normalized.clone(),
                    cfg,
                );
            }
        }
        self.prune_mentions(cfg);

        // Polite phrasing is a tone preference.
        let lower = text.to_lowercase();
        if lower.contains("please") || lower.contains("thank") {
            self.reinforce_preference("tone:polite".to_string(), "polite".to_string(), cfg);
        }
    }

    /// Insert at base weight or reinforce an existing key. No decay; weights
    /// saturate at `cfg.max_preference_weight`.
    fn reinforce_preference(&mut self, key: String, value: String, cfg: &ContextConfig) {
        let pref = self
            .preferences
            .entry(key)
            .or_insert_with(|| Preference { value, weight: 0.0 });
        pref.weight = (pref.weight + 1.0).min(cfg.max_preference_weight);
    }

    fn prune_mentions(&mut self, cfg: &ContextConfig) {
        while self.mentioned_entities.len() > cfg.max_mentioned_entities {
            let oldest = self
                .mentioned_entities
                .iter()
                .min_by_key(|(_, m)| m.last_seen)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(key) => {
                    self.mentioned_entities.remove(&key);
                }
                None => break,
            }
        }
    }
}

pub type SharedContext = Arc<tokio::sync::Mutex<ConversationContext>>;

/// Bounded map of per-user contexts.
///
/// The outer `std::sync::Mutex` only guards the LRU lookup and is never held
/// across an await; per-user serialization happens on the inner tokio mutex.
pub struct ContextStore {
    users: Mutex<LruCache<String, SharedContext>>,
    cfg: ContextConfig,
}

impl ContextStore {
    pub fn new(cfg: ContextConfig) -> Self {
        let capacity = NonZeroUsize::new(cfg.max_tracked_users.max(1))
            .unwrap_or_else(|| NonZeroUsize::new(1).expect("1 is non-zero"));
        Self { users: Mutex::new(LruCache::new(capacity)), cfg }
    }

    pub fn config(&self) -> &ContextConfig {
        &self.cfg
    }

    /// Fetch the shared handle for a user, creating a fresh context if the
    /// user is new or was evicted. `restore` supplies a previously persisted
    /// context, if any; a corrupt or missing snapshot means a fresh start.
    pub fn get_or_create(
        &self,
        user_id: &str,
        restore: Option<ConversationContext>,
    ) -> SharedContext {
        let mut users = self.users.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = users.get(user_id) {
            return existing.clone();
        }
        let context = match restore {
            Some(snapshot) if snapshot.user_id == user_id => snapshot,
            Some(_) => {
                debug!(user_id, "snapshot user mismatch, starting fresh context");
                ConversationContext::new(user_id)
            }
            None => ConversationContext::new(user_id),
        };
        let shared: SharedContext = Arc::new(tokio::sync::Mutex::new(context));
        users.put(user_id.to_string(), shared.clone());
        shared
    }

    /// Fetch a user's handle without creating one.
    pub fn peek(&self, user_id: &str) -> Option<SharedContext> {
        let mut users = self.users.lock().unwrap_or_else(|e| e.into_inner());
        users.get(user_id).cloned()
    }

    /// Number of currently tracked users.
    pub fn tracked_users(&self) -> usize {
        self.users.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
