//! Built-in capability handlers, tried before any metered external call.
//!
//! Handlers are registered per intent category and run in priority order;
//! the first one returning an answer short-circuits routing to Direct.
//! Handlers are local and synchronous. A handler error counts as a decline
//! and is logged, never surfaced to the user.

use hermes_core::entity::{EntityKind, ExtractedEntity};
use hermes_core::intent::{IntentCandidate, IntentCategory};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::warn;

/// Everything a handler may inspect.
pub struct CapabilityInput<'a> {
    pub user_id: &'a str,
    pub text: &'a str,
    pub primary: &'a IntentCandidate,
    pub entities: &'a [ExtractedEntity],
}

/// A locally-handled fulfillment path.
pub trait Capability: Send + Sync {
    fn name(&self) -> &'static str;

    /// Lower runs first.
    fn priority(&self) -> u8 {
        50
    }

    /// Return `Ok(Some(answer))` to short-circuit routing to Direct,
    /// `Ok(None)` to decline.
    fn try_handle(&self, input: &CapabilityInput<'_>) -> anyhow::Result<Option<String>>;

    /// Optional partial answer used as the immediate half of a Hybrid
    /// decision. Default: no partial.
    fn partial(&self, _input: &CapabilityInput<'_>) -> Option<String> {
        None
    }
}

/// Per-category handler registry.
#[derive(Default)]
pub struct CapabilityRegistry {
    handlers: HashMap<IntentCategory, Vec<Arc<dyn Capability>>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the stock handlers.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(IntentCategory::Simple, Arc::new(GreetingCapability));
        registry.register(IntentCategory::Simple, Arc::new(HelpCapability));
        registry.register(IntentCategory::Simple, Arc::new(FallbackCapability));
        let price_cache = Arc::new(PriceCacheCapability::new());
        registry.register(IntentCategory::Immediate, price_cache);
        registry
    }

    pub fn register(&mut self, category: IntentCategory, handler: Arc<dyn Capability>) {
        let handlers = self.handlers.entry(category).or_default();
        handlers.push(handler);
        handlers.sort_by_key(|h| h.priority());
    }

    /// Try every handler for `category` in priority order.
    pub fn try_category(
        &self,
        category: IntentCategory,
        input: &CapabilityInput<'_>,
    ) -> Option<String> {
        for handler in self.handlers.get(&category)? {
            match handler.try_handle(input) {
                Ok(Some(answer)) => return Some(answer),
                Ok(None) => continue,
                Err(err) => {
                    // An erroring built-in is a decline, not a failure.
                    warn!(handler = handler.name(), error = %err, "capability handler error");
                }
            }
        }
        None
    }

    /// Best partial answer any handler offers, for the Hybrid path.
    pub fn try_partial(
        &self,
        category: IntentCategory,
        input: &CapabilityInput<'_>,
    ) -> Option<String> {
        self.handlers
            .get(&category)?
            .iter()
            .find_map(|h| h.partial(input))
    }
}

// === Stock handlers ===

/// Answers greetings without touching anything external.
pub struct GreetingCapability;

impl Capability for GreetingCapability {
    fn name(&self) -> &'static str {
        "greeting"
    }

    fn priority(&self) -> u8 {
        10
    }

    fn try_handle(&self, input: &CapabilityInput<'_>) -> anyhow::Result<Option<String>> {
        if input.primary.name != "greeting" {
            return Ok(None);
        }
        Ok(Some(
            "Hello! Ask me about prices, markets, your portfolio, or set an alert."
                .to_string(),
        ))
    }
}

/// Static usage text for help requests.
pub struct HelpCapability;

impl Capability for HelpCapability {
    fn name(&self) -> &'static str {
        "help"
    }

    fn priority(&self) -> u8 {
        10
    }

    fn try_handle(&self, input: &CapabilityInput<'_>) -> anyhow::Result<Option<String>> {
        if input.primary.name != "help" {
            return Ok(None);
        }
        Ok(Some(
            "I can look up prices (\"BTC price\"), summarize the market, track your \
             portfolio, run research, and send alerts (\"alert me when ETH hits 5k\")."
                .to_string(),
        ))
    }
}

/// Catch-all for Simple intents nothing else claimed. Keeps the Simple path
/// from ever escalating.
pub struct FallbackCapability;

impl Capability for FallbackCapability {
    fn name(&self) -> &'static str {
        "fallback"
    }

    fn priority(&self) -> u8 {
        200
    }

    fn try_handle(&self, _input: &CapabilityInput<'_>) -> anyhow::Result<Option<String>> {
        Ok(Some(
            "I'm not sure what you're after. Try \"help\" to see what I can do.".to_string(),
        ))
    }
}

/// Serves price lookups from a host-fed cache; declines on a miss so the
/// router may escalate to a live provider.
pub struct PriceCacheCapability {
    prices: RwLock<HashMap<String, f64>>,
}

impl PriceCacheCapability {
    pub fn new() -> Self {
        Self { prices: RwLock::new(HashMap::new()) }
    }

    /// Host pushes fresh quotes here.
    pub fn update(&self, symbol: impl Into<String>, price: f64) {
        self.prices
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(symbol.into(), price);
    }
}

impl Default for PriceCacheCapability {
    fn default() -> Self {
        Self::new()
    }
}

impl Capability for PriceCacheCapability {
    fn name(&self) -> &'static str {
        "price_cache"
    }

    fn priority(&self) -> u8 {
        20
    }

    fn try_handle(&self, input: &CapabilityInput<'_>) -> anyhow::Result<Option<String>> {
        if input.primary.name != "price_lookup" {
            return Ok(None);
        }
        let symbol = input
            .entities
            .iter()
            .find(|e| e.kind == EntityKind::Cryptocurrency)
            .map(|e| e.normalized.clone());
        let Some(symbol) = symbol else { return Ok(None) };

        let prices = self.prices.read().unwrap_or_else(|e| e.into_inner());
        Ok(prices
            .get(&symbol)
            .map(|price| format!("{symbol} is trading at ${price:.2}")))
    }

    fn partial(&self, input: &CapabilityInput<'_>) -> Option<String> {
        let symbol = input
            .entities
            .iter()
            .find(|e| e.kind == EntityKind::Cryptocurrency)?;
        let prices = self.prices.read().unwrap_or_else(|e| e.into_inner());
        prices.get(&symbol.normalized).map(|price| {
            format!(
                "Last known: {} at ${price:.2}. Digging deeper now.",
                symbol.normalized
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input<'a>(
        primary: &'a IntentCandidate,
        entities: &'a [ExtractedEntity],
    ) -> CapabilityInput<'a> {
        CapabilityInput { user_id: "u1", text: "test", primary, entities }
    }

    fn candidate(name: &str, category: IntentCategory) -> IntentCandidate {
        let mut c = IntentCandidate::fallback(0.9);
        c.name = name.to_string();
        c.category = category;
        c
    }

    #[test]
    fn test_greeting_handled() {
        let registry = CapabilityRegistry::with_defaults();
        let primary = candidate("greeting", IntentCategory::Simple);
        let answer = registry.try_category(IntentCategory::Simple, &input(&primary, &[]));
        assert!(answer.is_some());
    }

    #[test]
    fn test_simple_always_answered() {
        // The fallback handler guarantees Simple never leaves the local path.
        let registry = CapabilityRegistry::with_defaults();
        let primary = candidate("general_query", IntentCategory::Simple);
        let answer = registry.try_category(IntentCategory::Simple, &input(&primary, &[]));
        assert!(answer.is_some());
    }

    #[test]
    fn test_price_cache_hit_and_miss() {
        let mut registry = CapabilityRegistry::new();
        let cache = Arc::new(PriceCacheCapability::new());
        cache.update("BTC", 64_250.0);
        registry.register(IntentCategory::Immediate, cache);

        let primary = candidate("price_lookup", IntentCategory::Immediate);
        let btc = ExtractedEntity {
            kind: EntityKind::Cryptocurrency,
            raw: "btc".into(),
            normalized: "BTC".into(),
            confidence: 0.9,
            span_start: 0,
            span_end: 3,
        };
        let hit = registry.try_category(IntentCategory::Immediate, &input(&primary, std::slice::from_ref(&btc)));
        assert!(hit.unwrap().contains("64250"));

        let eth = ExtractedEntity { normalized: "ETH".into(), ..btc };
        let miss = registry.try_category(IntentCategory::Immediate, &input(&primary, std::slice::from_ref(&eth)));
        assert!(miss.is_none());
    }

    #[test]
    fn test_priority_order() {
        struct Named(&'static str, u8, bool);
        impl Capability for Named {
            fn name(&self) -> &'static str {
                self.0
            }
            fn priority(&self) -> u8 {
                self.1
            }
            fn try_handle(&self, _: &CapabilityInput<'_>) -> anyhow::Result<Option<String>> {
                Ok(self.2.then(|| self.0.to_string()))
            }
        }

        let mut registry = CapabilityRegistry::new();
        registry.register(IntentCategory::Immediate, Arc::new(Named("late", 90, true)));
        registry.register(IntentCategory::Immediate, Arc::new(Named("early", 10, true)));
        let primary = candidate("price_lookup", IntentCategory::Immediate);
        let answer = registry.try_category(IntentCategory::Immediate, &input(&primary, &[]));
        assert_eq!(answer.as_deref(), Some("early"));
    }

    #[test]
    fn test_erroring_handler_is_a_decline() {
        struct Broken;
        impl Capability for Broken {
            fn name(&self) -> &'static str {
                "broken"
            }
            fn priority(&self) -> u8 {
                1
            }
            fn try_handle(&self, _: &CapabilityInput<'_>) -> anyhow::Result<Option<String>> {
                anyhow::bail!("boom")
            }
        }

        let mut registry = CapabilityRegistry::new();
        registry.register(IntentCategory::Simple, Arc::new(Broken));
        registry.register(IntentCategory::Simple, Arc::new(FallbackCapability));
        let primary = candidate("general_query", IntentCategory::Simple);
        let answer = registry.try_category(IntentCategory::Simple, &input(&primary, &[]));
        assert!(answer.is_some());
    }
}
