//! Hermes intent understanding and adaptive routing engine.
//!
//! Pipeline per message: entity extraction, pattern and semantic scoring,
//! business-rule refinement with context boosts, then strategy selection.
//! Built-in capabilities are tried before any metered external call, which
//! is admitted through a shared trailing-window token budget. Outcomes feed
//! a rolling success rate that biases future ranking.

pub mod capability;
pub mod classifier;
pub mod context;
pub mod dispatch;
pub mod engine;
pub mod extractor;
pub mod feedback;
pub mod gateway;
pub mod persistence;
pub mod provider;
pub mod refiner;
pub mod router;

pub use engine::{Engine, EngineBuilder};
pub use hermes_core::{
    EngineConfig, EngineError, EntityKind, ExtractedEntity, IntentAnalysis, IntentCandidate,
    IntentCategory, RequestMetadata, RoutingDecision, RoutingStrategy, SentimentProfile,
};
