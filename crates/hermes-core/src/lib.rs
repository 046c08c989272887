//! Shared types and tables for the Hermes intent engine.
//!
//! Everything in this crate is synchronous and allocation-light: entity and
//! intent definitions, sentiment lexicons, the analysis result types, the
//! engine configuration, and the error enum. The async pipeline lives in
//! `hermes-engine`.

pub mod analysis;
pub mod config;
pub mod entity;
pub mod error;
pub mod feedback;
pub mod intent;
pub mod sentiment;

pub use analysis::{IntentAnalysis, RequestMetadata, RoutingDecision, RoutingStrategy};
pub use config::EngineConfig;
pub use entity::{EntityKind, ExtractedEntity};
pub use error::EngineError;
pub use feedback::{FlowStats, PerformanceRecord};
pub use intent::{IntentCandidate, IntentCategory, IntentDefinition};
pub use sentiment::{SentimentLabel, SentimentProfile};
