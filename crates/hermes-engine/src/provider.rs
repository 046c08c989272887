//! Metered access to external completion providers.
//!
//! Every external call passes the rate gateway first and runs under a
//! deadline. Callers see typed errors (`BudgetExhausted`, `Timeout`,
//! `Provider`) and decide whether to fall back to a built-in answer.

use crate::gateway::RateGateway;
use crate::persistence::BoxFuture;
use hermes_core::EngineError;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// An external service that answers prompts and bills by token.
pub trait ExternalProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Estimated token cost of the call, charged against the budget before
    /// the call is made.
    fn estimated_cost(&self, prompt: &str) -> u64;

    fn complete<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, anyhow::Result<String>>;
}

/// Wraps a provider with budget admission and a per-call deadline.
pub struct MeteredClient {
    provider: Arc<dyn ExternalProvider>,
    gateway: Arc<RateGateway>,
    timeout: Duration,
}

impl MeteredClient {
    pub fn new(
        provider: Arc<dyn ExternalProvider>,
        gateway: Arc<RateGateway>,
        timeout: Duration,
    ) -> Self {
        Self { provider, gateway, timeout }
    }

    /// Run one metered call. The budget is reserved before the call and is
    /// not refunded on failure.
    pub async fn call(&self, prompt: &str) -> Result<String, EngineError> {
        let cost = self.provider.estimated_cost(prompt);
        self.gateway.try_admit(cost).await?;
        debug!(provider = self.provider.name(), cost, "external call admitted");

        match tokio::time::timeout(self.timeout, self.provider.complete(prompt)).await {
            Ok(Ok(answer)) => Ok(answer),
            Ok(Err(err)) => {
                warn!(provider = self.provider.name(), error = %err, "provider call failed");
                Err(EngineError::Provider(err.to_string()))
            }
            Err(_) => {
                warn!(provider = self.provider.name(), "provider call timed out");
                Err(EngineError::Timeout { stage: "provider" })
            }
        }
    }
}

/// Offline provider used when no real backend is configured. Produces a
/// templated answer without network access, still metered like a real call.
pub struct EchoProvider {
    cost_per_call: u64,
}

impl EchoProvider {
    pub fn new(cost_per_call: u64) -> Self {
        Self { cost_per_call }
    }
}

impl Default for EchoProvider {
    fn default() -> Self {
        Self::new(500)
    }
}

impl ExternalProvider for EchoProvider {
    fn name(&self) -> &str {
        "echo"
    }

    fn estimated_cost(&self, prompt: &str) -> u64 {
        // Rough token estimate: 4 bytes per token, plus a flat response cost.
        (prompt.len() as u64 / 4) + self.cost_per_call
    }

    fn complete<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, anyhow::Result<String>> {
        Box::pin(async move {
            let head: String = prompt.chars().take(80).collect();
            Ok(format!("Here's what I found about \"{head}\"."))
        })
    }
}
