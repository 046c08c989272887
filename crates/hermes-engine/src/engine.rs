//! The engine facade: one analysis pipeline and one execution surface.
//!
//! `analyze` is the read side: extract entities, score sentiment, classify,
//! refine with conversation context, and plan a route. `handle` runs the
//! full flow and returns the routing decision alongside the analysis.
//! Built-ins answer first; the metered provider is the escalation path.

use crate::capability::{CapabilityInput, CapabilityRegistry};
use crate::classifier;
use crate::context::ContextStore;
use crate::dispatch::{DeliverySink, JobPool, JobRequest, SubscriptionManager};
use crate::extractor;
use crate::feedback::{FeedbackHandle, FeedbackRecorder};
use crate::gateway::RateGateway;
use crate::persistence::{ContextBackend, FeedbackSink, NullBackend};
use crate::provider::{EchoProvider, ExternalProvider, MeteredClient};
use crate::refiner;
use crate::router;
use hermes_core::config::EngineConfig;
use hermes_core::feedback::PerformanceRecord;
use hermes_core::sentiment;
use hermes_core::{
    EngineError, IntentAnalysis, RequestMetadata, RoutingDecision, RoutingStrategy,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Default sink that just logs deliveries. Hosts replace this with a real
/// channel back to the user.
pub struct LoggingSink;

impl DeliverySink for LoggingSink {
    fn deliver(&self, user_id: &str, flow_ref: &str, message: &str) {
        info!(user_id, flow_ref, message, "async result ready");
    }
}

pub struct EngineBuilder {
    config: EngineConfig,
    capabilities: CapabilityRegistry,
    provider: Arc<dyn ExternalProvider>,
    backend: Arc<dyn ContextBackend>,
    feedback_sink: Arc<dyn FeedbackSink>,
    delivery: Arc<dyn DeliverySink>,
}

impl EngineBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            capabilities: CapabilityRegistry::with_defaults(),
            provider: Arc::new(EchoProvider::default()),
            backend: Arc::new(NullBackend),
            feedback_sink: Arc::new(NullBackend),
            delivery: Arc::new(LoggingSink),
        }
    }

    pub fn capabilities(mut self, registry: CapabilityRegistry) -> Self {
        self.capabilities = registry;
        self
    }

    pub fn provider(mut self, provider: Arc<dyn ExternalProvider>) -> Self {
        self.provider = provider;
        self
    }

    pub fn context_backend(mut self, backend: Arc<dyn ContextBackend>) -> Self {
        self.backend = backend;
        self
    }

    pub fn feedback_sink(mut self, sink: Arc<dyn FeedbackSink>) -> Self {
        self.feedback_sink = sink;
        self
    }

    pub fn delivery(mut self, sink: Arc<dyn DeliverySink>) -> Self {
        self.delivery = sink;
        self
    }

    pub fn build(self) -> Engine {
        let recorder = FeedbackRecorder::spawn(self.config.feedback.clone(), self.feedback_sink);
        let feedback = recorder.handle();
        let gateway = Arc::new(RateGateway::new(self.config.rate_budget.clone()));
        let client = Arc::new(MeteredClient::new(
            self.provider,
            gateway.clone(),
            Duration::from_millis(self.config.routing.direct_timeout_ms),
        ));
        let jobs = JobPool::spawn(
            self.config.dispatch.clone(),
            self.delivery.clone(),
            feedback.clone(),
        );
        let subscriptions = SubscriptionManager::new(self.config.dispatch.clone(), self.delivery);

        Engine {
            contexts: ContextStore::new(self.config.context.clone()),
            capabilities: self.capabilities,
            gateway,
            client,
            jobs,
            subscriptions,
            recorder,
            feedback,
            backend: self.backend,
            config: self.config,
        }
    }
}

pub struct Engine {
    config: EngineConfig,
    contexts: ContextStore,
    capabilities: CapabilityRegistry,
    gateway: Arc<RateGateway>,
    client: Arc<MeteredClient>,
    jobs: JobPool,
    subscriptions: Arc<SubscriptionManager>,
    recorder: FeedbackRecorder,
    feedback: FeedbackHandle,
    backend: Arc<dyn ContextBackend>,
}

impl Engine {
    pub fn builder(config: EngineConfig) -> EngineBuilder {
        EngineBuilder::new(config)
    }

    pub fn with_defaults() -> Self {
        EngineBuilder::new(EngineConfig::default()).build()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn feedback(&self) -> FeedbackHandle {
        self.feedback.clone()
    }

    pub fn subscriptions(&self) -> &Arc<SubscriptionManager> {
        &self.subscriptions
    }

    /// Remaining budget tokens in the current window.
    pub async fn budget_available(&self) -> u64 {
        self.gateway.available().await
    }

    /// Number of users with a live conversation context.
    pub fn tracked_users(&self) -> usize {
        self.contexts.tracked_users()
    }

    /// Point-in-time copy of a user's conversation context, if tracked.
    pub async fn context_snapshot(
        &self,
        user_id: &str,
    ) -> Option<crate::context::ConversationContext> {
        let shared = self.contexts.peek(user_id)?;
        let ctx = shared.lock().await;
        Some(ctx.clone())
    }

    /// Analyze one message without executing it: entity extraction,
    /// sentiment, layered classification, context-aware refinement, and the
    /// route plan. Updates the user's conversation context as a side effect.
    pub async fn analyze(
        &self,
        user_id: &str,
        text: &str,
        metadata: &RequestMetadata,
    ) -> IntentAnalysis {
        let entities = extractor::extract(text);
        let sentiment = sentiment::analyze(text);
        let scored = classifier::classify(text, &self.config.classifier);

        // The backend is only consulted on a cache miss; a tracked user's
        // live context is always fresher than any snapshot.
        let shared = match self.contexts.peek(user_id) {
            Some(shared) => shared,
            None => {
                let snapshot = match self.backend.load(user_id).await {
                    Ok(snapshot) => snapshot,
                    Err(err) => {
                        warn!(user_id, error = %err, "context load failed, starting fresh");
                        None
                    }
                };
                self.contexts.get_or_create(user_id, snapshot)
            }
        };
        let stats = self.feedback.stats_snapshot();

        let (refined, plan, saved) = {
            let mut ctx = shared.lock().await;
            let boosts: HashMap<String, f32> = scored
                .iter()
                .map(|s| {
                    let boost = ctx.boost_for(
                        s.definition.name,
                        s.definition.category,
                        &entities,
                        &self.config.context,
                    );
                    (s.definition.name.to_string(), boost)
                })
                .collect();

            let refined = refiner::refine(
                text,
                metadata,
                scored,
                &boosts,
                &stats,
                &self.config.classifier,
            );
            let plan = router::plan(
                text,
                &refined.primary,
                &sentiment,
                &entities,
                &self.config.routing,
            );

            ctx.record_turn(
                text,
                &refined.primary.name,
                refined.primary.category,
                &entities,
                &self.config.context,
            );
            (refined, plan, ctx.clone())
        };

        // Snapshot persistence is best-effort; a failed store never blocks
        // the response.
        if let Err(err) = self.backend.store(&saved).await {
            warn!(user_id, error = %err, "context store failed");
        }

        debug!(
            user_id,
            intent = %refined.primary.name,
            confidence = refined.primary.confidence,
            strategy = plan.strategy.as_str(),
            "message analyzed"
        );

        IntentAnalysis {
            overall_confidence: refined.primary.confidence,
            estimated_response_secs: refined.primary.estimated_cost_secs,
            required_permissions: refined.primary.required_resources.clone(),
            primary_intent: refined.primary,
            secondary_intents: refined.secondary,
            sentiment,
            entities,
            user_id: user_id.to_string(),
            strategy: plan.strategy,
            urgency: plan.urgency,
            complexity: plan.complexity,
        }
    }

    /// Full flow: analyze, then execute the chosen strategy.
    pub async fn handle(
        &self,
        user_id: &str,
        text: &str,
        metadata: &RequestMetadata,
    ) -> Result<(IntentAnalysis, RoutingDecision), EngineError> {
        let analysis = self.analyze(user_id, text, metadata).await;
        let decision = self.execute(text, &analysis).await?;
        Ok((analysis, decision))
    }

    /// Execute a routing plan. Budget exhaustion and dispatch limits surface
    /// as typed errors; provider failures degrade to a canned answer.
    pub async fn execute(
        &self,
        text: &str,
        analysis: &IntentAnalysis,
    ) -> Result<RoutingDecision, EngineError> {
        match analysis.strategy {
            RoutingStrategy::Direct => self.execute_direct(text, analysis).await,
            RoutingStrategy::Background => {
                let job_id = self.submit_job(text, analysis)?;
                Ok(RoutingDecision::Background { job_id })
            }
            RoutingStrategy::Hybrid => {
                let immediate_answer = self.hybrid_preview(text, analysis);
                let job_id = self.submit_job(text, analysis)?;
                Ok(RoutingDecision::Hybrid { immediate_answer, job_id })
            }
            RoutingStrategy::Streaming => {
                let subscription_id = self
                    .subscriptions
                    .register(&analysis.user_id, text)
                    .await?;
                Ok(RoutingDecision::Streaming { subscription_id })
            }
        }
    }

    async fn execute_direct(
        &self,
        text: &str,
        analysis: &IntentAnalysis,
    ) -> Result<RoutingDecision, EngineError> {
        let started = Instant::now();
        let input = CapabilityInput {
            user_id: &analysis.user_id,
            text,
            primary: &analysis.primary_intent,
            entities: &analysis.entities,
        };

        if let Some(answer) = self
            .capabilities
            .try_category(analysis.primary_intent.category, &input)
        {
            self.feedback.record(PerformanceRecord::new(
                &analysis.primary_intent.name,
                started.elapsed().as_secs_f64(),
                true,
            ));
            return Ok(RoutingDecision::Direct { answer });
        }

        if !router::escalation_allowed(
            &analysis.primary_intent,
            analysis.complexity,
            &self.config.routing,
        ) {
            // No built-in answer and no escalation path: acknowledge rather
            // than guess.
            self.feedback.record(PerformanceRecord::new(
                &analysis.primary_intent.name,
                started.elapsed().as_secs_f64(),
                true,
            ));
            return Ok(RoutingDecision::Direct {
                answer: "I'm not sure what you're after. Could you rephrase that?".to_string(),
            });
        }

        match self.client.call(text).await {
            Ok(answer) => {
                self.feedback.record(PerformanceRecord::new(
                    &analysis.primary_intent.name,
                    started.elapsed().as_secs_f64(),
                    true,
                ));
                Ok(RoutingDecision::Direct { answer })
            }
            Err(err @ EngineError::BudgetExhausted { .. }) => {
                self.feedback.record(
                    PerformanceRecord::new(
                        &analysis.primary_intent.name,
                        started.elapsed().as_secs_f64(),
                        false,
                    )
                    .with_error("budget"),
                );
                Err(err)
            }
            Err(err) => {
                // Provider faults degrade to a canned answer; the error is
                // logged, not surfaced to the user.
                warn!(intent = %analysis.primary_intent.name, error = %err, "escalation failed");
                self.feedback.record(
                    PerformanceRecord::new(
                        &analysis.primary_intent.name,
                        started.elapsed().as_secs_f64(),
                        false,
                    )
                    .with_error("provider"),
                );
                Ok(RoutingDecision::Direct {
                    answer: "I'm having trouble reaching my data sources right now. \
                             Please try again shortly."
                        .to_string(),
                })
            }
        }
    }

    fn hybrid_preview(&self, text: &str, analysis: &IntentAnalysis) -> String {
        let input = CapabilityInput {
            user_id: &analysis.user_id,
            text,
            primary: &analysis.primary_intent,
            entities: &analysis.entities,
        };
        self.capabilities
            .try_partial(analysis.primary_intent.category, &input)
            .unwrap_or_else(|| {
                format!(
                    "Working on it. A full answer should take about {} seconds.",
                    analysis.estimated_response_secs.ceil() as u64
                )
            })
    }

    /// Work for a Background or Hybrid job. Built-ins are tried first, and
    /// the metered client is only reached when the escalation gate clears;
    /// otherwise the job resolves to an honest can't-go-deeper answer.
    fn job_work(&self, text: &str, analysis: &IntentAnalysis) -> crate::dispatch::JobWork {
        let input = CapabilityInput {
            user_id: &analysis.user_id,
            text,
            primary: &analysis.primary_intent,
            entities: &analysis.entities,
        };
        if let Some(answer) = self
            .capabilities
            .try_category(analysis.primary_intent.category, &input)
        {
            return Box::pin(async move { Ok(answer) });
        }

        if router::escalation_allowed(
            &analysis.primary_intent,
            analysis.complexity,
            &self.config.routing,
        ) {
            let client = self.client.clone();
            let prompt = text.to_string();
            return Box::pin(async move { client.call(&prompt).await.map_err(anyhow::Error::from) });
        }

        debug!(
            intent = %analysis.primary_intent.name,
            confidence = analysis.primary_intent.confidence,
            complexity = analysis.complexity,
            "job below escalation threshold, answering without external call"
        );
        Box::pin(async {
            Ok("I don't have enough to go deeper on that. \
                Could you narrow down what you're looking for?"
                .to_string())
        })
    }

    fn submit_job(&self, text: &str, analysis: &IntentAnalysis) -> Result<String, EngineError> {
        // Deadline scales with the intent's own cost estimate, floored so
        // even cheap jobs get a workable window.
        let deadline = Duration::from_secs_f32(analysis.estimated_response_secs.max(5.0) * 2.0);
        let request = JobRequest::new(
            analysis.user_id.clone(),
            analysis.primary_intent.name.clone(),
            deadline,
        );
        let work = self.job_work(text, analysis);
        self.jobs.submit(request, work)
    }

    /// Drain in-flight work and flush feedback. Call once at shutdown.
    pub async fn shutdown(self) {
        let Engine { subscriptions, jobs, recorder, feedback, .. } = self;
        subscriptions.shutdown().await;
        jobs.shutdown().await;
        // The recorder drains once every submit handle is gone.
        drop(feedback);
        recorder.shutdown().await;
        info!("engine stopped");
    }
}
