//! End-to-end routing behavior through the public engine surface.

use hermes_engine::{
    Engine, EntityKind, IntentCategory, RequestMetadata, RoutingDecision, RoutingStrategy,
};

fn meta() -> RequestMetadata {
    RequestMetadata::default()
}

#[tokio::test]
async fn test_price_query_direct_with_entity() {
    let engine = Engine::with_defaults();
    let (analysis, decision) = engine.handle("u1", "BTC price", &meta()).await.unwrap();

    assert!(analysis
        .entities
        .iter()
        .any(|e| e.kind == EntityKind::Cryptocurrency && e.normalized == "BTC"));
    assert_eq!(analysis.primary_intent.name, "price_lookup");
    assert_eq!(analysis.primary_intent.category, IntentCategory::Immediate);
    assert_eq!(analysis.strategy, RoutingStrategy::Direct);
    assert!(matches!(decision, RoutingDecision::Direct { .. }));
    engine.shutdown().await;
}

#[tokio::test]
async fn test_greeting_high_confidence() {
    let engine = Engine::with_defaults();
    let (analysis, decision) = engine.handle("u1", "Hello", &meta()).await.unwrap();

    assert_eq!(analysis.primary_intent.category, IntentCategory::Simple);
    assert!(analysis.overall_confidence >= 0.85);
    assert_eq!(analysis.strategy, RoutingStrategy::Direct);
    let RoutingDecision::Direct { answer } = decision else {
        panic!("greeting must answer directly");
    };
    assert!(!answer.is_empty());
    engine.shutdown().await;
}

#[tokio::test]
async fn test_empty_input_falls_back_gracefully() {
    let engine = Engine::with_defaults();
    let (analysis, decision) = engine.handle("u1", "", &meta()).await.unwrap();

    assert!(analysis.primary_intent.is_fallback());
    assert!(analysis.overall_confidence >= 0.5 && analysis.overall_confidence <= 0.61);
    assert_eq!(analysis.strategy, RoutingStrategy::Direct);
    assert!(matches!(decision, RoutingDecision::Direct { .. }));
    engine.shutdown().await;
}

#[tokio::test]
async fn test_complex_research_gets_job_id() {
    let engine = Engine::with_defaults();
    let (analysis, decision) = engine
        .handle(
            "u1",
            "research cross-chain arbitrage opportunities and recent whale movements, \
             compare exchange liquidity on binance and kraken, and explain the risks \
             of each strategy in detail",
            &meta(),
        )
        .await
        .unwrap();

    assert_eq!(analysis.primary_intent.category, IntentCategory::Complex);
    assert!(matches!(
        analysis.strategy,
        RoutingStrategy::Background | RoutingStrategy::Hybrid
    ));
    let job_id = decision.job_id().expect("non-direct strategies carry a job id");
    assert!(!job_id.is_empty());
    engine.shutdown().await;
}

#[tokio::test]
async fn test_hybrid_includes_immediate_answer() {
    let engine = Engine::with_defaults();
    // Urgent phrasing plus heavy complexity indicators pushes Complex work
    // onto the hybrid path.
    let (_, decision) = engine
        .handle(
            "u1",
            "urgent!! I need a deep dive now: analyze and compare cross-chain \
             arbitrage, whale movements, defi liquidation cascades and mev \
             strategies across every major exchange asap, right now",
            &meta(),
        )
        .await
        .unwrap();

    if let RoutingDecision::Hybrid { immediate_answer, job_id } = decision {
        assert!(!immediate_answer.is_empty());
        assert!(!job_id.is_empty());
    }
    engine.shutdown().await;
}

#[tokio::test]
async fn test_analysis_deterministic_for_same_input() {
    let run = |text: &'static str| async move {
        let engine = Engine::with_defaults();
        let analysis = engine.analyze("u1", text, &RequestMetadata::default()).await;
        engine.shutdown().await;
        (
            analysis.primary_intent.name.clone(),
            analysis.primary_intent.confidence,
            analysis.strategy,
        )
    };

    let first = run("should I buy ETH or is the market about to crash").await;
    let second = run("should I buy ETH or is the market about to crash").await;
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_hostile_inputs_never_panic() {
    let engine = Engine::with_defaults();
    let inputs: Vec<String> = vec![
        "\u{0}\u{1}\u{2} garbage".to_string(),
        "🚀🌕💎🙌".to_string(),
        "a".repeat(100_000),
        "SELECT * FROM users; DROP TABLE users;".to_string(),
        "   \t\n   ".to_string(),
    ];
    for input in inputs {
        let (analysis, _) = engine.handle("u1", &input, &meta()).await.unwrap();
        assert!(analysis.overall_confidence >= 0.0 && analysis.overall_confidence <= 1.0);
    }
    engine.shutdown().await;
}

#[tokio::test]
async fn test_context_boost_on_repeat_topic() {
    let engine = Engine::with_defaults();

    // Fresh user asking a vague follow-up.
    let cold = engine.analyze("cold", "what about ethereum", &meta()).await;

    // A user who has been talking prices gets the same follow-up read with
    // more confidence.
    engine.analyze("warm", "what is the ETH price", &meta()).await;
    engine.analyze("warm", "and the BTC price?", &meta()).await;
    let warm = engine.analyze("warm", "what about ethereum", &meta()).await;

    assert!(warm.overall_confidence >= cold.overall_confidence);
    engine.shutdown().await;
}

#[tokio::test]
async fn test_command_syntax_forces_immediate() {
    let engine = Engine::with_defaults();
    let analysis = engine.analyze("u1", "/price btc", &meta()).await;
    assert_eq!(analysis.primary_intent.category, IntentCategory::Immediate);
    assert!(analysis.overall_confidence >= 0.9);
    engine.shutdown().await;
}

#[tokio::test]
async fn test_subscription_limit_enforced() {
    let engine = Engine::with_defaults();
    let max = engine.config().dispatch.max_subscriptions_per_user;
    for i in 0..max {
        let text = format!("alert me when coin{i} moves 5%");
        let (_, decision) = engine.handle("sub-user", &text, &meta()).await.unwrap();
        assert!(matches!(decision, RoutingDecision::Streaming { .. }));
    }
    let err = engine
        .handle("sub-user", "alert me when BTC hits 100k", &meta())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        hermes_engine::EngineError::SubscriptionLimit { .. }
    ));
    engine.shutdown().await;
}
