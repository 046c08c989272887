//! Hermes console - interactive front door for the routing engine
//!
//! Reads messages from stdin, runs the full analyze/route flow, and prints
//! the decision. Async results (background jobs, expiries) arrive through
//! the logging delivery sink.

use anyhow::Result;
use hermes_engine::{Engine, RequestMetadata, RoutingDecision};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, Level};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .init();

    info!("Hermes engine v{} starting", env!("CARGO_PKG_VERSION"));

    let engine = Engine::with_defaults();
    let meta = RequestMetadata::default();

    println!("hermes ready - type a message, ctrl-d to quit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        match engine.handle("console", text, &meta).await {
            Ok((analysis, decision)) => {
                println!(
                    "intent={} confidence={:.2} strategy={}",
                    analysis.primary_intent.name,
                    analysis.overall_confidence,
                    analysis.strategy.as_str()
                );
                match decision {
                    RoutingDecision::Direct { answer } => println!("{answer}"),
                    RoutingDecision::Background { job_id } => {
                        println!("working on it (job {job_id})")
                    }
                    RoutingDecision::Streaming { subscription_id } => {
                        println!("subscribed ({subscription_id})")
                    }
                    RoutingDecision::Hybrid { immediate_answer, job_id } => {
                        println!("{immediate_answer} (job {job_id})")
                    }
                }
            }
            Err(err) => println!("error: {err}"),
        }
    }

    engine.shutdown().await;
    info!("Shutting down gracefully");
    Ok(())
}
