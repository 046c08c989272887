//! Persistence seams for context snapshots and feedback records.
//!
//! The engine only talks to these traits; the host wires in a real backend.
//! Persistence is always best-effort: a failed write degrades to in-memory
//! state with a warning, and a corrupt snapshot means a fresh context, never
//! a failed request.

use crate::context::ConversationContext;
use hermes_core::feedback::PerformanceRecord;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use tracing::warn;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Loads and stores per-user context snapshots.
pub trait ContextBackend: Send + Sync {
    /// `Ok(None)` when no usable snapshot exists (missing or corrupt).
    fn load<'a>(&'a self, user_id: &'a str)
        -> BoxFuture<'a, anyhow::Result<Option<ConversationContext>>>;

    fn store<'a>(&'a self, context: &'a ConversationContext) -> BoxFuture<'a, anyhow::Result<()>>;
}

/// Receives performance records for durable storage.
pub trait FeedbackSink: Send + Sync {
    fn append<'a>(&'a self, record: &'a PerformanceRecord) -> BoxFuture<'a, anyhow::Result<()>>;
}

/// Backend that stores nothing. Default for hosts that keep everything
/// in memory.
pub struct NullBackend;

impl ContextBackend for NullBackend {
    fn load<'a>(
        &'a self,
        _user_id: &'a str,
    ) -> BoxFuture<'a, anyhow::Result<Option<ConversationContext>>> {
        Box::pin(async { Ok(None) })
    }

    fn store<'a>(&'a self, _context: &'a ConversationContext) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async { Ok(()) })
    }
}

impl FeedbackSink for NullBackend {
    fn append<'a>(&'a self, _record: &'a PerformanceRecord) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async { Ok(()) })
    }
}

/// JSON files under a directory: one snapshot per user plus an append-only
/// feedback log.
pub struct JsonFileBackend {
    dir: PathBuf,
}

impl JsonFileBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn context_path(&self, user_id: &str) -> PathBuf {
        // User ids are host-controlled; keep only filename-safe characters.
        let safe: String = user_id
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("context-{safe}.json"))
    }

    fn feedback_path(&self) -> PathBuf {
        self.dir.join("feedback.jsonl")
    }
}

impl ContextBackend for JsonFileBackend {
    fn load<'a>(
        &'a self,
        user_id: &'a str,
    ) -> BoxFuture<'a, anyhow::Result<Option<ConversationContext>>> {
        Box::pin(async move {
            let path = self.context_path(user_id);
            let bytes = match tokio::fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
                Err(err) => return Err(err.into()),
            };
            match serde_json::from_slice::<ConversationContext>(&bytes) {
                Ok(context) => Ok(Some(context)),
                Err(err) => {
                    // Corrupt snapshot: discard and start fresh.
                    warn!(user_id, error = %err, "context snapshot corrupt, discarding");
                    Ok(None)
                }
            }
        })
    }

    fn store<'a>(&'a self, context: &'a ConversationContext) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            tokio::fs::create_dir_all(&self.dir).await?;
            let path = self.context_path(&context.user_id);
            let json = serde_json::to_vec_pretty(context)?;
            tokio::fs::write(&path, json).await?;
            Ok(())
        })
    }
}

impl FeedbackSink for JsonFileBackend {
    fn append<'a>(&'a self, record: &'a PerformanceRecord) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            use tokio::io::AsyncWriteExt;
            tokio::fs::create_dir_all(&self.dir).await?;
            let mut line = serde_json::to_vec(record)?;
            line.push(b'\n');
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(self.feedback_path())
                .await?;
            file.write_all(&line).await?;
            Ok(())
        })
    }
}
