//! Usage events: what the executor reports after every successful attempt.
//!
//! Recording is fire-and-forget: a recorder that fails must never fail the
//! request that produced the event.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::provider::Usage;

/// Endpoint label for completion requests.
pub const COMPLETIONS_ENDPOINT: &str = "/chat/completions";
/// Endpoint label for embedding requests.
pub const EMBEDDINGS_ENDPOINT: &str = "/embeddings";

/// Token consumption of one successful provider call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageEvent {
    pub model_id: String,
    pub provider_id: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
    pub task_name: String,
    pub endpoint: String,
    pub timestamp: DateTime<Utc>,
}

impl UsageEvent {
    pub fn new(
        model_id: impl Into<String>,
        provider_id: impl Into<String>,
        task_name: impl Into<String>,
        endpoint: impl Into<String>,
        usage: Usage,
    ) -> Self {
        Self {
            model_id: model_id.into(),
            provider_id: provider_id.into(),
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
            task_name: task_name.into(),
            endpoint: endpoint.into(),
            timestamp: Utc::now(),
        }
    }
}

/// External sink for usage events.
pub trait UsageRecorder: Send + Sync {
    /// Record one event. Errors are logged by the caller and otherwise ignored.
    fn record(&self, event: UsageEvent) -> std::result::Result<(), String>;
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRecorder;

impl UsageRecorder for NoopRecorder {
    fn record(&self, _event: UsageEvent) -> std::result::Result<(), String> {
        Ok(())
    }
}

/// A broadcast-based event bus for usage events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<UsageEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: UsageEvent) {
        // no subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<UsageEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl UsageRecorder for EventBus {
    fn record(&self, event: UsageEvent) -> std::result::Result<(), String> {
        self.publish(event);
        Ok(())
    }
}
