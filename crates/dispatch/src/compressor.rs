//! Conversation compression for payload-too-large rejections.

use async_trait::async_trait;
use modelrelay_core::message::{self, Message, Role};

/// Shrinks a conversation so it fits a provider's payload limit.
///
/// The executor calls this at most once per request.
#[async_trait]
pub trait MessageCompressor: Send + Sync {
    async fn compress(&self, messages: &[Message]) -> Result<Vec<Message>, String>;
}

/// Drops the oldest non-system messages until the estimate fits.
///
/// Keeps every system message and the newest messages whose estimated
/// tokens fit within `ratio` of the original estimate. The final message
/// is always kept.
#[derive(Debug, Clone, Copy)]
pub struct TruncatingCompressor {
    ratio: f64,
}

impl TruncatingCompressor {
    pub fn new(ratio: f64) -> Self {
        Self {
            ratio: ratio.clamp(0.0, 1.0),
        }
    }

    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    fn truncate(&self, messages: &[Message]) -> Vec<Message> {
        if messages.len() <= 1 {
            return messages.to_vec();
        }

        let original = message::estimated_tokens(messages);
        let target = (original as f64 * self.ratio) as usize;

        let mut budget_used: usize = messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(Message::estimated_tokens)
            .sum();

        let last = messages.len() - 1;
        let mut keep = vec![false; messages.len()];
        for (i, m) in messages.iter().enumerate().rev() {
            if m.role == Role::System {
                keep[i] = true;
                continue;
            }
            let cost = m.estimated_tokens();
            if i == last || budget_used + cost <= target {
                keep[i] = true;
                budget_used += cost;
            } else {
                // older messages would leave a gap in the dialogue
                break;
            }
        }
        // system prompts before the cut are still kept
        for (i, m) in messages.iter().enumerate() {
            if m.role == Role::System {
                keep[i] = true;
            }
        }

        messages
            .iter()
            .zip(keep)
            .filter_map(|(m, k)| k.then(|| m.clone()))
            .collect()
    }
}

impl Default for TruncatingCompressor {
    fn default() -> Self {
        Self::new(0.5)
    }
}

#[async_trait]
impl MessageCompressor for TruncatingCompressor {
    async fn compress(&self, messages: &[Message]) -> Result<Vec<Message>, String> {
        let out = self.truncate(messages);
        tracing::debug!(
            before = messages.len(),
            after = out.len(),
            "Conversation truncated"
        );
        Ok(out)
    }
}
