//! Data model for recorded usage and aggregated summaries.

use chrono::{DateTime, Utc};
use modelrelay_core::event::UsageEvent;
use serde::{Deserialize, Serialize};

/// One usage event with its computed cost.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    #[serde(flatten)]
    pub event: UsageEvent,
    /// Estimated cost in USD.
    pub cost_usd: f64,
}

/// Aggregated usage for one model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelUsageSummary {
    pub model_id: String,
    pub provider_id: String,
    pub calls: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub cost_usd: f64,
}

impl ModelUsageSummary {
    pub(crate) fn add(&mut self, record: &UsageRecord) {
        self.calls += 1;
        self.prompt_tokens += u64::from(record.event.prompt_tokens);
        self.completion_tokens += u64::from(record.event.completion_tokens);
        self.total_tokens += u64::from(record.event.total_tokens);
        self.cost_usd += record.cost_usd;
    }
}

/// Aggregated usage for one logical task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskUsageSummary {
    pub task_name: String,
    pub calls: u64,
    pub total_tokens: u64,
    pub cost_usd: f64,
}

/// Usage summary across all models and tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageSummary {
    pub total_calls: u64,
    pub total_prompt_tokens: u64,
    pub total_completion_tokens: u64,
    pub total_cost_usd: f64,
    /// Sorted by cost (most expensive first), then model id.
    pub by_model: Vec<ModelUsageSummary>,
    /// Sorted by task name.
    pub by_task: Vec<TaskUsageSummary>,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl UsageSummary {
    pub fn total_tokens(&self) -> u64 {
        self.total_prompt_tokens + self.total_completion_tokens
    }

    /// Pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, crate::TelemetryError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modelrelay_core::provider::Usage;

    fn record(tokens: u32, cost: f64) -> UsageRecord {
        UsageRecord {
            event: UsageEvent::new(
                "m",
                "p",
                "chat",
                "/chat/completions",
                Usage {
                    prompt_tokens: tokens,
                    completion_tokens: tokens,
                    total_tokens: tokens * 2,
                },
            ),
            cost_usd: cost,
        }
    }

    #[test]
    fn model_summary_accumulates() {
        let mut s = ModelUsageSummary::default();
        s.add(&record(10, 0.5));
        s.add(&record(5, 0.25));
        assert_eq!(s.calls, 2);
        assert_eq!(s.prompt_tokens, 15);
        assert_eq!(s.total_tokens, 30);
        assert!((s.cost_usd - 0.75).abs() < 1e-12);
    }

    #[test]
    fn record_serializes_flat() {
        let json = serde_json::to_value(record(1, 0.1)).unwrap();
        assert_eq!(json["model_id"], "m");
        assert_eq!(json["task_name"], "chat");
        assert_eq!(json["cost_usd"], 0.1);
    }
}
