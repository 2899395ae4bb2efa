//! Thread-safe usage tracker: prices usage events and aggregates them
//! per model and per task.

use crate::model::*;
use crate::pricing::PricingTable;
use chrono::{DateTime, Utc};
use modelrelay_core::event::{UsageEvent, UsageRecorder};
use std::collections::HashMap;
use std::sync::RwLock;

/// Recent records kept for windowed summaries.
const MAX_RECORDS: usize = 10_000;

/// The in-memory usage sink.
///
/// Thread-safe via `RwLock`. Running totals cover the tracker's whole
/// lifetime; individual records are capped and the oldest are dropped first.
pub struct UsageTracker {
    /// Pricing table for cost computation.
    pricing: PricingTable,
    /// Recent records (most recent last).
    records: RwLock<Vec<UsageRecord>>,
    /// Running totals.
    totals: RwLock<RunningTotals>,
}

#[derive(Debug)]
struct RunningTotals {
    started_at: DateTime<Utc>,
    by_model: HashMap<String, ModelUsageSummary>,
    by_task: HashMap<String, TaskUsageSummary>,
}

impl UsageTracker {
    /// Create a tracker with custom pricing.
    pub fn with_pricing(pricing: PricingTable) -> Self {
        Self {
            pricing,
            records: RwLock::new(Vec::new()),
            totals: RwLock::new(RunningTotals {
                started_at: Utc::now(),
                by_model: HashMap::new(),
                by_task: HashMap::new(),
            }),
        }
    }

    /// Create a tracker that prices nothing.
    pub fn new() -> Self {
        Self::with_pricing(PricingTable::empty())
    }

    pub fn pricing(&self) -> &PricingTable {
        &self.pricing
    }

    /// Price an event and fold it into the totals. Returns its cost.
    pub fn track(&self, event: UsageEvent) -> f64 {
        let cost =
            self.pricing
                .compute_cost(&event.model_id, event.prompt_tokens, event.completion_tokens);
        let record = UsageRecord {
            event,
            cost_usd: cost,
        };

        {
            let mut totals = self.totals.write().unwrap_or_else(|e| e.into_inner());
            let model = totals
                .by_model
                .entry(record.event.model_id.clone())
                .or_insert_with(|| ModelUsageSummary {
                    model_id: record.event.model_id.clone(),
                    provider_id: record.event.provider_id.clone(),
                    ..Default::default()
                });
            model.add(&record);

            let task = totals
                .by_task
                .entry(record.event.task_name.clone())
                .or_insert_with(|| TaskUsageSummary {
                    task_name: record.event.task_name.clone(),
                    ..Default::default()
                });
            task.calls += 1;
            task.total_tokens += u64::from(record.event.total_tokens);
            task.cost_usd += cost;
        }

        tracing::debug!(
            model = %record.event.model_id,
            task = %record.event.task_name,
            tokens = record.event.total_tokens,
            cost_usd = cost,
            "Usage recorded"
        );

        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        if records.len() >= MAX_RECORDS {
            let drain_count = MAX_RECORDS / 10;
            records.drain(..drain_count);
        }
        records.push(record);

        cost
    }

    /// Lifetime summary.
    pub fn summary(&self) -> UsageSummary {
        let totals = self.totals.read().unwrap_or_else(|e| e.into_inner());
        build_summary(
            totals.by_model.values().cloned().collect(),
            totals.by_task.values().cloned().collect(),
            totals.started_at,
            Utc::now(),
        )
    }

    /// Summary of the retained records within a time window.
    pub fn summary_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> UsageSummary {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        let mut by_model: HashMap<&str, ModelUsageSummary> = HashMap::new();
        let mut by_task: HashMap<&str, TaskUsageSummary> = HashMap::new();

        for r in records
            .iter()
            .filter(|r| r.event.timestamp >= from && r.event.timestamp <= to)
        {
            by_model
                .entry(&r.event.model_id)
                .or_insert_with(|| ModelUsageSummary {
                    model_id: r.event.model_id.clone(),
                    provider_id: r.event.provider_id.clone(),
                    ..Default::default()
                })
                .add(r);
            let task = by_task
                .entry(&r.event.task_name)
                .or_insert_with(|| TaskUsageSummary {
                    task_name: r.event.task_name.clone(),
                    ..Default::default()
                });
            task.calls += 1;
            task.total_tokens += u64::from(r.event.total_tokens);
            task.cost_usd += r.cost_usd;
        }

        build_summary(
            by_model.into_values().collect(),
            by_task.into_values().collect(),
            from,
            to,
        )
    }

    /// Most recent records, newest first.
    pub fn recent(&self, limit: usize) -> Vec<UsageRecord> {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        records.iter().rev().take(limit).cloned().collect()
    }

    pub fn record_count(&self) -> usize {
        self.records.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Drop retained records older than `cutoff`. Totals are unaffected.
    pub fn prune_before(&self, cutoff: DateTime<Utc>) -> usize {
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        let before = records.len();
        records.retain(|r| r.event.timestamp >= cutoff);
        before - records.len()
    }
}

impl Default for UsageTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl UsageRecorder for UsageTracker {
    fn record(&self, event: UsageEvent) -> Result<(), String> {
        self.track(event);
        Ok(())
    }
}

fn build_summary(
    mut by_model: Vec<ModelUsageSummary>,
    mut by_task: Vec<TaskUsageSummary>,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> UsageSummary {
    by_model.sort_by(|a, b| {
        b.cost_usd
            .total_cmp(&a.cost_usd)
            .then_with(|| a.model_id.cmp(&b.model_id))
    });
    by_task.sort_by(|a, b| a.task_name.cmp(&b.task_name));

    UsageSummary {
        total_calls: by_model.iter().map(|m| m.calls).sum(),
        total_prompt_tokens: by_model.iter().map(|m| m.prompt_tokens).sum(),
        total_completion_tokens: by_model.iter().map(|m| m.completion_tokens).sum(),
        total_cost_usd: by_model.iter().map(|m| m.cost_usd).sum(),
        by_model,
        by_task,
        from,
        to,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::ModelPricing;
    use modelrelay_core::provider::Usage;
    use std::sync::Arc;

    fn event(model: &str, task: &str, prompt: u32, completion: u32) -> UsageEvent {
        UsageEvent::new(
            model,
            "vendor",
            task,
            "/chat/completions",
            Usage {
                prompt_tokens: prompt,
                completion_tokens: completion,
                total_tokens: prompt + completion,
            },
        )
    }

    fn priced_tracker() -> UsageTracker {
        let pricing = PricingTable::empty();
        pricing.set("smart", ModelPricing::new(3.0, 15.0));
        UsageTracker::with_pricing(pricing)
    }

    #[test]
    fn track_computes_cost() {
        let tracker = priced_tracker();
        let cost = tracker.track(event("smart", "chat", 1000, 500));
        assert!((cost - 0.0105).abs() < 1e-10);
        assert_eq!(tracker.track(event("cheap", "chat", 1000, 500)), 0.0);
    }

    #[test]
    fn summary_aggregates_by_model_and_task() {
        let tracker = priced_tracker();
        tracker.track(event("smart", "chat", 1000, 500));
        tracker.track(event("smart", "summarize", 200, 100));
        tracker.track(event("cheap", "chat", 50, 50));

        let s = tracker.summary();
        assert_eq!(s.total_calls, 3);
        assert_eq!(s.total_tokens(), 1900);
        assert_eq!(s.by_model[0].model_id, "smart");
        assert_eq!(s.by_model[0].calls, 2);
        assert_eq!(s.by_model[1].model_id, "cheap");

        let tasks: Vec<(&str, u64)> = s
            .by_task
            .iter()
            .map(|t| (t.task_name.as_str(), t.calls))
            .collect();
        assert_eq!(tasks, vec![("chat", 2), ("summarize", 1)]);
    }

    #[test]
    fn windowed_summary_filters_by_time() {
        let tracker = UsageTracker::new();
        let mut old = event("m", "chat", 10, 10);
        old.timestamp = Utc::now() - chrono::Duration::hours(2);
        tracker.track(old);
        tracker.track(event("m", "chat", 1, 1));

        let recent = tracker.summary_between(Utc::now() - chrono::Duration::hours(1), Utc::now());
        assert_eq!(recent.total_calls, 1);
        assert_eq!(tracker.summary().total_calls, 2);

        assert_eq!(tracker.prune_before(Utc::now() - chrono::Duration::hours(1)), 1);
        assert_eq!(tracker.record_count(), 1);
        assert_eq!(tracker.summary().total_calls, 2);
    }

    #[test]
    fn recent_is_newest_first() {
        let tracker = UsageTracker::new();
        tracker.track(event("first", "chat", 1, 1));
        tracker.track(event("second", "chat", 1, 1));
        let recent = tracker.recent(1);
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].event.model_id, "second");
    }

    #[test]
    fn recorder_impl_never_fails() {
        let tracker = Arc::new(UsageTracker::new());
        let recorder: Arc<dyn UsageRecorder> = tracker.clone();
        recorder.record(event("m", "chat", 3, 4)).unwrap();
        assert_eq!(tracker.summary().total_tokens(), 7);
    }

    #[test]
    fn summary_serializes() {
        let tracker = priced_tracker();
        tracker.track(event("smart", "chat", 10, 10));
        let json = tracker.summary().to_json().unwrap();
        assert!(json.contains("\"by_model\""));
        assert!(json.contains("smart"));
    }
}
