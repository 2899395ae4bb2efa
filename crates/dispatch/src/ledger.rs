//! Usage ledger and least-loaded model selection.
//!
//! Per-model counters live behind atomics so concurrent calls against the
//! same model never lose an update. The outer map is only write-locked the
//! first time a model is seen.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use modelrelay_core::catalog::TaskProfile;
use modelrelay_core::error::DispatchError;
use modelrelay_core::provider::Usage;
use serde::Serialize;

/// Virtual tokens charged per failed attempt.
pub const PENALTY_WEIGHT: u64 = 300;

#[derive(Debug, Default)]
struct ModelUsage {
    total_tokens: AtomicU64,
    penalty: AtomicU64,
}

/// Point-in-time copy of one model's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    pub total_tokens: u64,
    pub penalty: u64,
}

impl LedgerEntry {
    pub fn score(&self) -> u64 {
        self.total_tokens
            .saturating_add(self.penalty.saturating_mul(PENALTY_WEIGHT))
    }
}

/// Running token and failure counters, keyed by model id.
///
/// Both counters only ever grow. Owned by whoever builds the executor; two
/// executors share state only if handed the same `Arc<UsageLedger>`.
#[derive(Debug, Default)]
pub struct UsageLedger {
    models: RwLock<HashMap<String, Arc<ModelUsage>>>,
}

impl UsageLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, model_id: &str) -> Arc<ModelUsage> {
        if let Some(usage) = self
            .models
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(model_id)
        {
            return Arc::clone(usage);
        }

        let mut models = self.models.write().unwrap_or_else(|e| e.into_inner());
        Arc::clone(models.entry(model_id.to_string()).or_default())
    }

    /// Add a successful call's tokens to the model's running total.
    pub fn record_success(&self, model_id: &str, usage: &Usage) {
        self.entry(model_id)
            .total_tokens
            .fetch_add(u64::from(usage.total_tokens), Ordering::Relaxed);
    }

    /// Charge one failed attempt to the model.
    pub fn record_failure(&self, model_id: &str) {
        self.entry(model_id).penalty.fetch_add(1, Ordering::Relaxed);
    }

    /// Counters for one model; zeros if it was never used.
    pub fn get(&self, model_id: &str) -> LedgerEntry {
        self.models
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(model_id)
            .map(|u| LedgerEntry {
                total_tokens: u.total_tokens.load(Ordering::Relaxed),
                penalty: u.penalty.load(Ordering::Relaxed),
            })
            .unwrap_or_default()
    }

    pub fn total_tokens(&self, model_id: &str) -> u64 {
        self.get(model_id).total_tokens
    }

    pub fn penalty(&self, model_id: &str) -> u64 {
        self.get(model_id).penalty
    }

    /// Selection score: `total_tokens + penalty * 300`.
    pub fn score(&self, model_id: &str) -> u64 {
        self.get(model_id).score()
    }

    /// Copy of every model's counters, sorted by model id.
    pub fn snapshot(&self) -> Vec<(String, LedgerEntry)> {
        let models = self.models.read().unwrap_or_else(|e| e.into_inner());
        let mut entries: Vec<(String, LedgerEntry)> = models
            .keys()
            .map(|id| (id.clone(), LedgerEntry::default()))
            .collect();
        drop(models);
        for (id, entry) in &mut entries {
            *entry = self.get(id);
        }
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// Pick the least-loaded candidate of a task.
    ///
    /// Lowest score wins; ties go to the earliest model in the profile's
    /// declared order.
    pub fn select<'p>(&self, profile: &'p TaskProfile) -> Result<&'p str, DispatchError> {
        let mut best: Option<(&str, u64)> = None;
        for candidate in &profile.models {
            let score = self.score(candidate);
            match best {
                Some((_, best_score)) if best_score <= score => {}
                _ => best = Some((candidate, score)),
            }
        }
        best.map(|(id, _)| id)
            .ok_or_else(|| DispatchError::EmptyProfile(profile.name.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(models: &[&str]) -> TaskProfile {
        TaskProfile::new("chat", models.iter().map(|m| m.to_string()).collect()).unwrap()
    }

    fn usage(total: u32) -> Usage {
        Usage {
            prompt_tokens: total / 2,
            completion_tokens: total - total / 2,
            total_tokens: total,
        }
    }

    #[test]
    fn fresh_ledger_picks_first_candidate() {
        let ledger = UsageLedger::new();
        assert_eq!(ledger.select(&profile(&["a", "b", "c"])).unwrap(), "a");
    }

    #[test]
    fn picks_lowest_score() {
        let ledger = UsageLedger::new();
        ledger.record_success("a", &usage(500));
        ledger.record_success("b", &usage(200));
        ledger.record_success("c", &usage(350));
        assert_eq!(ledger.select(&profile(&["a", "b", "c"])).unwrap(), "b");
    }

    #[test]
    fn penalty_weighs_three_hundred_tokens() {
        let ledger = UsageLedger::new();
        ledger.record_failure("a");
        ledger.record_success("b", &usage(299));
        assert_eq!(ledger.score("a"), 300);
        assert_eq!(ledger.select(&profile(&["a", "b"])).unwrap(), "b");

        ledger.record_success("b", &usage(1));
        // 300 vs 300: declared order breaks the tie
        assert_eq!(ledger.select(&profile(&["a", "b"])).unwrap(), "a");
        assert_eq!(ledger.select(&profile(&["b", "a"])).unwrap(), "b");
    }

    #[test]
    fn counters_never_decrease() {
        let ledger = UsageLedger::new();
        let mut last = LedgerEntry::default();
        for i in 0..20u32 {
            if i % 3 == 0 {
                ledger.record_failure("m");
            } else {
                ledger.record_success("m", &usage(i));
            }
            let now = ledger.get("m");
            assert!(now.penalty >= last.penalty);
            assert!(now.total_tokens >= last.total_tokens);
            last = now;
        }
        assert_eq!(last.penalty, 7);
    }

    #[test]
    fn unknown_model_reads_as_zero() {
        let ledger = UsageLedger::new();
        assert_eq!(ledger.get("nope"), LedgerEntry::default());
        assert!(ledger.snapshot().is_empty());
    }

    #[test]
    fn snapshot_is_sorted() {
        let ledger = UsageLedger::new();
        ledger.record_failure("zeta");
        ledger.record_success("alpha", &usage(10));
        let snap = ledger.snapshot();
        assert_eq!(snap[0].0, "alpha");
        assert_eq!(snap[0].1.total_tokens, 10);
        assert_eq!(snap[1].0, "zeta");
        assert_eq!(snap[1].1.penalty, 1);
    }

    #[test]
    fn concurrent_updates_sum_exactly() {
        let ledger = Arc::new(UsageLedger::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ledger = Arc::clone(&ledger);
                std::thread::spawn(move || {
                    for _ in 0..250 {
                        ledger.record_success("shared", &usage(4));
                        ledger.record_failure("shared");
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(ledger.total_tokens("shared"), 8 * 250 * 4);
        assert_eq!(ledger.penalty("shared"), 8 * 250);
    }
}
