//! Usage recording and cost tracking for ModelRelay.
//!
//! Receives the usage events the executor emits after every successful
//! call, prices them with per-model rates and keeps per-model and per-task
//! totals for reporting.

pub mod engine;
pub mod model;
pub mod pricing;

pub use engine::UsageTracker;
pub use model::{ModelUsageSummary, TaskUsageSummary, UsageRecord, UsageSummary};
pub use pricing::{ModelPricing, PricingTable};

/// Errors from the telemetry subsystem.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
}
