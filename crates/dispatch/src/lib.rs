//! # ModelRelay Dispatch
//!
//! Turns a logical task into a concrete provider call:
//!
//! - [`UsageLedger`] tracks tokens and failures per model and picks the
//!   least-loaded candidate
//! - [`classifier`] maps a failed attempt to wait, compress or abort
//! - [`MessageCompressor`] shrinks conversations rejected as too large
//! - [`RequestExecutor`] runs the retry loop
//! - [`reasoning`] splits inline `<think>` markup from visible text

pub mod classifier;
pub mod compressor;
pub mod executor;
pub mod ledger;
pub mod reasoning;

pub use classifier::{RetryAction, classify};
pub use compressor::{MessageCompressor, TruncatingCompressor};
pub use executor::RequestExecutor;
pub use ledger::{LedgerEntry, PENALTY_WEIGHT, UsageLedger};
pub use reasoning::extract_reasoning;
pub use tokio_util::sync::CancellationToken;
