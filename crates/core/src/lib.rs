//! # ModelRelay Core
//!
//! Domain types, traits, and error definitions for the ModelRelay LLM
//! dispatcher. This crate has **zero framework dependencies**; it defines
//! the domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every pluggable seam is defined as a trait here. Implementations live in
//! their respective crates. This enables:
//! - Swapping wire protocols via configuration
//! - Easy testing with scripted mock clients
//! - Clean dependency graph (all crates depend inward on core)

pub mod catalog;
pub mod error;
pub mod event;
pub mod message;
pub mod provider;

// Re-export key types at crate root for ergonomics
pub use catalog::{Catalog, ModelDescriptor, ProviderDescriptor, TaskProfile};
pub use error::{DispatchError, FailureKind, ProviderError, Result};
pub use event::{EventBus, NoopRecorder, UsageEvent, UsageRecorder};
pub use message::{Message, Role, ToolCall};
pub use provider::{
    CompletionRequest, ProviderClient, RequestContext, Response, ToolDefinition, Usage,
};
