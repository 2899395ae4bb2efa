//! LLM wire-protocol clients for ModelRelay.
//!
//! All clients implement the `modelrelay_core::ProviderClient` trait.
//! The registry builds the correct client from a provider's `client_type`.

pub mod anthropic;
mod http;
pub mod openai_compat;
pub mod registry;

pub use anthropic::AnthropicClient;
pub use openai_compat::OpenAiCompatClient;
pub use registry::{ClientConstructor, ClientRegistry};
