//! Catalog: the immutable set of providers, models and task profiles.
//!
//! Loaded once at startup (see `modelrelay-config`) and shared read-only by
//! every dispatcher. Nothing here is mutated after load.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::DispatchError;

/// An external vendor endpoint speaking one wire protocol.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderDescriptor {
    /// Unique provider id referenced by models.
    pub id: String,

    /// Registry key selecting the wire-protocol client ("openai", "anthropic").
    pub client_type: String,

    /// API base URL.
    #[serde(default)]
    pub base_url: String,

    /// API key (may be filled from `api_key_env` at load time).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Environment variable holding the API key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    /// Default attempt budget for tasks served by this provider.
    #[serde(default = "default_max_retry")]
    pub max_retry: u32,

    /// Seconds to wait before retrying a transient failure.
    #[serde(default = "default_retry_interval")]
    pub retry_interval: u64,

    /// Per-request HTTP timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_max_retry() -> u32 {
    2
}
fn default_retry_interval() -> u64 {
    10
}
fn default_timeout_secs() -> u64 {
    120
}

impl ProviderDescriptor {
    pub fn new(id: impl Into<String>, client_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            client_type: client_type.into(),
            base_url: String::new(),
            api_key: None,
            api_key_env: None,
            max_retry: default_max_retry(),
            retry_interval: default_retry_interval(),
            timeout_secs: default_timeout_secs(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_retry(mut self, max_retry: u32, retry_interval: u64) -> Self {
        self.max_retry = max_retry;
        self.retry_interval = retry_interval;
        self
    }
}

impl std::fmt::Debug for ProviderDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderDescriptor")
            .field("id", &self.id)
            .field("client_type", &self.client_type)
            .field("base_url", &self.base_url)
            .field(
                "api_key",
                &if self.api_key.is_some() { "[REDACTED]" } else { "None" },
            )
            .field("api_key_env", &self.api_key_env)
            .field("max_retry", &self.max_retry)
            .field("retry_interval", &self.retry_interval)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// One interchangeable backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDescriptor {
    /// Unique model id referenced by task profiles.
    pub id: String,

    /// Owning provider id.
    pub provider: String,

    /// Model name as the provider knows it. Empty means "same as id".
    #[serde(default)]
    pub model_identifier: String,

    /// Extra request-body parameters merged into every call.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra_params: serde_json::Map<String, serde_json::Value>,

    /// USD per 1M prompt tokens.
    #[serde(default)]
    pub price_in: f64,

    /// USD per 1M completion tokens.
    #[serde(default)]
    pub price_out: f64,
}

impl ModelDescriptor {
    pub fn new(id: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            provider: provider.into(),
            model_identifier: String::new(),
            extra_params: serde_json::Map::new(),
            price_in: 0.0,
            price_out: 0.0,
        }
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.model_identifier = identifier.into();
        self
    }

    /// The name sent over the wire.
    pub fn wire_name(&self) -> &str {
        if self.model_identifier.is_empty() {
            &self.id
        } else {
            &self.model_identifier
        }
    }
}

/// The candidate set and defaults for one logical task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskProfile {
    /// Task name, used in logs and usage events.
    pub name: String,

    /// Ordered candidate model ids; order breaks selection ties.
    pub models: Vec<String>,

    /// Default max tokens when the request does not override it.
    pub max_tokens: u32,

    /// Default temperature when the request does not override it.
    pub temperature: f32,

    /// Total attempts shared by every failure kind.
    pub retry_budget: u32,

    /// Seconds to wait before retrying, unless the provider sets its own.
    pub retry_interval: u64,
}

impl TaskProfile {
    /// Build a profile with default limits. Fails on an empty candidate list.
    pub fn new(
        name: impl Into<String>,
        models: Vec<String>,
    ) -> std::result::Result<Self, DispatchError> {
        let name = name.into();
        if models.is_empty() {
            return Err(DispatchError::EmptyProfile(name));
        }
        Ok(Self {
            name,
            models,
            max_tokens: 1024,
            temperature: 0.7,
            retry_budget: default_max_retry(),
            retry_interval: default_retry_interval(),
        })
    }

    pub fn with_retry(mut self, retry_budget: u32, retry_interval: u64) -> Self {
        self.retry_budget = retry_budget;
        self.retry_interval = retry_interval;
        self
    }

    pub fn with_limits(mut self, max_tokens: u32, temperature: f32) -> Self {
        self.max_tokens = max_tokens;
        self.temperature = temperature;
        self
    }
}

/// Resolved providers, models and tasks.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    providers: HashMap<String, ProviderDescriptor>,
    models: HashMap<String, ModelDescriptor>,
    tasks: HashMap<String, TaskProfile>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_provider(mut self, provider: ProviderDescriptor) -> Self {
        self.providers.insert(provider.id.clone(), provider);
        self
    }

    pub fn with_model(mut self, model: ModelDescriptor) -> Self {
        self.models.insert(model.id.clone(), model);
        self
    }

    pub fn with_task(mut self, task: TaskProfile) -> Self {
        self.tasks.insert(task.name.clone(), task);
        self
    }

    pub fn provider(&self, id: &str) -> Option<&ProviderDescriptor> {
        self.providers.get(id)
    }

    pub fn model(&self, id: &str) -> Option<&ModelDescriptor> {
        self.models.get(id)
    }

    pub fn task(&self, name: &str) -> Option<&TaskProfile> {
        self.tasks.get(name)
    }

    pub fn providers(&self) -> impl Iterator<Item = &ProviderDescriptor> {
        self.providers.values()
    }

    pub fn models(&self) -> impl Iterator<Item = &ModelDescriptor> {
        self.models.values()
    }

    pub fn tasks(&self) -> impl Iterator<Item = &TaskProfile> {
        self.tasks.values()
    }

    /// Look up a model together with its owning provider.
    pub fn resolve_model(
        &self,
        model_id: &str,
    ) -> std::result::Result<(&ModelDescriptor, &ProviderDescriptor), DispatchError> {
        let model = self
            .model(model_id)
            .ok_or_else(|| DispatchError::UnknownModel(model_id.to_string()))?;
        let provider = self.provider(&model.provider).ok_or_else(|| {
            DispatchError::UnknownModel(format!(
                "{model_id} (provider '{}' is not configured)",
                model.provider
            ))
        })?;
        Ok((model, provider))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_profile_rejected() {
        let err = TaskProfile::new("chat", vec![]).unwrap_err();
        assert!(matches!(err, DispatchError::EmptyProfile(ref n) if n == "chat"));
    }

    #[test]
    fn wire_name_falls_back_to_id() {
        let m = ModelDescriptor::new("fast", "p");
        assert_eq!(m.wire_name(), "fast");
        let m = m.with_identifier("vendor/fast-v2");
        assert_eq!(m.wire_name(), "vendor/fast-v2");
    }

    #[test]
    fn resolve_model_finds_provider() {
        let catalog = Catalog::new()
            .with_provider(ProviderDescriptor::new("p", "openai"))
            .with_model(ModelDescriptor::new("m", "p"));
        let (model, provider) = catalog.resolve_model("m").unwrap();
        assert_eq!(model.id, "m");
        assert_eq!(provider.client_type, "openai");
    }

    #[test]
    fn resolve_model_reports_missing_provider() {
        let catalog = Catalog::new().with_model(ModelDescriptor::new("m", "ghost"));
        let err = catalog.resolve_model("m").unwrap_err();
        assert!(err.to_string().contains("ghost"));
        assert!(catalog.resolve_model("nope").is_err());
    }

    #[test]
    fn provider_debug_redacts_key() {
        let p = ProviderDescriptor::new("p", "openai").with_api_key("sk-secret");
        let dbg = format!("{p:?}");
        assert!(!dbg.contains("sk-secret"));
        assert!(dbg.contains("[REDACTED]"));
    }
}
