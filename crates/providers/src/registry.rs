//! Client registry: maps a provider's `client_type` to a constructor.
//!
//! Clients are built lazily the first time a provider is used and cached by
//! provider id, so one HTTP connection pool serves every model of a provider.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use modelrelay_core::catalog::ProviderDescriptor;
use modelrelay_core::error::{DispatchError, ProviderError};
use modelrelay_core::provider::ProviderClient;
use tracing::debug;

use crate::anthropic::{self, AnthropicClient};
use crate::openai_compat::{self, OpenAiCompatClient};

/// Builds a client for one provider descriptor.
pub type ClientConstructor = Arc<
    dyn Fn(&ProviderDescriptor) -> Result<Arc<dyn ProviderClient>, ProviderError> + Send + Sync,
>;

/// Resolves providers to wire-protocol clients.
#[derive(Clone, Default)]
pub struct ClientRegistry {
    constructors: HashMap<String, ClientConstructor>,
    clients: Arc<RwLock<HashMap<String, Arc<dyn ProviderClient>>>>,
}

impl ClientRegistry {
    /// An empty registry. Every provider resolves to `UnknownProvider`.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in "openai" and "anthropic" clients.
    pub fn with_defaults() -> Self {
        Self::new()
            .register(openai_compat::CLIENT_TYPE, |p| {
                Ok(Arc::new(OpenAiCompatClient::new(p)?) as Arc<dyn ProviderClient>)
            })
            .register(anthropic::CLIENT_TYPE, |p| {
                Ok(Arc::new(AnthropicClient::new(p)?) as Arc<dyn ProviderClient>)
            })
    }

    /// Register (or replace) the constructor for a client type.
    pub fn register<F>(mut self, client_type: impl Into<String>, constructor: F) -> Self
    where
        F: Fn(&ProviderDescriptor) -> Result<Arc<dyn ProviderClient>, ProviderError>
            + Send
            + Sync
            + 'static,
    {
        self.constructors
            .insert(client_type.into(), Arc::new(constructor));
        self
    }

    /// Registered client types, sorted.
    pub fn client_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.constructors.keys().map(|s| s.as_str()).collect();
        types.sort_unstable();
        types
    }

    pub fn supports(&self, client_type: &str) -> bool {
        self.constructors.contains_key(client_type)
    }

    /// Get the client for a provider, building it on first use.
    pub fn resolve(
        &self,
        provider: &ProviderDescriptor,
    ) -> Result<Arc<dyn ProviderClient>, DispatchError> {
        if let Some(client) = self
            .clients
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&provider.id)
        {
            return Ok(Arc::clone(client));
        }

        let constructor =
            self.constructors
                .get(&provider.client_type)
                .ok_or_else(|| DispatchError::UnknownProvider {
                    provider: provider.id.clone(),
                    client_type: provider.client_type.clone(),
                })?;

        let client = constructor(provider).map_err(|e| DispatchError::ClientInit {
            provider: provider.id.clone(),
            reason: e.to_string(),
        })?;

        debug!(provider = %provider.id, client_type = %provider.client_type, "Client constructed");

        let mut clients = self.clients.write().unwrap_or_else(|e| e.into_inner());
        // Another task may have raced us here; keep whichever landed first.
        let cached = clients
            .entry(provider.id.clone())
            .or_insert(client);
        Ok(Arc::clone(cached))
    }
}

impl std::fmt::Debug for ClientRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientRegistry")
            .field("client_types", &self.client_types())
            .finish()
    }
}
