//! Configuration loading, validation, and management for ModelRelay.
//!
//! Loads configuration from `~/.modelrelay/config.toml` (or the path in
//! `MODELRELAY_CONFIG`), fills provider API keys from environment
//! variables, validates cross references, and resolves everything into an
//! immutable [`Catalog`].

use modelrelay_core::catalog::{Catalog, ModelDescriptor, ProviderDescriptor, TaskProfile};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Environment variable overriding the config file path.
pub const CONFIG_PATH_ENV: &str = "MODELRELAY_CONFIG";

/// The root configuration structure.
///
/// Maps directly to `~/.modelrelay/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Provider endpoints
    #[serde(default)]
    pub providers: Vec<ProviderDescriptor>,

    /// Models served by those providers
    #[serde(default)]
    pub models: Vec<ModelDescriptor>,

    /// Logical tasks, keyed by task name
    #[serde(default)]
    pub tasks: HashMap<String, TaskConfig>,
}

/// Raw per-task settings before defaults are resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Ordered candidate model ids
    pub models: Vec<String>,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Attempt budget; inherits the candidates' largest provider `max_retry`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_budget: Option<u32>,

    /// Backoff seconds; inherits the candidates' largest provider `retry_interval`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_interval: Option<u64>,
}

fn default_max_tokens() -> u32 {
    1024
}
fn default_temperature() -> f32 {
    0.7
}

const FALLBACK_RETRY_BUDGET: u32 = 2;
const FALLBACK_RETRY_INTERVAL: u64 = 10;

impl AppConfig {
    /// Load configuration from `MODELRELAY_CONFIG` or the default path.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| Self::config_dir().join("config.toml"));
        Self::load_from(&path)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let mut config = Self::from_toml(&content).map_err(|e| match e {
            ConfigError::ParseError { reason, .. } => ConfigError::ParseError {
                path: path.to_path_buf(),
                reason,
            },
            other => other,
        })?;

        config.apply_env_keys();
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string without touching the environment.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError {
            path: PathBuf::new(),
            reason: e.to_string(),
        })
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".modelrelay")
    }

    /// Fill missing provider keys from their `api_key_env` variables.
    fn apply_env_keys(&mut self) {
        for provider in &mut self.providers {
            if provider.api_key.as_deref().is_some_and(|k| !k.is_empty()) {
                continue;
            }
            if let Some(var) = &provider.api_key_env {
                match std::env::var(var) {
                    Ok(key) => provider.api_key = Some(key),
                    Err(_) => tracing::warn!(
                        provider = %provider.id,
                        env = %var,
                        "API key environment variable is not set"
                    ),
                }
            }
        }
    }

    /// Validate cross references and value ranges.
    ///
    /// Client types are deliberately not checked here: an unregistered type
    /// only fails the tasks that actually reach it.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut provider_ids = HashSet::new();
        for p in &self.providers {
            if !provider_ids.insert(p.id.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate provider id '{}'",
                    p.id
                )));
            }
        }

        let mut model_ids = HashSet::new();
        for m in &self.models {
            if !model_ids.insert(m.id.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate model id '{}'",
                    m.id
                )));
            }
            if !provider_ids.contains(m.provider.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "model '{}' references unknown provider '{}'",
                    m.id, m.provider
                )));
            }
        }

        for (name, task) in &self.tasks {
            if task.models.is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "task '{name}' has no candidate models"
                )));
            }
            if let Some(missing) = task.models.iter().find(|m| !model_ids.contains(m.as_str())) {
                return Err(ConfigError::ValidationError(format!(
                    "task '{name}' references unknown model '{missing}'"
                )));
            }
            if !(0.0..=2.0).contains(&task.temperature) {
                return Err(ConfigError::ValidationError(format!(
                    "task '{name}': temperature must be between 0.0 and 2.0"
                )));
            }
        }

        Ok(())
    }

    /// Resolve task defaults and build the immutable catalog.
    pub fn catalog(&self) -> Result<Catalog, ConfigError> {
        self.validate()?;

        let providers: HashMap<&str, &ProviderDescriptor> =
            self.providers.iter().map(|p| (p.id.as_str(), p)).collect();
        let models: HashMap<&str, &ModelDescriptor> =
            self.models.iter().map(|m| (m.id.as_str(), m)).collect();

        let mut catalog = Catalog::new();
        for p in &self.providers {
            catalog = catalog.with_provider(p.clone());
        }
        for m in &self.models {
            catalog = catalog.with_model(m.clone());
        }

        for (name, task) in &self.tasks {
            let candidate_providers: Vec<&ProviderDescriptor> = task
                .models
                .iter()
                .filter_map(|m| models.get(m.as_str()))
                .filter_map(|m| providers.get(m.provider.as_str()).copied())
                .collect();

            let retry_budget = task.retry_budget.unwrap_or_else(|| {
                candidate_providers
                    .iter()
                    .map(|p| p.max_retry)
                    .max()
                    .unwrap_or(FALLBACK_RETRY_BUDGET)
            });
            let retry_interval = task.retry_interval.unwrap_or_else(|| {
                candidate_providers
                    .iter()
                    .map(|p| p.retry_interval)
                    .max()
                    .unwrap_or(FALLBACK_RETRY_INTERVAL)
            });

            let profile = TaskProfile::new(name.clone(), task.models.clone())
                .map_err(|e| ConfigError::ValidationError(e.to_string()))?
                .with_limits(task.max_tokens, task.temperature)
                .with_retry(retry_budget, retry_interval);
            catalog = catalog.with_task(profile);
        }

        Ok(catalog)
    }

    /// Generate an example config TOML string.
    pub fn example_toml() -> String {
        let mut tasks = HashMap::new();
        tasks.insert(
            "chat".to_string(),
            TaskConfig {
                models: vec!["deepseek-v3".into(), "gpt-4o-mini".into()],
                max_tokens: 800,
                temperature: 0.7,
                retry_budget: Some(3),
                retry_interval: None,
            },
        );
        let config = Self {
            providers: vec![
                ProviderDescriptor::new("deepseek", "openai")
                    .with_base_url("https://api.deepseek.com/v1"),
                ProviderDescriptor::new("openai", "openai")
                    .with_base_url("https://api.openai.com/v1"),
            ],
            models: vec![
                ModelDescriptor::new("deepseek-v3", "deepseek").with_identifier("deepseek-chat"),
                ModelDescriptor::new("gpt-4o-mini", "openai"),
            ],
            tasks,
        };
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
[[providers]]
id = "vendor-a"
client_type = "openai"
base_url = "https://a.example.com/v1"
max_retry = 4
retry_interval = 5

[[providers]]
id = "vendor-b"
client_type = "anthropic"
max_retry = 2
retry_interval = 20

[[models]]
id = "fast"
provider = "vendor-a"
model_identifier = "vendor/fast-v2"
price_in = 0.5
price_out = 1.5
[models.extra_params]
enable_thinking = false

[[models]]
id = "smart"
provider = "vendor-b"

[tasks.chat]
models = ["fast", "smart"]
max_tokens = 800

[tasks.embed]
models = ["fast"]
retry_budget = 1
retry_interval = 3
"#;

    #[test]
    fn parses_and_resolves_catalog() {
        let config = AppConfig::from_toml(SAMPLE).unwrap();
        let catalog = config.catalog().unwrap();

        let fast = catalog.model("fast").unwrap();
        assert_eq!(fast.wire_name(), "vendor/fast-v2");
        assert_eq!(fast.extra_params["enable_thinking"], serde_json::json!(false));

        let chat = catalog.task("chat").unwrap();
        assert_eq!(chat.models, vec!["fast", "smart"]);
        assert_eq!(chat.max_tokens, 800);
        assert!((chat.temperature - 0.7).abs() < f32::EPSILON);
        // inherited from the candidates' providers
        assert_eq!(chat.retry_budget, 4);
        assert_eq!(chat.retry_interval, 20);

        let embed = catalog.task("embed").unwrap();
        assert_eq!(embed.retry_budget, 1);
        assert_eq!(embed.retry_interval, 3);
    }

    #[test]
    fn unknown_model_rejected() {
        let mut config = AppConfig::from_toml(SAMPLE).unwrap();
        config.tasks.get_mut("chat").unwrap().models.push("ghost".into());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn empty_task_rejected() {
        let mut config = AppConfig::from_toml(SAMPLE).unwrap();
        config.tasks.get_mut("chat").unwrap().models.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn model_with_unknown_provider_rejected() {
        let mut config = AppConfig::from_toml(SAMPLE).unwrap();
        config.models.push(ModelDescriptor::new("orphan", "nowhere"));
        assert!(config.validate().is_err());
    }

    #[test]
    fn duplicate_provider_rejected() {
        let mut config = AppConfig::from_toml(SAMPLE).unwrap();
        let dup = config.providers[0].clone();
        config.providers.push(dup);
        assert!(config.validate().is_err());
    }

    #[test]
    fn invalid_temperature_rejected() {
        let mut config = AppConfig::from_toml(SAMPLE).unwrap();
        config.tasks.get_mut("chat").unwrap().temperature = 5.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn unregistered_client_type_is_not_a_load_error() {
        let mut config = AppConfig::from_toml(SAMPLE).unwrap();
        config.providers[0].client_type = "carrier-pigeon".into();
        assert!(config.catalog().is_ok());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert!(config.providers.is_empty());
        assert!(config.tasks.is_empty());
    }

    #[test]
    fn load_from_file_fills_key_from_env() {
        let var = "MODELRELAY_TEST_KEY_8F3A";
        // SAFETY: test-local variable name, not read by any other test.
        unsafe { std::env::set_var(var, "sk-from-env") };

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[[providers]]
id = "p"
client_type = "openai"
api_key_env = "{var}"

[[models]]
id = "m"
provider = "p"

[tasks.chat]
models = ["m"]
"#
        )
        .unwrap();

        let config = AppConfig::load_from(file.path()).unwrap();
        assert_eq!(config.providers[0].api_key.as_deref(), Some("sk-from-env"));
    }

    #[test]
    fn parse_error_reports_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "this is not = = toml").unwrap();
        let err = AppConfig::load_from(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { ref path, .. } if path == file.path()));
    }

    #[test]
    fn example_toml_parses() {
        let toml_str = AppConfig::example_toml();
        let config = AppConfig::from_toml(&toml_str).unwrap();
        assert!(config.catalog().is_ok());
        assert!(toml_str.contains("deepseek"));
    }
}
