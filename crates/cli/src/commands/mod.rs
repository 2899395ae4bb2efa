pub mod check;
pub mod embed;
pub mod generate;
pub mod providers;

use std::path::Path;
use std::sync::Arc;

use modelrelay_config::AppConfig;
use modelrelay_core::catalog::TaskProfile;
use modelrelay_dispatch::{CancellationToken, RequestExecutor};
use modelrelay_providers::ClientRegistry;
use modelrelay_telemetry::{PricingTable, UsageTracker};

/// Load the config from an explicit path or the default location.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let config = match path {
        Some(p) => AppConfig::load_from(p),
        None => AppConfig::load(),
    }
    .map_err(|e| format!("Failed to load config: {e}"))?;
    Ok(config)
}

/// Build an executor wired to an in-memory usage tracker.
pub fn build_executor(
    config: &AppConfig,
) -> Result<(RequestExecutor, Arc<UsageTracker>), Box<dyn std::error::Error>> {
    let catalog = config.catalog()?;
    let tracker = Arc::new(UsageTracker::with_pricing(PricingTable::from_catalog(
        &catalog,
    )));
    let executor = RequestExecutor::new(Arc::new(catalog), ClientRegistry::with_defaults())
        .with_recorder(tracker.clone());
    Ok((executor, tracker))
}

pub fn find_task<'a>(
    executor: &'a RequestExecutor,
    name: &str,
) -> Result<&'a TaskProfile, Box<dyn std::error::Error>> {
    executor.task(name).ok_or_else(|| {
        let mut known: Vec<&str> = executor.catalog().tasks().map(|t| t.name.as_str()).collect();
        known.sort_unstable();
        format!("Unknown task '{name}'. Configured tasks: {}", known.join(", ")).into()
    })
}

/// A token that is cancelled on Ctrl-C.
pub fn ctrl_c_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling request");
            trigger.cancel();
        }
    });
    token
}

/// Log the tracker's totals after a request.
pub fn log_usage(tracker: &UsageTracker) {
    let summary = tracker.summary();
    for m in &summary.by_model {
        tracing::info!(
            model = %m.model_id,
            provider = %m.provider_id,
            calls = m.calls,
            prompt_tokens = m.prompt_tokens,
            completion_tokens = m.completion_tokens,
            cost_usd = m.cost_usd,
            "Usage"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const CONFIG: &str = r#"
[[providers]]
id = "vendor"
client_type = "openai"
base_url = "http://127.0.0.1:9"

[[models]]
id = "small"
provider = "vendor"
price_in = 1.0
price_out = 2.0

[tasks.chat]
models = ["small"]
"#;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn builds_executor_from_config_file() {
        let file = write_config(CONFIG);
        let config = load_config(Some(file.path())).unwrap();
        let (executor, tracker) = build_executor(&config).unwrap();

        let task = find_task(&executor, "chat").unwrap();
        assert_eq!(task.models, vec!["small"]);
        assert_eq!(tracker.pricing().models(), vec!["small".to_string()]);
    }

    #[test]
    fn unknown_task_lists_configured_ones() {
        let file = write_config(CONFIG);
        let config = load_config(Some(file.path())).unwrap();
        let (executor, _) = build_executor(&config).unwrap();

        let err = find_task(&executor, "summarize").unwrap_err();
        assert!(err.to_string().contains("chat"));
    }

    #[test]
    fn invalid_config_is_reported() {
        let file = write_config("[[models]]\nid = \"orphan\"\nprovider = \"missing\"\n");
        let err = load_config(Some(file.path())).unwrap_err();
        assert!(err.to_string().contains("Failed to load config"));
    }
}
