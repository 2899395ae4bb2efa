//! `modelrelay embed`: Embed text with a task's models.

use std::path::Path;

pub async fn run(
    config_path: Option<&Path>,
    task: &str,
    text: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;
    let (executor, tracker) = super::build_executor(&config)?;
    let profile = super::find_task(&executor, task)?;

    let token = super::ctrl_c_token();
    let response = executor.embed_with_cancel(profile, text, &token).await?;

    let vector = response.embedding.unwrap_or_default();
    let preview: Vec<String> = vector.iter().take(8).map(|v| format!("{v:.4}")).collect();
    println!("Dimensions: {}", vector.len());
    println!("Preview:    [{}{}]", preview.join(", "), if vector.len() > 8 { ", ..." } else { "" });
    println!("Model:      {} via {}", response.model_id, response.provider_id);

    super::log_usage(&tracker);
    Ok(())
}
