//! `modelrelay generate`: Run a text completion for a task.

use std::path::{Path, PathBuf};

use base64::Engine;
use modelrelay_core::message::{ImageContent, Message};
use modelrelay_core::provider::{RequestContext, Response};

pub struct GenerateArgs {
    pub task: String,
    pub prompt: String,
    pub system: Option<String>,
    pub image: Option<PathBuf>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub json: bool,
}

pub async fn run(
    config_path: Option<&Path>,
    args: GenerateArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;
    let (executor, tracker) = super::build_executor(&config)?;
    let profile = super::find_task(&executor, &args.task)?;

    let image = args.image.as_deref().map(load_image).transpose()?;
    let context = build_context(&args, image);
    let token = super::ctrl_c_token();
    let response = executor
        .generate_with_cancel(profile, context, &token)
        .await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        print!("{}", render(&response));
    }

    super::log_usage(&tracker);
    Ok(())
}

/// Read an image file and base64-encode it.
fn load_image(path: &Path) -> Result<ImageContent, Box<dyn std::error::Error>> {
    let format = path
        .extension()
        .and_then(|e| e.to_str())
        .ok_or_else(|| format!("Cannot tell the image format of {}", path.display()))?;
    let bytes = std::fs::read(path)
        .map_err(|e| format!("Failed to read image {}: {e}", path.display()))?;
    let data = base64::engine::general_purpose::STANDARD.encode(&bytes);
    Ok(ImageContent::new(format, data))
}

fn build_context(args: &GenerateArgs, image: Option<ImageContent>) -> RequestContext {
    let mut messages = Vec::new();
    if let Some(system) = &args.system {
        messages.push(Message::system(system.clone()));
    }
    let mut user = Message::user(args.prompt.clone());
    if let Some(image) = image {
        user = user.with_image(image);
    }
    messages.push(user);

    let mut context = RequestContext::new(messages);
    if let Some(n) = args.max_tokens {
        context = context.with_max_tokens(n);
    }
    if let Some(t) = args.temperature {
        context = context.with_temperature(t);
    }
    context
}

fn render(response: &Response) -> String {
    let mut out = String::new();
    if let Some(reasoning) = response.reasoning.as_deref().filter(|r| !r.is_empty()) {
        out.push_str("── reasoning ──\n");
        out.push_str(reasoning);
        out.push_str("\n── answer ──\n");
    }
    if let Some(text) = &response.text {
        out.push_str(text);
        out.push('\n');
    }
    for call in response.tool_calls.iter().flatten() {
        out.push_str(&format!("🔧 {}({})\n", call.name, call.arguments));
    }
    out.push_str(&format!(
        "\n[model: {} via {}]\n",
        response.model_id, response.provider_id
    ));
    out
}
