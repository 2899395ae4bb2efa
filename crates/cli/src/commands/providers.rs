//! `modelrelay providers`: List registered client types.

use modelrelay_providers::ClientRegistry;

pub fn run() {
    println!("🤖 Registered Client Types");
    println!("==========================");
    println!();
    for client_type in ClientRegistry::with_defaults().client_types() {
        println!("  • {client_type:<10} {}", describe(client_type));
    }
    println!();
    println!("  Reference one from a provider entry:");
    println!("    [[providers]]");
    println!("    id = \"deepseek\"");
    println!("    client_type = \"openai\"");
    println!("    base_url = \"https://api.deepseek.com/v1\"");
    println!("    api_key_env = \"DEEPSEEK_API_KEY\"");
}

fn describe(client_type: &str) -> &'static str {
    match client_type {
        "openai" => "OpenAI-compatible /chat/completions and /embeddings",
        "anthropic" => "Anthropic Messages API (no embeddings)",
        _ => "custom",
    }
}
