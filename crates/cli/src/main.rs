//! ModelRelay CLI: the main entry point.
//!
//! Commands:
//! - `generate` : Run a text completion for a task
//! - `embed`    : Embed a piece of text with a task's models
//! - `check`    : Validate the config and resolve every provider
//! - `providers`: List registered client types

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "modelrelay",
    about = "ModelRelay: resilient multi-provider LLM request dispatcher",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to ~/.modelrelay/config.toml)
    #[arg(short, long, global = true, env = "MODELRELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate text for a task
    Generate {
        /// Task name from the config
        #[arg(short, long)]
        task: String,

        /// User prompt
        #[arg(short, long)]
        prompt: String,

        /// Optional system prompt
        #[arg(short, long)]
        system: Option<String>,

        /// Attach an image file (format taken from its extension)
        #[arg(short, long)]
        image: Option<PathBuf>,

        /// Override the task's max tokens
        #[arg(long)]
        max_tokens: Option<u32>,

        /// Override the task's temperature
        #[arg(long)]
        temperature: Option<f32>,

        /// Print the full response as JSON
        #[arg(long)]
        json: bool,
    },

    /// Embed text with a task's models
    Embed {
        /// Task name from the config
        #[arg(short, long)]
        task: String,

        /// Text to embed
        #[arg(long)]
        text: String,
    },

    /// Validate the configuration
    Check,

    /// List registered client types
    Providers,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = cli.config.as_deref();
    match cli.command {
        Commands::Generate {
            task,
            prompt,
            system,
            image,
            max_tokens,
            temperature,
            json,
        } => {
            let args = commands::generate::GenerateArgs {
                task,
                prompt,
                system,
                image,
                max_tokens,
                temperature,
                json,
            };
            commands::generate::run(config, args).await?
        }
        Commands::Embed { task, text } => commands::embed::run(config, &task, &text).await?,
        Commands::Check => commands::check::run(config)?,
        Commands::Providers => commands::providers::run(),
    }

    Ok(())
}
