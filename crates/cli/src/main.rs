//! Grapnel CLI — the main entry point.
//!
//! Commands:
//! - `chat`   — Interactive chat or single-message mode
//! - `models` — List models available from the configured provider

use clap::{Parser, Subcommand};

mod chat;

#[derive(Parser)]
#[command(
    name = "grapnel",
    about = "Grapnel — a hook-driven LLM agent framework",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the agent
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Ask for confirmation before every tool call
        #[arg(long)]
        approve_tools: bool,
    },

    /// List models available from the configured provider
    Models,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Chat {
            message,
            approve_tools,
        } => chat::run(message, approve_tools).await?,
        Commands::Models => chat::list_models().await?,
    }

    Ok(())
}
