//! chatbridge CLI: the main entry point.
//!
//! Commands:
//! - `init`   : Write a default config file
//! - `serve`  : Start the LINE webhook server
//! - `chat`   : Talk to the bot from the terminal
//! - `check`  : Validate config and reference data
//! - `prompt` : Print the assembled system prompt

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "chatbridge",
    about = "chatbridge — LINE to LLM chat bridge",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to ~/.chatbridge/config.toml)
    #[arg(short, long, global = true, env = "CHATBRIDGE_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Start the LINE webhook server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Chat with the bot from the terminal
    Chat {
        /// Conversation key for the history store
        #[arg(short, long, default_value = "local")]
        user: String,

        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Validate config and reference data
    Check,

    /// Print the assembled system prompt
    Prompt,
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
        Commands::Init { force } => commands::init::run(config, force).await?,
        Commands::Serve { port } => commands::serve::run(config, port).await?,
        Commands::Chat { user, message } => commands::chat::run(config, &user, message).await?,
        Commands::Check => commands::check::run(config).await?,
        Commands::Prompt => commands::prompt::run(config).await?,
    }

    Ok(())
}
