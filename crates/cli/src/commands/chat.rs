//! `chatbridge chat`: Interactive or single-message chat mode.
//!
//! Runs the same exchange the webhook does, minus LINE: history, persona and
//! fallback behave identically.

use std::io::Write;
use std::path::Path;

use chatbridge_config::AppConfig;
use tokio::io::{AsyncBufReadExt, BufReader};

pub async fn run(
    config_path: Option<&Path>,
    user: &str,
    message: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;

    // Check for API key early, give a clear error
    if !config.has_api_key() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set the environment variable:");
        eprintln!("    OPENAI_API_KEY=sk-...");
        eprintln!();
        eprintln!("  Or add it to the [provider] section of:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let (agent, _history) = chatbridge_gateway::build_agent(&config)?;

    if let Some(msg) = message {
        // Single message mode
        let reply = agent.respond(user, &msg).await;
        println!("{}", reply.text());
        return Ok(());
    }

    println!();
    println!("  chatbridge — Interactive Mode");
    println!();
    println!("  Provider:  {}", agent.provider_name());
    println!("  Model:     {}", agent.model());
    println!("  User:      {user}");
    println!();
    println!("  Type your message and press Enter.");
    println!("  Type 'exit' or Ctrl+D to quit.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    print!("  You > ");
    std::io::stdout().flush()?;

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line == "exit" || line == "quit" {
            break;
        }
        if !line.is_empty() {
            let reply = agent.respond(user, line).await;
            println!();
            let prefix = if reply.is_fallback() { "Fallback" } else { "Bot" };
            for text in reply.text().lines() {
                println!("  {prefix} > {text}");
            }
            println!();
        }

        print!("  You > ");
        std::io::stdout().flush()?;
    }

    println!();
    println!("  Goodbye!");
    println!();

    Ok(())
}
