//! `chatbridge serve`: Start the LINE webhook server.

use std::path::Path;

pub async fn run(config_path: Option<&Path>, port_override: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = super::load_config(config_path)?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    println!("chatbridge webhook server");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!("   Model:     {}", config.model);
    println!("   History:   {} min window", config.history.retention_minutes);

    chatbridge_gateway::start(config).await?;

    Ok(())
}
