pub mod chat;
pub mod check;
pub mod init;
pub mod prompt;
pub mod serve;

use std::path::Path;

use chatbridge_config::AppConfig;

pub(crate) fn load_config(path: Option<&Path>) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let config = AppConfig::load(path).map_err(|e| format!("Failed to load config: {e}"))?;
    tracing::debug!(model = %config.model, port = config.gateway.port, "Config loaded");
    Ok(config)
}
