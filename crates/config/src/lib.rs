//! Configuration loading, validation, and management for chatbridge.
//!
//! Loads configuration from `~/.chatbridge/config.toml` (or an explicit path)
//! with environment variable overrides. Validates all settings at startup.

use chatbridge_core::persona::PersonaPaths;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Reply sent to the chat user whenever the completion gateway fails.
pub const DEFAULT_FALLBACK_REPLY: &str =
    "申し訳ありません。ただいま応答できません。少し時間をおいてお試しください。";

/// The root configuration structure.
///
/// Maps directly to `~/.chatbridge/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Model identifier sent with every completion request
    #[serde(default = "default_model")]
    pub model: String,

    /// Fixed reply used when the model cannot answer
    #[serde(default = "default_fallback_reply")]
    pub fallback_reply: String,

    /// Completion gateway settings
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Conversation history settings
    #[serde(default)]
    pub history: HistoryConfig,

    /// HTTP server settings
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// LINE Messaging API settings
    #[serde(default)]
    pub line: LineConfig,

    /// Persona and reference data files
    #[serde(default)]
    pub persona: PersonaConfig,
}

fn default_model() -> String {
    "gpt-4.1-nano".into()
}
fn default_fallback_reply() -> String {
    DEFAULT_FALLBACK_REPLY.into()
}
fn default_true() -> bool {
    true
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Completion calls taking longer than this count as failures
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_api_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_request_timeout() -> u64 {
    30
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: default_api_url(),
            temperature: None,
            max_tokens: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl ProviderConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// How long a turn stays in context
    #[serde(default = "default_retention_minutes")]
    pub retention_minutes: u64,

    /// Optional per-user entry cap; unset means unbounded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_entries_per_user: Option<usize>,

    /// Optional background sweep interval; unset means lazy eviction only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sweep_interval_secs: Option<u64>,

    /// Run exchanges for the same user one at a time
    #[serde(default = "default_true")]
    pub serialize_per_user: bool,
}

fn default_retention_minutes() -> u64 {
    180
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            retention_minutes: default_retention_minutes(),
            max_entries_per_user: None,
            sweep_interval_secs: None,
            serialize_per_user: true,
        }
    }
}

impl HistoryConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_minutes.saturating_mul(60))
    }

    pub fn sweep_interval(&self) -> Option<Duration> {
        self.sweep_interval_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

fn default_port() -> u16 {
    3000
}
fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_body_limit() -> usize {
    1024 * 1024
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            body_limit_bytes: default_body_limit(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct LineConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_access_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_secret: Option<String>,

    #[serde(default = "default_line_api_url")]
    pub api_url: String,
}

fn default_line_api_url() -> String {
    "https://api.line.me".into()
}

impl Default for LineConfig {
    fn default() -> Self {
        Self {
            channel_access_token: None,
            channel_secret: None,
            api_url: default_line_api_url(),
        }
    }
}

impl std::fmt::Debug for LineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineConfig")
            .field("channel_access_token", &redact(&self.channel_access_token))
            .field("channel_secret", &redact(&self.channel_secret))
            .field("api_url", &self.api_url)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaConfig {
    #[serde(default = "default_persona_path")]
    pub persona_path: PathBuf,

    #[serde(default = "default_menu_path")]
    pub menu_path: PathBuf,

    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,

    /// Override the system prompt entirely (skips file loading)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt_override: Option<String>,
}

fn default_persona_path() -> PathBuf {
    PathBuf::from("persona.txt")
}
fn default_menu_path() -> PathBuf {
    PathBuf::from("menu.json")
}
fn default_store_path() -> PathBuf {
    PathBuf::from("store.json")
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            persona_path: default_persona_path(),
            menu_path: default_menu_path(),
            store_path: default_store_path(),
            system_prompt_override: None,
        }
    }
}

impl PersonaConfig {
    pub fn paths(&self) -> PersonaPaths {
        PersonaPaths {
            persona: self.persona_path.clone(),
            menu: Some(self.menu_path.clone()),
            store: Some(self.store_path.clone()),
            system_prompt_override: self.system_prompt_override.clone(),
        }
    }
}

impl AppConfig {
    /// Load configuration from `path`, or the default location when `None`.
    ///
    /// Environment variables override file values:
    /// - `OPENAI_API_KEY`
    /// - `CHATBRIDGE_MODEL`
    /// - `LINE_CHANNEL_ACCESS_TOKEN`
    /// - `LINE_CHANNEL_SECRET`
    /// - `PORT`
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_dir().join("config.toml"),
        };
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides using `lookup` to read variables.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("OPENAI_API_KEY") {
            self.provider.api_key = Some(key);
        }
        if let Some(model) = lookup("CHATBRIDGE_MODEL") {
            self.model = model;
        }
        if let Some(token) = lookup("LINE_CHANNEL_ACCESS_TOKEN") {
            self.line.channel_access_token = Some(token);
        }
        if let Some(secret) = lookup("LINE_CHANNEL_SECRET") {
            self.line.channel_secret = Some(secret);
        }
        if let Some(port) = lookup("PORT") {
            self.gateway.port = port.parse().map_err(|_| {
                ConfigError::ValidationError(format!("PORT must be a port number, got {port:?}"))
            })?;
        }
        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".chatbridge")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.history.retention_minutes == 0 {
            return Err(ConfigError::ValidationError(
                "history.retention_minutes must be > 0".into(),
            ));
        }

        if self.history.max_entries_per_user == Some(0) {
            return Err(ConfigError::ValidationError(
                "history.max_entries_per_user must be > 0 when set".into(),
            ));
        }

        if self.history.sweep_interval_secs == Some(0) {
            return Err(ConfigError::ValidationError(
                "history.sweep_interval_secs must be > 0 when set".into(),
            ));
        }

        if self.provider.request_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "provider.request_timeout_secs must be > 0".into(),
            ));
        }

        if let Some(t) = self.provider.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(ConfigError::ValidationError(
                    "provider.temperature must be between 0.0 and 2.0".into(),
                ));
            }
        }

        if self.model.trim().is_empty() {
            return Err(ConfigError::ValidationError("model must not be empty".into()));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.provider.api_key.is_some()
    }

    /// Generate a default config TOML string (for `chatbridge init`).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            fallback_reply: default_fallback_reply(),
            provider: ProviderConfig::default(),
            history: HistoryConfig::default(),
            gateway: GatewayConfig::default(),
            line: LineConfig::default(),
            persona: PersonaConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
