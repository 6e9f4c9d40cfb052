//! TOML configuration parsing.
//!
//! Every section is optional. `[settings]` supplies the defaults for new
//! sessions and goes through the same range validation as runtime
//! settings; the remaining sections configure the external services.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::settings::{RagSettings, SettingsInput};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub settings: SettingsInput,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Environment variable holding the access token.
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            token_env: default_token_env(),
            timeout_secs: default_generation_timeout(),
        }
    }
}

fn default_api_url() -> String {
    "https://api-inference.huggingface.co".to_string()
}
fn default_token_env() -> String {
    "HF_TOKEN".to_string()
}
fn default_generation_timeout() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: 0,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "local".to_string()
}
fn default_batch_size() -> usize {
    32
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Upper bound on live sessions; creation fails once it is reached.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
    /// Sessions untouched for this long are dropped.
    #[serde(default = "default_session_idle_secs")]
    pub session_idle_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_sessions: default_max_sessions(),
            session_idle_secs: default_session_idle_secs(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8501".to_string()
}
fn default_max_sessions() -> usize {
    256
}
fn default_session_idle_secs() -> u64 {
    3600
}

impl Config {
    /// Session defaults from `[settings]`, with the token taken from the
    /// configured environment variable when the file does not set one.
    pub fn session_settings(&self) -> Result<RagSettings> {
        let mut input = self.settings.clone();
        if input.token.is_none() {
            input.token = std::env::var(&self.generation.token_env).ok();
        }
        RagSettings::from_input(input).map_err(|e| anyhow::anyhow!("[settings]: {}", e))
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    RagSettings::from_input(config.settings.clone())
        .map_err(|e| anyhow::anyhow!("[settings]: {}", e))?;

    if config.generation.timeout_secs == 0 {
        bail!("generation.timeout_secs must be > 0");
    }
    if config.generation.token_env.trim().is_empty() {
        bail!("generation.token_env must not be empty");
    }

    if config.server.max_sessions == 0 {
        bail!("server.max_sessions must be > 0");
    }
    if config.server.session_idle_secs == 0 {
        bail!("server.session_idle_secs must be > 0");
    }

    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }
    if config.embedding.dims == Some(0) {
        bail!("embedding.dims must be > 0");
    }

    match config.embedding.provider.as_str() {
        "disabled" | "local" | "huggingface" | "openai" | "ollama" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be local, huggingface, openai, ollama, or disabled.",
            other
        ),
    }

    if config.embedding.provider == "openai"
        && (config.embedding.model.is_none() || config.embedding.dims.is_none())
    {
        bail!("embedding.model and embedding.dims must be specified when provider is 'openai'");
    }

    Ok(())
}
