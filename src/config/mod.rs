pub mod validation;

use serde::{Deserialize, Serialize};
use std::path::Path;

use self::validation::validate_config;

/// Error type for configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Invalid value for environment variable {name}: {message}")]
    Env { name: &'static str, message: String },
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
    /// Upstream call timeout in seconds; `0` disables it.
    #[serde(default)]
    pub timeout: u64,
    #[serde(default = "default_http_pool_max_idle_per_host")]
    pub http_pool_max_idle_per_host: usize,
    #[serde(default = "default_http_pool_idle_timeout_secs")]
    pub http_pool_idle_timeout_secs: u64,
    #[serde(default)]
    pub runtime_worker_threads: Option<usize>,
    #[serde(default = "default_runtime_max_blocking_threads")]
    pub runtime_max_blocking_threads: Option<usize>,
    #[serde(default)]
    pub base_path: String,
    #[serde(default = "default_stream_channel_capacity")]
    pub stream_channel_capacity: usize,
}

fn default_port() -> u16 {
    8000
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_http_pool_max_idle_per_host() -> usize {
    16
}
fn default_http_pool_idle_timeout_secs() -> u64 {
    15
}
#[allow(clippy::unnecessary_wraps)]
fn default_runtime_max_blocking_threads() -> Option<usize> {
    Some(8)
}
fn default_stream_channel_capacity() -> usize {
    32
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            timeout: 0,
            http_pool_max_idle_per_host: default_http_pool_max_idle_per_host(),
            http_pool_idle_timeout_secs: default_http_pool_idle_timeout_secs(),
            runtime_worker_threads: None,
            runtime_max_blocking_threads: default_runtime_max_blocking_threads(),
            base_path: String::new(),
            stream_channel_capacity: default_stream_channel_capacity(),
        }
    }
}

/// The single CodeGPT agent every completion is forwarded to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default)]
    pub agent_id: String,
    #[serde(default)]
    pub org_id: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub http_use_env_proxy: bool,
}

fn default_api_url() -> String {
    "https://api.codegpt.co/api/v1/chat/completions".to_string()
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            agent_id: String::new(),
            org_id: String::new(),
            api_key: String::new(),
            http_use_env_proxy: false,
        }
    }
}

/// Client authentication configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientAuthConfig {
    #[serde(default)]
    pub api_key: String,
}

/// Feature flags and settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturesConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "INFO".to_string()
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

const DEFAULT_MODELS: &[&str] = &[
    "deepseek-r1-bedrock",
    "gpt-4-turbo",
    "gpt-4o",
    "gpt-4o-mini",
    "gpt-3.5-turbo",
    "gpt-3.5-turbo-16k",
    "gpt-4.1",
    "gpt-4",
    "claude-4-sonnet-bedrock",
    "claude-4-sonnet-thinking-bedrock",
    "claude-3.5-sonnet-anthropic",
    "claude-3.7-sonnet-anthropic",
    "claude-3.7-sonnet-thinking-anthropic",
    "claude-3.7-bedrock",
    "claude-3.7-thinking-bedrock",
    "claude-3.5-haiku-bedrock",
    "claude-2.1",
    "claude-instant-1.2",
    "claude-3-sonnet",
    "claude-3.5-sonnet",
    "llama-4-maverick-17b-128e-instruct-maas-vertex",
    "claude-3.7-vertex",
    "claude-3.7-thinking-vertex",
    "claude-3-5-sonnet-vertex",
    "claude-3-5-haiku-vertex",
    "gemini-1.0-pro",
    "gemini-1.5-pro-latest",
    "gemini-1.5-flash",
    "gemini-2.5-pro-vertex",
    "gemini-2.5-flash-vertex",
    "gemini-2.0-flash-vertex",
    "gemini-2.0-flash-generative-ai",
    "gemini-2.0-flash-thinking-exp-1219-generative-ai",
    "llama-4-scout-17b-cf",
    "llama3-70b",
    "llama-3.1-70b",
    "llama-3.1-405b",
    "command-r-plus",
    "mistral-large-2",
    "o3-mini",
    "o1-preview",
    "o1-mini",
    "deepseek-reasoner-r1",
    "llama-3.1-8b-cerebras",
    "llama-3.3-70b-cerebras",
    "deepSeek",
    "llama-4-scout-17b-cerebras",
    "llama-4-scout-meta",
    "llama-4-maverick-meta",
];

fn default_models() -> Vec<String> {
    DEFAULT_MODELS.iter().map(ToString::to_string).collect()
}

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub client_authentication: ClientAuthConfig,
    #[serde(default = "default_models")]
    pub models: Vec<String>,
    #[serde(default)]
    pub features: FeaturesConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            upstream: UpstreamConfig::default(),
            client_authentication: ClientAuthConfig::default(),
            models: default_models(),
            features: FeaturesConfig::default(),
        }
    }
}

impl AppConfig {
    /// The catalog entry used when a request names no model.
    #[must_use]
    pub fn default_model(&self) -> &str {
        self.models.first().map_or("", String::as_str)
    }

    #[must_use]
    pub fn has_model(&self, model: &str) -> bool {
        self.models.iter().any(|m| m == model)
    }

    /// Overlay values from an environment lookup function.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Env`] when a numeric variable does not parse.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("CODEGPT_API_URL") {
            self.upstream.api_url = value;
        }
        if let Some(value) = lookup("CODEGPT_AGENT_ID") {
            self.upstream.agent_id = value;
        }
        if let Some(value) = lookup("CODEGPT_ORG_ID") {
            self.upstream.org_id = value;
        }
        if let Some(value) = lookup("CODEGPT_API_KEY") {
            self.upstream.api_key = value;
        }
        if let Some(value) = lookup("VALID_API_KEY") {
            self.client_authentication.api_key = value;
        }
        if let Some(value) = lookup("HOST") {
            self.server.host = value;
        }
        if let Some(value) = lookup("PORT") {
            self.server.port = value.trim().parse().map_err(|e| ConfigError::Env {
                name: "PORT",
                message: format!("{e}"),
            })?;
        }
        if let Some(value) = lookup("LOG_LEVEL") {
            self.features.log_level = value;
        }
        Ok(())
    }
}

/// Load configuration from an optional YAML file, overlay the process
/// environment, and validate the result.
///
/// A missing file is not an error: the service can be configured from the
/// environment alone.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] when reading an existing file fails,
/// [`ConfigError::Yaml`] when parsing fails, [`ConfigError::Env`] when an
/// override is malformed, or [`ConfigError::Validation`] when semantic
/// validation fails.
pub fn load_config(path: &str) -> Result<AppConfig, ConfigError> {
    let mut config = if Path::new(path).exists() {
        let contents = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&contents)?
    } else {
        AppConfig::default()
    };
    config.apply_env_overrides(|name| std::env::var(name).ok())?;
    validate_config(&config)?;
    Ok(config)
}
