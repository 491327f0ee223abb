//! Configuration management for chatstream
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.

use crate::chat::{ModelSpec, SessionConfig};
use crate::error::{ChatStreamError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure for chatstream
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Completion backend connection settings
    #[serde(default)]
    pub provider: ProviderConfig,
    /// Settings applied to newly created sessions
    #[serde(default)]
    pub completion: CompletionConfig,
    /// Session database settings
    #[serde(default)]
    pub storage: StorageConfig,
    /// Output stream settings
    #[serde(default)]
    pub stream: StreamConfig,
}

/// OpenAI-compatible endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Base URL, without the `/chat/completions` suffix
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Bearer token; usually supplied through the environment
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,
}

fn default_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_connect_timeout() -> u64 {
    30
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            api_key: None,
            connect_timeout_seconds: default_connect_timeout(),
        }
    }
}

/// Model and sampling settings for new sessions
///
/// Existing sessions keep the settings they were created with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionConfig {
    /// Model identifier
    #[serde(default = "default_model")]
    pub model: String,

    /// Context ceiling for retained messages
    #[serde(default = "default_model_max_tokens")]
    pub model_max_tokens: usize,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_top_p")]
    pub top_p: f32,

    #[serde(default = "default_n")]
    pub n: u32,

    #[serde(default)]
    pub stop: Vec<String>,

    /// Upper bound on generated tokens
    #[serde(default)]
    pub max_tokens: Option<u32>,

    #[serde(default)]
    pub presence_penalty: f32,

    #[serde(default)]
    pub frequency_penalty: f32,

    /// System message that opens every new session
    #[serde(default = "default_system_message")]
    pub initial_system_message: String,

    /// Keep the system message out of eviction
    #[serde(default)]
    pub pin_system_message: bool,
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_model_max_tokens() -> usize {
    4096
}

fn default_temperature() -> f32 {
    1.0
}

fn default_top_p() -> f32 {
    1.0
}

fn default_n() -> u32 {
    1
}

fn default_system_message() -> String {
    "You are a helpful assistant.".to_string()
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            model_max_tokens: default_model_max_tokens(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            n: default_n(),
            stop: Vec::new(),
            max_tokens: None,
            presence_penalty: 0.0,
            frequency_penalty: 0.0,
            initial_system_message: default_system_message(),
            pin_system_message: false,
        }
    }
}

impl CompletionConfig {
    /// Session parameters derived from this configuration
    ///
    /// # Examples
    ///
    /// ```
    /// use chatstream::config::CompletionConfig;
    ///
    /// let session_config = CompletionConfig::default().session_config();
    /// assert_eq!(session_config.model.name, "gpt-4o-mini");
    /// assert_eq!(session_config.model.max_tokens, 4096);
    /// ```
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            model: ModelSpec::new(self.model.clone(), self.model_max_tokens),
            temperature: self.temperature,
            top_p: self.top_p,
            n: self.n,
            stop: self.stop.clone(),
            max_tokens: self.max_tokens,
            presence_penalty: self.presence_penalty,
            frequency_penalty: self.frequency_penalty,
            pin_system_message: self.pin_system_message,
        }
    }
}

/// Session database configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Database file; the platform data directory when unset
    #[serde(default)]
    pub path: Option<String>,
}

/// Output stream configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Snapshots buffered before the producer waits on the consumer
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_channel_capacity() -> usize {
    64
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// # Arguments
    ///
    /// * `path` - Path to configuration file
    /// * `cli` - CLI arguments for overrides
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ChatStreamError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| ChatStreamError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(api_base) = std::env::var("CHATSTREAM_API_BASE") {
            self.provider.api_base = api_base;
        }

        if let Ok(api_key) =
            std::env::var("CHATSTREAM_API_KEY").or_else(|_| std::env::var("OPENAI_API_KEY"))
        {
            self.provider.api_key = Some(api_key);
        }

        if let Ok(model) = std::env::var("CHATSTREAM_MODEL") {
            self.completion.model = model;
        }

        if let Ok(max_tokens) = std::env::var("CHATSTREAM_MODEL_MAX_TOKENS") {
            match max_tokens.parse::<usize>() {
                Ok(v) => self.completion.model_max_tokens = v,
                Err(_) => tracing::warn!(
                    "Ignoring invalid CHATSTREAM_MODEL_MAX_TOKENS: {}",
                    max_tokens
                ),
            }
        }

        if let Ok(temperature) = std::env::var("CHATSTREAM_TEMPERATURE") {
            match temperature.parse::<f32>() {
                Ok(v) => self.completion.temperature = v,
                Err(_) => {
                    tracing::warn!("Ignoring invalid CHATSTREAM_TEMPERATURE: {}", temperature)
                }
            }
        }

        if let Ok(prompt) = std::env::var("CHATSTREAM_SYSTEM_PROMPT") {
            self.completion.initial_system_message = prompt;
        }

        if let Ok(db) = std::env::var("CHATSTREAM_DB") {
            self.storage.path = Some(db);
        }

        if let Ok(capacity) = std::env::var("CHATSTREAM_CHANNEL_CAPACITY") {
            match capacity.parse::<usize>() {
                Ok(v) => self.stream.channel_capacity = v,
                Err(_) => tracing::warn!(
                    "Ignoring invalid CHATSTREAM_CHANNEL_CAPACITY: {}",
                    capacity
                ),
            }
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if cli.verbose {
            tracing::debug!("Verbose mode enabled");
        }

        if let Some(model) = &cli.model {
            self.completion.model = model.clone();
        }

        if let Some(db) = &cli.storage_path {
            self.storage.path = Some(db.clone());
        }
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns `ChatStreamError::Config` naming the first invalid setting
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.provider.api_base).map_err(|e| {
            ChatStreamError::Config(format!(
                "Invalid provider.api_base {}: {}",
                self.provider.api_base, e
            ))
        })?;

        if self.provider.connect_timeout_seconds == 0 {
            return Err(ChatStreamError::Config(
                "provider.connect_timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        if self.completion.initial_system_message.trim().is_empty() {
            return Err(ChatStreamError::Config(
                "completion.initial_system_message cannot be empty".to_string(),
            )
            .into());
        }

        if self.stream.channel_capacity == 0 {
            return Err(ChatStreamError::Config(
                "stream.channel_capacity must be greater than 0".to_string(),
            )
            .into());
        }

        self.completion
            .session_config()
            .validate()
            .map_err(|e| ChatStreamError::Config(format!("completion: {}", e)))?;

        Ok(())
    }
}
