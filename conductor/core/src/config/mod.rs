//! TOML Configuration File Support
//!
//! Centralized configuration for the generation core, loaded from
//! `~/.config/genconductor/conductor.toml`.
//!
//! # Configuration Priority
//!
//! Values are resolved with the following priority (highest first):
//! 1. CLI arguments (applied through [`ConfigOverrides`])
//! 2. Environment variables (`GENCONDUCTOR_*`)
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Provider Values
//!
//! Provider base URLs and secret keys are plain string values looked up by
//! dotted key through [`ConfigLookup`] (`doc2x.url`, `doc2x.key`,
//! `docmee.url`, `docmee.key`, `chat.url`, `chat.key`). A dotted key maps to
//! an environment variable by upper-casing and replacing dots with
//! underscores: `doc2x.key` → `GENCONDUCTOR_DOC2X_KEY`.
//!
//! # Example Configuration
//!
//! ```toml
//! [pipeline]
//! stream_buffer = 64
//! token_ttl_secs = 3000
//! poll_interval_ms = 1000
//! poll_timeout_secs = 60
//! request_timeout_secs = 120
//! template_candidates = 4
//!
//! [chat]
//! model = "deepseek-chat"
//! temperature = 0.7
//! max_tokens = 4000
//!
//! [values]
//! "doc2x.url" = "https://v2.doc2x.noedgeai.com"
//! "doc2x.key" = "sk-..."
//! ```

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::GenerationError;

/// Environment variable prefix for all overrides
pub const ENV_PREFIX: &str = "GENCONDUCTOR_";

/// Default chat completion endpoint
pub const DEFAULT_CHAT_URL: &str = "https://api.deepseek.com/chat/completions";

/// Default presentation provider base URL
pub const DEFAULT_DOCMEE_URL: &str = "https://easegen.docmee.cn";

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Key/Value Lookup
// =============================================================================

/// Key/value configuration lookup used to resolve provider endpoints and keys
pub trait ConfigLookup: Send + Sync {
    /// Raw value for `key`, if any
    fn get_value(&self, key: &str) -> Option<String>;

    /// Trimmed, non-blank value for `key`
    ///
    /// # Errors
    ///
    /// Returns [`GenerationError::Configuration`] when the key is missing or
    /// blank. This is fatal for the calling operation and is never retried.
    fn require_value(&self, key: &str) -> Result<String, GenerationError> {
        self.get_value(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| GenerationError::Configuration {
                key: key.to_string(),
            })
    }
}

/// In-memory lookup, mostly for tests and embedding
#[derive(Clone, Debug, Default)]
pub struct MapConfig {
    values: HashMap<String, String>,
}

impl MapConfig {
    /// Create an empty lookup
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }
}

impl ConfigLookup for MapConfig {
    fn get_value(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

/// Environment variable name for a dotted configuration key
#[must_use]
pub fn env_key_for(key: &str) -> String {
    let mut name = String::from(ENV_PREFIX);
    for c in key.chars() {
        if c.is_ascii_alphanumeric() {
            name.push(c.to_ascii_uppercase());
        } else {
            name.push('_');
        }
    }
    name
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where a configuration value came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// Pipeline section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineToml {
    /// Capacity of the live delta channel
    pub stream_buffer: Option<usize>,

    /// Capacity of the caller-facing event channel
    pub event_buffer: Option<usize>,

    /// Lifetime of a cached provider credential in seconds
    pub token_ttl_secs: Option<u64>,

    /// Usage limit requested with each credential
    pub token_limit: Option<u32>,

    /// Delay between status polls in milliseconds
    pub poll_interval_ms: Option<u64>,

    /// Upper bound on an async provider task in seconds
    pub poll_timeout_secs: Option<u64>,

    /// Upper bound on a single non-streaming provider call in seconds
    pub request_timeout_secs: Option<u64>,

    /// Number of templates requested before random selection
    pub template_candidates: Option<usize>,
}

/// Chat section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatToml {
    /// Model identifier sent with each completion
    pub model: Option<String>,

    /// Sampling temperature
    pub temperature: Option<f32>,

    /// Completion length cap
    pub max_tokens: Option<u32>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConductorToml {
    /// Pipeline tunables
    pub pipeline: PipelineToml,

    /// Chat completion settings
    pub chat: ChatToml,

    /// Provider endpoints and secrets by dotted key
    pub values: HashMap<String, String>,
}

// =============================================================================
// Resolved Configuration
// =============================================================================

/// Pipeline tunables after all sources are applied
#[derive(Clone, Debug, PartialEq)]
pub struct PipelineSettings {
    /// Capacity of the live delta channel
    pub stream_buffer: usize,
    /// Capacity of the caller-facing event channel
    pub event_buffer: usize,
    /// Lifetime of a cached credential
    pub token_ttl: Duration,
    /// Usage limit requested with each credential
    pub token_limit: Option<u32>,
    /// Delay between status polls
    pub poll_interval: Duration,
    /// Upper bound on an async provider task
    pub poll_timeout: Duration,
    /// Upper bound on a single non-streaming provider call
    pub request_timeout: Duration,
    /// Number of templates requested before random selection
    pub template_candidates: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            stream_buffer: 64,
            event_buffer: 128,
            // Provider tokens are valid for one hour
            token_ttl: Duration::from_secs(3000),
            token_limit: None,
            poll_interval: Duration::from_secs(1),
            poll_timeout: Duration::from_secs(60),
            request_timeout: crate::backend::DEFAULT_REQUEST_TIMEOUT,
            template_candidates: 4,
        }
    }
}

/// Chat completion settings after all sources are applied
#[derive(Clone, Debug, PartialEq)]
pub struct ChatSettings {
    /// Model identifier
    pub model: String,
    /// Sampling temperature
    pub temperature: f32,
    /// Completion length cap
    pub max_tokens: u32,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            model: "deepseek-chat".to_string(),
            temperature: 0.7,
            max_tokens: 4000,
        }
    }
}

/// Centralized configuration for the generation core
///
/// Use [`load_config`] to load with proper priority handling. The struct also
/// serves as the process-wide [`ConfigLookup`] for provider values.
#[derive(Clone, Debug)]
pub struct ConductorConfigFile {
    /// Pipeline tunables
    pub pipeline: PipelineSettings,

    /// Chat completion settings
    pub chat: ChatSettings,

    /// Provider values by dotted key
    pub values: HashMap<String, String>,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    /// Source of configuration values
    source: ConfigSource,
}

impl Default for ConductorConfigFile {
    fn default() -> Self {
        let mut values = HashMap::new();
        values.insert("chat.url".to_string(), DEFAULT_CHAT_URL.to_string());
        values.insert("docmee.url".to_string(), DEFAULT_DOCMEE_URL.to_string());

        Self {
            pipeline: PipelineSettings::default(),
            chat: ChatSettings::default(),
            values,
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl ConductorConfigFile {
    /// Create a new configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Set the configuration source
    pub fn set_source(&mut self, source: ConfigSource) {
        self.source = source;
    }

    /// Check that tunables are usable
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] for zero-sized buffers, a zero
    /// poll interval or request timeout, or an empty template candidate set.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pipeline.stream_buffer == 0 || self.pipeline.event_buffer == 0 {
            return Err(ConfigError::ValidationError(
                "channel buffers must hold at least one element".into(),
            ));
        }
        if self.pipeline.poll_interval.is_zero() {
            return Err(ConfigError::ValidationError(
                "poll_interval_ms must be greater than zero".into(),
            ));
        }
        if self.pipeline.request_timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "request_timeout_secs must be greater than zero".into(),
            ));
        }
        if self.pipeline.template_candidates == 0 {
            return Err(ConfigError::ValidationError(
                "template_candidates must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

impl ConfigLookup for ConductorConfigFile {
    fn get_value(&self, key: &str) -> Option<String> {
        std::env::var(env_key_for(key))
            .ok()
            .or_else(|| self.values.get(key).cloned())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/genconductor/conductor.toml` or
/// `~/.config/genconductor/conductor.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("genconductor").join("conductor.toml"))
}

/// Load configuration from all sources with proper priority
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed.
/// A missing config file is not an error (defaults are used).
pub fn load_config() -> Result<ConductorConfigFile, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed,
/// or if the resulting values fail validation.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<ConductorConfigFile, ConfigError> {
    let mut config = ConductorConfigFile::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: ConductorToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, toml_config);
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    apply_env_config(&mut config);
    config.validate()?;

    Ok(config)
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut ConductorConfigFile, toml: ConductorToml) {
    let pipeline = &mut config.pipeline;
    if let Some(size) = toml.pipeline.stream_buffer {
        pipeline.stream_buffer = size;
    }
    if let Some(size) = toml.pipeline.event_buffer {
        pipeline.event_buffer = size;
    }
    if let Some(secs) = toml.pipeline.token_ttl_secs {
        pipeline.token_ttl = Duration::from_secs(secs);
    }
    if toml.pipeline.token_limit.is_some() {
        pipeline.token_limit = toml.pipeline.token_limit;
    }
    if let Some(ms) = toml.pipeline.poll_interval_ms {
        pipeline.poll_interval = Duration::from_millis(ms);
    }
    if let Some(secs) = toml.pipeline.poll_timeout_secs {
        pipeline.poll_timeout = Duration::from_secs(secs);
    }
    if let Some(secs) = toml.pipeline.request_timeout_secs {
        pipeline.request_timeout = Duration::from_secs(secs);
    }
    if let Some(n) = toml.pipeline.template_candidates {
        pipeline.template_candidates = n;
    }

    if let Some(model) = toml.chat.model {
        config.chat.model = model;
    }
    if let Some(temperature) = toml.chat.temperature {
        config.chat.temperature = temperature;
    }
    if let Some(max_tokens) = toml.chat.max_tokens {
        config.chat.max_tokens = max_tokens;
    }

    config.values.extend(toml.values);
}

/// Parse a numeric environment override
fn env_number<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

/// Apply environment variable overrides to the config
///
/// Provider values are read from the environment lazily by
/// [`ConfigLookup::get_value`]; only typed tunables are applied here.
fn apply_env_config(config: &mut ConductorConfigFile) {
    if let Some(size) = env_number("GENCONDUCTOR_STREAM_BUFFER") {
        config.pipeline.stream_buffer = size;
        config.source = ConfigSource::Env;
    }
    if let Some(size) = env_number("GENCONDUCTOR_EVENT_BUFFER") {
        config.pipeline.event_buffer = size;
        config.source = ConfigSource::Env;
    }
    if let Some(secs) = env_number("GENCONDUCTOR_TOKEN_TTL_SECS") {
        config.pipeline.token_ttl = Duration::from_secs(secs);
        config.source = ConfigSource::Env;
    }
    if let Some(limit) = env_number("GENCONDUCTOR_TOKEN_LIMIT") {
        config.pipeline.token_limit = Some(limit);
        config.source = ConfigSource::Env;
    }
    if let Some(ms) = env_number("GENCONDUCTOR_POLL_INTERVAL_MS") {
        config.pipeline.poll_interval = Duration::from_millis(ms);
        config.source = ConfigSource::Env;
    }
    if let Some(secs) = env_number("GENCONDUCTOR_POLL_TIMEOUT_SECS") {
        config.pipeline.poll_timeout = Duration::from_secs(secs);
        config.source = ConfigSource::Env;
    }
    if let Some(secs) = env_number("GENCONDUCTOR_REQUEST_TIMEOUT_SECS") {
        config.pipeline.request_timeout = Duration::from_secs(secs);
        config.source = ConfigSource::Env;
    }
    if let Ok(model) = std::env::var("GENCONDUCTOR_CHAT_MODEL") {
        config.chat.model = model;
        config.source = ConfigSource::Env;
    }
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Builder for applying CLI overrides to configuration
///
/// Use this after [`load_config`] to apply command-line argument overrides.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Poll timeout override (seconds)
    pub poll_timeout_secs: Option<u64>,

    /// Chat model override
    pub chat_model: Option<String>,

    /// Extra provider values
    pub values: Vec<(String, String)>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set poll timeout override
    #[must_use]
    pub fn with_poll_timeout_secs(mut self, secs: u64) -> Self {
        self.poll_timeout_secs = Some(secs);
        self
    }

    /// Set chat model override
    #[must_use]
    pub fn with_chat_model(mut self, model: String) -> Self {
        self.chat_model = Some(model);
        self
    }

    /// Add a provider value override
    #[must_use]
    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.push((key.into(), value.into()));
        self
    }

    /// Whether any override is set
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.poll_timeout_secs.is_none() && self.chat_model.is_none() && self.values.is_empty()
    }

    /// Apply overrides to a configuration
    pub fn apply(&self, config: &mut ConductorConfigFile) {
        if self.is_empty() {
            return;
        }
        if let Some(secs) = self.poll_timeout_secs {
            config.pipeline.poll_timeout = Duration::from_secs(secs);
        }
        if let Some(ref model) = self.chat_model {
            config.chat.model = model.clone();
        }
        for (key, value) in &self.values {
            config.values.insert(key.clone(), value.clone());
        }
        config.source = ConfigSource::Cli;
    }
}
