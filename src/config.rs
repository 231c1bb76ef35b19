// Configuration File Support
//
// This module provides configuration file parsing for PromptGate.
// Supports TOML format with environment variable overrides.
// Configuration files are loaded from the platform config directory: ~/.config/promptgate/config.toml

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::rate_limit::RateLimitConfig;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// Per-session quota
    pub rate_limit: RateLimitConfig,

    /// Text generation backend
    pub generation: GenerationConfig,

    /// Overlap search backend
    pub search: SearchConfig,

    /// HTTP API
    pub server: ServerConfig,

    /// Metrics configuration
    pub metrics: MetricsConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, pretty, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}

/// Generation backend configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenerationConfig {
    /// Backend name (gemini, echo)
    pub backend: String,

    /// API base URL
    pub base_url: String,

    /// Models to pick from at random
    pub models: Vec<String>,

    /// Environment variables holding API keys, one key per variable
    pub api_key_env: Vec<String>,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Attempts per generation, including the first
    pub max_attempts: usize,

    /// Longest accepted prompt, in characters
    pub max_prompt_chars: usize,

    /// Longest returned response, in characters
    pub max_response_chars: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            backend: "gemini".to_string(),
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            models: vec!["gemini-1.5-flash".to_string(), "gemini-1.5-pro".to_string()],
            api_key_env: vec!["GOOGLE_API_KEY".to_string()],
            timeout_secs: 60,
            max_attempts: 3,
            max_prompt_chars: 10_000,
            max_response_chars: crate::generation::DEFAULT_MAX_RESPONSE_CHARS,
        }
    }
}

/// Overlap search configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SearchConfig {
    /// Whether overlap search is available
    pub enabled: bool,

    /// Search API endpoint
    pub endpoint: String,

    /// Environment variable holding the API key
    pub api_key_env: String,

    /// Environment variable holding the search engine id
    pub engine_id_env: String,

    /// Results requested per search
    pub max_results: usize,

    /// Words of generated text used as the query
    pub query_words: usize,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: "https://www.googleapis.com/customsearch/v1".to_string(),
            api_key_env: "GOOGLE_SEARCH_API_KEY".to_string(),
            engine_id_env: "GOOGLE_SEARCH_ENGINE_ID".to_string(),
            max_results: 5,
            query_words: 32,
            timeout_secs: 15,
        }
    }
}

/// HTTP API configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address
    pub host: String,

    /// Listen port
    pub port: u16,

    /// Sessions idle longer than this are dropped
    pub session_idle_ttl_secs: u64,

    /// Interval between idle-session sweeps
    pub purge_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            session_idle_ttl_secs: 24 * 3600,
            purge_interval_secs: 300,
        }
    }
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MetricsConfig {
    /// Whether to expose /metrics
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Config {
    /// Load configuration from the default config directory
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    /// If the config file does not exist, returns default configuration.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed, or
    /// if the result fails validation. A missing file yields the defaults
    /// with environment overrides applied.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let config = if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file from {:?}", path))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file from {:?}", path))?;
            tracing::info!("Loaded configuration from {:?}", path);
            config
        } else {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            Self::default()
        };

        let config = config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path
    ///
    /// Returns `~/.config/promptgate/config.toml` on Linux
    pub fn config_path() -> PathBuf {
        if let Some(proj_dirs) = directories::ProjectDirs::from("com", "promptgate", "promptgate") {
            proj_dirs.config_dir().join("config.toml")
        } else {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home)
                .join(".config")
                .join("promptgate")
                .join("config.toml")
        }
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Environment variables take precedence over config file values:
    /// - PROMPTGATE_LOG_LEVEL
    /// - PROMPTGATE_LOG_FORMAT
    /// - PROMPTGATE_RATE_LIMIT_* (see [`RateLimitConfig::with_env_overrides`])
    /// - PROMPTGATE_GENERATION_BACKEND
    /// - PROMPTGATE_SERVER_PORT
    /// - PROMPTGATE_METRICS_ENABLED
    pub fn apply_env_overrides(mut self) -> Self {
        if let Ok(level) = std::env::var("PROMPTGATE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("PROMPTGATE_LOG_FORMAT") {
            self.logging.format = format;
        }

        self.rate_limit = self.rate_limit.with_env_overrides();

        if let Ok(backend) = std::env::var("PROMPTGATE_GENERATION_BACKEND") {
            if !backend.trim().is_empty() {
                self.generation.backend = backend.trim().to_lowercase();
            }
        }

        if let Ok(port) = std::env::var("PROMPTGATE_SERVER_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                if port > 0 {
                    self.server.port = port;
                }
            }
        }

        if let Ok(enabled) = std::env::var("PROMPTGATE_METRICS_ENABLED") {
            self.metrics.enabled = enabled.parse().unwrap_or(self.metrics.enabled);
        }

        self
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<()> {
        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                self.logging.level
            ),
        }

        match self.logging.format.to_lowercase().as_str() {
            "json" | "pretty" | "compact" => {}
            _ => anyhow::bail!(
                "Invalid log format: {}. Must be one of: json, pretty, compact",
                self.logging.format
            ),
        }

        self.rate_limit
            .validate()
            .context("Invalid [rate_limit] section")?;

        match self.generation.backend.to_lowercase().as_str() {
            "gemini" | "echo" => {}
            _ => anyhow::bail!(
                "Invalid generation backend: {}. Must be 'gemini' or 'echo'",
                self.generation.backend
            ),
        }
        if self.generation.backend.eq_ignore_ascii_case("gemini") {
            if self.generation.models.is_empty() {
                anyhow::bail!("At least one generation model must be configured");
            }
            if self.generation.api_key_env.is_empty() {
                anyhow::bail!("At least one API key variable must be configured");
            }
        }
        if self.generation.max_attempts == 0 {
            anyhow::bail!("Generation max_attempts must be > 0");
        }
        if self.generation.max_prompt_chars == 0 {
            anyhow::bail!("Generation max_prompt_chars must be > 0");
        }
        if self.generation.max_response_chars == 0 {
            anyhow::bail!("Generation max_response_chars must be > 0");
        }

        if self.search.enabled && self.search.query_words == 0 {
            anyhow::bail!("Search query_words must be > 0");
        }

        if self.server.port == 0 {
            anyhow::bail!("Server port must be > 0");
        }
        if self.server.purge_interval_secs == 0 {
            anyhow::bail!("Server purge_interval_secs must be > 0");
        }
        if self.server.session_idle_ttl_secs < self.rate_limit.window_secs.max(1) {
            anyhow::bail!(
                "Server session_idle_ttl_secs ({}) must be at least rate_limit.window_secs ({})",
                self.server.session_idle_ttl_secs,
                self.rate_limit.window_secs
            );
        }

        Ok(())
    }

    /// Convert log level string to tracing::Level
    pub fn log_level(&self) -> Result<tracing::Level> {
        self.logging
            .level
            .to_lowercase()
            .parse()
            .map_err(|e| anyhow::anyhow!("Failed to parse log level: {}", e))
    }
}
