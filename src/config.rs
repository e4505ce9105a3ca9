// Configuration File Support
//
// Bridge configuration is read from an optional TOML file and then overridden
// from the process environment. In a typical deployment the file is absent and
// everything comes from FEISHU_* / GITHUB_* variables injected by the host.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct BridgeConfig {
    /// HTTP listener configuration
    pub server: ServerConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Feishu app credentials
    pub feishu: FeishuConfig,

    /// Downstream repository dispatch configuration
    pub dispatch: DispatchConfig,
}

/// HTTP listener configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind
    pub bind: String,

    /// Port to listen on
    pub port: u16,

    /// Path Feishu posts event callbacks to
    pub webhook_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 8080,
            webhook_path: "/webhook/event".to_string(),
        }
    }
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

/// Feishu app configuration
#[derive(Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FeishuConfig {
    /// Event encrypt key; required once the app enables encrypted callbacks
    pub encrypt_key: Option<String>,

    /// App ID, used only for outbound messages
    pub app_id: Option<String>,

    /// App secret, used only for outbound messages
    pub app_secret: Option<String>,

    /// Open platform base URL
    pub api_base: String,
}

impl Default for FeishuConfig {
    fn default() -> Self {
        Self {
            encrypt_key: None,
            app_id: None,
            app_secret: None,
            api_base: "https://open.feishu.cn".to_string(),
        }
    }
}

impl fmt::Debug for FeishuConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeishuConfig")
            .field("encrypt_key", &redact(&self.encrypt_key))
            .field("app_id", &self.app_id)
            .field("app_secret", &redact(&self.app_secret))
            .field("api_base", &self.api_base)
            .finish()
    }
}

/// Repository dispatch configuration
#[derive(Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DispatchConfig {
    /// API base URL of the repository host
    pub api_base: String,

    /// Target repository as `owner/name`
    pub repo: Option<String>,

    /// Access token sent as `Authorization: token <token>`
    pub token: Option<String>,

    /// `event_type` of the dispatch event
    pub event_type: String,

    /// Request timeout in seconds for the dispatch call
    pub timeout_secs: u64,

    /// Forward on a detached task instead of awaiting before acknowledging
    pub detached: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.github.com".to_string(),
            repo: None,
            token: None,
            event_type: "feishu_trigger".to_string(),
            timeout_secs: 10,
            detached: false,
        }
    }
}

impl fmt::Debug for DispatchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchConfig")
            .field("api_base", &self.api_base)
            .field("repo", &self.repo)
            .field("token", &redact(&self.token))
            .field("event_type", &self.event_type)
            .field("timeout_secs", &self.timeout_secs)
            .field("detached", &self.detached)
            .finish()
    }
}

fn redact(secret: &Option<String>) -> Option<&'static str> {
    secret.as_ref().map(|_| "[REDACTED]")
}

/// Read an environment variable, treating an empty value as unset
fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

impl BridgeConfig {
    /// Load configuration from an optional file, then apply the environment
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be parsed, or if the
    /// resulting configuration fails validation.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => {
                let config = Self::default().apply_env_overrides();
                config.validate()?;
                Ok(config)
            }
        }
    }

    /// Load configuration from a specific path
    ///
    /// If the file does not exist, defaults are used before the environment
    /// overrides are applied.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let config = if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file from {:?}", path))?;
            let config: BridgeConfig = toml::from_str(&content)
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

    /// Apply environment variable overrides to the configuration
    ///
    /// Environment variables take precedence over config file values:
    /// - FEISHU_ENCRYPT_KEY, FEISHU_APP_ID, FEISHU_APP_SECRET, FEISHU_API_BASE
    /// - GITHUB_REPO, GITHUB_TOKEN, GITHUB_API_BASE
    /// - BRIDGE_LOG_LEVEL, BRIDGE_LOG_FORMAT, BRIDGE_BIND, BRIDGE_PORT
    pub fn apply_env_overrides(mut self) -> Self {
        // Feishu
        if let Some(key) = env_var("FEISHU_ENCRYPT_KEY") {
            self.feishu.encrypt_key = Some(key);
        }
        if let Some(app_id) = env_var("FEISHU_APP_ID") {
            self.feishu.app_id = Some(app_id);
        }
        if let Some(secret) = env_var("FEISHU_APP_SECRET") {
            self.feishu.app_secret = Some(secret);
        }
        if let Some(base) = env_var("FEISHU_API_BASE") {
            self.feishu.api_base = base;
        }

        // Dispatch
        if let Some(repo) = env_var("GITHUB_REPO") {
            self.dispatch.repo = Some(repo);
        }
        if let Some(token) = env_var("GITHUB_TOKEN") {
            self.dispatch.token = Some(token);
        }
        if let Some(base) = env_var("GITHUB_API_BASE") {
            self.dispatch.api_base = base;
        }

        // Logging
        if let Some(level) = env_var("BRIDGE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = env_var("BRIDGE_LOG_FORMAT") {
            self.logging.format = format;
        }

        // Server
        if let Some(bind) = env_var("BRIDGE_BIND") {
            self.server.bind = bind;
        }
        if let Some(port) = env_var("BRIDGE_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                if port > 0 {
                    self.server.port = port;
                }
            }
        }

        self
    }

    /// Validate the configuration
    ///
    /// Secrets are not required here: a missing encrypt key only matters once
    /// an encrypted callback arrives, and missing dispatch settings only once
    /// a message needs forwarding.
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

        if self.server.port == 0 {
            anyhow::bail!("Server port must be > 0");
        }
        if !self.server.webhook_path.starts_with('/') {
            anyhow::bail!(
                "Webhook path must start with '/': {}",
                self.server.webhook_path
            );
        }

        if self.dispatch.timeout_secs == 0 {
            anyhow::bail!("Dispatch timeout must be > 0 seconds");
        }
        if self.dispatch.event_type.is_empty() {
            anyhow::bail!("Dispatch event_type must not be empty");
        }
        if let Some(repo) = &self.dispatch.repo {
            if repo.split('/').filter(|part| !part.is_empty()).count() != 2 {
                anyhow::bail!("Dispatch repo must be in owner/name form: {}", repo);
            }
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
