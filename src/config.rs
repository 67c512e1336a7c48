/*!
 * Configuration types for Portcullis
 */

use portcullis_connect::{ApiPaths, ClientConfig, ShellAuth, ShellAuthMode};
use portcullis_sentinel::BackoffPolicy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

use crate::error::{PortcullisError, Result};

/// Environment variable that overrides `api.token`
pub const TOKEN_ENV: &str = "PORTCULLIS_API_TOKEN";

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    /// Log level for diagnostic output
    #[serde(default)]
    pub log_level: LogLevel,

    /// Log file path (None = stdout)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<std::path::PathBuf>,

    /// Enable verbose logging (shorthand for log_level = debug)
    #[serde(default)]
    pub verbose: bool,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub access: AccessConfig,

    /// Cadence of the orphaned-policy sweep
    #[serde(default)]
    pub maintenance: BackoffPolicy,

    /// Workloads known to the static discovery adapter
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub workloads: Vec<StaticWorkload>,
}

/// Remote access-control API connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL including the fixed API prefix, e.g. `https://api.example.com/api/v1`
    #[serde(default)]
    pub base_url: String,

    /// Bearer token; `PORTCULLIS_API_TOKEN` takes precedence when set
    #[serde(default)]
    pub token: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Collection and item path segments
    #[serde(default)]
    pub paths: ApiPaths,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            token: String::new(),
            request_timeout_secs: default_request_timeout(),
            paths: ApiPaths::default(),
        }
    }
}

/// What every provisioned endpoint binds to and who may use it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessConfig {
    /// Relays new endpoints bind to
    #[serde(default)]
    pub connector_ids: Vec<String>,

    /// Externally managed policies attached to every endpoint
    #[serde(default)]
    pub predefined_policy_ids: Vec<String>,

    /// Upstream login for shell endpoints
    #[serde(default = "default_shell_username")]
    pub shell_username: String,

    #[serde(default)]
    pub shell_auth_mode: ShellAuthMode,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            connector_ids: Vec::new(),
            predefined_policy_ids: Vec::new(),
            shell_username: default_shell_username(),
            shell_auth_mode: ShellAuthMode::default(),
        }
    }
}

impl AccessConfig {
    pub fn shell_auth(&self) -> ShellAuth {
        ShellAuth {
            username: self.shell_username.clone(),
            mode: self.shell_auth_mode,
        }
    }
}

/// A workload entry for `StaticDiscovery`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticWorkload {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<IpAddr>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

/// Log level for diagnostic output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Only errors
    Error,

    /// Warnings and errors
    Warn,

    /// Info, warnings, and errors
    #[default]
    Info,

    /// Debug and above
    Debug,

    /// All messages including traces
    Trace,
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

fn default_request_timeout() -> u64 {
    30
}

fn default_shell_username() -> String {
    "root".to_string()
}

impl Config {
    /// Load configuration from a TOML file, applying `PORTCULLIS_API_TOKEN`
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&contents)?;
        Ok(config.with_token_override(std::env::var(TOKEN_ENV).ok()))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents)
            .map_err(|e| PortcullisError::Config(format!("Invalid configuration: {}", e)))
    }

    /// Replace the configured token with `token` when it is set and non-empty
    pub fn with_token_override(mut self, token: Option<String>) -> Self {
        if let Some(token) = token.filter(|t| !t.trim().is_empty()) {
            self.api.token = token;
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.api.base_url.trim().is_empty() {
            return Err(PortcullisError::Config("api.base_url is required".to_string()));
        }

        if self.api.token.trim().is_empty() {
            return Err(PortcullisError::Config(format!(
                "api.token is required (or set {})",
                TOKEN_ENV
            )));
        }

        if self.api.request_timeout_secs == 0 {
            return Err(PortcullisError::Config(
                "api.request_timeout_secs must be greater than 0".to_string(),
            ));
        }

        self.maintenance
            .validate()
            .map_err(|e| PortcullisError::Config(format!("maintenance: {}", e)))?;

        Ok(())
    }

    /// Connection settings for `AccessClient`
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.api.base_url.clone(),
            token: self.api.token.clone(),
            timeout: Duration::from_secs(self.api.request_timeout_secs),
            paths: self.api.paths.clone(),
        }
    }
}
