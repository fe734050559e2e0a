//! Configuration management for relay
//!
//! Loads and saves the agent, capability-provider, model and limit settings.
//! Keys use camelCase so an existing `config.json` can be read unchanged.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

pub mod paths;

pub use paths::{config_path, data_dir, ensure_dir, expand_home, resolve_config_path};

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("CONFIG I/O ERROR: {0}")]
    Io(#[from] std::io::Error),

    #[error("CONFIG PARSE FAILED: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CONFIG NOT FOUND: {0}")]
    NotFound(PathBuf),

    #[error("INVALID CONFIG: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Agent identity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    #[serde(default = "default_agent_name")]
    pub name: String,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            system_prompt: default_system_prompt(),
        }
    }
}

fn default_agent_name() -> String {
    "relay".to_string()
}

fn default_system_prompt() -> String {
    "You are a helpful assistant. You can call tools to read files and keep \
     notes in a knowledge graph. Use a tool only when it helps answer the \
     request, then answer directly and concisely."
        .to_string()
}

/// A capability provider declared by the user
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServerDefinition {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Literal variables passed to the provider
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Parent environment variables forwarded by name
    #[serde(default)]
    pub inherit_env: Vec<String>,
}

/// Model selection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelConfig {
    #[serde(default = "default_model_provider")]
    pub provider: String,
    #[serde(default = "default_model_name")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_model_provider(),
            name: default_model_name(),
            api_key: String::new(),
            api_base: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

impl ModelConfig {
    /// Configured API key, if any
    pub fn api_key(&self) -> Option<String> {
        if self.api_key.is_empty() {
            None
        } else {
            Some(self.api_key.clone())
        }
    }
}

fn default_model_provider() -> String {
    "groq".to_string()
}

fn default_model_name() -> String {
    "llama-3.1-8b-instant".to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_temperature() -> f32 {
    0.7
}

/// Turn and session limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitsConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turn_timeout_secs: Option<u64>,
    #[serde(default = "default_launch_timeout")]
    pub launch_timeout_secs: u64,
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout_secs: u64,
    #[serde(default = "default_tool_timeout")]
    pub tool_timeout_secs: u64,
    #[serde(default = "default_model_timeout")]
    pub model_timeout_secs: u64,
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            turn_timeout_secs: None,
            launch_timeout_secs: default_launch_timeout(),
            handshake_timeout_secs: default_handshake_timeout(),
            tool_timeout_secs: default_tool_timeout(),
            model_timeout_secs: default_model_timeout(),
            shutdown_grace_secs: default_shutdown_grace(),
        }
    }
}

impl LimitsConfig {
    pub fn turn_timeout(&self) -> Option<Duration> {
        self.turn_timeout_secs.map(Duration::from_secs)
    }

    pub fn launch_timeout(&self) -> Duration {
        Duration::from_secs(self.launch_timeout_secs)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }

    pub fn model_timeout(&self) -> Duration {
        Duration::from_secs(self.model_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

fn default_max_iterations() -> u32 {
    20
}

fn default_launch_timeout() -> u64 {
    10
}

fn default_handshake_timeout() -> u64 {
    30
}

fn default_tool_timeout() -> u64 {
    60
}

fn default_model_timeout() -> u64 {
    120
}

fn default_shutdown_grace() -> u64 {
    5
}

/// Logging policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingConfig {
    /// `tracing` filter directive, e.g. `warn` or `relay_mcp=debug`
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_enabled_servers() -> Vec<String> {
    vec!["filesystem".to_string()]
}

fn default_workspace() -> String {
    ".".to_string()
}

/// Root configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub agent: AgentConfig,
    /// Names of the capability providers to start
    #[serde(default = "default_enabled_servers")]
    pub mcp_servers: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub custom_servers: Vec<ServerDefinition>,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Root directory exposed to the filesystem provider
    #[serde(default = "default_workspace")]
    pub workspace: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            agent: AgentConfig::default(),
            mcp_servers: default_enabled_servers(),
            custom_servers: Vec::new(),
            model: ModelConfig::default(),
            limits: LimitsConfig::default(),
            logging: LoggingConfig::default(),
            workspace: default_workspace(),
        }
    }
}

impl Config {
    /// Load from a specific location, falling back to defaults when missing
    pub async fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("no config found at {:?}, using defaults", path);
            return Ok(Config::default());
        }

        debug!("loading config from {:?}", path);
        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a location that must exist
    pub async fn load_required(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        Self::load_from(path).await
    }

    /// Save to a specific location
    pub async fn save_to(&self, path: &Path) -> Result<()> {
        debug!("writing config to {:?}", path);

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    /// Reject settings the runtime cannot honour
    pub fn validate(&self) -> Result<()> {
        if self.limits.max_iterations == 0 {
            return Err(ConfigError::Invalid(
                "limits.maxIterations must be at least 1".to_string(),
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for server in &self.custom_servers {
            if server.name.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "custom server with empty name".to_string(),
                ));
            }
            if server.command.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "custom server '{}' has no command",
                    server.name
                )));
            }
            if !seen.insert(server.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "custom server '{}' declared twice",
                    server.name
                )));
            }
        }

        Ok(())
    }

    /// Workspace root with `~` expanded
    pub fn workspace_path(&self) -> PathBuf {
        expand_home(&self.workspace)
    }

    /// Whether a provider is listed in `mcpServers`
    pub fn is_enabled(&self, name: &str) -> bool {
        self.mcp_servers.iter().any(|n| n == name)
    }
}

/// Write a default config at `path` unless one already exists
pub async fn init(path: &Path) -> Result<Config> {
    if path.exists() {
        warn!("config already exists at {:?}", path);
    } else {
        Config::default().save_to(path).await?;
        info!("config written to {:?}", path);
    }

    Config::load_from(path).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.agent.name, "relay");
        assert_eq!(config.mcp_servers, vec!["filesystem".to_string()]);
        assert_eq!(config.model.provider, "groq");
        assert_eq!(config.limits.max_iterations, 20);
        assert!(config.limits.turn_timeout().is_none());
        assert_eq!(config.logging.level, "warn");
    }

    #[test]
    fn test_camel_case_keys() {
        let json = r#"{
            "agent": { "name": "scout", "systemPrompt": "Be brief." },
            "mcpServers": ["filesystem", "memory"],
            "limits": { "maxIterations": 3, "toolTimeoutSecs": 9 }
        }"#;

        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.agent.system_prompt, "Be brief.");
        assert!(config.is_enabled("memory"));
        assert_eq!(config.limits.max_iterations, 3);
        assert_eq!(config.limits.tool_timeout(), Duration::from_secs(9));
        assert_eq!(config.limits.handshake_timeout_secs, 30);
    }

    #[test]
    fn test_validate_zero_iterations() {
        let mut config = Config::default();
        config.limits.max_iterations = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_duplicate_custom_server() {
        let mut config = Config::default();
        let server = ServerDefinition {
            name: "git".to_string(),
            command: "mcp-git".to_string(),
            ..Default::default()
        };
        config.custom_servers = vec![server.clone(), server];

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("declared twice"));
    }

    #[test]
    fn test_validate_custom_server_without_command() {
        let mut config = Config::default();
        config.custom_servers = vec![ServerDefinition {
            name: "broken".to_string(),
            ..Default::default()
        }];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_model_api_key_empty() {
        let model = ModelConfig::default();
        assert!(model.api_key().is_none());
    }
}
