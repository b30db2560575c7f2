//! Configuration loading and validation for Grapnel.
//!
//! Loads `~/.grapnel/config.toml` with environment variable overrides
//! (`GRAPNEL_API_KEY`, `GRAPNEL_MODEL`, `GRAPNEL_PROVIDER`). All settings
//! have defaults; a missing file is not an error.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// The root configuration structure. Maps directly to
/// `~/.grapnel/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the default provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default LLM provider
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Default temperature
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Default max tokens per LLM response
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// Run-loop settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// Auto-compaction settings
    #[serde(default)]
    pub compaction: CompactionConfig,

    /// Shell tool allowlist; empty means allow everything
    #[serde(default = "default_shell_allowlist")]
    pub shell_allowlist: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Maximum loop iterations per user turn
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Override the model's context window, in tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_window: Option<usize>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            context_window: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompactionConfig {
    /// Whether auto-compaction is installed at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Context usage percentage that triggers compaction
    #[serde(default = "default_threshold_percent")]
    pub threshold_percent: f32,

    /// How many recent messages survive verbatim
    #[serde(default = "default_keep_recent")]
    pub keep_recent: usize,

    /// Minimum history length before compaction is considered
    #[serde(default = "default_min_messages")]
    pub min_messages: usize,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold_percent: default_threshold_percent(),
            keep_recent: default_keep_recent(),
            min_messages: default_min_messages(),
        }
    }
}

fn default_provider() -> String {
    "openrouter".into()
}
fn default_model() -> String {
    "anthropic/claude-sonnet-4".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_max_iterations() -> u32 {
    25
}
fn default_true() -> bool {
    true
}
fn default_threshold_percent() -> f32 {
    90.0
}
fn default_keep_recent() -> usize {
    5
}
fn default_min_messages() -> usize {
    8
}
fn default_shell_allowlist() -> Vec<String> {
    [
        "ls", "cat", "head", "tail", "echo", "pwd", "date", "whoami", "wc", "grep", "find",
        "which", "git", "cargo", "rustc",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            agent: AgentConfig::default(),
            compaction: CompactionConfig::default(),
            shell_allowlist: default_shell_allowlist(),
        }
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field(
                "api_key",
                &self.api_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("agent", &self.agent)
            .field("compaction", &self.compaction)
            .field("shell_allowlist", &self.shell_allowlist)
            .finish()
    }
}

impl AppConfig {
    /// The default config file location, `~/.grapnel/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        std::env::home_dir().map(|home| home.join(".grapnel").join("config.toml"))
    }

    /// Load from the default location, falling back to defaults when the
    /// file does not exist, then apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match Self::default_path() {
            Some(path) if path.exists() => Self::load_from(&path)?,
            _ => Self::default(),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load from an explicit path. The file must exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        debug!(path = %path.display(), "Loading configuration");
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("GRAPNEL_API_KEY") {
            if !key.is_empty() {
                self.api_key = Some(key);
            }
        }
        if let Ok(model) = std::env::var("GRAPNEL_MODEL") {
            if !model.is_empty() {
                self.default_model = model;
            }
        }
        if let Ok(provider) = std::env::var("GRAPNEL_PROVIDER") {
            if !provider.is_empty() {
                self.default_provider = provider;
            }
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.agent.max_iterations == 0 {
            return Err(ConfigError::Invalid(
                "agent.max_iterations must be at least 1".into(),
            ));
        }
        if !(0.0..=200.0).contains(&self.compaction.threshold_percent) {
            return Err(ConfigError::Invalid(
                "compaction.threshold_percent must be between 0 and 200".into(),
            ));
        }
        if self.compaction.keep_recent == 0 {
            return Err(ConfigError::Invalid(
                "compaction.keep_recent must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let config = AppConfig::default();
        assert_eq!(config.default_provider, "openrouter");
        assert_eq!(config.agent.max_iterations, 25);
        assert!(config.compaction.enabled);
        assert_eq!(config.compaction.keep_recent, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parses_partial_toml() {
        let raw = r#"
            default_model = "gpt-4o"

            [agent]
            max_iterations = 10

            [compaction]
            threshold_percent = 80.0
        "#;
        let config: AppConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.default_model, "gpt-4o");
        assert_eq!(config.agent.max_iterations, 10);
        assert!((config.compaction.threshold_percent - 80.0).abs() < f32::EPSILON);
        // Untouched sections keep their defaults.
        assert_eq!(config.compaction.keep_recent, 5);
        assert_eq!(config.default_provider, "openrouter");
    }

    #[test]
    fn zero_iterations_is_invalid() {
        let mut config = AppConfig::default();
        config.agent.max_iterations = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn debug_redacts_the_api_key() {
        let mut config = AppConfig::default();
        config.api_key = Some("sk-secret-key".into());
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret-key"));
        assert!(debug.contains("REDACTED"));
    }
}
