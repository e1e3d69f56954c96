//! Application configuration for the generation task pipeline
//!
//! Configuration is deliberately small: the app identity the pipeline runs
//! under and the optional output-moderation rule. Loaded from TOML.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

fn default_scan_interval_ms() -> u64 {
    300
}

/// Top-level application configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    pub app: AppSection,
    /// Output moderation; absent means moderation is disabled
    pub moderation: Option<ModerationSection>,
}

/// App identity section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppSection {
    /// Application identifier
    pub id: String,
    /// Owning tenant identifier
    pub tenant_id: String,
}

/// Output moderation section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModerationSection {
    #[serde(flatten)]
    pub rule: ModerationRule,
    /// How often the background scanner re-checks accumulated output
    #[serde(default = "default_scan_interval_ms")]
    pub scan_interval_ms: u64,
}

/// Moderation rule selection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModerationRule {
    /// Screen output against a keyword list; on a hit the whole answer is
    /// replaced with the preset response
    Keywords {
        keywords: Vec<String>,
        preset_response: String,
    },
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Validation(String),
}

impl AppConfig {
    /// Load and validate configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.app.id.trim().is_empty() {
            return Err(ConfigError::Validation("app.id must not be empty".into()));
        }
        if self.app.tenant_id.trim().is_empty() {
            return Err(ConfigError::Validation(
                "app.tenant_id must not be empty".into(),
            ));
        }
        if let Some(moderation) = &self.moderation {
            let ModerationRule::Keywords { keywords, .. } = &moderation.rule;
            if keywords.is_empty() {
                return Err(ConfigError::Validation(
                    "moderation.keywords must not be empty".into(),
                ));
            }
            if moderation.scan_interval_ms == 0 {
                return Err(ConfigError::Validation(
                    "moderation.scan_interval_ms must be greater than zero".into(),
                ));
            }
        }
        Ok(())
    }
}
