//! core::config::schema
//!
//! Configuration file schema.
//!
//! # Location
//!
//! Searched in order:
//! 1. `$GCT_CONFIG` if set
//! 2. `$XDG_CONFIG_HOME/git-control-tower/config.toml`
//! 3. `~/.git-control-tower/config.toml`
//!
//! # Validation
//!
//! Unknown fields are rejected at parse time. Values are validated after
//! parsing (non-zero timeouts and port, known log format).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Configuration file contents.
///
/// # Example
///
/// ```toml
/// [server]
/// bind = "127.0.0.1"
/// port = 18000
///
/// [git]
/// binary = "/usr/bin/git"
/// repo_root = "/srv/checkout"
///
/// [audit]
/// database = "/var/lib/gct/audit.db"
///
/// [workspace_sandbox]
/// url = "http://127.0.0.1:17700"
///
/// [timeouts]
/// read_secs = 5
/// mutation_secs = 15
/// network_secs = 30
///
/// [logging]
/// format = "json"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub server: Option<ServerSection>,
    pub git: Option<GitSection>,
    pub audit: Option<AuditSection>,
    pub workspace_sandbox: Option<SandboxSection>,
    pub timeouts: Option<TimeoutSection>,
    pub logging: Option<LoggingSection>,
}

impl FileConfig {
    /// Validate the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(server) = &self.server {
            if server.port == Some(0) {
                return Err(ConfigError::InvalidValue(
                    "server.port must be non-zero".to_string(),
                ));
            }
        }
        if let Some(git) = &self.git {
            if git.binary.as_deref().is_some_and(|b| b.trim().is_empty()) {
                return Err(ConfigError::InvalidValue(
                    "git.binary cannot be empty".to_string(),
                ));
            }
        }
        if let Some(timeouts) = &self.timeouts {
            timeouts.validate()?;
        }
        if let Some(logging) = &self.logging {
            if let Some(format) = &logging.format {
                LogFormat::parse(format)?;
            }
        }
        Ok(())
    }
}

/// `[server]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSection {
    /// Interface to bind
    pub bind: Option<String>,
    /// Listen port
    pub port: Option<u16>,
}

/// `[git]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct GitSection {
    /// Path to the git executable
    pub binary: Option<String>,
    /// Repository root override
    pub repo_root: Option<PathBuf>,
}

/// `[audit]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct AuditSection {
    /// SQLite database file; absent means audit is disabled
    pub database: Option<PathBuf>,
}

/// `[workspace_sandbox]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SandboxSection {
    /// Base URL of the workspace-sandbox API
    pub url: Option<String>,
}

/// `[timeouts]` section, in seconds.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct TimeoutSection {
    pub read_secs: Option<u64>,
    pub mutation_secs: Option<u64>,
    pub network_secs: Option<u64>,
}

impl TimeoutSection {
    fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("timeouts.read_secs", self.read_secs),
            ("timeouts.mutation_secs", self.mutation_secs),
            ("timeouts.network_secs", self.network_secs),
        ] {
            if value == Some(0) {
                return Err(ConfigError::InvalidValue(format!("{name} must be non-zero")));
            }
        }
        Ok(())
    }
}

/// `[logging]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSection {
    /// `text` or `json`
    pub format: Option<String>,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    /// Valid format names.
    pub const VALID: &'static [&'static str] = &["text", "json"];

    /// Parse a format name.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for unknown names.
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(ConfigError::InvalidValue(format!(
                "invalid log format '{}', must be one of: {}",
                other,
                Self::VALID.join(", ")
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogFormat::Text => "text",
            LogFormat::Json => "json",
        }
    }
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
