//! core::config
//!
//! Configuration schema and loading.
//!
//! # Precedence
//!
//! Configuration values are resolved in this order (later overrides earlier):
//! 1. Default values
//! 2. Config file (see [`schema`] for search locations)
//! 3. Environment variables
//! 4. CLI flags ([`ConfigOverrides`])
//!
//! # Environment
//!
//! | Variable | Setting |
//! |---|---|
//! | `GCT_CONFIG` | Config file path |
//! | `GCT_REPO_ROOT` | Repository root override |
//! | `GCT_GIT_BIN` | Git executable |
//! | `GCT_AUDIT_DB` | Audit database path (unset disables audit) |
//! | `GCT_API_PORT`, `API_PORT` | Listen port |
//! | `GCT_LOG_FORMAT` | `text` or `json` |
//! | `WORKSPACE_SANDBOX_URL` | Workspace-sandbox base URL |
//! | `WORKSPACE_SANDBOX_API_PORT` | Workspace-sandbox port on localhost |
//!
//! # Example
//!
//! ```no_run
//! use git_control_tower::core::config::{Config, ConfigOverrides};
//!
//! let config = Config::load(&ConfigOverrides::default()).unwrap();
//! println!("listening on {}", config.socket_addr().unwrap());
//! ```

pub mod schema;

pub use schema::{FileConfig, LogFormat};

use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

/// Errors from configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("invalid config value: {0}")]
    InvalidValue(String),
}

/// Default listen port.
pub const DEFAULT_PORT: u16 = 18000;

/// Default bind interface.
pub const DEFAULT_BIND: &str = "127.0.0.1";

/// Per-class request deadlines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Status, diff, branch listing
    pub read: Duration,
    /// Stage, commit, branch create/switch, discard, ignore
    pub mutation: Duration,
    /// Anything that talks to a remote (fetch, push, pull, publish)
    pub network: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            read: Duration::from_secs(5),
            mutation: Duration::from_secs(15),
            network: Duration::from_secs(30),
        }
    }
}

/// Flag-level overrides, highest precedence.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub config_path: Option<PathBuf>,
    pub bind: Option<String>,
    pub port: Option<u16>,
    pub repo_root: Option<PathBuf>,
    pub git_binary: Option<String>,
    pub audit_database: Option<PathBuf>,
}

/// Fully resolved configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub repo_root: Option<PathBuf>,
    pub git_binary: String,
    pub audit_database: Option<PathBuf>,
    pub sandbox_url: Option<String>,
    pub timeouts: Timeouts,
    pub log_format: LogFormat,
    loaded_from: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            port: DEFAULT_PORT,
            repo_root: None,
            git_binary: "git".to_string(),
            audit_database: None,
            sandbox_url: None,
            timeouts: Timeouts::default(),
            log_format: LogFormat::Text,
            loaded_from: None,
        }
    }
}

impl Config {
    /// Load configuration from the file system and process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed, or if
    /// any resolved value is invalid. A missing config file is not an error.
    pub fn load(overrides: &ConfigOverrides) -> Result<Config, ConfigError> {
        let env = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());

        let path = match &overrides.config_path {
            Some(explicit) => Some(explicit.clone()),
            None => Self::find_config_file(&env),
        };
        let file = match &path {
            Some(path) => Self::read_file(path)?,
            None => FileConfig::default(),
        };

        Self::resolve(file, path, env, overrides)
    }

    /// Locate the config file in standard locations.
    fn find_config_file(env: &impl Fn(&str) -> Option<String>) -> Option<PathBuf> {
        if let Some(path) = env("GCT_CONFIG") {
            return Some(PathBuf::from(path));
        }

        let candidates = [
            env("XDG_CONFIG_HOME").map(|xdg| PathBuf::from(xdg).join("git-control-tower/config.toml")),
            dirs::home_dir().map(|home| home.join(".git-control-tower/config.toml")),
        ];
        candidates.into_iter().flatten().find(|path| path.exists())
    }

    /// Read and parse a config file.
    pub fn read_file(path: &Path) -> Result<FileConfig, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Merge defaults, file, environment and overrides.
    ///
    /// `env` is injected so resolution can be tested without touching the
    /// process environment.
    pub fn resolve(
        file: FileConfig,
        loaded_from: Option<PathBuf>,
        env: impl Fn(&str) -> Option<String>,
        overrides: &ConfigOverrides,
    ) -> Result<Config, ConfigError> {
        file.validate()?;

        let mut config = Config {
            loaded_from,
            ..Config::default()
        };

        // File
        if let Some(server) = file.server {
            if let Some(bind) = server.bind {
                config.bind = bind;
            }
            if let Some(port) = server.port {
                config.port = port;
            }
        }
        if let Some(git) = file.git {
            if let Some(binary) = git.binary {
                config.git_binary = binary;
            }
            config.repo_root = git.repo_root;
        }
        if let Some(audit) = file.audit {
            config.audit_database = audit.database;
        }
        if let Some(sandbox) = file.workspace_sandbox {
            config.sandbox_url = sandbox.url;
        }
        if let Some(timeouts) = file.timeouts {
            let defaults = Timeouts::default();
            config.timeouts = Timeouts {
                read: timeouts.read_secs.map_or(defaults.read, Duration::from_secs),
                mutation: timeouts
                    .mutation_secs
                    .map_or(defaults.mutation, Duration::from_secs),
                network: timeouts
                    .network_secs
                    .map_or(defaults.network, Duration::from_secs),
            };
        }
        if let Some(format) = file.logging.and_then(|l| l.format) {
            config.log_format = LogFormat::parse(&format)?;
        }

        // Environment
        if let Some(root) = env("GCT_REPO_ROOT") {
            config.repo_root = Some(PathBuf::from(root));
        }
        if let Some(binary) = env("GCT_GIT_BIN") {
            config.git_binary = binary;
        }
        if let Some(db) = env("GCT_AUDIT_DB") {
            config.audit_database = Some(PathBuf::from(db));
        }
        if let Some(port) = env("GCT_API_PORT").or_else(|| env("API_PORT")) {
            config.port = parse_port(&port)?;
        }
        if let Some(format) = env("GCT_LOG_FORMAT") {
            config.log_format = LogFormat::parse(&format)?;
        }
        if let Some(url) = env("WORKSPACE_SANDBOX_URL") {
            config.sandbox_url = Some(url);
        } else if let Some(port) = env("WORKSPACE_SANDBOX_API_PORT") {
            let port = parse_port(&port)?;
            config.sandbox_url = Some(format!("http://127.0.0.1:{port}"));
        }

        // Flags
        if let Some(bind) = &overrides.bind {
            config.bind = bind.clone();
        }
        if let Some(port) = overrides.port {
            config.port = port;
        }
        if let Some(root) = &overrides.repo_root {
            config.repo_root = Some(root.clone());
        }
        if let Some(binary) = &overrides.git_binary {
            config.git_binary = binary.clone();
        }
        if let Some(db) = &overrides.audit_database {
            config.audit_database = Some(db.clone());
        }

        if config.port == 0 {
            return Err(ConfigError::InvalidValue("port must be non-zero".to_string()));
        }
        config.socket_addr()?;

        Ok(config)
    }

    /// Address the HTTP server binds to.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if `bind` is not an IP address.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self.bind.parse().map_err(|_| {
            ConfigError::InvalidValue(format!("invalid bind address '{}'", self.bind))
        })?;
        Ok(SocketAddr::new(ip, self.port))
    }

    /// Path of the config file that was loaded, if any.
    pub fn loaded_from(&self) -> Option<&Path> {
        self.loaded_from.as_deref()
    }
}

fn parse_port(value: &str) -> Result<u16, ConfigError> {
    match value.trim().parse::<u16>() {
        Ok(port) if port != 0 => Ok(port),
        _ => Err(ConfigError::InvalidValue(format!("invalid port '{value}'"))),
    }
}
