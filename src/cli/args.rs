//! cli::args
//!
//! Command-line argument definitions using clap derive.
//!
//! # Global Flags
//!
//! Every flag overrides the config file and environment:
//! - `--config <path>`: Config file to load
//! - `--bind <addr>` / `--port <port>`: Listen address
//! - `--repo <path>`: Repository root
//! - `--git-bin <path>`: Git executable
//! - `--audit-db <path>`: SQLite audit database

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::core::config::ConfigOverrides;

/// Git Control Tower - local HTTP service for audited Git operations
#[derive(Parser, Debug)]
#[command(name = "gct")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file (defaults to $GCT_CONFIG, then the XDG and home locations)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Address to bind
    #[arg(long, global = true, value_name = "ADDR")]
    pub bind: Option<String>,

    /// Port to listen on
    #[arg(short, long, global = true)]
    pub port: Option<u16>,

    /// Repository root (skips discovery from the working directory)
    #[arg(long, global = true, value_name = "PATH")]
    pub repo: Option<PathBuf>,

    /// Git executable
    #[arg(long = "git-bin", global = true, value_name = "PATH")]
    pub git_bin: Option<String>,

    /// SQLite database for the audit log; auditing is off when unset
    #[arg(long = "audit-db", global = true, value_name = "PATH")]
    pub audit_db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Parser::parse()
    }

    /// Flag-level configuration overrides.
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            config_path: self.config.clone(),
            bind: self.bind.clone(),
            port: self.port,
            repo_root: self.repo.clone(),
            git_binary: self.git_bin.clone(),
            audit_database: self.audit_db.clone(),
        }
    }
}

/// Available commands.
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Run the HTTP service (default)
    Serve,

    /// Print the resolved configuration and exit
    #[command(name = "config")]
    ShowConfig,
}
