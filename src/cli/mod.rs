//! cli
//!
//! Command-line entry point for the `gct` binary.
//!
//! # Responsibilities
//!
//! - Parse flags and resolve configuration
//! - Install logging
//! - Wire the runner, audit store and workspace-sandbox client into the
//!   HTTP server and run it until interrupted
//!
//! The CLI layer is thin: all repository work happens behind
//! [`crate::server`] and [`crate::service`].

pub mod args;

pub use args::{Cli, Command};

use std::sync::Arc;

use anyhow::{Context as _, Result};
use tokio::net::TcpListener;

use crate::audit::{AuditLogger, NoopAuditLogger, SqliteAuditLogger};
use crate::core::config::Config;
use crate::git::CliGitRunner;
use crate::logging;
use crate::sandbox::WorkspaceSandboxClient;
use crate::server::{self, AppState};

/// Run the CLI application.
///
/// This is the main entry point called from `main.rs`.
pub async fn run() -> Result<()> {
    let cli = Cli::parse_args();
    let config = Config::load(&cli.overrides()).context("failed to load configuration")?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::ShowConfig => {
            print!("{}", describe(&config));
            Ok(())
        }
        Command::Serve => {
            logging::init(config.log_format);
            serve(config).await
        }
    }
}

/// Human-readable dump of the resolved configuration.
pub fn describe(config: &Config) -> String {
    let path = |p: Option<&std::path::Path>| {
        p.map_or_else(|| "(none)".to_string(), |p| p.display().to_string())
    };
    let mut out = String::new();
    out.push_str(&format!("config_file = {}\n", path(config.loaded_from())));
    out.push_str(&format!("bind = {}\n", config.bind));
    out.push_str(&format!("port = {}\n", config.port));
    out.push_str(&format!("repo_root = {}\n", path(config.repo_root.as_deref())));
    out.push_str(&format!("git_binary = {}\n", config.git_binary));
    out.push_str(&format!(
        "audit_database = {}\n",
        path(config.audit_database.as_deref())
    ));
    out.push_str(&format!(
        "workspace_sandbox_url = {}\n",
        config.sandbox_url.as_deref().unwrap_or("(none)")
    ));
    out.push_str(&format!(
        "timeouts = read {}s, mutation {}s, network {}s\n",
        config.timeouts.read.as_secs(),
        config.timeouts.mutation.as_secs(),
        config.timeouts.network.as_secs()
    ));
    out.push_str(&format!("log_format = {}\n", config.log_format));
    out
}

fn audit_logger(config: &Config) -> Arc<dyn AuditLogger> {
    let Some(path) = &config.audit_database else {
        tracing::info!("audit database not configured; audit logging disabled");
        return Arc::new(NoopAuditLogger);
    };
    match SqliteAuditLogger::open(path) {
        Ok(logger) => {
            tracing::info!(path = %path.display(), "audit log opened");
            Arc::new(logger)
        }
        Err(e) => {
            tracing::warn!(error = %e, "audit log unavailable; continuing without it");
            Arc::new(NoopAuditLogger)
        }
    }
}

async fn serve(config: Config) -> Result<()> {
    if let Some(path) = config.loaded_from() {
        tracing::info!(path = %path.display(), "loaded config file");
    }

    let runner = Arc::new(CliGitRunner::new(
        config.git_binary.clone(),
        config.repo_root.clone(),
    ));
    let sandbox = WorkspaceSandboxClient::new(config.sandbox_url.clone())?;
    let state = AppState::new(runner, audit_logger(&config), sandbox, config.timeouts);

    let addr = config.socket_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    server::serve(listener, state, shutdown_signal()).await?;
    tracing::info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describe_lists_defaults() {
        let text = describe(&Config::default());
        assert!(text.contains("port = 18000"));
        assert!(text.contains("audit_database = (none)"));
        assert!(text.contains("timeouts = read 5s, mutation 15s, network 30s"));
    }
}
