//! server::state
//!
//! Process-wide dependencies shared by every handler.

use std::sync::Arc;

use crate::audit::{AuditLogger, NoopAuditLogger};
use crate::core::config::Timeouts;
use crate::git::{GitRunner, RunContext};
use crate::sandbox::WorkspaceSandboxClient;
use crate::service::GitService;

/// Deadline class of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationClass {
    Read,
    Mutation,
    Network,
}

/// Handler state; cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub service: GitService,
    pub audit: Arc<dyn AuditLogger>,
    pub sandbox: WorkspaceSandboxClient,
    pub timeouts: Timeouts,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("audit_configured", &self.audit.is_configured())
            .field("sandbox", &self.sandbox.base_url())
            .field("timeouts", &self.timeouts)
            .finish_non_exhaustive()
    }
}

impl AppState {
    pub fn new(
        runner: Arc<dyn GitRunner>,
        audit: Arc<dyn AuditLogger>,
        sandbox: WorkspaceSandboxClient,
        timeouts: Timeouts,
    ) -> Self {
        Self {
            service: GitService::new(runner),
            audit,
            sandbox,
            timeouts,
        }
    }

    /// State with audit disabled and no workspace-sandbox service.
    ///
    /// # Errors
    ///
    /// Fails only if the HTTP client cannot be built.
    pub fn with_runner(runner: Arc<dyn GitRunner>) -> Result<Self, crate::sandbox::SandboxError> {
        Ok(Self::new(
            runner,
            Arc::new(NoopAuditLogger),
            WorkspaceSandboxClient::new(None)?,
            Timeouts::default(),
        ))
    }

    /// Fresh deadline for one request.
    pub fn context(&self, class: OperationClass) -> RunContext {
        let timeout = match class {
            OperationClass::Read => self.timeouts.read,
            OperationClass::Mutation => self.timeouts.mutation,
            OperationClass::Network => self.timeouts.network,
        };
        RunContext::with_timeout(timeout)
    }
}
