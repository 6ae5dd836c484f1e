//! Git Control Tower - a local HTTP service over a Git working copy
//!
//! Git Control Tower lets tools and agents inspect and change a repository
//! without shelling out themselves: status, diffs, staging, commits,
//! branches, and remote sync, each behind a safety policy and recorded in
//! an audit log.
//!
//! # Architecture
//!
//! The codebase follows a layered architecture:
//!
//! - [`cli`] - Command-line entry point (parses flags, wires dependencies)
//! - [`server`] - axum router, handlers and HTTP error mapping
//! - [`service`] - One operation per method, composed from runner + parsers
//! - [`git`] - Runner seam over the `git` binary, and pure output parsers
//! - [`core`] - Domain types, path hygiene, commit validation, configuration
//! - [`audit`] - Audit trail of mutating operations
//! - [`sandbox`] - Client for the workspace-sandbox commit preview
//! - [`logging`] - `tracing` subscriber setup
//!
//! # Correctness Invariants
//!
//! 1. Every Git side effect flows through a [`git::GitRunner`]
//! 2. Caller-supplied paths never escape the repository root
//! 3. Policy rejections are warnings the caller must confirm, never silent
//! 4. A push is only reported verified when the remote ref matches HEAD
//! 5. Audit failures never fail the operation being audited

pub mod audit;
pub mod cli;
pub mod core;
pub mod git;
pub mod logging;
pub mod sandbox;
pub mod server;
pub mod service;
