//! git
//!
//! Single interface for all Git operations.
//!
//! # Architecture
//!
//! This module is the **only doorway** to Git. Every repository read and
//! write flows through the [`GitRunner`] capability; no other module spawns
//! `git` or touches `.git` internals. Production uses [`CliGitRunner`] over
//! the `git` binary, tests use the in-memory [`FakeGitRunner`].
//!
//! # Responsibilities
//!
//! - Runner capability and request deadlines ([`runner`])
//! - Child-process adapter ([`cli`])
//! - In-memory repository model ([`fake`])
//! - Pure parsers for status, branch refs and diffs ([`porcelain`],
//!   [`refs`], [`diff`])
//!
//! # Invariants
//!
//! - Runner methods return raw output; parsing happens in the parsers
//! - Every runner call carries a [`RunContext`] deadline
//! - Errors always carry the trimmed stderr of the failed command
//!
//! # Example
//!
//! ```
//! use git_control_tower::git::{parse_porcelain_v2, FakeGitRunner, GitRunner, RunContext};
//! use std::path::Path;
//! use std::time::Duration;
//!
//! # tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap().block_on(async {
//! let git = FakeGitRunner::new("/repo");
//! let ctx = RunContext::with_timeout(Duration::from_secs(5));
//!
//! let raw = git.status_porcelain_v2(&ctx, Path::new("/repo")).await.unwrap();
//! let status = parse_porcelain_v2(&raw);
//! assert_eq!(status.branch.head, "main");
//! # });
//! ```

pub mod cli;
pub mod diff;
pub mod fake;
pub mod porcelain;
pub mod refs;
pub mod runner;

pub use cli::CliGitRunner;
pub use diff::{annotate_diff, parse_unified_diff, DiffResponse};
pub use fake::FakeGitRunner;
pub use porcelain::parse_porcelain_v2;
pub use refs::{parse_branch_refs, ParsedBranchRef};
pub use runner::{CommitAuthor, GitRunner, GitRunnerError, RunContext, RunnerResult};
