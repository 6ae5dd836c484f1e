//! core
//!
//! Domain types and pure rules shared by every layer.
//!
//! # Modules
//!
//! - [`types`] - Repository snapshot model and scope attribution
//! - [`paths`] - Path hygiene and scope expansion
//! - [`conventional`] - Conventional-commit validation
//! - [`config`] - Configuration schema and loading
//!
//! Nothing in this module performs I/O except config loading.

pub mod config;
pub mod conventional;
pub mod paths;
pub mod types;
