//! core::paths
//!
//! Path hygiene for repository-relative paths supplied by callers.
//!
//! Every mutation that names files (stage, unstage, discard, ignore) runs
//! its input through [`sanitize_paths`]. The rules:
//!
//! - Trim surrounding whitespace; reject empty input.
//! - Lexically clean the path (collapse `.`, `..`, repeated `/`).
//! - Strip a leading `/` so absolute-looking paths become repo-relative.
//! - Reject anything that still begins with `..` (escapes the repository).
//!
//! # Example
//!
//! ```
//! use git_control_tower::core::paths::{clean_file_path, sanitize_paths};
//!
//! assert_eq!(clean_file_path("  /a/b/../c  "), "a/c");
//! assert_eq!(clean_file_path("../x"), "../x");
//!
//! let result = sanitize_paths(&["src/lib.rs".to_string(), "../etc/passwd".to_string()]);
//! assert_eq!(result.accepted, vec!["src/lib.rs"]);
//! assert_eq!(result.rejected.len(), 1);
//! ```

use crate::core::types::ScopeKey;

/// Lexically clean a caller-supplied path.
///
/// Trims whitespace, collapses `.`/`..`/`//` segments and strips one
/// leading `/`. Does not touch the filesystem. Returns an empty string for
/// blank input.
pub fn clean_file_path(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    let cleaned = lexical_clean(trimmed);
    match cleaned.strip_prefix('/') {
        Some("") => ".".to_string(),
        Some(rest) => rest.to_string(),
        None => cleaned,
    }
}

/// Lexical path cleaning with `path.Clean` semantics on `/`-separated paths.
fn lexical_clean(path: &str) -> String {
    let rooted = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if parts.last().is_some_and(|last| *last != "..") {
                    parts.pop();
                } else if !rooted {
                    parts.push("..");
                }
            }
            other => parts.push(other),
        }
    }

    let joined = parts.join("/");
    match (rooted, joined.is_empty()) {
        (true, _) => format!("/{joined}"),
        (false, true) => ".".to_string(),
        (false, false) => joined,
    }
}

/// A path that failed hygiene checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedPath {
    /// The path as supplied.
    pub path: String,
    /// Why it was rejected.
    pub reason: String,
}

impl RejectedPath {
    /// Render as a validation message.
    pub fn message(&self) -> String {
        format!("{}: {}", self.reason, self.path)
    }
}

/// Outcome of sanitizing a batch of paths.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SanitizedPaths {
    /// Cleaned, de-duplicated paths in input order.
    pub accepted: Vec<String>,
    /// Inputs rejected by hygiene rules.
    pub rejected: Vec<RejectedPath>,
}

impl SanitizedPaths {
    /// Validation messages for every rejected path.
    pub fn rejection_messages(&self) -> Vec<String> {
        self.rejected.iter().map(RejectedPath::message).collect()
    }
}

/// Apply path hygiene to every input.
pub fn sanitize_paths(raw: &[String]) -> SanitizedPaths {
    sanitize(raw, true)
}

/// Like [`sanitize_paths`], but also rejects inputs that clean to the
/// repository root (`/`, `.`, `a/..`). Destructive operations use this.
pub fn sanitize_subpaths(raw: &[String]) -> SanitizedPaths {
    sanitize(raw, false)
}

fn sanitize(raw: &[String], allow_root: bool) -> SanitizedPaths {
    let mut result = SanitizedPaths::default();

    for input in raw {
        let cleaned = clean_file_path(input);
        if cleaned.is_empty() {
            result.rejected.push(RejectedPath {
                path: input.clone(),
                reason: "empty path".to_string(),
            });
        } else if escapes_repository(&cleaned) {
            result.rejected.push(RejectedPath {
                path: input.clone(),
                reason: "path escapes repository".to_string(),
            });
        } else if !allow_root && cleaned == "." {
            result.rejected.push(RejectedPath {
                path: input.clone(),
                reason: "path names the repository root".to_string(),
            });
        } else if !result.accepted.contains(&cleaned) {
            result.accepted.push(cleaned);
        }
    }

    result
}

/// Whether a cleaned path points outside the repository root.
pub fn escapes_repository(cleaned: &str) -> bool {
    cleaned == ".." || cleaned.starts_with("../")
}

/// Errors expanding a scope label.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScopeError {
    #[error("unknown scope '{0}' (expected scenario:<name>, resource:<name> or package:<name>)")]
    Unknown(String),
}

/// Expand a scope label (`scenario:X`) into its directory prefix (`scenarios/X/`).
///
/// # Example
///
/// ```
/// use git_control_tower::core::paths::expand_scope;
///
/// assert_eq!(expand_scope("scenario:tower").unwrap(), "scenarios/tower/");
/// assert!(expand_scope("other").is_err());
/// ```
pub fn expand_scope(label: &str) -> Result<String, ScopeError> {
    ScopeKey::parse(label)
        .and_then(|key| key.path_prefix())
        .ok_or_else(|| ScopeError::Unknown(label.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_collapses_and_strips_root() {
        assert_eq!(clean_file_path("  /a/b/../c  "), "a/c");
        assert_eq!(clean_file_path("a//b/./c"), "a/b/c");
        assert_eq!(clean_file_path("/"), ".");
        assert_eq!(clean_file_path("./"), ".");
        assert_eq!(clean_file_path("a/.."), ".");
        assert_eq!(clean_file_path("/../x"), "x");
    }

    #[test]
    fn clean_keeps_leading_parent_segments() {
        assert_eq!(clean_file_path("../x"), "../x");
        assert_eq!(clean_file_path("a/../../x"), "../x");
        assert_eq!(clean_file_path(".."), "..");
    }

    #[test]
    fn clean_blank_is_empty() {
        assert_eq!(clean_file_path(""), "");
        assert_eq!(clean_file_path("   "), "");
    }

    #[test]
    fn sanitize_rejects_escapes_and_blanks() {
        let inputs = vec![
            "ok.txt".to_string(),
            "  ".to_string(),
            "../outside".to_string(),
            "dir/../../outside".to_string(),
            "/ok.txt".to_string(),
        ];
        let result = sanitize_paths(&inputs);

        assert_eq!(result.accepted, vec!["ok.txt"]);
        assert_eq!(result.rejected.len(), 3);
        assert_eq!(result.rejected[0].reason, "empty path");
        assert!(result.rejection_messages()[1].contains("escapes repository"));
    }

    #[test]
    fn subpaths_reject_repository_root() {
        let inputs: Vec<String> = ["/", ".", "./", "a/..", "a/b"]
            .iter()
            .map(|p| p.to_string())
            .collect();

        assert_eq!(sanitize_paths(&inputs).accepted, vec![".", "a/b"]);

        let result = sanitize_subpaths(&inputs);
        assert_eq!(result.accepted, vec!["a/b"]);
        assert_eq!(result.rejected.len(), 4);
        assert!(result
            .rejected
            .iter()
            .all(|r| r.reason == "path names the repository root"));
    }

    #[test]
    fn dotdot_prefixed_names_are_not_escapes() {
        assert!(!escapes_repository("..hidden"));
        assert!(escapes_repository("../x"));
        assert!(escapes_repository(".."));
    }

    #[test]
    fn expand_scope_labels() {
        assert_eq!(expand_scope("resource:redis").unwrap(), "resources/redis/");
        assert_eq!(expand_scope(" package:ui ").unwrap(), "packages/ui/");
        assert_eq!(
            expand_scope("bogus:x"),
            Err(ScopeError::Unknown("bogus:x".to_string()))
        );
    }
}
