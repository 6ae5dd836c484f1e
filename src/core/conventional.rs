//! core::conventional
//!
//! Conventional-commit message validation.
//!
//! A valid header is `type(scope)!: description` where:
//! - `type` is one of [`COMMIT_TYPES`]
//! - `(scope)` is optional and limited to lowercase alphanumerics and `-`
//! - `!` (breaking change marker) is optional
//! - the description after `": "` is non-empty
//!
//! Only the first line of the message is checked; bodies and trailers are
//! free-form.
//!
//! # Example
//!
//! ```
//! use git_control_tower::core::conventional::validate_conventional;
//!
//! assert!(validate_conventional("feat(api): add endpoint").is_ok());
//! assert!(validate_conventional("feat(api)!: drop v1").is_ok());
//! assert!(validate_conventional("add feature").is_err());
//! ```

use std::sync::OnceLock;

use regex::Regex;

/// Closed set of accepted commit types.
pub const COMMIT_TYPES: [&str; 11] = [
    "feat", "fix", "docs", "style", "refactor", "perf", "test", "build", "ci", "chore", "revert",
];

fn header_regex() -> &'static Regex {
    static HEADER: OnceLock<Regex> = OnceLock::new();
    HEADER.get_or_init(|| {
        let pattern = format!(r"^({})(\([a-z0-9-]+\))?!?: .+$", COMMIT_TYPES.join("|"));
        Regex::new(&pattern).unwrap_or_else(|e| unreachable!("static pattern is valid: {e}"))
    })
}

/// Validate a commit message against the conventional-commit header format.
///
/// # Errors
///
/// Returns a human-readable validation message when the header is rejected.
pub fn validate_conventional(message: &str) -> Result<(), String> {
    let header = message.lines().next().unwrap_or_default();
    if header.trim().is_empty() {
        return Err("commit message cannot be empty".to_string());
    }
    if header_regex().is_match(header) {
        return Ok(());
    }

    let hint = match header.split_once(':') {
        None => "missing ': ' separator after the type".to_string(),
        Some((prefix, _)) => {
            let ty = prefix
                .trim_end_matches('!')
                .split('(')
                .next()
                .unwrap_or_default();
            if !COMMIT_TYPES.contains(&ty) {
                format!(
                    "unknown commit type '{ty}' (expected one of: {})",
                    COMMIT_TYPES.join(", ")
                )
            } else {
                "expected 'type(scope): description' with a lowercase scope and non-empty description"
                    .to_string()
            }
        }
    };
    Err(format!("commit message is not a conventional commit: {hint}"))
}
