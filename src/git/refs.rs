//! git::refs
//!
//! Parser for `git for-each-ref` branch listings.
//!
//! Each line is `refname|short|upstream|oid|committerdate` (see
//! [`BRANCH_REF_FORMAT`](crate::git::cli::BRANCH_REF_FORMAT)). Remote HEAD
//! symrefs are skipped.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One branch ref from a `for-each-ref` listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedBranchRef {
    /// Full ref name (`refs/heads/main`)
    pub ref_name: String,
    /// Short name (`main`, `origin/main`)
    pub short_name: String,
    /// Upstream short name, if configured
    pub upstream: Option<String>,
    /// Tip commit
    pub oid: String,
    /// Committer date of the tip; `None` when unparseable
    pub last_commit_at: Option<DateTime<Utc>>,
    /// Whether this is a remote-tracking ref
    pub is_remote: bool,
}

impl ParsedBranchRef {
    /// Split a remote ref's short name into `(remote, branch)`.
    pub fn remote_parts(&self) -> Option<(&str, &str)> {
        if !self.is_remote {
            return None;
        }
        self.short_name
            .split_once('/')
            .filter(|(remote, branch)| !remote.is_empty() && !branch.is_empty())
    }
}

/// Parse `for-each-ref` output into branch refs, in input order.
///
/// Malformed lines (fewer than two fields) are skipped.
///
/// ```
/// use git_control_tower::git::refs::parse_branch_refs;
///
/// let raw = b"refs/heads/main|main|origin/main|abc123|2024-01-15 10:30:00 +0000\n\
///             refs/remotes/origin/HEAD|origin/HEAD||abc123|2024-01-15 10:30:00 +0000\n\
///             refs/remotes/origin/main|origin/main||abc123|2024-01-15T10:30:00Z\n";
/// let refs = parse_branch_refs(raw);
///
/// assert_eq!(refs.len(), 2);
/// assert_eq!(refs[0].upstream.as_deref(), Some("origin/main"));
/// assert!(refs[1].is_remote);
/// ```
pub fn parse_branch_refs(raw: &[u8]) -> Vec<ParsedBranchRef> {
    String::from_utf8_lossy(raw)
        .lines()
        .filter_map(parse_line)
        .collect()
}

fn parse_line(line: &str) -> Option<ParsedBranchRef> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let mut fields = line.splitn(5, '|');
    let ref_name = fields.next()?.trim().to_string();
    let short_name = fields.next()?.trim().to_string();
    let upstream = fields
        .next()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .map(str::to_string);
    let oid = fields.next().unwrap_or_default().trim().to_string();
    let last_commit_at = fields.next().and_then(parse_commit_date);

    if ref_name.is_empty() || short_name.is_empty() {
        return None;
    }

    let is_remote = ref_name.starts_with("refs/remotes/");
    if is_remote && (short_name.ends_with("/HEAD") || ref_name.ends_with("/HEAD")) {
        return None;
    }

    Some(ParsedBranchRef {
        ref_name,
        short_name,
        upstream,
        oid,
        last_commit_at,
        is_remote,
    })
}

/// Parse either `2006-01-02 15:04:05 -0700` or RFC 3339 dates.
fn parse_commit_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    DateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S %z")
        .or_else(|_| DateTime::parse_from_rfc3339(value))
        .or_else(|_| DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%z"))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}
