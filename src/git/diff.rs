//! git::diff
//!
//! Unified-diff parser.
//!
//! Produces hunks with their body lines verbatim, per-diff stats, and an
//! optional per-line annotation with old/new line numbers.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// A single `@@` hunk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffHunk {
    pub old_start: u32,
    pub old_count: u32,
    pub new_start: u32,
    pub new_count: u32,
    /// The full `@@ ... @@` line
    pub header: String,
    /// Body lines, verbatim
    pub lines: Vec<String>,
}

/// Line and file counts for a diff.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffStats {
    pub additions: usize,
    pub deletions: usize,
    pub files: usize,
}

/// Classification of an annotated line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineKind {
    Context,
    Addition,
    Deletion,
    Header,
}

/// One diff line with its position in the old and new files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotatedLine {
    pub kind: LineKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_line: Option<u32>,
    pub text: String,
}

/// Parsed diff as returned by the diff endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffResponse {
    pub has_diff: bool,
    pub hunks: Vec<DiffHunk>,
    pub stats: DiffStats,
    pub raw: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotated: Option<Vec<AnnotatedLine>>,
}

fn hunk_regex() -> &'static Regex {
    static HUNK: OnceLock<Regex> = OnceLock::new();
    HUNK.get_or_init(|| {
        Regex::new(r"^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@")
            .unwrap_or_else(|e| unreachable!("static pattern is valid: {e}"))
    })
}

fn parse_hunk_header(line: &str) -> Option<DiffHunk> {
    let caps = hunk_regex().captures(line)?;
    let number = |idx: usize, default: u32| {
        caps.get(idx)
            .and_then(|m| m.as_str().parse::<u32>().ok())
            .unwrap_or(default)
    };
    Some(DiffHunk {
        old_start: number(1, 0),
        old_count: number(2, 1),
        new_start: number(3, 0),
        new_count: number(4, 1),
        header: line.to_string(),
        lines: Vec::new(),
    })
}

fn is_file_header(line: &str) -> bool {
    line.starts_with("diff --git ")
}

/// Parse raw unified-diff output.
///
/// Empty (or whitespace-only) input yields `has_diff = false`.
///
/// ```
/// use git_control_tower::git::diff::parse_unified_diff;
///
/// let raw = "diff --git a/f.txt b/f.txt\n--- a/f.txt\n+++ b/f.txt\n@@ -1 +1,2 @@\n-old\n+new\n+more\n";
/// let diff = parse_unified_diff(raw);
///
/// assert!(diff.has_diff);
/// assert_eq!(diff.stats.files, 1);
/// assert_eq!((diff.stats.additions, diff.stats.deletions), (2, 1));
/// assert_eq!(diff.hunks[0].old_count, 1);
/// assert_eq!(diff.hunks[0].lines, vec!["-old", "+new", "+more"]);
/// ```
pub fn parse_unified_diff(raw: &str) -> DiffResponse {
    let mut response = DiffResponse {
        has_diff: !raw.trim().is_empty(),
        raw: raw.to_string(),
        ..Default::default()
    };
    if !response.has_diff {
        return response;
    }

    let mut file_headers = std::collections::BTreeSet::new();
    let mut current: Option<DiffHunk> = None;

    for line in raw.lines() {
        if is_file_header(line) {
            file_headers.insert(line);
            response.hunks.extend(current.take());
            continue;
        }
        if let Some(hunk) = parse_hunk_header(line) {
            response.hunks.extend(current.replace(hunk));
            continue;
        }
        let Some(hunk) = current.as_mut() else {
            continue;
        };
        if line.starts_with('+') && !line.starts_with("+++") {
            response.stats.additions += 1;
        } else if line.starts_with('-') && !line.starts_with("---") {
            response.stats.deletions += 1;
        }
        hunk.lines.push(line.to_string());
    }
    response.hunks.extend(current);
    response.stats.files = file_headers.len();
    response
}

/// Annotate every line of a unified diff with its kind and line numbers.
pub fn annotate_diff(raw: &str) -> Vec<AnnotatedLine> {
    let mut annotated = Vec::new();
    let mut in_hunk = false;
    let mut old_line = 0u32;
    let mut new_line = 0u32;

    for line in raw.lines() {
        let header = |text: &str| AnnotatedLine {
            kind: LineKind::Header,
            old_line: None,
            new_line: None,
            text: text.to_string(),
        };

        if is_file_header(line) {
            in_hunk = false;
            annotated.push(header(line));
            continue;
        }
        if let Some(hunk) = parse_hunk_header(line) {
            in_hunk = true;
            old_line = hunk.old_start;
            new_line = hunk.new_start;
            annotated.push(header(line));
            continue;
        }
        if !in_hunk {
            annotated.push(header(line));
            continue;
        }

        let entry = match line.chars().next() {
            Some('+') => {
                new_line += 1;
                AnnotatedLine {
                    kind: LineKind::Addition,
                    old_line: None,
                    new_line: Some(new_line - 1),
                    text: line.to_string(),
                }
            }
            Some('-') => {
                old_line += 1;
                AnnotatedLine {
                    kind: LineKind::Deletion,
                    old_line: Some(old_line - 1),
                    new_line: None,
                    text: line.to_string(),
                }
            }
            Some('\\') => header(line),
            _ => {
                old_line += 1;
                new_line += 1;
                AnnotatedLine {
                    kind: LineKind::Context,
                    old_line: Some(old_line - 1),
                    new_line: Some(new_line - 1),
                    text: line.to_string(),
                }
            }
        };
        annotated.push(entry);
    }
    annotated
}
