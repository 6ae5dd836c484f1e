//! git::porcelain
//!
//! Parser for `git status --porcelain=v2 --branch -z` output.
//!
//! # Records
//!
//! | Prefix | Meaning | Fields before path |
//! |--------|---------|--------------------|
//! | `#`    | branch header (`branch.oid`, `branch.head`, `branch.upstream`, `branch.ab`) | - |
//! | `1`    | ordinary change | `XY sub mH mI mW hH hI` |
//! | `2`    | rename/copy, followed by a record holding the original path | `XY sub mH mI mW hH hI Xscore` |
//! | `u`    | unmerged | `XY sub m1 m2 m3 mW h1 h2 h3` |
//! | `?`    | untracked | - |
//! | `!`    | ignored | - |
//!
//! For `1` and `2` records, `X != '.'` marks the path staged and
//! `Y != '.'` marks it unstaged. Unmerged paths go to `conflicts` and
//! `unstaged` only. Unrecognised records are kept in
//! [`RepoStatus::unparsed`] and never abort parsing.
//!
//! The parser fills `branch`, `files` and `unparsed`; sorting, summary and
//! scopes are applied by [`RepoStatus::normalize`].

use crate::core::types::RepoStatus;

/// Parse raw porcelain-v2 output.
///
/// Records are NUL-separated. Output without any NUL byte is treated as
/// newline-separated, with rename origins after a tab.
///
/// # Example
///
/// ```
/// use git_control_tower::git::porcelain::parse_porcelain_v2;
///
/// let raw = b"# branch.head main\0# branch.ab +2 -1\01 M. N... 100644 100644 100644 abc abc file1.txt\0? notes.md\0";
/// let status = parse_porcelain_v2(raw);
///
/// assert_eq!(status.branch.head, "main");
/// assert_eq!((status.branch.ahead, status.branch.behind), (2, 1));
/// assert_eq!(status.files.staged, vec!["file1.txt"]);
/// assert_eq!(status.files.untracked, vec!["notes.md"]);
/// ```
pub fn parse_porcelain_v2(raw: &[u8]) -> RepoStatus {
    let text = String::from_utf8_lossy(raw);
    let nul_separated = text.contains('\0');
    let records: Vec<&str> = if nul_separated {
        text.split('\0').collect()
    } else {
        text.split('\n').collect()
    };

    let mut status = RepoStatus::default();
    let mut iter = records.into_iter();

    while let Some(record) = iter.next() {
        let record = record.trim_end_matches('\r');
        if record.trim().is_empty() {
            continue;
        }

        let Some(kind) = record.chars().next() else {
            continue;
        };
        let rest = &record[kind.len_utf8()..];
        let rest = rest.strip_prefix(' ').unwrap_or(rest);

        match kind {
            '#' => parse_header(&mut status, rest),
            '1' => match change_fields(rest, 7) {
                Some((xy, raw)) => apply_xy(&mut status, xy, &unquote_path(raw)),
                None => status.unparsed.push(record.to_string()),
            },
            '2' => {
                let Some((xy, mut raw)) = change_fields(rest, 8) else {
                    status.unparsed.push(record.to_string());
                    continue;
                };
                if nul_separated {
                    // Original path occupies the next record.
                    let _origin = iter.next();
                } else if let Some((dest, _origin)) = raw.split_once('\t') {
                    raw = dest;
                }
                apply_xy(&mut status, xy, &unquote_path(raw));
            }
            'u' => match change_fields(rest, 9) {
                Some((_, raw)) => {
                    let path = unquote_path(raw);
                    status.files.conflicts.push(path.clone());
                    status.files.unstaged.push(path);
                }
                None => status.unparsed.push(record.to_string()),
            },
            '?' => push_path(&mut status.files.untracked, rest),
            '!' => push_path(&mut status.files.ignored, rest),
            _ => status.unparsed.push(record.to_string()),
        }
    }

    status
}

fn parse_header(status: &mut RepoStatus, header: &str) {
    let (key, value) = header.split_once(' ').unwrap_or((header, ""));
    let value = value.trim();
    match key {
        "branch.oid" => status.branch.oid = value.to_string(),
        "branch.head" => status.branch.head = value.to_string(),
        "branch.upstream" if !value.is_empty() => {
            status.branch.upstream = Some(value.to_string());
        }
        "branch.ab" => {
            let (ahead, behind) = parse_ahead_behind(value);
            status.branch.ahead = ahead;
            status.branch.behind = behind;
        }
        _ => {}
    }
}

/// Parse `+A -B` into non-negative counts; malformed values read as zero.
fn parse_ahead_behind(value: &str) -> (u32, u32) {
    let mut ahead = 0;
    let mut behind = 0;
    for token in value.split_whitespace() {
        let count = |digits: &str| digits.parse::<i64>().map(|n| n.unsigned_abs()).unwrap_or(0);
        let clamp = |n: u64| u32::try_from(n).unwrap_or(u32::MAX);
        if let Some(digits) = token.strip_prefix('+') {
            ahead = clamp(count(digits));
        } else if let Some(digits) = token.strip_prefix('-') {
            behind = clamp(count(digits));
        }
    }
    (ahead, behind)
}

/// Split a change record body into its `XY` token and raw path field.
///
/// `fields` is the number of space-separated tokens (XY included) that
/// precede the path. Records with fewer tokens fall back to treating the
/// final token as the path.
fn change_fields(rest: &str, fields: usize) -> Option<(&str, &str)> {
    let parts: Vec<&str> = rest.splitn(fields + 1, ' ').collect();
    let xy = *parts.first()?;
    if xy.chars().count() != 2 || parts.len() < 2 {
        return None;
    }
    let raw_path = if parts.len() == fields + 1 {
        parts[fields]
    } else {
        parts.last().copied()?
    };
    if raw_path.trim().is_empty() {
        return None;
    }
    Some((xy, raw_path))
}

fn apply_xy(status: &mut RepoStatus, xy: &str, path: &str) {
    if path.is_empty() {
        return;
    }
    let mut chars = xy.chars();
    let x = chars.next().unwrap_or('.');
    let y = chars.next().unwrap_or('.');
    if x != '.' {
        status.files.staged.push(path.to_string());
    }
    if y != '.' {
        status.files.unstaged.push(path.to_string());
    }
}

fn push_path(list: &mut Vec<String>, raw: &str) {
    let path = unquote_path(raw);
    if !path.is_empty() {
        list.push(path);
    }
}

/// Trim a path and undo git's C-style quoting when it starts with `"`.
///
/// Octal escapes are decoded as raw bytes, so quoted UTF-8 round-trips.
///
/// ```
/// use git_control_tower::git::porcelain::unquote_path;
///
/// assert_eq!(unquote_path("  plain.txt "), "plain.txt");
/// assert_eq!(unquote_path(r#""with space\tand tab.txt""#), "with space\tand tab.txt");
/// assert_eq!(unquote_path(r#""caf\303\251.md""#), "café.md");
/// ```
pub fn unquote_path(raw: &str) -> String {
    let trimmed = raw.trim();
    let Some(inner) = trimmed.strip_prefix('"') else {
        return trimmed.to_string();
    };
    let inner = inner.strip_suffix('"').unwrap_or(inner);

    let mut bytes = Vec::with_capacity(inner.len());
    let mut iter = inner.bytes().peekable();
    while let Some(b) = iter.next() {
        if b != b'\\' {
            bytes.push(b);
            continue;
        }
        let Some(escaped) = iter.next() else {
            bytes.push(b'\\');
            break;
        };
        match escaped {
            b'a' => bytes.push(0x07),
            b'b' => bytes.push(0x08),
            b'f' => bytes.push(0x0c),
            b'n' => bytes.push(b'\n'),
            b'r' => bytes.push(b'\r'),
            b't' => bytes.push(b'\t'),
            b'v' => bytes.push(0x0b),
            b'0'..=b'7' => {
                let mut value = u32::from(escaped - b'0');
                for _ in 0..2 {
                    match iter.peek() {
                        Some(d @ b'0'..=b'7') => {
                            value = value * 8 + u32::from(*d - b'0');
                            iter.next();
                        }
                        _ => break,
                    }
                }
                bytes.push(u8::try_from(value & 0xff).unwrap_or(0));
            }
            other => bytes.push(other),
        }
    }
    String::from_utf8_lossy(&bytes).into_owned()
}
