//! service::ignore
//!
//! Add a path to the nearest `.gitignore` and drop it from the index.
//!
//! # Algorithm
//!
//! 1. Clean the path; reject empty, root, or escaping paths.
//! 2. Walk from the path's parent directory up to the repository root and
//!    pick the first directory holding a `.gitignore` (the root file is
//!    created when none exists).
//! 3. Compute the entry relative to that directory.
//! 4. Append it unless an equivalent entry exists. Entries compare after
//!    trimming and stripping one leading `/`.
//! 5. Write the file atomically (temp file in the same directory, then
//!    rename).
//! 6. `git rm --cached` the path so the rule takes effect.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use super::GitService;
use crate::core::paths::sanitize_paths;
use crate::git::RunContext;

const GITIGNORE: &str = ".gitignore";

/// Ignore request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IgnoreRequest {
    pub path: String,
}

/// Ignore outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IgnoreResponse {
    pub success: bool,
    pub path: String,
    /// Repository-relative path of the `.gitignore` that holds the entry
    pub gitignore: String,
    pub entry: String,
    /// The entry was already present; the file was not rewritten
    pub already_present: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub validation_errors: Vec<String>,
}

/// Entry form used for duplicate detection.
fn normalize_entry(line: &str) -> &str {
    let trimmed = line.trim();
    trimmed.strip_prefix('/').unwrap_or(trimmed).trim()
}

/// Whether `contents` already carries an entry covering `entry`.
///
/// A plain `build` line matches directories too, so it covers `build/`.
/// The reverse does not hold: `build/` never matches a file named `build`.
pub fn contains_entry(contents: &str, entry: &str) -> bool {
    let wanted = normalize_entry(entry);
    let wanted_dir = wanted.strip_suffix('/');
    contents.lines().any(|line| {
        let line = normalize_entry(line);
        line == wanted || wanted_dir.is_some_and(|dir| line == dir)
    })
}

/// Append `entry` on its own line, keeping a trailing newline.
pub fn append_entry(contents: &str, entry: &str) -> String {
    let mut out = String::with_capacity(contents.len() + entry.len() + 2);
    out.push_str(contents);
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(entry);
    out.push('\n');
    out
}

/// Candidate directories for `.gitignore`, deepest first, ending with the root (`""`).
fn candidate_dirs(rel: &str) -> Vec<String> {
    let mut dirs: Vec<String> = Path::new(rel)
        .ancestors()
        .skip(1)
        .map(|dir| dir.to_string_lossy().to_string())
        .filter(|dir| !dir.is_empty())
        .collect();
    dirs.push(String::new());
    dirs
}

/// Path of `rel` relative to directory `dir` (both repository-relative).
fn entry_relative_to(dir: &str, rel: &str) -> String {
    if dir.is_empty() {
        return rel.to_string();
    }
    rel.strip_prefix(dir)
        .and_then(|rest| rest.strip_prefix('/'))
        .unwrap_or(rel)
        .to_string()
}

/// Write `contents` to `path` via a temp file and rename.
async fn write_atomic(path: &Path, contents: &str) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    tokio::fs::create_dir_all(dir).await?;
    let temp: PathBuf = dir.join(format!(".gitignore.tmp-{}", uuid::Uuid::new_v4()));

    let mut file = tokio::fs::File::create(&temp).await?;
    let written = async {
        file.write_all(contents.as_bytes()).await?;
        file.sync_all().await
    }
    .await;
    drop(file);
    if let Err(e) = written {
        let _ = tokio::fs::remove_file(&temp).await;
        return Err(e);
    }
    if let Err(e) = tokio::fs::rename(&temp, path).await {
        let _ = tokio::fs::remove_file(&temp).await;
        return Err(e);
    }
    Ok(())
}

impl GitService {
    /// Ignore a path and untrack it.
    pub async fn ignore(&self, ctx: &RunContext, repo: &Path, req: &IgnoreRequest) -> IgnoreResponse {
        let mut response = IgnoreResponse {
            path: req.path.clone(),
            ..Default::default()
        };

        let sanitized = sanitize_paths(std::slice::from_ref(&req.path));
        let Some(rel) = sanitized.accepted.first().cloned() else {
            response.validation_errors = sanitized.rejection_messages();
            return response;
        };
        if rel == "." {
            response
                .validation_errors
                .push("cannot ignore the repository root".to_string());
            return response;
        }
        response.path = rel.clone();

        let mut target_dir = String::new();
        for dir in candidate_dirs(&rel) {
            if tokio::fs::try_exists(repo.join(&dir).join(GITIGNORE))
                .await
                .unwrap_or(false)
            {
                target_dir = dir;
                break;
            }
        }
        let gitignore_rel = if target_dir.is_empty() {
            GITIGNORE.to_string()
        } else {
            format!("{target_dir}/{GITIGNORE}")
        };
        let gitignore_path = repo.join(&gitignore_rel);

        let mut entry = entry_relative_to(&target_dir, &rel);
        if tokio::fs::metadata(repo.join(&rel))
            .await
            .is_ok_and(|m| m.is_dir())
        {
            entry.push('/');
        }
        response.gitignore = gitignore_rel;
        response.entry = entry.clone();

        let contents = match tokio::fs::read_to_string(&gitignore_path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => {
                response.error = Some(format!("failed to read {}: {e}", response.gitignore));
                return response;
            }
        };

        if contains_entry(&contents, &entry) {
            response.already_present = true;
        } else if let Err(e) = write_atomic(&gitignore_path, &append_entry(&contents, &entry)).await {
            response.error = Some(format!("failed to write {}: {e}", response.gitignore));
            return response;
        } else {
            tracing::info!(gitignore = %response.gitignore, entry = %entry, "added ignore entry");
        }

        match self.runner.remove_from_index(ctx, repo, &rel).await {
            Ok(()) => response.success = true,
            Err(e) => {
                response.error = Some(format!(
                    "added to {} but could not untrack: {}",
                    response.gitignore,
                    e.detail()
                ));
            }
        }
        response
    }
}
