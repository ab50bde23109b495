//! Staged diff collection using git2.
//!
//! Only changes in the index are considered: a commit message describes what
//! `git commit` would record, and that is the staged tree.

use std::fmt;
use std::path::{Path, PathBuf};

use git2::{Delta, Diff, DiffFormat, ErrorCode, Repository, Tree};
use tracing::{debug, info, warn};

use crate::error::DiffError;

/// Maximum characters for the unified diff text before truncation.
const MAX_DIFF_LENGTH: usize = 30_000;

/// Appended to the diff text when it was cut short.
const TRUNCATION_NOTE: &str = "\n... (diff truncated, focus on the visible changes)\n";

/// Source of the change text a commit message is written for.
pub trait DiffProvider {
    /// The current change set as unified diff text.
    ///
    /// Fails with [`DiffError::NoChanges`] when there is nothing to describe.
    fn change_text(&self) -> Result<String, DiffError>;
}

/// Reject diff text that is empty or whitespace only.
pub fn ensure_changes(text: String) -> Result<String, DiffError> {
    if text.trim().is_empty() {
        return Err(DiffError::NoChanges);
    }
    Ok(text)
}

/// Status of a staged file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileStatus {
    Added,
    Modified,
    Deleted,
    Renamed,
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileStatus::Added => write!(f, "Added"),
            FileStatus::Modified => write!(f, "Modified"),
            FileStatus::Deleted => write!(f, "Deleted"),
            FileStatus::Renamed => write!(f, "Renamed"),
        }
    }
}

/// A file with staged changes.
#[derive(Debug, Clone)]
pub struct ChangedFile {
    pub path: String,
    pub status: FileStatus,
}

/// Summary of the staged changes.
#[derive(Debug, Clone)]
pub struct StagedDiff {
    pub diff_text: String,
    pub changed_files: Vec<ChangedFile>,
    pub truncated: bool,
    pub additions: usize,
    pub deletions: usize,
}

/// Reads staged changes from the repository containing `path`.
#[derive(Debug, Clone)]
pub struct GitDiffProvider {
    path: PathBuf,
}

impl GitDiffProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open the repository and collect its staged diff.
    pub fn collect(&self) -> Result<StagedDiff, DiffError> {
        let repo = Repository::discover(&self.path).map_err(|source| DiffError::OpenRepository {
            path: self.path.clone(),
            source,
        })?;
        collect_staged_diff(&repo)
    }
}

impl DiffProvider for GitDiffProvider {
    fn change_text(&self) -> Result<String, DiffError> {
        let staged = self.collect()?;
        info!(
            "Staged diff: {} files, {} additions, {} deletions, truncated={}",
            staged.changed_files.len(),
            staged.additions,
            staged.deletions,
            staged.truncated
        );
        for file in &staged.changed_files {
            debug!("  {} ({})", file.path, file.status);
        }
        ensure_changes(staged.diff_text)
    }
}

/// Resolve the HEAD tree, distinguishing empty-repo errors from real failures.
///
/// Returns `Ok(None)` for repos with no commits (unborn branch / not found),
/// `Ok(Some(tree))` for repos with a valid HEAD, or `Err(DiffError::DiffFailed)`
/// for real errors (corrupt HEAD, permission issues, missing objects).
fn resolve_head_tree(repo: &Repository) -> Result<Option<Tree<'_>>, DiffError> {
    let head_ref = match repo.head() {
        Ok(r) => r,
        Err(e) if e.code() == ErrorCode::UnbornBranch || e.code() == ErrorCode::NotFound => {
            return Ok(None);
        }
        Err(e) => return Err(DiffError::DiffFailed(e)),
    };

    let tree = head_ref.peel_to_tree().map_err(DiffError::DiffFailed)?;
    Ok(Some(tree))
}

/// Collect the diff between HEAD and the index.
///
/// Returns [`DiffError::NoChanges`] when nothing is staged.
pub fn collect_staged_diff(repo: &Repository) -> Result<StagedDiff, DiffError> {
    let head_tree = resolve_head_tree(repo)?;

    let staged = repo
        .diff_tree_to_index(head_tree.as_ref(), None, None)
        .map_err(DiffError::DiffFailed)?;

    let changed_files = collect_files(&staged);
    if changed_files.is_empty() {
        return Err(DiffError::NoChanges);
    }

    let mut diff_text = String::new();
    let mut additions = 0usize;
    let mut deletions = 0usize;
    let mut truncated = false;

    append_diff_text(&staged, &mut diff_text, &mut additions, &mut deletions, &mut truncated);
    if truncated {
        diff_text.push_str(TRUNCATION_NOTE);
    }

    Ok(StagedDiff {
        diff_text,
        changed_files,
        truncated,
        additions,
        deletions,
    })
}

fn collect_files(diff: &Diff<'_>) -> Vec<ChangedFile> {
    diff.deltas()
        .filter_map(|delta| {
            let status = match delta.status() {
                Delta::Added => FileStatus::Added,
                Delta::Deleted => FileStatus::Deleted,
                Delta::Renamed => FileStatus::Renamed,
                _ => FileStatus::Modified,
            };
            let path = delta
                .new_file()
                .path()
                .or_else(|| delta.old_file().path())?
                .to_string_lossy()
                .to_string();
            Some(ChangedFile { path, status })
        })
        .collect()
}

/// Append unified diff text from a diff object, respecting the max length.
fn append_diff_text(
    diff: &Diff<'_>,
    text: &mut String,
    additions: &mut usize,
    deletions: &mut usize,
    truncated: &mut bool,
) {
    if let Err(e) = diff.print(DiffFormat::Patch, |_delta, _hunk, line| {
        if *truncated {
            return true;
        }

        let origin = line.origin();
        match origin {
            '+' => *additions += 1,
            '-' => *deletions += 1,
            _ => {}
        }

        let content = String::from_utf8_lossy(line.content());

        if text.len() + content.len() + 2 > MAX_DIFF_LENGTH {
            *truncated = true;
            return true;
        }

        if origin == '+' || origin == '-' || origin == ' ' {
            text.push(origin);
        }
        text.push_str(&content);

        true
    }) {
        warn!("Failed to collect diff text: {e}");
        *truncated = true;
    }
}
