//! Staged diff collection and prompt construction.

pub mod diff;
pub mod prompt;

pub use diff::{
    ChangedFile, DiffProvider, FileStatus, GitDiffProvider, StagedDiff, collect_staged_diff,
    ensure_changes,
};
pub use prompt::{InstructionSource, SYSTEM_PROMPT, build_messages, build_prompt};
