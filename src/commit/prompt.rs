//! Prompt construction for commit message generation.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::backend::Message;
use crate::error::PromptError;

/// Placeholder replaced by the diff text.
pub const DIFF_PLACEHOLDER: &str = "{diff}";

/// System message sent ahead of every request.
pub const SYSTEM_PROMPT: &str = "You are a commit message generator. You output ONLY the commit message. No reasoning. No explanation. No alternatives. Just the message.";

/// Built-in instructions used when no instruction file is configured.
pub const DEFAULT_INSTRUCTIONS: &str = r#"Generate a git commit message for this diff.

RULES:
- Output ONLY the commit message, nothing else
- Format: <type>(<scope>): <summary>
- Types: feat, fix, docs, refactor, chore, ci, build, test, style, perf
- Summary: imperative, lowercase, under 72 chars
- Optional body: blank line, then bullet points

EXAMPLE OUTPUT:
feat(cli): add streaming output

- print the response as it is generated
- validate the model before sending the diff

FORBIDDEN:
- Do not explain your reasoning
- Do not list alternatives
- Do not say "here is the commit message"
- Do not use markdown code blocks

DIFF:
{diff}"#;

/// Where the instruction template comes from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum InstructionSource {
    #[default]
    Builtin,
    /// A skill or instruction file, read verbatim.
    File(PathBuf),
}

impl InstructionSource {
    pub fn from_path(path: Option<PathBuf>) -> Self {
        path.map(InstructionSource::File).unwrap_or_default()
    }

    /// Load the instruction template.
    pub fn load(&self) -> Result<String, PromptError> {
        match self {
            InstructionSource::Builtin => Ok(DEFAULT_INSTRUCTIONS.to_string()),
            InstructionSource::File(path) => load_instruction_file(path),
        }
    }
}

fn load_instruction_file(path: &Path) -> Result<String, PromptError> {
    let content = std::fs::read_to_string(path).map_err(|source| PromptError::InstructionLoad {
        path: path.to_path_buf(),
        source,
    })?;

    if content.trim().is_empty() {
        return Err(PromptError::InstructionLoad {
            path: path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, "file is empty"),
        });
    }

    debug!("Loaded instructions from {} ({} chars)", path.display(), content.len());
    Ok(content)
}

/// Insert `diff_text` into `template`.
///
/// Every `{diff}` placeholder is replaced. A template without one gets the
/// diff appended under a `DIFF:` heading.
pub fn build_prompt(template: &str, diff_text: &str) -> String {
    if template.contains(DIFF_PLACEHOLDER) {
        return template.replace(DIFF_PLACEHOLDER, diff_text);
    }

    let mut prompt = template.trim_end().to_string();
    prompt.push_str("\n\nDIFF:\n");
    prompt.push_str(diff_text);
    prompt
}

/// The request for one commit message: system instructions, then the prompt.
pub fn build_messages(prompt: String) -> Vec<Message> {
    vec![Message::system(SYSTEM_PROMPT), Message::user(prompt)]
}
