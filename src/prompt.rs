//! Grounded prompt construction.
//!
//! Retrieved passages become `[Source: name]` blocks under a `# Context`
//! heading, preceded by rules telling the model to answer only from them.

use serde::{Deserialize, Serialize};
use std::path::Path;

use groundwork_core::models::Retrieved;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a concise, helpful Q&A assistant. \
     Answer clearly. If unsure, say so briefly and suggest what info is needed.";

pub const GROUNDING_RULES: &str = "Use ONLY the context below to answer. \
     If the answer is not in the context, say \
     \"I'm not sure based on the provided documents.\"";

pub const NO_CONTEXT: &str = "No relevant context.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum AnswerStyle {
    #[default]
    Concise,
    Detailed,
}

impl AnswerStyle {
    fn suffix(self) -> &'static str {
        match self {
            AnswerStyle::Concise => " Keep it brief.",
            AnswerStyle::Detailed => " Provide a bit more detail and one small example.",
        }
    }
}

/// Read the system prompt from `path`, or fall back to
/// [`DEFAULT_SYSTEM_PROMPT`] when the file is missing or unreadable.
pub fn load_system_prompt(path: &Path) -> String {
    if !path.exists() {
        return DEFAULT_SYSTEM_PROMPT.to_string();
    }
    match std::fs::read_to_string(path) {
        Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
        Ok(_) => DEFAULT_SYSTEM_PROMPT.to_string(),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "cannot read system prompt, using default");
            DEFAULT_SYSTEM_PROMPT.to_string()
        }
    }
}

/// Source-labelled context blocks, or [`NO_CONTEXT`] when nothing was retrieved.
pub fn format_context(passages: &[Retrieved]) -> String {
    if passages.is_empty() {
        return NO_CONTEXT.to_string();
    }
    passages
        .iter()
        .map(|p| format!("[Source: {}]\n{}", p.source, p.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// System + user messages for one grounded question.
pub fn build_messages(
    question: &str,
    style: AnswerStyle,
    passages: &[Retrieved],
    system_prompt: &str,
) -> Vec<ChatMessage> {
    let user = format!(
        "{}\n\n# Context\n{}\n\n# Question\n{}{}",
        GROUNDING_RULES,
        format_context(passages),
        question.trim(),
        style.suffix()
    );

    vec![
        ChatMessage {
            role: Role::System,
            content: format!("{} Always follow grounding rules.", system_prompt),
        },
        ChatMessage {
            role: Role::User,
            content: user,
        },
    ]
}
