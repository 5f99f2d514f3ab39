//! System prompts for slide explanation.
//!
//! Centralising the prompt here serves two purposes:
//!
//! 1. **Single source of truth** — changing how slides are explained
//!    requires editing exactly one place.
//!
//! 2. **Testability** — unit tests can inspect the prompt directly without
//!    spinning up a real generation service.
//!
//! Callers can override the default via
//! [`crate::config::ExplainConfig::system_prompt`]; the constant here is
//! used only when no override is provided.

/// Default system prompt for explaining one slide's text.
///
/// This prompt is used when `ExplainConfig::system_prompt` is `None`.
pub const EXPLAIN_SYSTEM_PROMPT: &str = "\
You are a patient lecturer. The user message contains the raw text of one \
presentation slide. Write clear, self-contained paragraphs that explain the \
slide's content to someone seeing it for the first time.

Rules:
- Explain the ideas on the slide; do not merely restate its bullet points.
- Expand abbreviations and define terms the first time they appear.
- Do not mention that the input is a slide or refer to 'this slide'.
- Output plain prose paragraphs only, no headings or lists.";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_is_nonempty_prose() {
        assert!(EXPLAIN_SYSTEM_PROMPT.len() > 100);
        assert!(!EXPLAIN_SYSTEM_PROMPT.contains('\t'));
    }
}
