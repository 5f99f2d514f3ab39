//! The generation seam: one text in, a list of generated paragraphs out.
//!
//! [`Generator`] is the trait the pipeline runner fans out over. It is
//! deliberately tiny — a single independent, side-effect-free call — so a
//! test double is a few lines and the runner never learns provider details.
//!
//! [`OpenAiGenerator`] is the production implementation: a thin
//! chat-completions client over `reqwest`. It performs exactly one attempt
//! per call; retry, backoff, and the per-call timeout live in the runner so
//! every `Generator` implementation gets them for free.

use crate::config::ExplainConfig;
use crate::error::{ExplainError, GenerateError};
use crate::prompts::EXPLAIN_SYSTEM_PROMPT;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A single call to the external text-generation capability.
///
/// Implementations must be safe to invoke concurrently; calls share no
/// mutable state. Callers never pass empty or whitespace-only text — the
/// runner skips generation for such slides entirely.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Generate explanation paragraphs for one slide's text.
    async fn generate(&self, text: &str) -> Result<Vec<String>, GenerateError>;
}

/// Chat-completions client for OpenAI-compatible endpoints.
pub struct OpenAiGenerator {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
    system_prompt: String,
    temperature: f32,
    max_tokens: usize,
}

impl OpenAiGenerator {
    /// Build a generator from the pipeline configuration.
    ///
    /// The API key comes from `config.api_key`, falling back to the
    /// `OPENAI_API_KEY` environment variable.
    pub fn from_config(config: &ExplainConfig) -> Result<Self, ExplainError> {
        let api_key = match &config.api_key {
            Some(key) if !key.is_empty() => key.clone(),
            _ => std::env::var("OPENAI_API_KEY").map_err(|_| {
                ExplainError::InvalidConfig(
                    "no API key: set ExplainConfig::api_key or the OPENAI_API_KEY environment variable"
                        .into(),
                )
            })?,
        };

        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ExplainError::Internal(format!("http client: {e}")))?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            system_prompt: config
                .system_prompt
                .clone()
                .unwrap_or_else(|| EXPLAIN_SYSTEM_PROMPT.to_string()),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }
}

#[async_trait]
impl Generator for OpenAiGenerator {
    async fn generate(&self, text: &str) -> Result<Vec<String>, GenerateError> {
        debug_assert!(
            !text.trim().is_empty(),
            "callers must skip generation for empty slide text"
        );

        let body = ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &self.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: text,
                },
            ],
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerateError::Unavailable {
                detail: e.to_string(),
            })?;

        let status = response.status();
        if status.as_u16() == 429 {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            return Err(GenerateError::RateLimited { retry_after_secs });
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(GenerateError::Service {
                status: status.as_u16(),
                detail: truncate(&detail, 300),
            });
        }

        let parsed: ChatResponse =
            response
                .json()
                .await
                .map_err(|e| GenerateError::Unavailable {
                    detail: format!("malformed response body: {e}"),
                })?;

        let texts = collect_texts(parsed);
        debug!(paragraphs = texts.len(), "generation call succeeded");
        Ok(texts)
    }
}

/// Pull the non-empty, trimmed message contents out of a response.
fn collect_texts(response: ChatResponse) -> Vec<String> {
    response
        .choices
        .into_iter()
        .filter_map(|choice| choice.message)
        .filter_map(|message| message.content)
        .map(|content| content.trim().to_string())
        .filter(|content| !content.is_empty())
        .collect()
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &s[..end])
    }
}

// ── Wire types ───────────────────────────────────────────────────────────

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    max_tokens: usize,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Option<MessageBody>,
}

#[derive(Deserialize)]
struct MessageBody {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_nonempty_trimmed_contents() {
        let response: ChatResponse = serde_json::from_str(
            r#"{"choices":[
                {"message":{"content":"  First answer.  "}},
                {"message":{"content":""}},
                {"message":{"content":null}},
                {"message":null},
                {"message":{"content":"Second."}}
            ]}"#,
        )
        .unwrap();
        assert_eq!(
            collect_texts(response),
            vec!["First answer.".to_string(), "Second.".to_string()]
        );
    }

    #[test]
    fn missing_choices_yield_empty() {
        let response: ChatResponse = serde_json::from_str("{}").unwrap();
        assert!(collect_texts(response).is_empty());
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 300), "short");
        let long = "é".repeat(200);
        let cut = truncate(&long, 301);
        assert!(cut.ends_with('…'));
    }

    #[test]
    fn from_config_requires_a_key() {
        // Guard against ambient credentials leaking into the assertion.
        if std::env::var("OPENAI_API_KEY").is_ok() {
            return;
        }
        let config = ExplainConfig::default();
        assert!(OpenAiGenerator::from_config(&config).is_err());
        let config = ExplainConfig::builder().api_key("sk-test").build().unwrap();
        assert!(OpenAiGenerator::from_config(&config).is_ok());
    }
}
