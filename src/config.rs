//! Configuration for the slide-deck explanation pipeline.
//!
//! All pipeline behaviour is controlled through [`ExplainConfig`], built via
//! its [`ExplainConfigBuilder`]. Keeping every knob in one struct makes it
//! trivial to share configs across tasks, log them, and diff two runs to
//! understand why their outputs differ.
//!
//! # Design choice: builder over constructor
//! A fifteen-field constructor is unreadable and breaks on every new field.
//! The builder lets callers set only what they care about and rely on
//! well-documented defaults for the rest.

use crate::error::ExplainError;
use std::path::PathBuf;

/// Configuration for the explanation pipeline.
///
/// Built via [`ExplainConfig::builder()`] or using
/// [`ExplainConfig::default()`].
///
/// # Example
/// ```rust
/// use deck2notes::ExplainConfig;
///
/// let config = ExplainConfig::builder()
///     .concurrency(4)
///     .model("gpt-4o-mini")
///     .api_timeout_secs(30)
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct ExplainConfig {
    /// Directory where uploaded decks are stored. Default: `uploads`.
    pub upload_dir: PathBuf,

    /// Directory where completed notes documents are published. Default: `outputs`.
    ///
    /// The notes file for a job is always `<output_dir>/<job_id>.json`, so
    /// completion can be reconstructed from the directory contents alone.
    pub output_dir: PathBuf,

    /// Number of concurrent generation calls per job. Default: 8.
    ///
    /// The generation API is network-bound; fanning out cuts wall-clock time
    /// roughly linearly until the provider starts throttling. Lower this if
    /// you see rate-limit errors, raise it for fast providers.
    pub concurrency: usize,

    /// Number of jobs the dispatcher runs in parallel. Default: 4.
    ///
    /// Each job already fans out `concurrency` calls, so total in-flight
    /// requests can reach `max_concurrent_jobs * concurrency`.
    pub max_concurrent_jobs: usize,

    /// Chat model identifier. Default: `gpt-4o-mini`.
    pub model: String,

    /// API key for the generation service.
    ///
    /// If `None`, the `OPENAI_API_KEY` environment variable is read when the
    /// client is constructed.
    pub api_key: Option<String>,

    /// Base URL of the chat-completions API. Default: `https://api.openai.com/v1`.
    ///
    /// Overridable so tests and self-hosted gateways can point the client at
    /// a different endpoint without touching the environment.
    pub api_base: String,

    /// Custom system prompt. If `None`, uses [`crate::prompts::EXPLAIN_SYSTEM_PROMPT`].
    pub system_prompt: Option<String>,

    /// Sampling temperature for the completion. Default: 0.7.
    ///
    /// Explanations benefit from some variation in phrasing; transcription
    /// tasks would want this near zero, explanation does not.
    pub temperature: f32,

    /// Maximum tokens the model may generate per slide. Default: 1024.
    pub max_tokens: usize,

    /// Maximum retry attempts on a transient generation failure. Default: 3.
    ///
    /// 5xx, timeout, and rate-limit errors are usually transient. Permanent
    /// errors (bad API key, 400) are not retried and fail the slide
    /// immediately.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds (exponential backoff). Default: 500.
    ///
    /// Doubles after each attempt: 500 ms -> 1 s -> 2 s. Backing off avoids
    /// a thundering herd when several slides hit a recovering endpoint at
    /// once.
    pub retry_backoff_ms: u64,

    /// Per-generation-call timeout in seconds. Default: 60.
    ///
    /// A timed-out call counts as transient unavailability and is retried.
    pub api_timeout_secs: u64,

    /// Interval between upload-directory scans in watcher mode, in
    /// milliseconds. Default: 1000.
    pub poll_interval_ms: u64,
}

impl Default for ExplainConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("uploads"),
            output_dir: PathBuf::from("outputs"),
            concurrency: 8,
            max_concurrent_jobs: 4,
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            api_base: "https://api.openai.com/v1".to_string(),
            system_prompt: None,
            temperature: 0.7,
            max_tokens: 1024,
            max_retries: 3,
            retry_backoff_ms: 500,
            api_timeout_secs: 60,
            poll_interval_ms: 1000,
        }
    }
}

impl ExplainConfig {
    /// Create a new builder for `ExplainConfig`.
    pub fn builder() -> ExplainConfigBuilder {
        ExplainConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ExplainConfig`].
#[derive(Debug)]
pub struct ExplainConfigBuilder {
    config: ExplainConfig,
}

impl ExplainConfigBuilder {
    pub fn upload_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.upload_dir = dir.into();
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn max_concurrent_jobs(mut self, n: usize) -> Self {
        self.config.max_concurrent_jobs = n.max(1);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn api_base(mut self, base: impl Into<String>) -> Self {
        self.config.api_base = base.into();
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs.max(1);
        self
    }

    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms.max(50);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExplainConfig, ExplainError> {
        let c = &self.config;
        if c.concurrency == 0 {
            return Err(ExplainError::InvalidConfig(
                "concurrency must be >= 1".into(),
            ));
        }
        if c.model.is_empty() {
            return Err(ExplainError::InvalidConfig("model must be set".into()));
        }
        if c.api_base.is_empty() {
            return Err(ExplainError::InvalidConfig("api_base must be set".into()));
        }
        if c.upload_dir == c.output_dir {
            return Err(ExplainError::InvalidConfig(
                "upload_dir and output_dir must differ (the watcher would re-trigger on its own outputs)".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = ExplainConfig::builder().build().unwrap();
        assert_eq!(config.concurrency, 8);
        assert_eq!(config.model, "gpt-4o-mini");
        assert_eq!(config.api_timeout_secs, 60);
    }

    #[test]
    fn concurrency_clamped_to_one() {
        let config = ExplainConfig::builder().concurrency(0).build().unwrap();
        assert_eq!(config.concurrency, 1);
    }

    #[test]
    fn same_dirs_rejected() {
        let result = ExplainConfig::builder()
            .upload_dir("data")
            .output_dir("data")
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn temperature_clamped() {
        let config = ExplainConfig::builder().temperature(9.0).build().unwrap();
        assert_eq!(config.temperature, 2.0);
    }
}
