//! Task invokers: text generation, code generation and classification.
//!
//! Each invocation validates its input, builds a fresh request with the
//! task's fixed parameters and sends it through the retry wrapper.

pub mod prompt;

use std::time::Duration;

use tokio::time::Instant;
use tracing::info;

use crate::error::TaskError;
use crate::llm::{InvocationParams, ModelClient, ModelRequest, RetryPolicy, retry_with_backoff};

pub use prompt::{classification_prompt, code_prompt};

/// Outcome of a classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// One of the caller's categories, in the caller's casing.
    pub label: String,
    /// False when no category appeared in the model's answer and the first
    /// category was returned as a fallback.
    pub matched: bool,
}

/// Runs tasks against a model client.
pub struct TaskRunner<C> {
    client: C,
    policy: RetryPolicy,
    retry_budget: Option<Duration>,
}

impl<C: ModelClient> TaskRunner<C> {
    pub fn new(client: C) -> Self {
        Self {
            client,
            policy: RetryPolicy::default(),
            retry_budget: None,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Cap the time an invocation may spend waiting between retries.
    pub fn with_retry_budget(mut self, budget: Duration) -> Self {
        self.retry_budget = Some(budget);
        self
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Generate free-form text for `prompt`.
    pub async fn generate_text(&self, prompt: &str) -> Result<String, TaskError> {
        require_non_empty(prompt, "Prompt is required")?;

        let request = ModelRequest::new(prompt, InvocationParams::creative());
        self.invoke("text generation", &request).await
    }

    /// Generate code for `prompt`. The response text is returned unchanged.
    pub async fn generate_code(&self, prompt: &str) -> Result<String, TaskError> {
        require_non_empty(prompt, "Prompt is required")?;

        let request = ModelRequest::new(code_prompt(prompt), InvocationParams::code());
        self.invoke("code generation", &request).await
    }

    /// Classify `text` into one of `categories`.
    ///
    /// Always returns one of `categories`; see [`TaskRunner::classify_text_detailed`]
    /// to tell a real match from the first-category fallback.
    pub async fn classify_text(
        &self,
        text: &str,
        categories: &[String],
    ) -> Result<String, TaskError> {
        self.classify_text_detailed(text, categories)
            .await
            .map(|c| c.label)
    }

    pub async fn classify_text_detailed(
        &self,
        text: &str,
        categories: &[String],
    ) -> Result<Classification, TaskError> {
        require_non_empty(text, "Text is required")?;
        if categories.is_empty() {
            return Err(TaskError::Validation(
                "At least one category is required".to_string(),
            ));
        }

        let request = ModelRequest::new(
            classification_prompt(text, categories),
            InvocationParams::classification(),
        );
        let response = self.invoke("text classification", &request).await?;

        Ok(match_category(&response, categories))
    }

    async fn invoke(&self, task: &str, request: &ModelRequest) -> Result<String, TaskError> {
        info!("Starting {}", task);

        let policy = match self.retry_budget {
            Some(budget) => self.policy.clone().with_deadline(Instant::now() + budget),
            None => self.policy.clone(),
        };

        let text = retry_with_backoff(&policy, || self.client.generate(request)).await?;

        info!("{} completed successfully", task);
        Ok(text)
    }
}

fn require_non_empty(value: &str, message: &str) -> Result<(), TaskError> {
    if value.is_empty() {
        return Err(TaskError::Validation(message.to_string()));
    }
    Ok(())
}

/// Pick the first category that appears in the model's answer.
///
/// Matching is case-insensitive substring search over the trimmed answer;
/// when nothing matches, the first category is returned unmatched.
pub fn match_category(response: &str, categories: &[String]) -> Classification {
    let normalized = response.trim().to_lowercase();

    categories
        .iter()
        .find(|c| normalized.contains(&c.to_lowercase()))
        .map(|c| Classification {
            label: c.clone(),
            matched: true,
        })
        .unwrap_or_else(|| Classification {
            label: categories.first().cloned().unwrap_or_default(),
            matched: false,
        })
}
