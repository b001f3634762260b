//! The upstream model capability: prompt and parameters in, text out.

use async_trait::async_trait;

use crate::error::UpstreamError;

/// Output cap for free-form and code generation.
pub const GENERATION_MAX_TOKENS: u32 = 2048;

/// Output cap for classification; a label is all we need back.
pub const CLASSIFICATION_MAX_TOKENS: u32 = 50;

/// Per-task sampling parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InvocationParams {
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl InvocationParams {
    /// Higher temperature for creative variety.
    pub fn creative() -> Self {
        Self {
            temperature: 0.7,
            max_output_tokens: GENERATION_MAX_TOKENS,
        }
    }

    /// Low temperature so code output stays deterministic.
    pub fn code() -> Self {
        Self {
            temperature: 0.2,
            max_output_tokens: GENERATION_MAX_TOKENS,
        }
    }

    pub fn classification() -> Self {
        Self {
            temperature: 0.0,
            max_output_tokens: CLASSIFICATION_MAX_TOKENS,
        }
    }
}

/// One outbound model call. Built fresh for every attempt sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelRequest {
    pub prompt: String,
    pub params: InvocationParams,
}

impl ModelRequest {
    pub fn new(prompt: impl Into<String>, params: InvocationParams) -> Self {
        Self {
            prompt: prompt.into(),
            params,
        }
    }
}

/// Trait for calling the upstream language model.
///
/// This abstraction allows mocking the model API in tests.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Send the request and return the response text.
    async fn generate(&self, request: &ModelRequest) -> Result<String, UpstreamError>;
}

#[async_trait]
impl<C: ModelClient + ?Sized> ModelClient for std::sync::Arc<C> {
    async fn generate(&self, request: &ModelRequest) -> Result<String, UpstreamError> {
        (**self).generate(request).await
    }
}
