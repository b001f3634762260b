//! tasksmith - Text generation, code generation and classification over Gemini.
//!
//! # Overview
//!
//! tasksmith forwards three kinds of requests to a hosted language model and
//! wraps every call in rate-limit-aware retries with exponential backoff.
//! It can be used as a library, from the command line, or as an HTTP service.

pub mod config;
pub mod error;
pub mod gemini;
pub mod llm;
pub mod server;
pub mod tasks;

// Re-export commonly used types
pub use config::AppConfig;
pub use error::{ConfigError, TaskError, TaskErrorKind, UpstreamError};
pub use gemini::GeminiClient;
pub use llm::{ErrorClass, InvocationParams, ModelClient, ModelRequest, RetryPolicy};
pub use tasks::{Classification, TaskRunner};
