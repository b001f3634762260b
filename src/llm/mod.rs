//! Upstream model abstraction and retry handling.

pub mod client;
pub mod retry;

pub use client::{InvocationParams, ModelClient, ModelRequest};
pub use retry::{
    ErrorClass, RetryFailure, RetryPolicy, classify, is_rate_limit_error, is_retryable_error,
    retry_with_backoff,
};
