//! Configuration loaded from the environment.
//!
//! Recognized variables:
//! - `GOOGLE_API_KEY` (required): credential for the Gemini API
//! - `TASKSMITH_MODEL`: model name, defaults to `gemini-2.0-flash`
//! - `TASKSMITH_BASE_URL`: API base URL, mainly for tests and proxies
//! - `TASKSMITH_UPSTREAM_TIMEOUT`: per-request timeout in seconds (default 60)
//! - `TASKSMITH_RETRY_BUDGET`: optional cap, in seconds, on time spent retrying

use std::env;
use std::time::Duration;

use tracing::warn;

use crate::error::ConfigError;
use crate::gemini::{DEFAULT_BASE_URL, DEFAULT_MODEL, GeminiClient};
use crate::gemini::client::DEFAULT_TIMEOUT_SECS;

pub const API_KEY_ENV_VAR: &str = "GOOGLE_API_KEY";
pub const MODEL_ENV_VAR: &str = "TASKSMITH_MODEL";
pub const BASE_URL_ENV_VAR: &str = "TASKSMITH_BASE_URL";
pub const TIMEOUT_ENV_VAR: &str = "TASKSMITH_UPSTREAM_TIMEOUT";
pub const RETRY_BUDGET_ENV_VAR: &str = "TASKSMITH_RETRY_BUDGET";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub upstream_timeout: Duration,
    pub retry_budget: Option<Duration>,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = non_empty_var(API_KEY_ENV_VAR).ok_or(ConfigError::MissingApiKey)?;

        let retry_budget = match non_empty_var(RETRY_BUDGET_ENV_VAR) {
            Some(v) => Some(Duration::from_secs(v.parse::<u64>().map_err(|e| {
                ConfigError::InvalidValue {
                    var: RETRY_BUDGET_ENV_VAR,
                    value: v.clone(),
                    reason: e.to_string(),
                }
            })?)),
            None => None,
        };

        Ok(Self {
            api_key,
            model: non_empty_var(MODEL_ENV_VAR).unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: non_empty_var(BASE_URL_ENV_VAR)
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            upstream_timeout: get_timeout(),
            retry_budget,
        })
    }

    /// Build the Gemini client described by this configuration.
    pub fn gemini_client(&self) -> GeminiClient {
        GeminiClient::new(self.api_key.clone())
            .with_model(self.model.clone())
            .with_base_url(self.base_url.clone())
            .with_timeout(self.upstream_timeout)
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Get the configured upstream timeout.
///
/// Logs a warning if the environment variable is set but contains
/// an invalid value (non-numeric, negative or zero).
fn get_timeout() -> Duration {
    match non_empty_var(TIMEOUT_ENV_VAR) {
        Some(v) => match v.parse::<u64>() {
            Ok(secs) if secs > 0 => Duration::from_secs(secs),
            _ => {
                warn!(
                    "Invalid {} value '{}', using default {}s",
                    TIMEOUT_ENV_VAR, v, DEFAULT_TIMEOUT_SECS
                );
                Duration::from_secs(DEFAULT_TIMEOUT_SECS)
            }
        },
        None => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
    }
}
