//! Google Gemini integration.

pub mod client;

pub use client::{DEFAULT_BASE_URL, DEFAULT_MODEL, GeminiClient};
