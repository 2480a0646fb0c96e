//! # Error Types Module
//!
//! Typed errors for the pieces of the bot that need to distinguish failure modes.
//! Everything else propagates `anyhow::Error` with context.

use thiserror::Error;

/// Startup configuration errors. These are the only errors allowed to stop the process.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is absent
    #[error("{0} must be set")]
    Missing(&'static str),
    /// An environment variable is present but cannot be parsed
    #[error("{name} has an invalid value '{value}': {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// User input rejected while collecting a filter value.
///
/// Each variant maps to a localized corrective message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    #[error("not a number")]
    NotANumber,
    #[error("negative value")]
    Negative,
    #[error("value must be positive")]
    NotPositive,
    #[error("empty input")]
    Empty,
    #[error("input is too long")]
    TooLong,
    #[error("minimum price {min} is greater than maximum price {max}")]
    MinAboveMax { min: i64, max: i64 },
}

impl InputError {
    /// Localization key of the corrective message shown to the user
    pub fn message_key(&self) -> &'static str {
        match self {
            InputError::NotANumber => "error-not-a-number",
            InputError::Negative => "error-negative-number",
            InputError::NotPositive => "error-not-positive",
            InputError::Empty => "error-empty-input",
            InputError::TooLong => "error-too-long",
            InputError::MinAboveMax { .. } => "error-min-above-max",
        }
    }
}

/// Listing source failures
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("listing source returned status {0}")]
    Status(reqwest::StatusCode),
    #[error("listing source timed out after {0}s")]
    Timeout(u64),
    #[error("malformed response: {0}")]
    Malformed(String),
}
