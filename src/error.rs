//! Error types for the reflection engine.

use std::time::Duration;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Flow error: {0}")]
    Flow(#[from] FlowError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Invalid phase catalog: {0}")]
    InvalidCatalog(String),
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Provider {provider} timed out after {timeout:?}")]
    Timeout { provider: String, timeout: Duration },
}

/// Rejections of caller-supplied turn input.
///
/// These are the only errors `process_turn` returns; every other failure is
/// folded into a well-formed `TurnResult`.
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    #[error("Phase {phase} is not in the catalog (1..={max})")]
    PhaseOutOfRange { phase: u8, max: u8 },

    #[error("Requested phase {requested} does not match flow state phase {actual}")]
    PhaseMismatch { requested: u8, actual: u8 },

    #[error("Readiness {0} is outside [0, 1]")]
    InvalidReadiness(f64),

    #[error("Session is already complete")]
    SessionComplete,

    #[error("Malformed flow state: {0}")]
    MalformedState(String),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
