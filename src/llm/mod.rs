//! LLM integration.
//!
//! The orchestrator only sees the `LlmProvider` trait. The production backend
//! is Anthropic's Messages API; tests plug in scripted providers.

pub mod anthropic;
pub mod provider;
pub mod retry;

pub use anthropic::AnthropicProvider;
pub use provider::*;
pub use retry::complete_with_retry;

use std::sync::Arc;

use crate::error::LlmError;

/// Supported LLM backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackend {
    Anthropic,
}

/// Configuration for creating an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub backend: LlmBackend,
    pub api_key: secrecy::SecretString,
    pub model: String,
}

/// Create an LLM provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    match config.backend {
        LlmBackend::Anthropic => {
            tracing::info!("Using Anthropic (model: {})", config.model);
            Ok(Arc::new(AnthropicProvider::new(
                config.api_key.clone(),
                &config.model,
            )))
        }
    }
}
