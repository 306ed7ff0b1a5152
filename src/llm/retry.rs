//! Timeout + retry-after-backoff wrapper around a single completion call.

use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::config::RetryConfig;
use crate::error::LlmError;

use super::provider::{CompletionRequest, CompletionResponse, LlmProvider};

/// Run `request` against `llm`, bounding each attempt by `config.timeout`.
///
/// Between attempts it sleeps a jittered `config.backoff`, or the provider's
/// `retry_after` hint (capped at `config.timeout`) after a rate limit.
///
/// Returns the error from the last attempt if all of them fail.
pub async fn complete_with_retry(
    llm: &dyn LlmProvider,
    request: &CompletionRequest,
    config: &RetryConfig,
) -> Result<CompletionResponse, LlmError> {
    let attempts = config.attempts.max(1);
    let mut last_error = None;

    for attempt in 1..=attempts {
        if let Some(previous) = &last_error {
            tokio::time::sleep(retry_delay(previous, config)).await;
        }

        let outcome = tokio::time::timeout(config.timeout, llm.complete(request.clone())).await;
        let error = match outcome {
            Ok(Ok(response)) => return Ok(response),
            Ok(Err(e)) => e,
            Err(_) => LlmError::Timeout {
                provider: llm.model_name().to_string(),
                timeout: config.timeout,
            },
        };

        warn!(
            model = llm.model_name(),
            attempt,
            attempts,
            error = %error,
            "Generation attempt failed"
        );
        last_error = Some(error);
    }

    Err(last_error.unwrap_or_else(|| LlmError::RequestFailed {
        provider: llm.model_name().to_string(),
        reason: "no attempts made".to_string(),
    }))
}

fn retry_delay(error: &LlmError, config: &RetryConfig) -> Duration {
    match error {
        LlmError::RateLimited {
            retry_after: Some(wait),
            ..
        } => (*wait).min(config.timeout),
        _ => jittered(config.backoff),
    }
}

fn jittered(base: Duration) -> Duration {
    let max_jitter = (base.as_millis() / 4) as u64;
    if max_jitter == 0 {
        return base;
    }
    base + Duration::from_millis(rand::thread_rng().gen_range(0..=max_jitter))
}
