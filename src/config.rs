//! Configuration types.
//!
//! Everything here has a `Default` matching the documented protocol and a
//! `from_env()` reader that falls back to the default for any variable that is
//! unset or fails to parse.

use std::time::Duration;

use crate::error::ConfigError;

/// Weights for the three readiness signals. Must sum to 1.0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringWeights {
    pub slot_coverage: f64,
    pub substance: f64,
    pub confirmation: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            slot_coverage: 0.5,
            substance: 0.3,
            confirmation: 0.2,
        }
    }
}

impl ScoringWeights {
    pub fn sum(&self) -> f64 {
        self.slot_coverage + self.substance + self.confirmation
    }
}

/// Retry behaviour for calls to the text-generation provider.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts per generation call, including the first.
    pub attempts: u32,
    /// Per-attempt timeout.
    pub timeout: Duration,
    /// Base delay before a retry. Up to 25% jitter is added.
    pub backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: 2,
            timeout: Duration::from_secs(30),
            backoff: Duration::from_millis(750),
        }
    }
}

/// Tunables for scoring, advancement, and generation.
#[derive(Debug, Clone)]
pub struct FlowConfig {
    pub weights: ScoringWeights,
    /// Readiness needed for a non-forced advance.
    pub advance_threshold: f64,
    /// Stayed turns required before a threshold advance without explicit
    /// confirmation.
    pub min_turns_before_advance: u32,
    /// Phrases that count as the user affirming the phase is covered.
    /// Matched case-insensitively as substrings.
    pub confirmation_phrases: Vec<String>,
    /// How many recent history turns are sent to the generator.
    pub history_window: usize,
    pub temperature: f32,
    pub max_tokens: u32,
    pub retry: RetryConfig,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            weights: ScoringWeights::default(),
            advance_threshold: 0.7,
            min_turns_before_advance: 1,
            confirmation_phrases: [
                "that's everything",
                "that's all",
                "that is all",
                "that's it",
                "that's the whole",
                "that is the whole",
                "nothing else",
                "nothing more to add",
                "that covers it",
                "yes, that's right",
                "yes that's right",
                "that sums it up",
                "ready to move on",
                "let's move on",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            history_window: 20,
            temperature: 0.7,
            max_tokens: 600,
            retry: RetryConfig::default(),
        }
    }
}

impl FlowConfig {
    /// Read overrides from `REFLECT_*` environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let weights = ScoringWeights {
            slot_coverage: env_parse("REFLECT_WEIGHT_COVERAGE", defaults.weights.slot_coverage),
            substance: env_parse("REFLECT_WEIGHT_SUBSTANCE", defaults.weights.substance),
            confirmation: env_parse(
                "REFLECT_WEIGHT_CONFIRMATION",
                defaults.weights.confirmation,
            ),
        };

        let confirmation_phrases = std::env::var("REFLECT_CONFIRMATION_PHRASES")
            .ok()
            .map(|raw| {
                raw.split('|')
                    .map(|s| s.trim().to_lowercase())
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|phrases| !phrases.is_empty())
            .unwrap_or(defaults.confirmation_phrases);

        Self {
            weights,
            advance_threshold: env_parse("REFLECT_ADVANCE_THRESHOLD", defaults.advance_threshold),
            min_turns_before_advance: env_parse(
                "REFLECT_MIN_TURNS_BEFORE_ADVANCE",
                defaults.min_turns_before_advance,
            ),
            confirmation_phrases,
            history_window: env_parse("REFLECT_HISTORY_WINDOW", defaults.history_window),
            temperature: env_parse("REFLECT_TEMPERATURE", defaults.temperature),
            max_tokens: env_parse("REFLECT_MAX_TOKENS", defaults.max_tokens),
            retry: RetryConfig {
                attempts: env_parse("REFLECT_LLM_ATTEMPTS", defaults.retry.attempts),
                timeout: Duration::from_secs(env_parse(
                    "REFLECT_LLM_TIMEOUT_SECS",
                    defaults.retry.timeout.as_secs(),
                )),
                backoff: Duration::from_millis(env_parse(
                    "REFLECT_LLM_BACKOFF_MS",
                    defaults.retry.backoff.as_millis() as u64,
                )),
            },
        }
    }

    /// Reject configurations the scorer and policy cannot honour.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let w = &self.weights;
        if [w.slot_coverage, w.substance, w.confirmation]
            .iter()
            .any(|v| !v.is_finite() || *v < 0.0)
        {
            return Err(ConfigError::InvalidValue {
                key: "weights".into(),
                message: "weights must be finite and non-negative".into(),
            });
        }
        if (w.sum() - 1.0).abs() > 1e-6 {
            return Err(ConfigError::InvalidValue {
                key: "weights".into(),
                message: format!("weights must sum to 1.0, got {}", w.sum()),
            });
        }
        if !(self.advance_threshold > 0.0 && self.advance_threshold <= 1.0) {
            return Err(ConfigError::InvalidValue {
                key: "advance_threshold".into(),
                message: format!("must be in (0, 1], got {}", self.advance_threshold),
            });
        }
        if self.retry.attempts == 0 {
            return Err(ConfigError::InvalidValue {
                key: "retry.attempts".into(),
                message: "at least one attempt is required".into(),
            });
        }
        Ok(())
    }
}

/// HTTP server settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub model: String,
    /// Directory for daily-rolling log files. Stderr only when unset.
    pub log_dir: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            model: "claude-sonnet-4-20250514".to_string(),
            log_dir: None,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            port: env_parse("REFLECT_PORT", defaults.port),
            model: std::env::var("REFLECT_MODEL").unwrap_or(defaults.model),
            log_dir: std::env::var("REFLECT_LOG_DIR")
                .ok()
                .filter(|s| !s.trim().is_empty()),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = FlowConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.advance_threshold, 0.7);
        assert_eq!(config.min_turns_before_advance, 1);
        assert!((config.weights.sum() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn weights_must_sum_to_one() {
        let config = FlowConfig {
            weights: ScoringWeights {
                slot_coverage: 0.5,
                substance: 0.5,
                confirmation: 0.2,
            },
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("sum to 1.0"));
    }

    #[test]
    fn negative_weight_rejected() {
        let config = FlowConfig {
            weights: ScoringWeights {
                slot_coverage: 1.2,
                substance: -0.2,
                confirmation: 0.0,
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn threshold_out_of_range_rejected() {
        for threshold in [0.0, 1.5, f64::NAN] {
            let config = FlowConfig {
                advance_threshold: threshold,
                ..Default::default()
            };
            assert!(config.validate().is_err(), "threshold {threshold} accepted");
        }
    }

    #[test]
    fn zero_attempts_rejected() {
        let mut config = FlowConfig::default();
        config.retry.attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn env_parse_falls_back_on_garbage() {
        assert_eq!(env_parse("REFLECT_TEST_UNSET_VARIABLE_XYZ", 42u32), 42);
    }
}
