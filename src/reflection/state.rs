//! Flow state: the serializable accumulator passed in and returned on every
//! turn. The engine never holds one between calls.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::FlowError;

use super::phase::{PhaseCatalog, PhaseId};
use super::slots::Context;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    User,
    Assistant,
}

/// One message in the conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Turn {
    pub role: TurnRole,
    pub text: String,
    pub phase_at_time: PhaseId,
    #[serde(default = "Utc::now")]
    pub at: DateTime<Utc>,
}

impl Turn {
    pub fn user(text: impl Into<String>, phase: PhaseId) -> Self {
        Self {
            role: TurnRole::User,
            text: text.into(),
            phase_at_time: phase,
            at: Utc::now(),
        }
    }

    pub fn assistant(text: impl Into<String>, phase: PhaseId) -> Self {
        Self {
            role: TurnRole::Assistant,
            text: text.into(),
            phase_at_time: phase,
            at: Utc::now(),
        }
    }
}

/// Record of how a phase was left.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseOutcome {
    pub phase: PhaseId,
    /// True when the follow-up cap, not readiness, moved the session on.
    pub forced: bool,
    pub summary: String,
}

/// Conversation state carried between turns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowState {
    pub readiness: f64,
    #[serde(default)]
    pub context: Context,
    #[serde(default)]
    pub last_prompt: String,
    #[serde(default)]
    pub last_response: String,
    #[serde(default)]
    pub conversation_history: Vec<Turn>,
    pub current_phase: PhaseId,
    #[serde(default)]
    pub turns_in_phase: u32,
    /// Set once the terminal phase has been advanced past.
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub phase_outcomes: Vec<PhaseOutcome>,
}

impl Default for FlowState {
    fn default() -> Self {
        Self {
            readiness: 0.0,
            context: Context::new(),
            last_prompt: String::new(),
            last_response: String::new(),
            conversation_history: Vec::new(),
            current_phase: PhaseId::FIRST,
            turns_in_phase: 0,
            completed: false,
            phase_outcomes: Vec::new(),
        }
    }
}

impl FlowState {
    /// Empty state at the start of a session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject caller-supplied state the engine cannot safely continue from.
    pub fn validate(&self, catalog: &PhaseCatalog) -> Result<(), FlowError> {
        if !catalog.contains(self.current_phase) {
            return Err(FlowError::PhaseOutOfRange {
                phase: self.current_phase.get(),
                max: catalog.len() as u8,
            });
        }
        if !self.readiness.is_finite() || !(0.0..=1.0).contains(&self.readiness) {
            return Err(FlowError::InvalidReadiness(self.readiness));
        }
        if self.completed {
            return Err(FlowError::SessionComplete);
        }
        if let Some(turn) = self
            .conversation_history
            .iter()
            .find(|t| !catalog.contains(t.phase_at_time))
        {
            return Err(FlowError::MalformedState(format!(
                "history turn references unknown phase {}",
                turn.phase_at_time
            )));
        }
        if let Some(outcome) = self
            .phase_outcomes
            .iter()
            .find(|o| o.phase >= self.current_phase)
        {
            return Err(FlowError::MalformedState(format!(
                "outcome recorded for phase {} but session is at phase {}",
                outcome.phase, self.current_phase
            )));
        }
        Ok(())
    }

    /// The most recent `window` turns.
    pub fn recent_history(&self, window: usize) -> &[Turn] {
        let start = self.conversation_history.len().saturating_sub(window);
        &self.conversation_history[start..]
    }
}
