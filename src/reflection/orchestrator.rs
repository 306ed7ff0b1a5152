//! Turn orchestrator: the per-request entry point.
//!
//! `process_turn` is a pure function of `(input, flow_state)` apart from the
//! generator calls it awaits (at most two: the base reply, and a re-scoped
//! reply on an advance edge). It never stores anything; the caller persists
//! the returned `flow_state`.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::FlowConfig;
use crate::error::{FlowError, LlmError};
use crate::llm::{
    CompletionRequest, FinishReason, LlmConfig, LlmProvider, complete_with_retry, create_provider,
    estimate_cost,
};

use super::phase::{Phase, PhaseCatalog, PhaseId};
use super::policy::{AdvancementPolicy, Transition};
use super::prompts::{
    build_messages, closing_system_prompt, ensure_phase_tag, parse_generation,
    phase_system_prompt, transition_system_prompt,
};
use super::scorer::ReadinessScorer;
use super::slots::{Context, extract_slots, merge_context, scope_to_phase};
use super::state::{FlowState, PhaseOutcome, Turn};
use super::summary::summarize;

/// Shown (after the phase tag) when the generator cannot be reached.
pub const FALLBACK_MESSAGE: &str =
    "I'm having trouble responding right now. Your progress is saved, so please send your \
     message again in a moment.";

/// Output envelope of one turn.
#[derive(Debug, Clone, Serialize)]
pub struct TurnResult {
    /// Reply text, always opening with `[Phase <id>: <name>]` for `current_phase`.
    pub content: String,
    /// Readiness computed on this turn. On an advancing turn this is the score
    /// that triggered the advance; `flow_state.readiness` is already reset.
    pub readiness: f64,
    pub original_phase: PhaseId,
    pub current_phase: PhaseId,
    pub phase_advanced: bool,
    pub forced: bool,
    pub session_complete: bool,
    pub summary: String,
    pub flow_state: FlowState,
    /// Set only on the generation-failure fallback.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct TurnOrchestrator {
    llm: Arc<dyn LlmProvider>,
    catalog: PhaseCatalog,
    scorer: ReadinessScorer,
    policy: AdvancementPolicy,
    config: FlowConfig,
}

impl TurnOrchestrator {
    pub fn new(llm: Arc<dyn LlmProvider>, catalog: PhaseCatalog, config: FlowConfig) -> Self {
        Self {
            scorer: ReadinessScorer::new(&config),
            policy: AdvancementPolicy::new(&config),
            llm,
            catalog,
            config,
        }
    }

    /// Build an orchestrator from configuration: validates the flow settings
    /// and creates the configured provider.
    pub fn from_config(
        llm: &LlmConfig,
        catalog: PhaseCatalog,
        config: FlowConfig,
    ) -> crate::error::Result<Self> {
        config.validate()?;
        let provider = create_provider(llm)?;
        Ok(Self::new(provider, catalog, config))
    }

    pub fn catalog(&self) -> &PhaseCatalog {
        &self.catalog
    }

    /// Run one user turn against `flow_state`.
    ///
    /// Errors only for caller-supplied state the engine refuses to guess at.
    /// Generator failures produce a fallback `TurnResult` carrying the
    /// untouched input state.
    pub async fn process_turn(
        &self,
        user_input: &str,
        flow_state: &FlowState,
    ) -> Result<TurnResult, FlowError> {
        flow_state.validate(&self.catalog)?;

        let original_phase = flow_state.current_phase;
        let phase = self.phase(original_phase)?;
        let input = user_input.trim();
        let history = flow_state.recent_history(self.config.history_window);

        let base = match self
            .generate(phase_system_prompt(phase, &flow_state.context), history, input)
            .await
        {
            Ok(text) => parse_generation(&text),
            Err(e) => return Ok(self.fallback(phase, flow_state, &e)),
        };

        // An empty message carries nothing to extract; anything the generator
        // claims to have captured from it is ignored.
        let extracted = match base.extracted.as_ref() {
            Some(payload) if !input.is_empty() => {
                scope_to_phase(extract_slots(payload), &phase.required_slots)
            }
            Some(_) => {
                debug!(phase = %original_phase, "Ignoring extraction for empty input");
                Context::new()
            }
            None => {
                debug!(phase = %original_phase, "No slot extraction this turn");
                Context::new()
            }
        };
        let context = merge_context(&flow_state.context, &extracted);

        let score = self
            .scorer
            .breakdown(phase, &context, input, flow_state.readiness);
        let decision = self.policy.decide(
            phase,
            flow_state.turns_in_phase,
            score.readiness,
            score.confirmation,
        );
        let transition = AdvancementPolicy::transition(&self.catalog, phase, decision);

        debug!(
            phase = %original_phase,
            coverage = score.coverage,
            substance = score.substance,
            confirmation = score.confirmation,
            weighted = score.weighted,
            readiness = score.readiness,
            turns_in_phase = flow_state.turns_in_phase,
            ?transition,
            "Scored turn"
        );

        let mut next = flow_state.clone();
        next.context = context;

        let (reply, reply_phase, summary) = match transition {
            Transition::Stay => {
                next.readiness = score.readiness;
                next.turns_in_phase += 1;
                let summary = summarize(phase, &next.context, false);
                (base.reply, phase, summary)
            }
            Transition::Advance { to, forced } => {
                let next_phase = self.phase(to)?;
                let prompt = transition_system_prompt(phase, next_phase, &next.context, forced);
                let text = match self.generate(prompt, history, input).await {
                    Ok(text) => text,
                    Err(e) => return Ok(self.fallback(phase, flow_state, &e)),
                };

                let summary = leave_phase(&mut next, phase, forced);
                next.current_phase = to;
                next.readiness = 0.0;
                next.turns_in_phase = 0;
                (parse_generation(&text).reply, next_phase, summary)
            }
            Transition::Complete { forced } => {
                let prompt = closing_system_prompt(phase, &next.context);
                let text = match self.generate(prompt, history, input).await {
                    Ok(text) => text,
                    Err(e) => return Ok(self.fallback(phase, flow_state, &e)),
                };

                let summary = leave_phase(&mut next, phase, forced);
                next.readiness = score.readiness;
                next.completed = true;
                (parse_generation(&text).reply, phase, summary)
            }
        };

        let content = ensure_phase_tag(&reply, reply_phase);
        if !reply.starts_with(&reply_phase.tag()) {
            warn!(
                expected = %reply_phase.tag(),
                "Generator reply missing or mismatching phase tag, repaired"
            );
        }

        next.conversation_history
            .push(Turn::user(input, original_phase));
        next.conversation_history
            .push(Turn::assistant(&content, next.current_phase));
        next.last_prompt = input.to_string();
        next.last_response = content.clone();

        let phase_advanced = matches!(transition, Transition::Advance { .. });
        let session_complete = matches!(transition, Transition::Complete { .. });
        let forced = matches!(
            transition,
            Transition::Advance { forced: true, .. } | Transition::Complete { forced: true }
        );

        info!(
            original_phase = %original_phase,
            current_phase = %next.current_phase,
            readiness = score.readiness,
            phase_advanced,
            forced,
            session_complete,
            slots_extracted = extracted.len(),
            "Turn processed"
        );

        Ok(TurnResult {
            content,
            readiness: score.readiness,
            original_phase,
            current_phase: next.current_phase,
            phase_advanced,
            forced,
            session_complete,
            summary,
            flow_state: next,
            error: None,
        })
    }

    fn phase(&self, id: PhaseId) -> Result<&Phase, FlowError> {
        self.catalog
            .get_phase(id)
            .ok_or(FlowError::PhaseOutOfRange {
                phase: id.get(),
                max: self.catalog.len() as u8,
            })
    }

    async fn generate(
        &self,
        system_prompt: String,
        history: &[Turn],
        input: &str,
    ) -> Result<String, LlmError> {
        let request = CompletionRequest::new(build_messages(system_prompt, history, input))
            .with_temperature(self.config.temperature)
            .with_max_tokens(self.config.max_tokens);

        let response = complete_with_retry(self.llm.as_ref(), &request, &self.config.retry).await?;

        if response.finish_reason == FinishReason::Length {
            warn!(
                max_tokens = self.config.max_tokens,
                response_id = response.response_id.as_deref().unwrap_or("-"),
                "Generation hit the token limit, reply may be cut short"
            );
        }
        debug!(
            model = self.llm.model_name(),
            response_id = response.response_id.as_deref().unwrap_or("-"),
            input_tokens = response.input_tokens,
            output_tokens = response.output_tokens,
            cost_usd = %estimate_cost(self.llm.as_ref(), &response),
            "Generation complete"
        );
        Ok(response.content)
    }

    fn fallback(&self, phase: &Phase, flow_state: &FlowState, error: &LlmError) -> TurnResult {
        warn!(
            phase = %phase.id,
            error = %error,
            "Generation failed after retry, returning fallback"
        );
        TurnResult {
            content: ensure_phase_tag(FALLBACK_MESSAGE, phase),
            readiness: flow_state.readiness,
            original_phase: phase.id,
            current_phase: phase.id,
            phase_advanced: false,
            forced: false,
            session_complete: false,
            summary: summarize(phase, &flow_state.context, false),
            flow_state: flow_state.clone(),
            error: Some(error.to_string()),
        }
    }
}

/// Record how `phase` was left and return its summary.
fn leave_phase(state: &mut FlowState, phase: &Phase, forced: bool) -> String {
    let summary = summarize(phase, &state.context, forced);
    state.phase_outcomes.push(PhaseOutcome {
        phase: phase.id,
        forced,
        summary: summary.clone(),
    });
    summary
}
