//! Phase framing for the text generator, and parsing of what comes back.
//!
//! The generator is asked to open every reply with the canonical phase tag
//! and to append one `[EXTRACTED: {...}]` marker carrying slot values pulled
//! from the user's latest message. Neither is trusted: the tag is repaired by
//! [`ensure_phase_tag`] and the marker is optional.

use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

use crate::llm::ChatMessage;

use super::phase::{Phase, PhaseId};
use super::slots::Context;
use super::state::{Turn, TurnRole};

/// Control marker for structured extraction. Stripped before display.
pub const EXTRACTED_MARKER: &str = "[EXTRACTED:";

/// A leading phase tag, correct or not, optionally opened with markdown
/// emphasis. The matching close is stripped separately.
static LEADING_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(\*{1,2})?\s*\[\s*phase\s+(\d+)\s*:\s*([^\]]*)\]").expect("static regex")
});

const BASE_PROMPT: &str = "\
You are a calm, warm reflection guide helping a parent think through a difficult \
co-parenting moment. You walk them through a fixed seven-step reflection, one step at a time.

Guidelines:
- Be concise: 2-4 sentences. Ask ONE question at a time.
- Reflect back what the parent said before asking anything new.
- Stay with the current step. Do not jump ahead or give advice the step doesn't call for.
- Never take sides against the other parent and never diagnose anyone.";

/// System prompt for a normal turn in `phase`.
pub fn phase_system_prompt(phase: &Phase, context: &Context) -> String {
    format!(
        "{BASE_PROMPT}\n\n{step}\n\n{learned}{format}",
        step = step_section(phase),
        learned = learned_section(context),
        format = format_section(phase, true),
    )
}

/// System prompt for the reply on an advance edge: acknowledge the step just
/// finished and open the next one.
pub fn transition_system_prompt(
    previous: &Phase,
    next: &Phase,
    context: &Context,
    forced: bool,
) -> String {
    let handoff = if forced {
        format!(
            "The parent has spent several turns on \"{}\" without fully resolving it. \
             Gently note that it is fine to come back to it later, then move on.",
            previous.name
        )
    } else {
        format!(
            "The parent has just completed \"{}\". Briefly acknowledge what they shared \
             in one sentence, then move on.",
            previous.name
        )
    };

    format!(
        "{BASE_PROMPT}\n\n{handoff}\n\n{step}\n\nOpen this step with a single question.\n\n\
         {learned}{format}",
        step = step_section(next),
        learned = learned_section(context),
        format = format_section(next, false),
    )
}

/// System prompt for the final reply once the terminal phase is finished.
pub fn closing_system_prompt(phase: &Phase, context: &Context) -> String {
    format!(
        "{BASE_PROMPT}\n\nThe parent has finished the last step, \"{name}\". Reflect back the \
         response they chose and their first step, thank them, and close the conversation. \
         Do not ask a new question.\n\n{learned}{format}",
        name = phase.name,
        learned = learned_section(context),
        format = format_section(phase, false),
    )
}

fn step_section(phase: &Phase) -> String {
    let slots = phase
        .required_slots
        .iter()
        .map(|k| format!("- {} ({})", k.as_str(), k.label()))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "CURRENT STEP: {tag}\nGoal: {goal}\nInformation this step needs:\n{slots}",
        tag = phase.tag(),
        goal = phase.goal,
    )
}

fn learned_section(context: &Context) -> String {
    if context.is_empty() {
        return String::new();
    }
    let lines = context
        .iter()
        .map(|(k, v)| format!("- {}: {}", k.label(), v))
        .collect::<Vec<_>>()
        .join("\n");
    format!("What the parent has shared so far:\n{lines}\n\n")
}

fn format_section(phase: &Phase, with_extraction: bool) -> String {
    let mut out = format!(
        "FORMAT:\n- Begin your reply with exactly {tag} followed by a space.",
        tag = phase.tag()
    );
    if with_extraction {
        let keys = phase
            .required_slots
            .iter()
            .map(|k| format!("\"{}\"", k.as_str()))
            .collect::<Vec<_>>()
            .join(", ");
        out.push_str(&format!(
            "\n- After your reply, on its own final line, write {EXTRACTED_MARKER} {{...}}] \
             with a single-line JSON object. Use only these keys: {keys}. Fill a key only \
             with what the parent actually said in their latest message, in a short phrase. \
             Use null for anything they did not say. The parent will NOT see this line."
        ));
    }
    out
}

/// Chat messages for a generation call: system framing, the recent history
/// window, then the new user input.
pub fn build_messages(system_prompt: String, history: &[Turn], input: &str) -> Vec<ChatMessage> {
    let mut messages = vec![ChatMessage::system(system_prompt)];

    // Providers expect the conversation to open with a user message.
    let first_user = history
        .iter()
        .position(|t| t.role == TurnRole::User)
        .unwrap_or(history.len());

    messages.extend(history[first_user..].iter().map(|turn| match turn.role {
        TurnRole::User => ChatMessage::user(&turn.text),
        TurnRole::Assistant => ChatMessage::assistant(&turn.text),
    }));
    if input.is_empty() {
        messages.push(ChatMessage::user("(the parent sent an empty message)"));
    } else {
        messages.push(ChatMessage::user(input));
    }
    messages
}

/// A generator reply split into display text and the extraction payload.
#[derive(Debug, Clone)]
pub struct ParsedGeneration {
    pub reply: String,
    /// `None` when the marker is absent or its JSON is malformed.
    pub extracted: Option<serde_json::Value>,
}

/// Split the extraction marker off a generator reply.
pub fn parse_generation(response: &str) -> ParsedGeneration {
    let Some(start) = response.rfind(EXTRACTED_MARKER) else {
        return ParsedGeneration {
            reply: response.trim().to_string(),
            extracted: None,
        };
    };

    let after = &response[start + EXTRACTED_MARKER.len()..];
    let mut values = serde_json::Deserializer::from_str(after).into_iter::<serde_json::Value>();
    let (extracted, consumed) = match values.next() {
        Some(Ok(value)) => {
            // Consume the payload and its closing bracket, nothing further.
            let tail = after[values.byte_offset()..].trim_start();
            let tail = tail.strip_prefix(']').unwrap_or(tail);
            (Some(value), after.len() - tail.len())
        }
        outcome => {
            // Without a parseable payload the marker runs to the end of its line.
            let consumed = after.find('\n').unwrap_or(after.len());
            if let Some(Err(e)) = outcome {
                warn!(
                    error = %e,
                    payload = after[..consumed].trim(),
                    "Malformed extraction payload"
                );
            }
            (None, consumed)
        }
    };

    let reply = format!("{}{}", &response[..start], &after[consumed..])
        .trim()
        .to_string();

    ParsedGeneration { reply, extracted }
}

/// Guarantee `reply` opens with `phase`'s canonical tag.
///
/// A leading tag that is wrong (or right but oddly formatted) is replaced; a
/// missing tag is prepended.
pub fn ensure_phase_tag(reply: &str, phase: &Phase) -> String {
    let tag = phase.tag();
    let body = match LEADING_TAG.captures(reply) {
        Some(caps) => {
            let rest = &reply[caps.get(0).map_or(0, |m| m.end())..];
            match caps.get(1) {
                Some(open) => rest
                    .trim_start()
                    .strip_prefix(open.as_str())
                    .unwrap_or(rest),
                None => rest,
            }
        }
        None => reply,
    };
    let body = body.trim();
    if body.is_empty() {
        tag
    } else {
        format!("{tag} {body}")
    }
}

/// Read the phase tag at the start of `content`, as a progress display would.
pub fn parse_phase_tag(content: &str) -> Option<(PhaseId, String)> {
    let caps = LEADING_TAG.captures(content)?;
    let id = caps.get(2)?.as_str().parse::<u8>().ok()?;
    let name = caps.get(3)?.as_str().trim().to_string();
    Some((PhaseId(id), name))
}
