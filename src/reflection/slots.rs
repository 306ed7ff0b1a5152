//! Slot keys, the accumulated context map, and the boundary that turns the
//! generator's untyped extraction payload into typed slot values.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// A named piece of information some phase is trying to elicit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotKey {
    SituationDescription,
    PartiesInvolved,
    SurfaceFeelings,
    UnderlyingFeelings,
    UnderlyingNeed,
    CoreValues,
    CoparentPerspective,
    CoparentNeed,
    ChildPerspective,
    ChildImpact,
    PossibleResponses,
    ChosenResponse,
    NextStep,
}

impl SlotKey {
    pub const ALL: [SlotKey; 13] = [
        Self::SituationDescription,
        Self::PartiesInvolved,
        Self::SurfaceFeelings,
        Self::UnderlyingFeelings,
        Self::UnderlyingNeed,
        Self::CoreValues,
        Self::CoparentPerspective,
        Self::CoparentNeed,
        Self::ChildPerspective,
        Self::ChildImpact,
        Self::PossibleResponses,
        Self::ChosenResponse,
        Self::NextStep,
    ];

    /// Wire name, identical to the serde representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SituationDescription => "situation_description",
            Self::PartiesInvolved => "parties_involved",
            Self::SurfaceFeelings => "surface_feelings",
            Self::UnderlyingFeelings => "underlying_feelings",
            Self::UnderlyingNeed => "underlying_need",
            Self::CoreValues => "core_values",
            Self::CoparentPerspective => "coparent_perspective",
            Self::CoparentNeed => "coparent_need",
            Self::ChildPerspective => "child_perspective",
            Self::ChildImpact => "child_impact",
            Self::PossibleResponses => "possible_responses",
            Self::ChosenResponse => "chosen_response",
            Self::NextStep => "next_step",
        }
    }

    /// Human-readable name for summaries and prompts.
    pub fn label(self) -> &'static str {
        match self {
            Self::SituationDescription => "what happened",
            Self::PartiesInvolved => "who was involved",
            Self::SurfaceFeelings => "how it felt in the moment",
            Self::UnderlyingFeelings => "the deeper feeling",
            Self::UnderlyingNeed => "the underlying need",
            Self::CoreValues => "the values at stake",
            Self::CoparentPerspective => "the co-parent's view",
            Self::CoparentNeed => "what the co-parent may need",
            Self::ChildPerspective => "the child's experience",
            Self::ChildImpact => "the impact on the child",
            Self::PossibleResponses => "possible responses",
            Self::ChosenResponse => "the chosen response",
            Self::NextStep => "the first step",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == key)
    }
}

impl std::fmt::Display for SlotKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accumulated slot values. Keys are only ever added or overwritten.
pub type Context = BTreeMap<SlotKey, String>;

/// Shallow per-key overwrite of `existing` with `extracted`.
///
/// Keys absent from `extracted` are kept untouched, so merging the same
/// payload twice yields the same context as merging it once.
pub fn merge_context(existing: &Context, extracted: &Context) -> Context {
    let mut merged = existing.clone();
    for (key, value) in extracted {
        merged.insert(*key, value.clone());
    }
    merged
}

/// Whether `key` holds a non-empty value.
pub fn is_filled(context: &Context, key: SlotKey) -> bool {
    context.get(&key).is_some_and(|v| !v.trim().is_empty())
}

/// Validate an untyped extraction payload into typed slot values.
///
/// Unknown keys are dropped. Strings are trimmed, numbers and booleans are
/// rendered as text, arrays of scalars are joined with ", ". Nulls, empty
/// values, and nested objects leave the slot unset. A payload that is not a
/// JSON object yields nothing. Never fails.
pub fn extract_slots(payload: &serde_json::Value) -> Context {
    let mut slots = Context::new();
    let Some(object) = payload.as_object() else {
        if !payload.is_null() {
            debug!(kind = json_kind(payload), "Ignoring non-object extraction payload");
        }
        return slots;
    };

    for (raw_key, value) in object {
        let Some(key) = SlotKey::from_key(raw_key.trim()) else {
            debug!(key = %raw_key, "Dropping unknown extraction key");
            continue;
        };
        if let Some(text) = coerce(value) {
            slots.insert(key, text);
        }
    }
    slots
}

/// Keep only the slots listed in `owned`. Values captured by other phases
/// can't be rewritten through a later phase's extraction.
pub fn scope_to_phase(mut slots: Context, owned: &[SlotKey]) -> Context {
    slots.retain(|key, _| {
        let keep = owned.contains(key);
        if !keep {
            debug!(key = %key, "Dropping extraction for a slot outside the current phase");
        }
        keep
    });
    slots
}

fn coerce(value: &serde_json::Value) -> Option<String> {
    use serde_json::Value;

    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(true) => "yes".to_string(),
        Value::Bool(false) => "no".to_string(),
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::Array(_) | Value::Object(_) => None,
                other => coerce(other),
            })
            .collect::<Vec<_>>()
            .join(", "),
        Value::Null | Value::Object(_) => return None,
    };

    if text.is_empty() || is_placeholder(&text) {
        None
    } else {
        Some(text)
    }
}

/// Models sometimes spell out "null" instead of emitting JSON null.
fn is_placeholder(text: &str) -> bool {
    matches!(
        text.to_ascii_lowercase().as_str(),
        "null" | "none" | "n/a" | "unknown"
    )
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
