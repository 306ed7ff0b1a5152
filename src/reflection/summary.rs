//! Summary synthesizer: a short, template-driven synopsis of what a phase
//! captured. Only ever echoes values already present in the context.

use super::phase::Phase;
use super::slots::{Context, is_filled};

/// Suffix marking a phase left because of the follow-up cap.
pub const FORCED_NOTE: &str = "[moved on after follow-up limit]";

pub fn summarize(phase: &Phase, context: &Context, forced: bool) -> String {
    let captured: Vec<&str> = phase
        .required_slots
        .iter()
        .filter(|key| is_filled(context, **key))
        .filter_map(|key| context.get(key))
        .map(|value| value.trim())
        .collect();

    let missing: Vec<&str> = phase
        .required_slots
        .iter()
        .filter(|key| !is_filled(context, **key))
        .map(|key| key.label())
        .collect();

    let mut summary = if captured.is_empty() {
        format!("{}: nothing captured yet", phase.summary_label)
    } else {
        format!("{}: {}", phase.summary_label, captured.join("; "))
    };

    if !missing.is_empty() {
        summary.push_str(&format!(" (incomplete: still missing {})", missing.join(", ")));
    }
    if forced {
        summary.push(' ');
        summary.push_str(FORCED_NOTE);
    }
    summary
}
