//! Readiness scorer.
//!
//! Combines three signals into a [0, 1] readiness for the current phase:
//! - slot coverage: fraction of the phase's required slots filled in context
//! - input substance: how much concrete information the latest message adds
//! - explicit confirmation: the user says the phase is covered
//!
//! Readiness never drops within a phase; the orchestrator resets it to zero
//! only when the phase actually advances.

use std::sync::LazyLock;

use regex::Regex;

use crate::config::{FlowConfig, ScoringWeights};

use super::phase::Phase;
use super::slots::{Context, is_filled};

/// Word count at which the length component saturates.
const SATURATING_WORDS: f64 = 25.0;

/// Concrete-detail hits at which the detail component saturates.
const SATURATING_DETAILS: f64 = 3.0;

const LENGTH_SHARE: f64 = 0.4;
const DETAIL_SHARE: f64 = 0.4;
const CAUSAL_SHARE: f64 = 0.2;

static NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d+(?:[:.]\d+)?\b").expect("static regex"));

static WEEKDAY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:mon|tues|wednes|thurs|fri|satur|sun)days?\b").expect("static regex")
});

static MONTH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:january|february|march|april|june|july|august|september|october|november|december)\b",
    )
    .expect("static regex")
});

static RELATIVE_TIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:today|yesterday|tonight|tomorrow|(?:last|this|next|every) (?:week|weekend|month|night|morning|time|year))\b",
    )
    .expect("static regex")
});

static TIME_OF_DAY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:morning|afternoon|evening|noon|midnight|\d{1,2}\s?(?:am|pm))\b")
        .expect("static regex")
});

static COUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:once|twice|first|second|third|fourth|fifth|(?:one|two|three|four|five|six|seven|eight|nine|ten) (?:times|hours|minutes|days|weeks|months))\b",
    )
    .expect("static regex")
});

static PEOPLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:son|daughter|kids?|children|child|ex|co-?parent|husband|wife|partner|mom|dad|mother|father|teacher|grandma|grandpa|stepmom|stepdad)\b",
    )
    .expect("static regex")
});

/// Capitalized word following a lowercase letter, comma, or semicolon, i.e.
/// a likely proper name rather than a sentence start.
static PROPER_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[a-z,;]\s+([A-Z][a-z]+)").expect("static regex"));

static CAUSAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:because|since|so that|which means|that means|led to|leads to|caused|causes|as a result|resulting in|affect(?:s|ed|ing)?|impact(?:s|ed|ing)?|so i|so we|so now|therefore|that's why|which made|made me)\b",
    )
    .expect("static regex")
});

/// Per-signal view of one scoring call, for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreBreakdown {
    pub coverage: f64,
    pub substance: f64,
    pub confirmation: bool,
    /// Weighted sum of this turn's signals, before the monotonic floor.
    pub weighted: f64,
    /// Final readiness: `max(prior, weighted)`, clamped to [0, 1].
    pub readiness: f64,
}

pub struct ReadinessScorer {
    weights: ScoringWeights,
    confirmation_phrases: Vec<String>,
}

impl ReadinessScorer {
    pub fn new(config: &FlowConfig) -> Self {
        Self {
            weights: config.weights,
            confirmation_phrases: config
                .confirmation_phrases
                .iter()
                .map(|p| normalize(p))
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    /// Readiness for the current call.
    pub fn score(&self, phase: &Phase, context: &Context, input: &str, prior: f64) -> f64 {
        self.breakdown(phase, context, input, prior).readiness
    }

    pub fn breakdown(
        &self,
        phase: &Phase,
        context: &Context,
        input: &str,
        prior: f64,
    ) -> ScoreBreakdown {
        let coverage = slot_coverage(phase, context);
        let substance = input_substance(input);
        let confirmation = self.is_confirmation(input);

        let weighted = self.weights.slot_coverage * coverage
            + self.weights.substance * substance
            + if confirmation {
                self.weights.confirmation
            } else {
                0.0
            };

        let prior = if prior.is_finite() { prior } else { 0.0 };
        let readiness = prior.max(weighted).clamp(0.0, 1.0);

        ScoreBreakdown {
            coverage,
            substance,
            confirmation,
            weighted,
            readiness,
        }
    }

    /// Whether the user affirms that the phase is covered.
    pub fn is_confirmation(&self, input: &str) -> bool {
        let text = normalize(input);
        if text.is_empty() {
            return false;
        }
        self.confirmation_phrases
            .iter()
            .any(|phrase| text.contains(phrase.as_str()))
    }
}

/// Fraction of the phase's required slots that are filled. A phase with no
/// required slots counts as fully covered.
pub fn slot_coverage(phase: &Phase, context: &Context) -> f64 {
    if phase.required_slots.is_empty() {
        return 1.0;
    }
    let filled = phase
        .required_slots
        .iter()
        .filter(|key| is_filled(context, **key))
        .count();
    filled as f64 / phase.required_slots.len() as f64
}

/// Bounded [0, 1] measure of concrete information in `input`.
pub fn input_substance(input: &str) -> f64 {
    let words = input.split_whitespace().count();
    if words == 0 {
        return 0.0;
    }

    let length = (words as f64 / SATURATING_WORDS).min(1.0);
    let details = (detail_hits(input) as f64 / SATURATING_DETAILS).min(1.0);
    let causal = if CAUSAL.is_match(input) { 1.0 } else { 0.0 };

    (LENGTH_SHARE * length + DETAIL_SHARE * details + CAUSAL_SHARE * causal).clamp(0.0, 1.0)
}

fn detail_hits(input: &str) -> usize {
    let simple = [
        &*NUMBER,
        &*WEEKDAY,
        &*MONTH,
        &*RELATIVE_TIME,
        &*TIME_OF_DAY,
        &*COUNT,
        &*PEOPLE,
    ]
    .iter()
    .map(|re| re.find_iter(input).count())
    .sum::<usize>();

    let names = PROPER_NAME
        .captures_iter(input)
        .filter_map(|c| c.get(1))
        .filter(|m| !WEEKDAY.is_match(m.as_str()) && !MONTH.is_match(m.as_str()))
        .count();

    simple + names
}

fn normalize(text: &str) -> String {
    text.trim().to_lowercase().replace(['\u{2019}', '\u{2018}'], "'")
}
