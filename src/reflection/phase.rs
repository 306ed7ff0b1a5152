//! Phase catalog: the ordered, immutable definition of the reflection protocol.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

use super::slots::SlotKey;

/// One-based position of a phase in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhaseId(pub u8);

impl PhaseId {
    pub const FIRST: PhaseId = PhaseId(1);

    pub fn get(self) -> u8 {
        self.0
    }
}

impl Default for PhaseId {
    fn default() -> Self {
        Self::FIRST
    }
}

impl std::fmt::Display for PhaseId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single stage of the protocol and the information it must elicit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Phase {
    pub id: PhaseId,
    pub name: String,
    /// What the assistant is trying to help the user see in this phase.
    pub goal: String,
    /// Lead-in for the summary line, e.g. "Identified".
    pub summary_label: String,
    pub required_slots: Vec<SlotKey>,
    /// Stayed turns after which the phase is force-advanced.
    pub max_followups: u32,
}

impl Phase {
    /// Canonical tag that must open every reply produced in this phase.
    pub fn tag(&self) -> String {
        format!("[Phase {}: {}]", self.id, self.name)
    }
}

/// Ordered phase sequence. Always proceeds id → id + 1; no branching.
#[derive(Debug, Clone, Serialize)]
pub struct PhaseCatalog {
    phases: Vec<Phase>,
}

impl PhaseCatalog {
    /// The seven-phase co-parenting reflection protocol.
    pub fn standard() -> Self {
        use SlotKey::*;

        let phase = |id: u8,
                     name: &str,
                     goal: &str,
                     label: &str,
                     slots: &[SlotKey],
                     max_followups: u32| Phase {
            id: PhaseId(id),
            name: name.to_string(),
            goal: goal.to_string(),
            summary_label: label.to_string(),
            required_slots: slots.to_vec(),
            max_followups,
        };

        Self {
            phases: vec![
                phase(
                    1,
                    "Name It",
                    "Help the user describe the specific situation in concrete terms: what \
                     happened, when, and who was involved.",
                    "Identified",
                    &[SituationDescription, PartiesInvolved],
                    4,
                ),
                phase(
                    2,
                    "Beneath",
                    "Help the user name what they felt in the moment and what deeper feeling \
                     sits underneath it.",
                    "Feelings",
                    &[SurfaceFeelings, UnderlyingFeelings],
                    3,
                ),
                phase(
                    3,
                    "Why",
                    "Help the user identify the need or value that this situation touches.",
                    "Need",
                    &[UnderlyingNeed, CoreValues],
                    3,
                ),
                phase(
                    4,
                    "Co-Parent",
                    "Invite the user to consider how the other parent may see the situation \
                     and what they might need.",
                    "Co-parent view",
                    &[CoparentPerspective, CoparentNeed],
                    3,
                ),
                phase(
                    5,
                    "Child",
                    "Turn attention to the children: how they experience this and how it \
                     affects them.",
                    "Child's view",
                    &[ChildPerspective, ChildImpact],
                    3,
                ),
                phase(
                    6,
                    "Options",
                    "Brainstorm several possible responses without judging them yet.",
                    "Options",
                    &[PossibleResponses],
                    3,
                ),
                phase(
                    7,
                    "Choose",
                    "Help the user pick one response and a concrete first step.",
                    "Chosen",
                    &[ChosenResponse, NextStep],
                    3,
                ),
            ],
        }
    }

    /// Build a custom catalog. Ids must run 1, 2, … with no gaps.
    pub fn from_phases(phases: Vec<Phase>) -> Result<Self, ConfigError> {
        if phases.is_empty() {
            return Err(ConfigError::InvalidCatalog("catalog has no phases".into()));
        }
        if phases.len() > u8::MAX as usize {
            return Err(ConfigError::InvalidCatalog(format!(
                "catalog has {} phases, at most {} supported",
                phases.len(),
                u8::MAX
            )));
        }
        for (index, phase) in phases.iter().enumerate() {
            let expected = index + 1;
            if phase.id.0 as usize != expected {
                return Err(ConfigError::InvalidCatalog(format!(
                    "phase at position {expected} has id {}",
                    phase.id
                )));
            }
            if phase.max_followups == 0 {
                return Err(ConfigError::InvalidCatalog(format!(
                    "phase {} has max_followups = 0",
                    phase.id
                )));
            }
            if phase.name.trim().is_empty() {
                return Err(ConfigError::InvalidCatalog(format!(
                    "phase {} has an empty name",
                    phase.id
                )));
            }
        }
        Ok(Self { phases })
    }

    pub fn get_phase(&self, id: PhaseId) -> Option<&Phase> {
        (id.0 as usize)
            .checked_sub(1)
            .and_then(|index| self.phases.get(index))
    }

    /// The phase after `id`, or `None` if `id` is terminal (or unknown).
    pub fn next_phase(&self, id: PhaseId) -> Option<PhaseId> {
        self.get_phase(id)?;
        let next = PhaseId(id.0.checked_add(1)?);
        self.get_phase(next).map(|p| p.id)
    }

    pub fn is_terminal(&self, id: PhaseId) -> bool {
        self.get_phase(id).is_some() && self.next_phase(id).is_none()
    }

    pub fn contains(&self, id: PhaseId) -> bool {
        self.get_phase(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.phases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }
}

impl Default for PhaseCatalog {
    fn default() -> Self {
        Self::standard()
    }
}
