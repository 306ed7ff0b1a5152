//! Phase advancement policy.

use serde::Serialize;

use crate::config::FlowConfig;

use super::phase::{Phase, PhaseCatalog, PhaseId};

/// Advance/stay verdict for one turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub advance: bool,
    /// The follow-up cap, not readiness, triggered the advance.
    pub forced: bool,
}

impl Decision {
    pub const STAY: Decision = Decision {
        advance: false,
        forced: false,
    };
    pub const ADVANCE: Decision = Decision {
        advance: true,
        forced: false,
    };
    pub const FORCED: Decision = Decision {
        advance: true,
        forced: true,
    };
}

/// Where the session goes after a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Stay,
    Advance { to: PhaseId, forced: bool },
    /// Advance out of the terminal phase: the session is over.
    Complete { forced: bool },
}

pub struct AdvancementPolicy {
    threshold: f64,
    min_turns_before_advance: u32,
}

impl AdvancementPolicy {
    pub fn new(config: &FlowConfig) -> Self {
        Self {
            threshold: config.advance_threshold,
            min_turns_before_advance: config.min_turns_before_advance,
        }
    }

    /// Rules in priority order:
    /// 1. readiness ≥ threshold and (confirmation or enough stayed turns) → advance
    /// 2. stayed turns ≥ `phase.max_followups` → forced advance
    /// 3. otherwise stay
    pub fn decide(
        &self,
        phase: &Phase,
        turns_in_phase: u32,
        readiness: f64,
        explicit_confirmation: bool,
    ) -> Decision {
        if readiness >= self.threshold
            && (explicit_confirmation || turns_in_phase >= self.min_turns_before_advance)
        {
            return Decision::ADVANCE;
        }
        if turns_in_phase >= phase.max_followups {
            return Decision::FORCED;
        }
        Decision::STAY
    }

    /// Resolve a decision against the catalog. The terminal phase never
    /// advances to a phase that doesn't exist; it completes instead.
    pub fn transition(catalog: &PhaseCatalog, phase: &Phase, decision: Decision) -> Transition {
        if !decision.advance {
            return Transition::Stay;
        }
        match catalog.next_phase(phase.id) {
            Some(to) => Transition::Advance {
                to,
                forced: decision.forced,
            },
            None => Transition::Complete {
                forced: decision.forced,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> AdvancementPolicy {
        AdvancementPolicy::new(&FlowConfig::default())
    }

    fn phase(id: u8) -> Phase {
        PhaseCatalog::standard()
            .get_phase(PhaseId(id))
            .cloned()
            .unwrap()
    }

    #[test]
    fn first_turn_above_threshold_waits_without_confirmation() {
        assert_eq!(policy().decide(&phase(1), 0, 0.9, false), Decision::STAY);
    }

    #[test]
    fn first_turn_above_threshold_advances_with_confirmation() {
        assert_eq!(policy().decide(&phase(1), 0, 0.75, true), Decision::ADVANCE);
    }

    #[test]
    fn second_turn_above_threshold_advances() {
        assert_eq!(policy().decide(&phase(1), 1, 0.7, false), Decision::ADVANCE);
    }

    #[test]
    fn below_threshold_stays_even_with_confirmation() {
        assert_eq!(policy().decide(&phase(1), 1, 0.69, true), Decision::STAY);
    }

    #[test]
    fn follow_up_cap_forces_advance() {
        let p = phase(2);
        let k = p.max_followups;
        assert_eq!(policy().decide(&p, k - 1, 0.4, false), Decision::STAY);
        assert_eq!(policy().decide(&p, k, 0.4, false), Decision::FORCED);
    }

    #[test]
    fn threshold_advance_beats_forced() {
        let p = phase(2);
        let d = policy().decide(&p, p.max_followups, 0.8, false);
        assert_eq!(d, Decision::ADVANCE);
    }

    #[test]
    fn stall_is_bounded_for_every_phase() {
        let policy = policy();
        for p in PhaseCatalog::standard().phases() {
            let mut turns = 0;
            loop {
                let d = policy.decide(p, turns, 0.0, false);
                if d.advance {
                    assert!(d.forced);
                    break;
                }
                turns += 1;
                assert!(turns <= p.max_followups, "phase {} stalled", p.id);
            }
        }
    }

    #[test]
    fn transition_resolves_next_and_terminal() {
        let catalog = PhaseCatalog::standard();
        assert_eq!(
            AdvancementPolicy::transition(&catalog, &phase(3), Decision::ADVANCE),
            Transition::Advance {
                to: PhaseId(4),
                forced: false
            }
        );
        assert_eq!(
            AdvancementPolicy::transition(&catalog, &phase(7), Decision::FORCED),
            Transition::Complete { forced: true }
        );
        assert_eq!(
            AdvancementPolicy::transition(&catalog, &phase(7), Decision::STAY),
            Transition::Stay
        );
    }
}
