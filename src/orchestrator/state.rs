//! Run phase state machine
//!
//! Phases: IDLE → PUSHING → EXECUTING → PULLING → DONE, with ABORTED
//! reachable from every non-terminal phase.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Phase of one push/execute/pull cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Idle,
    Pushing,
    Executing,
    Pulling,
    Done,
    Aborted,
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Done | Phase::Aborted)
    }

    /// Check if transition from this phase to target is valid
    pub fn can_transition_to(&self, target: Phase) -> bool {
        match (self, target) {
            (Phase::Idle, Phase::Pushing) => true,
            (Phase::Pushing, Phase::Executing) => true,
            (Phase::Executing, Phase::Pulling) => true,
            (Phase::Pulling, Phase::Done) => true,
            (from, Phase::Aborted) => !from.is_terminal(),
            _ => false,
        }
    }
}

/// A recorded phase change
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseTransition {
    pub from: Phase,
    pub to: Phase,
    pub at: DateTime<Utc>,
}

/// Attempted transition the state machine does not allow
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid phase transition from {from:?} to {to:?}")]
pub struct InvalidTransition {
    pub from: Phase,
    pub to: Phase,
}

/// Current phase plus the transitions that led to it
#[derive(Debug, Clone)]
pub struct PhaseTracker {
    phase: Phase,
    history: Vec<PhaseTransition>,
}

impl PhaseTracker {
    pub fn new() -> Self {
        Self {
            phase: Phase::Idle,
            history: Vec::new(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn history(&self) -> &[PhaseTransition] {
        &self.history
    }

    /// Move to `target`, recording the change
    pub fn transition(&mut self, target: Phase) -> Result<(), InvalidTransition> {
        if !self.phase.can_transition_to(target) {
            return Err(InvalidTransition {
                from: self.phase,
                to: target,
            });
        }

        self.history.push(PhaseTransition {
            from: self.phase,
            to: target,
            at: Utc::now(),
        });
        self.phase = target;
        Ok(())
    }
}

impl Default for PhaseTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let mut tracker = PhaseTracker::new();
        for phase in [Phase::Pushing, Phase::Executing, Phase::Pulling, Phase::Done] {
            tracker.transition(phase).unwrap();
        }
        assert_eq!(tracker.phase(), Phase::Done);
        assert_eq!(tracker.history().len(), 4);
        assert_eq!(tracker.history()[0].from, Phase::Idle);
    }

    #[test]
    fn test_abort_from_any_active_phase() {
        for phase in [Phase::Idle, Phase::Pushing, Phase::Executing, Phase::Pulling] {
            assert!(phase.can_transition_to(Phase::Aborted), "{phase:?}");
        }
        assert!(!Phase::Done.can_transition_to(Phase::Aborted));
        assert!(!Phase::Aborted.can_transition_to(Phase::Aborted));
    }

    #[test]
    fn test_pull_cannot_be_skipped() {
        assert!(!Phase::Executing.can_transition_to(Phase::Done));
        assert!(!Phase::Pushing.can_transition_to(Phase::Pulling));
        assert!(!Phase::Idle.can_transition_to(Phase::Executing));
    }

    #[test]
    fn test_terminal_phases_are_final() {
        let mut tracker = PhaseTracker::new();
        tracker.transition(Phase::Aborted).unwrap();
        let err = tracker.transition(Phase::Pushing).unwrap_err();
        assert_eq!(err.from, Phase::Aborted);
        assert_eq!(err.to, Phase::Pushing);
    }
}
