//! Cache-context lifecycle - explicit state machine
//!
//! The install/activate/fetch callback style of the platform becomes a named
//! state machine driven by the worker task. Guards reject transitions the
//! platform would never produce; nothing here depends on listener
//! registration order or global mutable state.
//!
//! ```text
//! Installing ──▶ Waiting ──▶ Activating ──▶ Active
//!      │            │             │            │
//!      └────────────┴─────────────┴────────────┴──▶ Redundant
//! ```
//!
//! The worker skips the "wait for clients to close" step, so Waiting is
//! passed through immediately after a successful install.

use serde::Serialize;
use std::fmt;

/// Phase of one cache-context generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecyclePhase {
    /// App-shell generation is being opened and populated
    Installing,
    /// Install complete, eligible for activation
    Waiting,
    /// Sweeping non-current generations
    Activating,
    /// Intercepting fetches
    Active,
    /// Failed or superseded; never leaves this phase
    Redundant,
}

impl LifecyclePhase {
    /// Only an active context intercepts fetches; in every other phase
    /// requests pass straight to the upstream.
    pub fn can_intercept(&self) -> bool {
        matches!(self, LifecyclePhase::Active)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, LifecyclePhase::Redundant)
    }

    /// Whether the state machine admits `next` from this phase
    pub fn can_transition_to(&self, next: LifecyclePhase) -> bool {
        use LifecyclePhase::*;
        match (self, next) {
            (Installing, Waiting) => true,
            (Waiting, Activating) => true,
            (Activating, Active) => true,
            // Any live phase can fail or be superseded
            (Installing | Waiting | Activating | Active, Redundant) => true,
            _ => false,
        }
    }
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LifecyclePhase::Installing => "installing",
            LifecyclePhase::Waiting => "waiting",
            LifecyclePhase::Activating => "activating",
            LifecyclePhase::Active => "active",
            LifecyclePhase::Redundant => "redundant",
        };
        write!(f, "{}", label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use LifecyclePhase::*;

    #[test]
    fn test_happy_path_transitions() {
        assert!(Installing.can_transition_to(Waiting));
        assert!(Waiting.can_transition_to(Activating));
        assert!(Activating.can_transition_to(Active));
    }

    #[test]
    fn test_every_live_phase_can_go_redundant() {
        for phase in [Installing, Waiting, Activating, Active] {
            assert!(phase.can_transition_to(Redundant), "{} -> redundant", phase);
        }
    }

    #[test]
    fn test_redundant_is_terminal() {
        assert!(Redundant.is_terminal());
        for next in [Installing, Waiting, Activating, Active, Redundant] {
            assert!(!Redundant.can_transition_to(next));
        }
    }

    #[test]
    fn test_no_skipping_forward() {
        assert!(!Installing.can_transition_to(Active));
        assert!(!Installing.can_transition_to(Activating));
        assert!(!Waiting.can_transition_to(Active));
        assert!(!Active.can_transition_to(Installing));
    }

    #[test]
    fn test_only_active_intercepts() {
        assert!(Active.can_intercept());
        for phase in [Installing, Waiting, Activating, Redundant] {
            assert!(!phase.can_intercept());
        }
    }

    #[test]
    fn test_display_labels() {
        assert_eq!(Installing.to_string(), "installing");
        assert_eq!(Active.to_string(), "active");
        assert_eq!(Redundant.to_string(), "redundant");
    }
}
