//! Server lifecycle states.

use std::fmt;

/// `Starting → Serving → Draining → Stopped`.
///
/// `Serving → Stopped` is reserved for a listener failure, which skips the
/// drain entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Starting,
    Serving,
    Draining,
    Stopped,
}

impl LifecycleState {
    pub fn can_transition_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (Starting, Serving) | (Serving, Draining) | (Serving, Stopped) | (Draining, Stopped)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Starting => "starting",
            LifecycleState::Serving => "serving",
            LifecycleState::Draining => "draining",
            LifecycleState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::LifecycleState::*;

    #[test]
    fn forward_transitions_only() {
        assert!(Starting.can_transition_to(Serving));
        assert!(Serving.can_transition_to(Draining));
        assert!(Draining.can_transition_to(Stopped));

        assert!(!Serving.can_transition_to(Starting));
        assert!(!Draining.can_transition_to(Serving));
        assert!(!Stopped.can_transition_to(Serving));
        assert!(!Starting.can_transition_to(Draining));
    }
}
