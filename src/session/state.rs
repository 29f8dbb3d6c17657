//! Session state machine
//!
//! Defines the lifecycle states and which transitions between them are legal.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a recording session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Created, never started
    Created,
    /// `start` accepted, waiting for capture to begin
    Starting,
    /// Capturing and encoding
    Running,
    /// Draining queued units and finalizing the output
    Stopping,
    /// Output finalized (terminal)
    Stopped,
    /// A fatal error occurred (terminal)
    Failed,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::Created
    }
}

impl SessionState {
    /// Stopped and Failed are never left again
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Stopped | SessionState::Failed)
    }

    /// Whether the source may still deliver units
    pub fn is_active(self) -> bool {
        matches!(self, SessionState::Starting | SessionState::Running)
    }

    /// Ordinal exposed across the C boundary
    pub fn ordinal(self) -> i32 {
        match self {
            SessionState::Created => 0,
            SessionState::Starting => 1,
            SessionState::Running => 2,
            SessionState::Stopping => 3,
            SessionState::Stopped => 4,
            SessionState::Failed => 5,
        }
    }

    /// Legal transitions of the lifecycle
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        match (self, next) {
            (Created, Starting) => true,
            (Starting, Running) => true,
            (Starting, Stopping) | (Running, Stopping) => true,
            (Stopping, Stopped) => true,
            // Any non-terminal state may fail
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Created => "created",
            SessionState::Starting => "starting",
            SessionState::Running => "running",
            SessionState::Stopping => "stopping",
            SessionState::Stopped => "stopped",
            SessionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use SessionState::*;

    const ALL: [SessionState; 6] = [Created, Starting, Running, Stopping, Stopped, Failed];

    #[test]
    fn test_happy_path_is_legal() {
        assert!(Created.can_transition_to(Starting));
        assert!(Starting.can_transition_to(Running));
        assert!(Running.can_transition_to(Stopping));
        assert!(Stopping.can_transition_to(Stopped));
    }

    #[test]
    fn test_terminal_states_are_never_left() {
        for from in [Stopped, Failed] {
            for to in ALL {
                assert!(!from.can_transition_to(to), "{} -> {} must be illegal", from, to);
            }
        }
    }

    #[test]
    fn test_any_live_state_can_fail() {
        for from in [Created, Starting, Running, Stopping] {
            assert!(from.can_transition_to(Failed));
        }
    }

    #[test]
    fn test_no_shortcuts() {
        assert!(!Created.can_transition_to(Running));
        assert!(!Created.can_transition_to(Stopping));
        assert!(!Running.can_transition_to(Stopped));
        assert!(!Running.can_transition_to(Starting));
    }
}
