/// Lifecycle of one call session.
///
/// ```text
/// Connecting → Greeting → Listening ⇄ Responding → Closing → Closed
/// ```
///
/// `Listening` and `Responding` are advisory: they track whether a reply is
/// being synthesized, and barge-in is accepted in both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Connection accepted, pipelines not started
    Connecting,
    /// Greeting submitted, recognition starting
    Greeting,
    Listening,
    Responding,
    /// Tearing down recognition, synthesis and transport
    Closing,
    /// Terminal
    Closed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Connecting => "connecting",
            SessionState::Greeting => "greeting",
            SessionState::Listening => "listening",
            SessionState::Responding => "responding",
            SessionState::Closing => "closing",
            SessionState::Closed => "closed",
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, SessionState::Closed)
    }

    /// Whether moving from `self` to `next` is a legal transition
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        use SessionState::*;
        match (self, next) {
            (Closed, _) => false,
            (_, Closing) => !matches!(self, Closing),
            (Closing, Closed) => true,
            (Connecting, Greeting) => true,
            (Greeting, Listening) | (Greeting, Responding) => true,
            (Listening, Responding) | (Responding, Listening) => true,
            (Responding, Responding) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        use SessionState::*;
        let path = [Connecting, Greeting, Listening, Responding, Listening, Closing, Closed];
        for pair in path.windows(2) {
            assert!(
                pair[0].can_transition_to(pair[1]),
                "{} -> {} should be allowed",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn test_closing_reachable_from_every_live_state() {
        use SessionState::*;
        for state in [Connecting, Greeting, Listening, Responding] {
            assert!(state.can_transition_to(Closing));
        }
        assert!(!Closing.can_transition_to(Closing));
    }

    #[test]
    fn test_closed_is_terminal() {
        use SessionState::*;
        for next in [Connecting, Greeting, Listening, Responding, Closing, Closed] {
            assert!(!Closed.can_transition_to(next));
        }
    }

    #[test]
    fn test_no_skipping_greeting() {
        assert!(!SessionState::Connecting.can_transition_to(SessionState::Listening));
        assert!(!SessionState::Listening.can_transition_to(SessionState::Greeting));
    }
}
