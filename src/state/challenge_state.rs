/// Challenge guard state definitions
///
/// This module defines the states of the interstitial-challenge guard and the
/// transitions allowed between them.
use std::fmt;

/// Represents the current state of the challenge guard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChallengeState {
    /// No challenge page is showing; reads may proceed
    Clear,

    /// A challenge page is showing; the guard is polling for it to clear
    Challenged,

    /// The challenge outlasted the wait budget
    Escalated,
}

impl ChallengeState {
    /// Returns true if reads may proceed in this state
    pub fn is_clear(&self) -> bool {
        matches!(self, Self::Clear)
    }

    /// Returns true if the guard gave up waiting
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Escalated)
    }

    /// Returns true if `next` is a legal successor of this state
    ///
    /// | From | To |
    /// |------|----|
    /// | Clear | Clear, Challenged |
    /// | Challenged | Challenged, Clear, Escalated |
    /// | Escalated | Clear (after a reset) |
    pub fn can_transition_to(&self, next: ChallengeState) -> bool {
        match (self, next) {
            (Self::Clear, Self::Clear | Self::Challenged) => true,
            (Self::Challenged, _) => true,
            (Self::Escalated, Self::Clear) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Clear => "clear",
            Self::Challenged => "challenged",
            Self::Escalated => "escalated",
        }
    }

    /// Returns all possible states
    pub fn all_states() -> Vec<Self> {
        vec![Self::Clear, Self::Challenged, Self::Escalated]
    }
}

impl fmt::Display for ChallengeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
