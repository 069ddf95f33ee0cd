/// Session state definitions for tracking crawl progress
///
/// A session moves `Pending -> Running -> {Completed, Aborted}`. A pending
/// session may also abort directly when its start-up fails.
use crate::HarvestError;
use serde::Serialize;
use std::fmt;

/// Represents the lifecycle state of a crawl session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Frontier seeded, nothing fetched yet
    Pending,

    /// Fetching pages
    Running,

    /// Frontier exhausted or page limit reached
    Completed,

    /// Stopped early: cancellation, render engine failure, robots denial
    Aborted,
}

impl SessionState {
    /// Returns true if no further transition is possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Aborted)
    }

    /// Checks whether `next` is a legal successor of this state
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Pending, Self::Aborted)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Aborted)
        )
    }

    /// Returns the successor state, or an error for an illegal transition
    pub fn transition(self, next: SessionState) -> Result<SessionState, HarvestError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(HarvestError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Aborted => "aborted",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
