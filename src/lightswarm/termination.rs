//! Termination checks for group-chat runs.
//!
//! Before every turn the runner evaluates, in this order:
//!
//! 1. the stop flag (set by `request_stop` or a truthy `"stop"` shared-state key),
//! 2. the round limit (`round >= max_rounds`),
//! 3. the session's custom termination condition, if any,
//! 4. the auto-stop tokens, scanned in the most recent message only.
//!
//! The first check that fires determines the [`StopReason`].

use crate::session::{SessionState, TerminationCondition};
use crate::Swarm;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a group-chat run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    /// The stop flag was set.
    StopRequested,
    /// The round limit was reached.
    MaxRounds,
    /// The custom termination condition returned `true`.
    Condition,
    /// The most recent message contained this auto-stop token.
    StopToken(String),
    /// A custom router declined to name a next speaker.
    NoNextSpeaker,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::StopRequested => write!(f, "stop requested"),
            StopReason::MaxRounds => write!(f, "max rounds reached"),
            StopReason::Condition => write!(f, "termination condition met"),
            StopReason::StopToken(token) => write!(f, "stop token '{}'", token),
            StopReason::NoNextSpeaker => write!(f, "no next speaker"),
        }
    }
}

/// Evaluates a session's termination checks against its state.
pub(crate) struct Termination<'a> {
    pub(crate) condition: Option<&'a TerminationCondition>,
    pub(crate) stop_tokens: &'a [String],
}

impl<'a> Termination<'a> {
    pub(crate) fn evaluate(&self, state: &mut SessionState, swarm: &Swarm) -> Option<StopReason> {
        if state.stop_requested() {
            return Some(StopReason::StopRequested);
        }
        if state.round >= state.max_rounds {
            return Some(StopReason::MaxRounds);
        }
        if let Some(condition) = self.condition {
            if condition(&mut *state, swarm) {
                return Some(StopReason::Condition);
            }
        }
        let last = state.last_message()?;
        find_stop_token(&last.content, self.stop_tokens).map(|t| StopReason::StopToken(t.to_string()))
    }
}

/// First token in `tokens` that occurs in `content`.
pub fn find_stop_token<'t>(content: &str, tokens: &'t [String]) -> Option<&'t str> {
    tokens
        .iter()
        .map(String::as_str)
        .find(|token| !token.is_empty() && content.contains(token))
}
