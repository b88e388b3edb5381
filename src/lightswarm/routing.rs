//! Next-speaker routing.
//!
//! After each recorded turn the group-chat runner asks the session's
//! [`RoutingRules`] who speaks next:
//!
//! - [`RoutingRules::RoleBased`] maps the role of the last speaker to the name
//!   of the next agent, with an optional fallback agent. A seed prompt (or any
//!   user-role message) is looked up under the role key `"user"`.
//! - [`RoutingRules::RoundRobin`] cycles through the participants in session
//!   order.
//! - [`RoutingRules::Custom`] delegates to a caller-supplied function of the
//!   history and shared state.
//!
//! Targets and the fallback are validated when the session is created; a
//! transition that is simply missing at runtime is a
//! [`SwarmError::Routing`](crate::error::SwarmError::Routing).

use crate::agent::Agent;
use crate::error::SwarmError;
use crate::message::{ChatMessage, Role};
use crate::session::{SessionState, SharedState};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Custom router: returns the name of the next agent, or `None` to end the
/// run.
pub type CustomRouter = Arc<dyn Fn(&[ChatMessage], &SharedState) -> Option<String> + Send + Sync>;

/// How a session chooses its next speaker.
#[derive(Clone)]
pub enum RoutingRules {
    RoleBased {
        /// Last speaker's role tag to next agent's name.
        role_transitions: HashMap<String, String>,
        /// Agent to use when the last speaker's role has no transition.
        fallback: Option<String>,
    },
    RoundRobin,
    Custom(CustomRouter),
}

impl RoutingRules {
    /// Role-based routing from `(role, next agent)` pairs.
    ///
    /// ```rust
    /// use lightswarm::routing::RoutingRules;
    ///
    /// let rules = RoutingRules::role_based(
    ///     [("user", "Planner"), ("planner", "Builder"), ("executor", "Reviewer")],
    ///     Some("Planner"),
    /// );
    /// assert!(matches!(rules, RoutingRules::RoleBased { .. }));
    /// ```
    pub fn role_based<I, R, A>(transitions: I, fallback: Option<&str>) -> Self
    where
        I: IntoIterator<Item = (R, A)>,
        R: Into<String>,
        A: Into<String>,
    {
        RoutingRules::RoleBased {
            role_transitions: transitions
                .into_iter()
                .map(|(r, a)| (r.into(), a.into()))
                .collect(),
            fallback: fallback.map(str::to_string),
        }
    }

    pub fn custom<F>(router: F) -> Self
    where
        F: Fn(&[ChatMessage], &SharedState) -> Option<String> + Send + Sync + 'static,
    {
        RoutingRules::Custom(Arc::new(router))
    }

    /// Check that every name these rules can route to is a participant.
    pub(crate) fn validate(&self, participants: &[Agent]) -> Result<(), SwarmError> {
        let RoutingRules::RoleBased {
            role_transitions,
            fallback,
        } = self
        else {
            return Ok(());
        };

        let is_participant = |name: &str| participants.iter().any(|a| a.name() == name);
        for (role, target) in role_transitions {
            if !is_participant(target.as_str()) {
                return Err(SwarmError::config(format!(
                    "transition for role '{}' targets '{}', which is not a participant",
                    role, target
                )));
            }
        }
        if let Some(fallback) = fallback {
            if !is_participant(fallback.as_str()) {
                return Err(SwarmError::config(format!(
                    "fallback agent '{}' is not a participant",
                    fallback
                )));
            }
        }
        Ok(())
    }

    /// Pick the next speaker from `participants`, given the session state
    /// after the last recorded turn.
    ///
    /// `Ok(None)` means a custom router declined to name anyone.
    pub(crate) fn next_speaker<'a>(
        &self,
        state: &SessionState,
        participants: &'a [Agent],
    ) -> Result<Option<&'a Agent>, SwarmError> {
        let find = |name: &str| participants.iter().find(|a| a.name() == name);
        let last = state.last_message();

        match self {
            RoutingRules::RoleBased {
                role_transitions,
                fallback,
            } => {
                let role = last_speaker_role(last, participants);
                let target = role_transitions
                    .get(&role)
                    .or(fallback.as_ref())
                    .ok_or_else(|| {
                        SwarmError::routing(
                            &state.session_id,
                            format!("no transition for role '{}' and no fallback", role),
                        )
                    })?;
                find(target.as_str()).map(Some).ok_or_else(|| {
                    SwarmError::routing(
                        &state.session_id,
                        format!("'{}' is not a participant", target),
                    )
                })
            }
            RoutingRules::RoundRobin => {
                // Seeds from resumed runs sit between agent turns; skip them.
                let position = state
                    .history
                    .iter()
                    .rev()
                    .find(|m| m.role == Role::Assistant)
                    .and_then(|m| m.name.as_deref())
                    .and_then(|name| participants.iter().position(|a| a.name() == name));
                let next = match position {
                    Some(i) => (i + 1) % participants.len(),
                    None => 0,
                };
                Ok(participants.get(next))
            }
            RoutingRules::Custom(router) => {
                match router(&state.history, &state.shared_state) {
                    None => Ok(None),
                    Some(name) => find(name.as_str()).map(Some).ok_or_else(|| {
                        SwarmError::routing(
                            &state.session_id,
                            format!("custom router chose '{}', which is not a participant", name),
                        )
                    }),
                }
            }
        }
    }
}

/// Routing key of the last message: the participant's role tag for agent
/// replies, the conversation role label otherwise.
fn last_speaker_role(last: Option<&ChatMessage>, participants: &[Agent]) -> String {
    let Some(message) = last else {
        return Role::User.as_str().to_string();
    };
    if message.role == Role::Assistant {
        if let Some(agent) = message
            .name
            .as_deref()
            .and_then(|name| participants.iter().find(|a| a.name() == name))
        {
            return agent.role().to_string();
        }
    }
    message.role.as_str().to_string()
}

impl fmt::Debug for RoutingRules {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoutingRules::RoleBased {
                role_transitions,
                fallback,
            } => f
                .debug_struct("RoleBased")
                .field("role_transitions", role_transitions)
                .field("fallback", fallback)
                .finish(),
            RoutingRules::RoundRobin => f.write_str("RoundRobin"),
            RoutingRules::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}
