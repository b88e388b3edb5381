//! Error taxonomy for swarm configuration and execution.
//!
//! [`InvocationError`] is what an [`AgentHandle`](crate::agent::AgentHandle)
//! reports when a single call fails. [`SwarmError`] is what the swarm returns
//! to its caller; every variant carries enough context (session id, task id,
//! agent name) to diagnose the failure without re-running.
//!
//! # Examples
//!
//! ```
//! use lightswarm::error::{InvocationError, SwarmError};
//!
//! let err = SwarmError::Invocation {
//!     session_id: Some("s-1".into()),
//!     agent: "Planner".into(),
//!     source: InvocationError::failed("Planner", "connection reset"),
//! };
//! assert_eq!(
//!     err.to_string(),
//!     "Agent 'Planner' failed in session s-1: Invocation of 'Planner' failed: connection reset"
//! );
//! ```

use crate::task_graph::TaskGraphResult;
use std::time::Duration;
use thiserror::Error;

/// Failure reported by an agent handle for a single invocation.
///
/// Retry policy belongs to the handle; by the time the orchestrator sees one of
/// these the handle has given up.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvocationError {
    /// Transport or model fault.
    #[error("Invocation of '{agent}' failed: {message}")]
    Failed { agent: String, message: String },

    /// The handle gave up waiting for a reply.
    #[error("Invocation of '{agent}' timed out after {elapsed:?}")]
    Timeout { agent: String, elapsed: Duration },
}

impl InvocationError {
    /// Shorthand for [`InvocationError::Failed`].
    pub fn failed(agent: impl Into<String>, message: impl Into<String>) -> Self {
        InvocationError::Failed {
            agent: agent.into(),
            message: message.into(),
        }
    }

    /// Name of the agent whose invocation failed.
    pub fn agent(&self) -> &str {
        match self {
            InvocationError::Failed { agent, .. } | InvocationError::Timeout { agent, .. } => agent,
        }
    }
}

/// Errors that can occur during swarm configuration or execution.
#[derive(Debug, Error)]
pub enum SwarmError {
    /// An agent call failed during a group-chat turn. The session history is
    /// left exactly as of the last successfully recorded turn.
    #[error("Agent '{agent}' failed in session {}: {source}", .session_id.as_deref().unwrap_or("<none>"))]
    Invocation {
        session_id: Option<String>,
        agent: String,
        #[source]
        source: InvocationError,
    },

    /// No resolvable next speaker.
    #[error("Routing failed in session {session_id}: {reason}")]
    Routing { session_id: String, reason: String },

    /// The task dependency relation contains a cycle. Lists the tasks on the
    /// cycle. `session_id` is `None` when the graph was planned outside a run.
    #[error("Task graph contains a dependency cycle involving: {}", .task_ids.join(", "))]
    GraphCycle {
        session_id: Option<String>,
        task_ids: Vec<String>,
    },

    /// A task invocation failed mid-graph.
    ///
    /// `task_id`, `agent` and `source` describe the first failure in frontier
    /// order. `failed` lists every failed task of that frontier, first one
    /// included. `partial` holds every task that completed and
    /// `not_attempted` the tasks that never ran.
    #[error("Task '{task_id}' (agent '{agent}') failed in session {session_id}: {source}")]
    GraphTaskFailure {
        session_id: String,
        task_id: String,
        agent: String,
        #[source]
        source: InvocationError,
        failed: Vec<(String, InvocationError)>,
        partial: Box<TaskGraphResult>,
        not_attempted: Vec<String>,
    },

    /// Structurally invalid configuration (duplicate agent name, unknown
    /// participant, invalid dependency reference, ...).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// No live session with the given id.
    #[error("Session not found: {0}")]
    SessionNotFound(String),
}

impl SwarmError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        SwarmError::Configuration(msg.into())
    }

    pub(crate) fn routing(session_id: &str, reason: impl Into<String>) -> Self {
        SwarmError::Routing {
            session_id: session_id.to_string(),
            reason: reason.into(),
        }
    }
}
