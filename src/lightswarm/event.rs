//! Swarm event system.
//!
//! Provides a callback-based observability layer for the swarm. Implement
//! [`EventHandler`] to receive real-time notifications about:
//!
//! - **Session lifecycle**: creation and shared-state updates
//! - **Group-chat runs**: run start/end, each turn's start, reply and failure
//! - **Task graphs**: graph start/end, each task's start, completion and failure
//!
//! The handler is wrapped in `Arc<dyn EventHandler>` and attached with
//! [`Swarm::with_event_handler`](crate::Swarm::with_event_handler). Its method
//! has a default no-op implementation.
//!
//! # Event Flow (group chat, 3 agents, stops on a token)
//!
//! ```text
//! RunStarted { session_id }
//!   ├─ TurnStarted { round: 1, agent: "Planner" }
//!   ├─ TurnCompleted { round: 1, agent: "Planner" }
//!   ├─ TurnStarted { round: 2, agent: "Builder" }
//!   ├─ TurnCompleted { round: 2, agent: "Builder" }
//!   ├─ TurnStarted { round: 3, agent: "Reviewer" }
//!   └─ TurnCompleted { round: 3, agent: "Reviewer" }
//! RunCompleted { turns: 3, reason: StopToken("FINAL_ANSWER") }
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use lightswarm::event::{EventHandler, SwarmEvent};
//! use async_trait::async_trait;
//!
//! struct Printer;
//!
//! #[async_trait]
//! impl EventHandler for Printer {
//!     async fn on_swarm_event(&self, event: &SwarmEvent) {
//!         if let SwarmEvent::TurnCompleted { agent, round, .. } = event {
//!             println!("round {}: {} spoke", round, agent);
//!         }
//!     }
//! }
//! ```

use crate::termination::StopReason;
use async_trait::async_trait;

/// Events emitted by a [`Swarm`](crate::Swarm).
#[derive(Debug, Clone, PartialEq)]
pub enum SwarmEvent {
    // ── Sessions ─────────────────────────────────────────────────────────
    /// A session was created by `create_session`.
    SessionCreated {
        session_id: String,
        participants: Vec<String>,
        max_rounds: usize,
    },

    /// Keys were merged into a session's shared state from outside a run.
    SharedStateUpdated {
        session_id: String,
        keys: Vec<String>,
        stop: bool,
    },

    // ── Group chat ───────────────────────────────────────────────────────
    /// A group-chat run began (after any stop-flag short circuit).
    RunStarted {
        session_id: String,
        round: usize,
        seeded: bool,
    },

    /// A speaker was routed and is about to be invoked.
    TurnStarted {
        session_id: String,
        /// 1-based round the turn will be recorded in.
        round: usize,
        agent: String,
    },

    /// A turn's reply was recorded.
    TurnCompleted {
        session_id: String,
        round: usize,
        agent: String,
        response_length: usize,
    },

    /// A turn's invocation failed; nothing was recorded.
    TurnFailed {
        session_id: String,
        round: usize,
        agent: String,
        error: String,
    },

    /// A group-chat run ended.
    RunCompleted {
        session_id: String,
        turns: usize,
        reason: StopReason,
    },

    // ── Task graphs ──────────────────────────────────────────────────────
    TaskGraphStarted {
        session_id: String,
        tasks: usize,
        frontiers: usize,
    },

    TaskStarted {
        session_id: String,
        task_id: String,
        agent: String,
    },

    TaskCompleted {
        session_id: String,
        task_id: String,
        agent: String,
        response_length: usize,
    },

    TaskFailed {
        session_id: String,
        task_id: String,
        agent: String,
        error: String,
    },

    /// A task graph ended. `completed` is the number of recorded results.
    TaskGraphCompleted {
        session_id: String,
        completed: usize,
        success: bool,
    },
}

/// Trait for receiving swarm events.
///
/// The `Send + Sync` bound allows the handler to be shared across sessions
/// and tokio tasks via `Arc<dyn EventHandler>`.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Called when the swarm emits an event. The default implementation is a
    /// no-op.
    async fn on_swarm_event(&self, _event: &SwarmEvent) {}
}
