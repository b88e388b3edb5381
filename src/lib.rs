//! # LightSwarm
//!
//! LightSwarm is a lightweight Rust toolkit for orchestrating teams of agents. Each agent is a
//! black box that turns a prompt into a reply; LightSwarm decides who speaks when, what they see,
//! and when the conversation is over.
//!
//! The crate provides carefully layered abstractions for:
//!
//! * **Agent Registry**: [`Swarm`] holds uniquely named [`Agent`]s, each with a role tag and an
//!   [`agent::AgentHandle`] that performs the actual invocation (a model client, a local closure,
//!   a remote service)
//! * **Group Chat Sessions**: [`session`] objects carry ordered history, a key-value
//!   [`session::SharedState`], a round counter and a cooperative stop flag
//! * **Routing**: [`routing::RoutingRules`] pick the next speaker by role transitions, round-robin
//!   or a custom function
//! * **Termination**: round limits, custom predicates and auto-stop tokens, see [`termination`]
//! * **Task Graphs**: [`task_graph`] executes dependency-ordered tasks with independent tasks
//!   running concurrently
//! * **Observability**: `log` output throughout plus an [`event::EventHandler`] callback layer
//!
//! Model inference itself is out of scope: bring a [`client_wrapper::ClientWrapper`] for your
//! provider, or implement [`agent::AgentHandle`] directly.
//!
//! ## Core Concepts
//!
//! ### Agents
//!
//! ```rust
//! use lightswarm::agent::{Agent, FnAgentHandle};
//! use std::sync::Arc;
//!
//! let planner = Agent::new(
//!     "Planner",
//!     "planner",
//!     Arc::new(FnAgentHandle::from_fn(|prompt, _ctx| Ok(format!("Plan for: {}", prompt)))),
//! );
//! ```
//!
//! ### Group Chat
//!
//! A session is created from [`session::SessionOptions`] and run with
//! [`Swarm::run_group_chat`]. Before every turn the termination checks run; then the routing rules
//! pick the next speaker, the prompt builder (if any) turns the last message into that speaker's
//! prompt, and the reply is appended to the history.
//!
//! ```rust,no_run
//! use lightswarm::agent::{Agent, FnAgentHandle};
//! use lightswarm::routing::RoutingRules;
//! use lightswarm::session::SessionOptions;
//! use lightswarm::Swarm;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     lightswarm::init_logger();
//!
//!     let mut swarm = Swarm::new();
//!     for (name, role) in [("Planner", "planner"), ("Builder", "executor"), ("Reviewer", "reviewer")] {
//!         swarm.register_agent(Agent::new(
//!             name,
//!             role,
//!             Arc::new(FnAgentHandle::from_fn(|prompt, ctx| {
//!                 Ok(format!("{} read {} chars", ctx.agent_name, prompt.len()))
//!             })),
//!         ))?;
//!     }
//!
//!     let session = swarm
//!         .create_session(
//!             SessionOptions::new(["Planner", "Builder", "Reviewer"])
//!                 .with_max_rounds(6)
//!                 .with_routing(RoutingRules::role_based(
//!                     [("planner", "Builder"), ("executor", "Reviewer"), ("reviewer", "Planner")],
//!                     Some("Planner"),
//!                 ))
//!                 .with_auto_stop_tokens(["FINAL_ANSWER"]),
//!         )
//!         .await?;
//!
//!     let summary = swarm
//!         .run_group_chat(&session, Some("Design a FastAPI service"))
//!         .await?;
//!     println!("{} turns, stopped: {}", summary.turns, summary.stop_reason);
//!
//!     for message in session.history().await {
//!         println!("[{}] {}", message.speaker(), message.content);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ### Task Graphs
//!
//! ```rust,no_run
//! use lightswarm::task_graph::{Task, TaskPrompt};
//! # async fn demo(
//! #     swarm: &lightswarm::Swarm,
//! #     session: &lightswarm::session::SessionHandle,
//! # ) -> Result<(), lightswarm::error::SwarmError> {
//! let tasks = vec![
//!     Task::new("plan", "Planner", "Create a plan for the service."),
//!     Task::new(
//!         "build",
//!         "Builder",
//!         TaskPrompt::computed(|results, _| {
//!             format!("Implement this plan:\n{}", results.get("plan").unwrap_or_default())
//!         }),
//!     )
//!     .depends_on(["plan"]),
//! ];
//! let results = swarm.run_task_graph(&tasks, session).await?;
//! println!("{}", results.get("build").unwrap_or_default());
//! # Ok(())
//! # }
//! ```

use std::sync::Once;

static INIT_LOGGER: Once = Once::new();

/// Initialise the global [`env_logger`] subscriber exactly once.
///
/// Applications embedding LightSwarm can opt in to simple `RUST_LOG` driven diagnostics without
/// having to choose a specific logging backend upfront.
///
/// ```rust
/// lightswarm::init_logger();
/// log::info!("Logger is ready");
/// ```
pub fn init_logger() {
    INIT_LOGGER.call_once(|| {
        env_logger::init();
    });
}

// Import the top-level `lightswarm` module.
pub mod lightswarm;

// Re-exporting key items for easier external access.
pub use lightswarm::agent;
pub use lightswarm::agent::{Agent, AgentHandle, FnAgentHandle, InvocationContext};
pub use lightswarm::client_wrapper;
pub use lightswarm::client_wrapper::ClientWrapper;
pub use lightswarm::config;
pub use lightswarm::config::{AgentConfig, SwarmConfig};
pub use lightswarm::error;
pub use lightswarm::error::{InvocationError, SwarmError};
pub use lightswarm::event;
pub use lightswarm::event::{EventHandler, SwarmEvent};
pub use lightswarm::group_chat;
pub use lightswarm::group_chat::RunSummary;
pub use lightswarm::message;
pub use lightswarm::message::{ChatMessage, Role};
pub use lightswarm::routing;
pub use lightswarm::routing::RoutingRules;
pub use lightswarm::session;
pub use lightswarm::session::{SessionHandle, SessionOptions, SessionState, SharedState};
pub use lightswarm::swarm;
pub use lightswarm::task_graph;
pub use lightswarm::task_graph::{Task, TaskGraphResult, TaskPrompt};
pub use lightswarm::termination;
pub use lightswarm::termination::StopReason;
pub use lightswarm::Swarm;
