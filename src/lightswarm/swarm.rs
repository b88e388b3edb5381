//! The swarm coordinator.
//!
//! A [`Swarm`] owns the agent registry and the table of live sessions, and is
//! the entry point for both execution modes:
//!
//! - **Group chat** ([`Swarm::run_group_chat`]): agents take turns in a
//!   session, chosen by the session's routing rules, until a termination check
//!   fires.
//! - **Task graph** ([`Swarm::run_task_graph`]): a DAG of tasks, each bound to
//!   an agent, executed frontier by frontier with independent tasks running
//!   concurrently.
//!
//! Registration needs `&mut Swarm`, so the agent set is fixed once the swarm is
//! shared. Everything else takes `&self`: wrap the swarm in an `Arc` to run
//! independent sessions from several tokio tasks at once. Runs on the same
//! session are serialized.
//!
//! # Example
//!
//! ```rust
//! use lightswarm::agent::{Agent, FnAgentHandle};
//! use lightswarm::routing::RoutingRules;
//! use lightswarm::session::SessionOptions;
//! use lightswarm::termination::StopReason;
//! use lightswarm::Swarm;
//! use std::sync::Arc;
//!
//! # async fn demo() -> Result<(), lightswarm::error::SwarmError> {
//! let mut swarm = Swarm::new();
//! swarm.register_agent(Agent::new(
//!     "Planner",
//!     "planner",
//!     Arc::new(FnAgentHandle::from_fn(|_, _| Ok("1. write code".into()))),
//! ))?;
//! swarm.register_agent(Agent::new(
//!     "Reviewer",
//!     "reviewer",
//!     Arc::new(FnAgentHandle::from_fn(|_, _| Ok("Looks good. FINAL_ANSWER".into()))),
//! ))?;
//!
//! let session = swarm
//!     .create_session(
//!         SessionOptions::new(["Planner", "Reviewer"])
//!             .with_routing(RoutingRules::role_based(
//!                 [("user", "Planner"), ("planner", "Reviewer")],
//!                 None,
//!             ))
//!             .with_auto_stop_tokens(["FINAL_ANSWER"]),
//!     )
//!     .await?;
//!
//! let summary = swarm.run_group_chat(&session, Some("Build a TODO app")).await?;
//! assert_eq!(summary.turns, 2);
//! assert_eq!(summary.stop_reason, StopReason::StopToken("FINAL_ANSWER".into()));
//! # Ok(())
//! # }
//! ```

use crate::agent::Agent;
use crate::config::SwarmConfig;
use crate::error::SwarmError;
use crate::event::{EventHandler, SwarmEvent};
use crate::group_chat::{GroupChatRunner, RunSummary};
use crate::session::{Session, SessionHandle, SessionOptions};
use crate::task_graph::{Task, TaskGraphExecutor, TaskGraphResult};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Coordinator for agents and sessions.
pub struct Swarm {
    config: SwarmConfig,
    agents: HashMap<String, Agent>,
    agent_order: Vec<String>,
    sessions: RwLock<HashMap<String, SessionHandle>>,
    event_handler: Option<Arc<dyn EventHandler>>,
}

impl Swarm {
    pub fn new() -> Self {
        Self::with_config(SwarmConfig::default())
    }

    pub fn with_config(config: SwarmConfig) -> Self {
        Self {
            config,
            agents: HashMap::new(),
            agent_order: Vec::new(),
            sessions: RwLock::new(HashMap::new()),
            event_handler: None,
        }
    }

    /// Attach an event handler (builder pattern).
    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.event_handler = Some(handler);
        self
    }

    pub fn config(&self) -> &SwarmConfig {
        &self.config
    }

    pub(crate) async fn emit(&self, event: SwarmEvent) {
        if let Some(handler) = &self.event_handler {
            handler.on_swarm_event(&event).await;
        }
    }

    // ── Agent registry ──────────────────────────────────────────────────

    /// Register an agent. Names must be unique within the swarm.
    pub fn register_agent(&mut self, agent: Agent) -> Result<(), SwarmError> {
        if agent.name().is_empty() {
            return Err(SwarmError::config("agent name must not be empty"));
        }
        if self.agents.contains_key(agent.name()) {
            return Err(SwarmError::config(format!(
                "agent '{}' is already registered",
                agent.name()
            )));
        }
        log::info!("registered agent '{}' ({})", agent.name(), agent.role());
        self.agent_order.push(agent.name().to_string());
        self.agents.insert(agent.name().to_string(), agent);
        Ok(())
    }

    /// Register several agents at once. Either all are registered or, on a
    /// duplicate or empty name, none are.
    pub fn register_agents(&mut self, agents: impl IntoIterator<Item = Agent>) -> Result<(), SwarmError> {
        let agents: Vec<Agent> = agents.into_iter().collect();
        let mut seen = HashSet::new();
        for agent in &agents {
            if agent.name().is_empty() {
                return Err(SwarmError::config("agent name must not be empty"));
            }
            if self.agents.contains_key(agent.name()) || !seen.insert(agent.name()) {
                return Err(SwarmError::config(format!(
                    "agent '{}' is already registered",
                    agent.name()
                )));
            }
        }
        for agent in agents {
            self.register_agent(agent)?;
        }
        Ok(())
    }

    pub fn get_agent(&self, name: &str) -> Option<&Agent> {
        self.agents.get(name)
    }

    /// Registered agents in registration order.
    pub fn list_agents(&self) -> Vec<&Agent> {
        self.agent_order
            .iter()
            .filter_map(|name| self.agents.get(name))
            .collect()
    }

    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    // ── Sessions ────────────────────────────────────────────────────────

    /// Create a session between registered agents.
    ///
    /// Fails with [`SwarmError::Configuration`] when the participant list is
    /// empty, names an unregistered agent or the same agent twice, when the
    /// routing rules target a non-participant, or when the requested session
    /// id is already live.
    pub async fn create_session(&self, options: SessionOptions) -> Result<SessionHandle, SwarmError> {
        if options.participants.is_empty() {
            return Err(SwarmError::config("a session needs at least one participant"));
        }

        let mut participants = Vec::with_capacity(options.participants.len());
        for name in &options.participants {
            let agent = self
                .agents
                .get(name)
                .ok_or_else(|| SwarmError::config(format!("unknown participant '{}'", name)))?;
            if participants.iter().any(|a: &Agent| a.name() == name.as_str()) {
                return Err(SwarmError::config(format!("participant '{}' listed twice", name)));
            }
            participants.push(agent.clone());
        }
        options.routing.validate(&participants)?;

        let session_id = options
            .session_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let max_rounds = options.max_rounds.unwrap_or(self.config.default_max_rounds);
        let names: Vec<String> = participants.iter().map(|a| a.name().to_string()).collect();

        let session = {
            let mut sessions = self.sessions.write().await;
            if sessions.contains_key(&session_id) {
                return Err(SwarmError::config(format!(
                    "session '{}' already exists",
                    session_id
                )));
            }
            let session = Arc::new(Session::new(session_id.clone(), participants, max_rounds, options));
            sessions.insert(session_id.clone(), Arc::clone(&session));
            session
        };

        log::info!(
            "created session {} with [{}], max {} rounds",
            session_id,
            names.join(", "),
            max_rounds
        );
        self.emit(SwarmEvent::SessionCreated {
            session_id,
            participants: names,
            max_rounds,
        })
        .await;
        Ok(session)
    }

    pub async fn session(&self, session_id: &str) -> Option<SessionHandle> {
        self.sessions.read().await.get(session_id).cloned()
    }

    pub async fn session_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Drop a session from the table. Handles already held stay usable for
    /// inspection but can no longer be run through this swarm.
    pub async fn remove_session(&self, session_id: &str) -> Option<SessionHandle> {
        let removed = self.sessions.write().await.remove(session_id);
        if removed.is_some() {
            log::info!("removed session {}", session_id);
        }
        removed
    }

    async fn live_session(&self, session: &SessionHandle) -> Result<(), SwarmError> {
        match self.sessions.read().await.get(session.id()) {
            Some(live) if Arc::ptr_eq(live, session) => Ok(()),
            _ => Err(SwarmError::SessionNotFound(session.id().to_string())),
        }
    }

    /// Merge entries into a session's shared state.
    ///
    /// A `"stop"` entry also sets (truthy) or clears (falsy) the stop flag.
    /// Updates made while a turn is in flight are seen from the next turn on.
    ///
    /// ```rust,no_run
    /// # async fn demo(swarm: &lightswarm::Swarm, id: &str) -> Result<(), lightswarm::error::SwarmError> {
    /// use serde_json::json;
    ///
    /// swarm.update_shared_state(id, [("phase", json!("review")), ("stop", json!(true))]).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn update_shared_state<I, K, V>(&self, session_id: &str, entries: I) -> Result<(), SwarmError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let session = self
            .session(session_id)
            .await
            .ok_or_else(|| SwarmError::SessionNotFound(session_id.to_string()))?;

        let (keys, stop) = {
            let mut state = session.lock_state().await;
            let keys = state.merge_shared_state(entries);
            (keys, state.stop_requested())
        };
        log::debug!("session {}: shared state updated {:?}", session_id, keys);
        self.emit(SwarmEvent::SharedStateUpdated {
            session_id: session_id.to_string(),
            keys,
            stop,
        })
        .await;
        Ok(())
    }

    /// Ask a session to stop before its next turn. Idempotent.
    pub async fn request_stop(&self, session_id: &str) -> Result<(), SwarmError> {
        self.update_shared_state(session_id, [("stop", true)]).await
    }

    /// Clear a stop request so the session can run again.
    pub async fn clear_stop(&self, session_id: &str) -> Result<(), SwarmError> {
        self.update_shared_state(session_id, [("stop", false)]).await
    }

    // ── Execution ───────────────────────────────────────────────────────

    /// Run a group chat, seeding the history with `initial_prompt` from the
    /// default user name.
    ///
    /// Without an initial prompt the run resumes from the existing history,
    /// which must not be empty.
    pub async fn run_group_chat(
        &self,
        session: &SessionHandle,
        initial_prompt: Option<&str>,
    ) -> Result<RunSummary, SwarmError> {
        self.run_group_chat_as(session, initial_prompt, &self.config.default_user_name)
            .await
    }

    /// [`run_group_chat`](Swarm::run_group_chat) with an explicit speaker name
    /// for the seed message.
    pub async fn run_group_chat_as(
        &self,
        session: &SessionHandle,
        initial_prompt: Option<&str>,
        user_name: &str,
    ) -> Result<RunSummary, SwarmError> {
        self.live_session(session).await?;
        GroupChatRunner::new(self, session)
            .run(initial_prompt, user_name)
            .await
    }

    /// Execute a task graph in the context of `session`.
    ///
    /// Task agents are looked up in the swarm registry, so they need not be
    /// session participants. The session history is left untouched; outputs
    /// are returned in the [`TaskGraphResult`].
    pub async fn run_task_graph(
        &self,
        tasks: &[Task],
        session: &SessionHandle,
    ) -> Result<TaskGraphResult, SwarmError> {
        self.live_session(session).await?;
        TaskGraphExecutor::new(self, session).run(tasks).await
    }
}

impl Default for Swarm {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Swarm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Swarm")
            .field("config", &self.config)
            .field("agents", &self.agent_order)
            .field("has_event_handler", &self.event_handler.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::FnAgentHandle;

    fn echo(name: &str) -> Agent {
        Agent::new(name, "assistant", Arc::new(FnAgentHandle::from_fn(|p, _| Ok(p.to_string()))))
    }

    #[test]
    fn list_agents_keeps_registration_order() {
        let mut swarm = Swarm::new();
        swarm
            .register_agents([echo("Zed"), echo("Amy"), echo("Kim")])
            .unwrap();
        let names: Vec<&str> = swarm.list_agents().iter().map(|a| a.name()).collect();
        assert_eq!(names, vec!["Zed", "Amy", "Kim"]);
    }

    #[test]
    fn bulk_registration_is_all_or_nothing() {
        let mut swarm = Swarm::new();
        swarm.register_agent(echo("Amy")).unwrap();

        let err = swarm.register_agents([echo("Bob"), echo("Amy")]).unwrap_err();
        assert!(matches!(err, SwarmError::Configuration(_)));
        assert!(swarm.get_agent("Bob").is_none());
        assert_eq!(swarm.agent_count(), 1);
    }

    #[tokio::test]
    async fn duplicate_session_id_is_rejected() {
        let mut swarm = Swarm::new();
        swarm.register_agent(echo("Amy")).unwrap();

        swarm
            .create_session(SessionOptions::new(["Amy"]).with_session_id("fixed"))
            .await
            .unwrap();
        let err = swarm
            .create_session(SessionOptions::new(["Amy"]).with_session_id("fixed"))
            .await
            .unwrap_err();
        assert!(matches!(err, SwarmError::Configuration(_)));
    }

    #[tokio::test]
    async fn removed_session_cannot_run() {
        let mut swarm = Swarm::new();
        swarm.register_agent(echo("Amy")).unwrap();
        let session = swarm
            .create_session(SessionOptions::new(["Amy"]).with_max_rounds(1))
            .await
            .unwrap();

        assert!(swarm.remove_session(session.id()).await.is_some());
        let err = swarm.run_group_chat(&session, Some("hi")).await.unwrap_err();
        assert!(matches!(err, SwarmError::SessionNotFound(_)));
        assert!(session.history().await.is_empty());
    }
}
