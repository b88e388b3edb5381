//! Session state store.
//!
//! A [`Session`] is one logical multi-turn conversation. It owns:
//!
//! - the immutable setup chosen at creation time: participants, routing rules,
//!   prompt builder, termination condition and auto-stop tokens;
//! - the mutable [`SessionState`]: history, [`SharedState`], round counter and
//!   stop flag.
//!
//! Sessions are shared as [`SessionHandle`]s (`Arc<Session>`). The state sits
//! behind an async mutex that is only held for short, synchronous sections
//! (never across an agent call), and a separate run lock guarantees at most one
//! group-chat or task-graph run per session at a time.
//!
//! # Example
//!
//! ```rust
//! use lightswarm::routing::RoutingRules;
//! use lightswarm::session::{SessionOptions, SharedState};
//! use serde_json::json;
//!
//! let mut shared = SharedState::new();
//! shared.insert("task", "Design a FastAPI service");
//! shared.insert("notes", json!([]));
//!
//! let options = SessionOptions::new(["Planner", "Builder", "Reviewer"])
//!     .with_max_rounds(6)
//!     .with_routing(RoutingRules::role_based(
//!         [("planner", "Builder"), ("executor", "Reviewer"), ("reviewer", "Planner")],
//!         Some("Planner"),
//!     ))
//!     .with_shared_state(shared)
//!     .with_auto_stop_tokens(["FINAL_ANSWER"]);
//! ```

use crate::agent::Agent;
use crate::message::ChatMessage;
use crate::routing::RoutingRules;
use crate::Swarm;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::btree_map;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

/// Shared-state key mirrored by the session's stop flag.
pub const STOP_KEY: &str = "stop";

/// Session-scoped key-value store visible to prompt builders, termination
/// conditions and task prompts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SharedState {
    entries: BTreeMap<String, Value>,
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.entries.get_mut(key)
    }

    /// The value under `key` as a string slice, if it is a JSON string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.entries.get(key).and_then(Value::as_str)
    }

    /// Mutable access to `key`, inserting `default()` first when absent.
    pub fn get_or_insert_with(&mut self, key: &str, default: impl FnOnce() -> Value) -> &mut Value {
        self.entries.entry(key.to_string()).or_insert_with(default)
    }

    /// Insert a value, returning the previous one.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.entries.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.entries.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Whether `key` holds a truthy value: `true`, a non-zero number, or a
    /// non-empty string, array or object. Missing keys and `null` are falsy.
    pub fn is_truthy(&self, key: &str) -> bool {
        self.entries.get(key).map(is_truthy).unwrap_or(false)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, Value> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for SharedState {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// The mutable state of a session.
///
/// Serializable so a session can be exported after a run and inspected or
/// replayed elsewhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: String,
    /// Ordered conversation history, seed prompts included.
    pub history: Vec<ChatMessage>,
    pub shared_state: SharedState,
    /// Number of agent turns recorded so far, across all runs.
    pub round: usize,
    /// Cooperative stop request, checked between turns.
    pub stop: bool,
    pub max_rounds: usize,
}

impl SessionState {
    pub fn new(session_id: impl Into<String>, max_rounds: usize, shared_state: SharedState) -> Self {
        let mut state = Self {
            session_id: session_id.into(),
            history: Vec::new(),
            shared_state,
            round: 0,
            stop: false,
            max_rounds,
        };
        state.stop = state.shared_state.is_truthy(STOP_KEY);
        state
    }

    pub fn last_message(&self) -> Option<&ChatMessage> {
        self.history.last()
    }

    /// Whether a stop has been requested through the flag or the `"stop"`
    /// shared-state key.
    pub fn stop_requested(&self) -> bool {
        self.stop || self.shared_state.is_truthy(STOP_KEY)
    }

    /// Set or clear the stop flag, keeping the `"stop"` key in sync.
    pub fn set_stop(&mut self, stop: bool) {
        self.stop = stop;
        self.shared_state.insert(STOP_KEY, stop);
    }

    /// Merge entries into the shared state. A `"stop"` entry also drives the
    /// stop flag. Returns the merged keys in the order given.
    pub fn merge_shared_state<I, K, V>(&mut self, entries: I) -> Vec<String>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let mut keys = Vec::new();
        for (key, value) in entries {
            let key = key.into();
            let value = value.into();
            if key == STOP_KEY {
                self.stop = is_truthy(&value);
            }
            self.shared_state.insert(key.clone(), value);
            keys.push(key);
        }
        keys
    }

    /// Number of agent-authored (assistant) messages in the history.
    pub fn agent_turns(&self) -> usize {
        self.history
            .iter()
            .filter(|m| m.role == crate::message::Role::Assistant)
            .count()
    }
}

/// Builds the prompt for the next speaker from (next agent's name, last
/// message, session state). May mutate the shared state.
pub type PromptBuilder =
    Arc<dyn Fn(&str, Option<&ChatMessage>, &mut SessionState) -> String + Send + Sync>;

/// Custom termination predicate. Returning `true` stops the session. May
/// mutate the shared state.
pub type TerminationCondition = Arc<dyn Fn(&mut SessionState, &Swarm) -> bool + Send + Sync>;

/// Everything needed to create a session with
/// [`Swarm::create_session`](crate::Swarm::create_session).
#[derive(Clone)]
pub struct SessionOptions {
    pub(crate) session_id: Option<String>,
    pub(crate) participants: Vec<String>,
    pub(crate) max_rounds: Option<usize>,
    pub(crate) routing: RoutingRules,
    pub(crate) shared_state: SharedState,
    pub(crate) prompt_builder: Option<PromptBuilder>,
    pub(crate) termination_condition: Option<TerminationCondition>,
    pub(crate) auto_stop_tokens: Vec<String>,
}

impl SessionOptions {
    /// Options for a session between the named, already registered agents.
    ///
    /// Defaults to round-robin routing, the swarm's default round limit, empty
    /// shared state, the forwarding prompt builder and no stop tokens.
    pub fn new<I, S>(participants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            session_id: None,
            participants: participants.into_iter().map(Into::into).collect(),
            max_rounds: None,
            routing: RoutingRules::RoundRobin,
            shared_state: SharedState::new(),
            prompt_builder: None,
            termination_condition: None,
            auto_stop_tokens: Vec::new(),
        }
    }

    /// Use a caller-chosen session id instead of a generated UUID.
    pub fn with_session_id(mut self, id: impl Into<String>) -> Self {
        self.session_id = Some(id.into());
        self
    }

    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = Some(max_rounds);
        self
    }

    pub fn with_routing(mut self, routing: RoutingRules) -> Self {
        self.routing = routing;
        self
    }

    pub fn with_shared_state(mut self, shared_state: SharedState) -> Self {
        self.shared_state = shared_state;
        self
    }

    pub fn with_prompt_builder<F>(mut self, builder: F) -> Self
    where
        F: Fn(&str, Option<&ChatMessage>, &mut SessionState) -> String + Send + Sync + 'static,
    {
        self.prompt_builder = Some(Arc::new(builder));
        self
    }

    pub fn with_termination_condition<F>(mut self, condition: F) -> Self
    where
        F: Fn(&mut SessionState, &Swarm) -> bool + Send + Sync + 'static,
    {
        self.termination_condition = Some(Arc::new(condition));
        self
    }

    pub fn with_auto_stop_tokens<I, S>(mut self, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.auto_stop_tokens = tokens.into_iter().map(Into::into).collect();
        self
    }
}

/// Shared handle to a live session.
pub type SessionHandle = Arc<Session>;

/// A live session created by a [`Swarm`].
pub struct Session {
    id: String,
    participants: Vec<Agent>,
    pub(crate) routing: RoutingRules,
    pub(crate) prompt_builder: Option<PromptBuilder>,
    pub(crate) termination_condition: Option<TerminationCondition>,
    pub(crate) auto_stop_tokens: Vec<String>,
    state: Mutex<SessionState>,
    run_lock: Mutex<()>,
}

impl Session {
    pub(crate) fn new(
        id: String,
        participants: Vec<Agent>,
        max_rounds: usize,
        options: SessionOptions,
    ) -> Self {
        let state = SessionState::new(id.clone(), max_rounds, options.shared_state);
        Self {
            id,
            participants,
            routing: options.routing,
            prompt_builder: options.prompt_builder,
            termination_condition: options.termination_condition,
            auto_stop_tokens: options.auto_stop_tokens,
            state: Mutex::new(state),
            run_lock: Mutex::new(()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Participants in session order (the order round-robin follows).
    pub fn participants(&self) -> &[Agent] {
        &self.participants
    }

    pub fn participant(&self, name: &str) -> Option<&Agent> {
        self.participants.iter().find(|a| a.name() == name)
    }

    /// Lock the state for inspection or direct mutation.
    ///
    /// Runs take this lock between agent calls, so holding the guard delays
    /// the next turn of an in-flight run.
    pub async fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().await
    }

    /// Clone of the current state.
    pub async fn snapshot(&self) -> SessionState {
        self.state.lock().await.clone()
    }

    pub async fn history(&self) -> Vec<ChatMessage> {
        self.state.lock().await.history.clone()
    }

    pub async fn shared_state(&self) -> SharedState {
        self.state.lock().await.shared_state.clone()
    }

    pub async fn round(&self) -> usize {
        self.state.lock().await.round
    }

    pub async fn is_stopped(&self) -> bool {
        self.state.lock().await.stop_requested()
    }

    pub(crate) async fn acquire_run(&self) -> MutexGuard<'_, ()> {
        self.run_lock.lock().await
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field(
                "participants",
                &self.participants.iter().map(Agent::name).collect::<Vec<_>>(),
            )
            .field("routing", &self.routing)
            .field("auto_stop_tokens", &self.auto_stop_tokens)
            .finish()
    }
}
