//! Task-graph executor.
//!
//! A task graph is a set of [`Task`]s, each bound to a registered agent, with
//! dependencies forming a DAG. Execution proceeds frontier by frontier: every
//! task whose dependencies have all completed runs concurrently with the rest
//! of its frontier, and the next frontier starts only once the whole current
//! one has settled.
//!
//! ```text
//! frontier 0:  plan
//!                │
//! frontier 1:  build ─── docs        (run concurrently)
//!                │        │
//! frontier 2:  review ────┘
//! ```
//!
//! The whole graph is validated before any agent is invoked: unknown agents,
//! dangling or self dependencies, duplicate ids and cycles are all rejected up
//! front. Task prompts are resolved lazily, right before the task's frontier
//! runs, so a [`TaskPrompt::Computed`] prompt can read every upstream output.
//!
//! # Example
//!
//! ```rust
//! use lightswarm::task_graph::{Task, TaskPrompt};
//!
//! let tasks = vec![
//!     Task::new("plan", "Planner", "Create a plan for the service."),
//!     Task::new(
//!         "build",
//!         "Builder",
//!         TaskPrompt::computed(|results, _state| {
//!             format!("Implement this plan:\n{}", results.get("plan").unwrap_or_default())
//!         }),
//!     )
//!     .depends_on(["plan"]),
//! ];
//! assert_eq!(tasks[1].depends_on, vec!["plan".to_string()]);
//! ```

use crate::agent::{Agent, InvocationContext};
use crate::error::{InvocationError, SwarmError};
use crate::event::SwarmEvent;
use crate::session::{Session, SessionState};
use crate::Swarm;
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Prompt function: (results so far, session state snapshot) to prompt text.
pub type PromptFn = Arc<dyn Fn(&TaskGraphResult, &SessionState) -> String + Send + Sync>;

/// A task's prompt: fixed text, or computed from upstream results.
#[derive(Clone)]
pub enum TaskPrompt {
    Literal(String),
    Computed(PromptFn),
}

impl TaskPrompt {
    pub fn computed<F>(f: F) -> Self
    where
        F: Fn(&TaskGraphResult, &SessionState) -> String + Send + Sync + 'static,
    {
        TaskPrompt::Computed(Arc::new(f))
    }

    fn resolve(&self, results: &TaskGraphResult, state: &SessionState) -> String {
        match self {
            TaskPrompt::Literal(text) => text.clone(),
            TaskPrompt::Computed(f) => f(results, state),
        }
    }
}

impl From<&str> for TaskPrompt {
    fn from(text: &str) -> Self {
        TaskPrompt::Literal(text.to_string())
    }
}

impl From<String> for TaskPrompt {
    fn from(text: String) -> Self {
        TaskPrompt::Literal(text)
    }
}

impl fmt::Debug for TaskPrompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskPrompt::Literal(text) => f.debug_tuple("Literal").field(text).finish(),
            TaskPrompt::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

/// A unit of work in a task graph.
#[derive(Debug, Clone)]
pub struct Task {
    pub id: String,
    /// Name of the registered agent that runs this task.
    pub agent: String,
    pub prompt: TaskPrompt,
    pub depends_on: Vec<String>,
}

impl Task {
    pub fn new(id: impl Into<String>, agent: impl Into<String>, prompt: impl Into<TaskPrompt>) -> Self {
        Self {
            id: id.into(),
            agent: agent.into(),
            prompt: prompt.into(),
            depends_on: Vec::new(),
        }
    }

    /// Set the ids this task waits for (builder pattern).
    pub fn depends_on<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on = ids.into_iter().map(Into::into).collect();
        self
    }
}

/// Output and timing of one completed task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub agent: String,
    pub output: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

/// Results of a task-graph run, keyed by task id.
///
/// Entries are only ever added, never replaced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskGraphResult {
    records: BTreeMap<String, TaskRecord>,
    completion_order: Vec<String>,
}

impl TaskGraphResult {
    /// Output text of a completed task.
    pub fn get(&self, task_id: &str) -> Option<&str> {
        self.records.get(task_id).map(|r| r.output.as_str())
    }

    pub fn record(&self, task_id: &str) -> Option<&TaskRecord> {
        self.records.get(task_id)
    }

    pub fn contains(&self, task_id: &str) -> bool {
        self.records.contains_key(task_id)
    }

    /// Task ids in the order their results were recorded.
    pub fn completion_order(&self) -> &[String] {
        &self.completion_order
    }

    /// Task id to output text.
    pub fn outputs(&self) -> BTreeMap<String, String> {
        self.records
            .iter()
            .map(|(id, r)| (id.clone(), r.output.clone()))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TaskRecord)> {
        self.records.iter().map(|(id, r)| (id.as_str(), r))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn insert(&mut self, task_id: &str, record: TaskRecord) -> bool {
        if self.records.contains_key(task_id) {
            return false;
        }
        self.records.insert(task_id.to_string(), record);
        self.completion_order.push(task_id.to_string());
        true
    }
}

/// Check the graph shape and split it into frontiers of task ids.
///
/// Within a frontier, ids keep their input order. Fails with
/// [`SwarmError::Configuration`] on empty or duplicate ids and on dangling or
/// self dependencies, and with [`SwarmError::GraphCycle`] naming the tasks on
/// or between cycles.
///
/// ```rust
/// use lightswarm::task_graph::{plan_frontiers, Task};
///
/// let tasks = vec![
///     Task::new("review", "Reviewer", "Review").depends_on(["build", "docs"]),
///     Task::new("plan", "Planner", "Plan"),
///     Task::new("build", "Builder", "Build").depends_on(["plan"]),
///     Task::new("docs", "Writer", "Document").depends_on(["plan"]),
/// ];
/// let frontiers = plan_frontiers(&tasks)?;
/// assert_eq!(frontiers, vec![vec!["plan"], vec!["build", "docs"], vec!["review"]]);
/// # Ok::<(), lightswarm::error::SwarmError>(())
/// ```
pub fn plan_frontiers(tasks: &[Task]) -> Result<Vec<Vec<String>>, SwarmError> {
    let mut ids = HashSet::new();
    for task in tasks {
        if task.id.is_empty() {
            return Err(SwarmError::config("task id must not be empty"));
        }
        if !ids.insert(task.id.as_str()) {
            return Err(SwarmError::config(format!("duplicate task id '{}'", task.id)));
        }
    }
    for task in tasks {
        for dep in &task.depends_on {
            if dep == &task.id {
                return Err(SwarmError::config(format!("task '{}' depends on itself", task.id)));
            }
            if !ids.contains(dep.as_str()) {
                return Err(SwarmError::config(format!(
                    "task '{}' depends on unknown task '{}'",
                    task.id, dep
                )));
            }
        }
    }

    let mut remaining: HashMap<&str, HashSet<&str>> = tasks
        .iter()
        .map(|t| (t.id.as_str(), t.depends_on.iter().map(String::as_str).collect()))
        .collect();
    let mut frontiers = Vec::new();

    while !remaining.is_empty() {
        let frontier: Vec<&str> = tasks
            .iter()
            .map(|t| t.id.as_str())
            .filter(|id| remaining.get(id).map(HashSet::is_empty).unwrap_or(false))
            .collect();

        if frontier.is_empty() {
            return Err(SwarmError::GraphCycle {
                session_id: None,
                task_ids: cycle_members(tasks, &remaining),
            });
        }
        for id in &frontier {
            remaining.remove(id);
        }
        for deps in remaining.values_mut() {
            for id in &frontier {
                deps.remove(id);
            }
        }
        frontiers.push(frontier.into_iter().map(str::to_string).collect());
    }

    Ok(frontiers)
}

/// Of the tasks left unordered, drop those that merely depend on a cycle
/// without being part of one.
fn cycle_members(tasks: &[Task], remaining: &HashMap<&str, HashSet<&str>>) -> Vec<String> {
    let mut members: HashSet<&str> = remaining.keys().copied().collect();
    loop {
        let downstream_only: Vec<&str> = members
            .iter()
            .copied()
            .filter(|id| {
                !members
                    .iter()
                    .any(|other| remaining.get(other).map(|d| d.contains(id)).unwrap_or(false))
            })
            .collect();
        if downstream_only.is_empty() {
            break;
        }
        for id in downstream_only {
            members.remove(id);
        }
    }
    tasks
        .iter()
        .map(|t| t.id.as_str())
        .filter(|id| members.contains(id))
        .map(str::to_string)
        .collect()
}

struct Outcome {
    task_id: String,
    agent: String,
    started_at: DateTime<Utc>,
    completed_at: DateTime<Utc>,
    result: Result<String, InvocationError>,
}

pub(crate) struct TaskGraphExecutor<'a> {
    swarm: &'a Swarm,
    session: &'a Session,
}

impl<'a> TaskGraphExecutor<'a> {
    pub(crate) fn new(swarm: &'a Swarm, session: &'a Session) -> Self {
        Self { swarm, session }
    }

    fn resolve_agents(&self, tasks: &[Task]) -> Result<HashMap<String, Agent>, SwarmError> {
        let mut agents = HashMap::new();
        for task in tasks {
            let agent = self.swarm.get_agent(&task.agent).ok_or_else(|| {
                SwarmError::config(format!(
                    "task '{}' uses unregistered agent '{}'",
                    task.id, task.agent
                ))
            })?;
            agents.insert(task.id.clone(), agent.clone());
        }
        Ok(agents)
    }

    pub(crate) async fn run(&self, tasks: &[Task]) -> Result<TaskGraphResult, SwarmError> {
        let session_id = self.session.id().to_string();
        let frontiers = plan_frontiers(tasks).map_err(|e| match e {
            SwarmError::GraphCycle { task_ids, .. } => SwarmError::GraphCycle {
                session_id: Some(session_id.clone()),
                task_ids,
            },
            other => other,
        })?;
        let agents = self.resolve_agents(tasks)?;
        let by_id: HashMap<&str, &Task> = tasks.iter().map(|t| (t.id.as_str(), t)).collect();

        let _run = self.session.acquire_run().await;
        log::info!(
            "session {}: task graph with {} tasks in {} frontiers",
            session_id,
            tasks.len(),
            frontiers.len()
        );
        self.swarm
            .emit(SwarmEvent::TaskGraphStarted {
                session_id: session_id.clone(),
                tasks: tasks.len(),
                frontiers: frontiers.len(),
            })
            .await;

        let limiter = self
            .swarm
            .config()
            .max_parallel_tasks
            .map(|n| Arc::new(Semaphore::new(n.max(1))));
        let mut results = TaskGraphResult::default();

        for (index, frontier) in frontiers.iter().enumerate() {
            let snapshot = self.session.snapshot().await;
            let mut handles = Vec::with_capacity(frontier.len());

            for task_id in frontier {
                // plan_frontiers and resolve_agents cover every frontier id.
                let (task, agent) = (by_id[task_id.as_str()], &agents[task_id]);
                let prompt = task.prompt.resolve(&results, &snapshot);
                let context = InvocationContext {
                    session_id: Some(session_id.clone()),
                    agent_name: agent.name().to_string(),
                    agent_role: agent.role().to_string(),
                    task_id: Some(task_id.clone()),
                    history: snapshot.history.clone(),
                    shared_state: snapshot.shared_state.clone(),
                };

                log::info!("session {}: task '{}' -> {}", session_id, task_id, agent.name());
                self.swarm
                    .emit(SwarmEvent::TaskStarted {
                        session_id: session_id.clone(),
                        task_id: task_id.clone(),
                        agent: agent.name().to_string(),
                    })
                    .await;

                let agent = agent.clone();
                let task_id = task_id.clone();
                let limiter = limiter.clone();
                handles.push(tokio::spawn(async move {
                    let _permit = match limiter {
                        Some(semaphore) => semaphore.acquire_owned().await.ok(),
                        None => None,
                    };
                    let started_at = Utc::now();
                    let result = agent.invoke(&prompt, &context).await.map(|m| m.content);
                    Outcome {
                        task_id,
                        agent: agent.name().to_string(),
                        started_at,
                        completed_at: Utc::now(),
                        result,
                    }
                }));
            }

            let mut failures: Vec<(String, String, InvocationError)> = Vec::new();
            for (task_id, joined) in frontier.iter().zip(join_all(handles).await) {
                let outcome = match joined {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        let agent = by_id
                            .get(task_id.as_str())
                            .map(|t| t.agent.clone())
                            .unwrap_or_default();
                        Outcome {
                            task_id: task_id.clone(),
                            started_at: Utc::now(),
                            completed_at: Utc::now(),
                            result: Err(InvocationError::failed(
                                agent.clone(),
                                format!("task aborted: {}", e),
                            )),
                            agent,
                        }
                    }
                };

                match outcome.result {
                    Ok(output) => {
                        let response_length = output.len();
                        results.insert(
                            &outcome.task_id,
                            TaskRecord {
                                agent: outcome.agent.clone(),
                                output,
                                started_at: outcome.started_at,
                                completed_at: outcome.completed_at,
                            },
                        );
                        self.swarm
                            .emit(SwarmEvent::TaskCompleted {
                                session_id: session_id.clone(),
                                task_id: outcome.task_id,
                                agent: outcome.agent,
                                response_length,
                            })
                            .await;
                    }
                    Err(error) => {
                        log::error!(
                            "session {}: task '{}' ({}) failed: {}",
                            session_id,
                            outcome.task_id,
                            outcome.agent,
                            error
                        );
                        self.swarm
                            .emit(SwarmEvent::TaskFailed {
                                session_id: session_id.clone(),
                                task_id: outcome.task_id.clone(),
                                agent: outcome.agent.clone(),
                                error: error.to_string(),
                            })
                            .await;
                        failures.push((outcome.task_id, outcome.agent, error));
                    }
                }
            }

            if let Some((task_id, agent, source)) = failures.first().cloned() {
                let not_attempted: Vec<String> =
                    frontiers[index + 1..].iter().flatten().cloned().collect();
                self.swarm
                    .emit(SwarmEvent::TaskGraphCompleted {
                        session_id: session_id.clone(),
                        completed: results.len(),
                        success: false,
                    })
                    .await;
                return Err(SwarmError::GraphTaskFailure {
                    session_id,
                    task_id,
                    agent,
                    source,
                    failed: failures
                        .into_iter()
                        .map(|(task_id, _, error)| (task_id, error))
                        .collect(),
                    partial: Box::new(results),
                    not_attempted,
                });
            }
        }

        log::info!(
            "session {}: task graph completed ({} results)",
            session_id,
            results.len()
        );
        self.swarm
            .emit(SwarmEvent::TaskGraphCompleted {
                session_id,
                completed: results.len(),
                success: true,
            })
            .await;
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn independent_tasks_share_a_frontier() {
        let tasks = vec![
            Task::new("a", "A", "a"),
            Task::new("b", "B", "b"),
            Task::new("c", "C", "c").depends_on(["a", "b"]),
        ];
        assert_eq!(
            plan_frontiers(&tasks).unwrap(),
            vec![vec!["a".to_string(), "b".to_string()], vec!["c".to_string()]]
        );
    }

    #[test]
    fn cycle_names_only_cycle_members() {
        let tasks = vec![
            Task::new("root", "A", "r"),
            Task::new("x", "A", "x").depends_on(["root", "y"]),
            Task::new("y", "A", "y").depends_on(["x"]),
            Task::new("after", "A", "z").depends_on(["y"]),
        ];
        match plan_frontiers(&tasks) {
            Err(SwarmError::GraphCycle { task_ids, .. }) => {
                assert_eq!(task_ids, vec!["x".to_string(), "y".to_string()])
            }
            other => panic!("expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn rejects_bad_references() {
        let dangling = vec![Task::new("a", "A", "a").depends_on(["ghost"])];
        assert!(matches!(plan_frontiers(&dangling), Err(SwarmError::Configuration(_))));

        let selfish = vec![Task::new("a", "A", "a").depends_on(["a"])];
        assert!(matches!(plan_frontiers(&selfish), Err(SwarmError::Configuration(_))));

        let duplicate = vec![Task::new("a", "A", "1"), Task::new("a", "B", "2")];
        assert!(matches!(plan_frontiers(&duplicate), Err(SwarmError::Configuration(_))));
    }

    #[test]
    fn results_are_never_overwritten() {
        let now = Utc::now();
        let record = |output: &str| TaskRecord {
            agent: "A".into(),
            output: output.into(),
            started_at: now,
            completed_at: now,
        };
        let mut results = TaskGraphResult::default();
        assert!(results.insert("a", record("first")));
        assert!(!results.insert("a", record("second")));
        assert_eq!(results.get("a"), Some("first"));
        assert_eq!(results.completion_order(), ["a".to_string()]);
    }

    #[test]
    fn empty_graph_has_no_frontiers() {
        assert!(plan_frontiers(&[]).unwrap().is_empty());
    }
}
