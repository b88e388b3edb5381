//! Multi-agent collaboration with routed turns, shared notes and a task graph.
//!
//! The agents here are scripted so the demo runs offline. Swap the
//! `FnAgentHandle`s for `Agent::with_client(config, client)` to talk to a real
//! model.
//!
//! Run with `RUST_LOG=info cargo run --example multi_agent`.

use async_trait::async_trait;
use lightswarm::agent::{Agent, FnAgentHandle};
use lightswarm::config::AgentConfig;
use lightswarm::event::{EventHandler, SwarmEvent};
use lightswarm::message::ChatMessage;
use lightswarm::routing::RoutingRules;
use lightswarm::session::{SessionOptions, SessionState, SharedState};
use lightswarm::task_graph::{Task, TaskPrompt};
use lightswarm::Swarm;
use serde_json::{json, Value};
use std::sync::Arc;

struct ConsoleEvents;

#[async_trait]
impl EventHandler for ConsoleEvents {
    async fn on_swarm_event(&self, event: &SwarmEvent) {
        match event {
            SwarmEvent::TurnCompleted { round, agent, .. } => {
                println!("  round {} done by {}", round, agent)
            }
            SwarmEvent::TaskCompleted { task_id, agent, .. } => {
                println!("  task '{}' done by {}", task_id, agent)
            }
            SwarmEvent::RunCompleted { turns, reason, .. } => {
                println!("  run finished after {} turns: {}", turns, reason)
            }
            _ => {}
        }
    }
}

fn scripted(config: AgentConfig, reply: fn(&str) -> String) -> Agent {
    Agent::from_config(
        config,
        Arc::new(FnAgentHandle::from_fn(move |prompt, _ctx| Ok(reply(prompt)))),
    )
}

fn collaborative_prompt(agent: &str, last: Option<&ChatMessage>, state: &mut SessionState) -> String {
    if let Some(message) = last.filter(|m| !m.content.is_empty()) {
        let record = format!("{}: {}", message.speaker(), message.content);
        if let Value::Array(notes) = state.shared_state.get_or_insert_with("notes", || json!([])) {
            if notes.last().and_then(Value::as_str) != Some(record.as_str()) {
                notes.push(Value::String(record));
            }
        }
    }

    let summary = match state.shared_state.get("notes") {
        Some(Value::Array(notes)) if !notes.is_empty() => notes
            .iter()
            .rev()
            .take(3)
            .rev()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join("\n"),
        _ => "No shared notes yet.".to_string(),
    };
    format!(
        "Task: {}\n\nRecent notes:\n{}\n\nIt is {}'s turn; give a concrete action or conclusion.",
        state.shared_state.get_str("task").unwrap_or_default(),
        summary,
        agent
    )
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    lightswarm::init_logger();

    let mut swarm = Swarm::new().with_event_handler(Arc::new(ConsoleEvents));
    swarm.register_agents([
        scripted(
            AgentConfig::new("Planner", "planner")
                .with_instructions("Summarise the request and break it into steps.")
                .with_model("gpt-4o-mini"),
            |_| "1. Define models 2. Add /health 3. Add /recommend".to_string(),
        ),
        scripted(
            AgentConfig::new("Builder", "executor")
                .with_instructions("Turn the plan into an implementation sketch.")
                .with_model("gpt-4o-mini"),
            |prompt| format!("app = FastAPI()  # from {} chars of context", prompt.len()),
        ),
        scripted(
            AgentConfig::new("Reviewer", "reviewer")
                .with_instructions("Review the design; finish with FINAL_ANSWER when it is sound.")
                .with_model("gpt-4o-mini"),
            |_| "Add rate limiting to /recommend. FINAL_ANSWER=OK".to_string(),
        ),
    ])?;

    let mut shared = SharedState::new();
    shared.insert(
        "task",
        "Design a FastAPI service with health-check and recommendation endpoints",
    );
    shared.insert("notes", json!([]));

    let session = swarm
        .create_session(
            SessionOptions::new(["Planner", "Builder", "Reviewer"])
                .with_max_rounds(6)
                .with_routing(RoutingRules::role_based(
                    [("planner", "Builder"), ("executor", "Reviewer"), ("reviewer", "Planner")],
                    Some("Planner"),
                ))
                .with_shared_state(shared)
                .with_prompt_builder(collaborative_prompt)
                .with_termination_condition(|state, _swarm| {
                    state
                        .last_message()
                        .map(|m| m.contains("FINAL_ANSWER"))
                        .unwrap_or(false)
                })
                .with_auto_stop_tokens(["FINAL_ANSWER"]),
        )
        .await?;

    println!("=== Group chat ===");
    swarm
        .run_group_chat_as(
            &session,
            Some("Please plan a FastAPI service exposing /health and /recommend."),
            "customer",
        )
        .await?;

    for message in session.history().await {
        println!("[{}] {}", message.speaker(), message.content);
    }
    println!("\nShared notes:");
    println!("{}", serde_json::to_string_pretty(&session.shared_state().await.get("notes"))?);

    // A downstream scheduler can pause the session through shared state.
    swarm.request_stop(session.id()).await?;
    let paused = swarm.run_group_chat(&session, None).await?;
    println!("\nManual stop: {} ({} turns)", paused.stop_reason, paused.turns);
    swarm.clear_stop(session.id()).await?;

    let tasks = vec![
        Task::new("plan", "Planner", "Using the discussion so far, list three implementation steps."),
        Task::new(
            "build",
            "Builder",
            TaskPrompt::computed(|results, _| {
                format!("Write pseudo-code for these steps:\n{}", results.get("plan").unwrap_or_default())
            }),
        )
        .depends_on(["plan"]),
        Task::new(
            "review",
            "Reviewer",
            TaskPrompt::computed(|results, _| {
                format!(
                    "Assess the risks of this pseudo-code and finish with FINAL_ANSWER=OK.\n{}",
                    results.get("build").unwrap_or_default()
                )
            }),
        )
        .depends_on(["build"]),
    ];

    println!("\n=== Task graph ===");
    let results = swarm.run_task_graph(&tasks, &session).await?;
    println!("{}", serde_json::to_string_pretty(&results.outputs())?);
    Ok(())
}
