use async_trait::async_trait;
use lightswarm::agent::{Agent, FnAgentHandle};
use lightswarm::client_wrapper::{ClientWrapper, Message};
use lightswarm::config::AgentConfig;
use lightswarm::error::{InvocationError, SwarmError};
use lightswarm::event::{EventHandler, SwarmEvent};
use lightswarm::message::{ChatMessage, Role};
use lightswarm::routing::RoutingRules;
use lightswarm::session::{SessionOptions, SharedState};
use lightswarm::termination::StopReason;
use lightswarm::Swarm;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn scripted(name: &str, role: &str, replies: &[&str]) -> Agent {
    let replies: Vec<String> = replies.iter().map(|r| r.to_string()).collect();
    let calls = AtomicUsize::new(0);
    Agent::new(
        name,
        role,
        Arc::new(FnAgentHandle::from_fn(move |_prompt, _ctx| {
            let i = calls.fetch_add(1, Ordering::SeqCst);
            Ok(replies[i.min(replies.len() - 1)].clone())
        })),
    )
}

fn echo(name: &str, role: &str) -> Agent {
    Agent::new(
        name,
        role,
        Arc::new(FnAgentHandle::from_fn(|prompt, ctx| {
            Ok(format!("{}: {}", ctx.agent_name, prompt))
        })),
    )
}

fn team_rules() -> RoutingRules {
    RoutingRules::role_based(
        [("planner", "Builder"), ("executor", "Reviewer"), ("reviewer", "Planner")],
        Some("Planner"),
    )
}

async fn team_swarm(review_replies: &[&str]) -> Swarm {
    let mut swarm = Swarm::new();
    swarm
        .register_agents([
            scripted("Planner", "planner", &["1. models 2. routes 3. tests"]),
            scripted("Builder", "executor", &["def create_app(): ..."]),
            scripted("Reviewer", "reviewer", review_replies),
        ])
        .unwrap();
    swarm
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<SwarmEvent>>,
}

#[async_trait]
impl EventHandler for Recorder {
    async fn on_swarm_event(&self, event: &SwarmEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

#[tokio::test]
async fn test_team_stops_on_final_answer() {
    let swarm = team_swarm(&["Looks good. FINAL_ANSWER"]).await;
    let mut shared = SharedState::new();
    shared.insert("task", "Design a FastAPI service");
    shared.insert("notes", json!([]));

    let session = swarm
        .create_session(
            SessionOptions::new(["Planner", "Builder", "Reviewer"])
                .with_max_rounds(6)
                .with_routing(team_rules())
                .with_shared_state(shared)
                .with_auto_stop_tokens(["FINAL_ANSWER"])
                .with_prompt_builder(|next, last, state| {
                    let speaker = last.map(|m| m.speaker().to_string()).unwrap_or_default();
                    if let Some(Value::Array(notes)) = state.shared_state.get_mut("notes") {
                        notes.push(json!(format!("{} -> {}", speaker, next)));
                    }
                    format!(
                        "Task: {}\nLast message: {}",
                        state.shared_state.get_str("task").unwrap_or_default(),
                        last.map(|m| m.content.as_str()).unwrap_or_default()
                    )
                }),
        )
        .await
        .unwrap();

    let summary = swarm
        .run_group_chat(&session, Some("Design a FastAPI service"))
        .await
        .unwrap();

    assert_eq!(summary.turns, 3);
    assert_eq!(summary.round, 3);
    assert_eq!(
        summary.stop_reason,
        StopReason::StopToken("FINAL_ANSWER".to_string())
    );

    let history = session.history().await;
    let speakers: Vec<&str> = history.iter().map(|m| m.speaker()).collect();
    assert_eq!(speakers, vec!["user", "Planner", "Builder", "Reviewer"]);
    assert_eq!(history[0].role, Role::User);
    assert_eq!(history[0].metadata.get("seed").map(String::as_str), Some("true"));
    for (i, message) in history.iter().skip(1).enumerate() {
        assert_eq!(message.role, Role::Assistant);
        assert_eq!(message.metadata["round"], (i + 1).to_string());
    }

    let shared = session.shared_state().await;
    assert_eq!(
        shared.get("notes"),
        Some(&json!(["user -> Planner", "Planner -> Builder", "Builder -> Reviewer"]))
    );
}

#[tokio::test]
async fn test_max_rounds_bounds_history() {
    let mut swarm = Swarm::new();
    swarm
        .register_agents([echo("Ping", "a"), echo("Pong", "b")])
        .unwrap();
    let session = swarm
        .create_session(SessionOptions::new(["Ping", "Pong"]).with_max_rounds(5))
        .await
        .unwrap();

    let summary = swarm.run_group_chat(&session, Some("serve")).await.unwrap();
    assert_eq!(summary.stop_reason, StopReason::MaxRounds);
    assert_eq!(summary.turns, 5);

    let history = session.history().await;
    assert_eq!(history.len(), 6);
    let speakers: Vec<&str> = history.iter().skip(1).map(|m| m.speaker()).collect();
    assert_eq!(speakers, vec!["Ping", "Pong", "Ping", "Pong", "Ping"]);

    // The round counter persists, so a second run has nothing left to do.
    let again = swarm.run_group_chat(&session, None).await.unwrap();
    assert_eq!(again.turns, 0);
    assert_eq!(again.stop_reason, StopReason::MaxRounds);
    assert_eq!(session.history().await.len(), 6);
}

#[tokio::test]
async fn test_round_robin_continues_after_new_seed() {
    let mut swarm = Swarm::new();
    swarm
        .register_agents([scripted("Ping", "a", &["DONE"]), scripted("Pong", "b", &["DONE"])])
        .unwrap();
    let session = swarm
        .create_session(SessionOptions::new(["Ping", "Pong"]).with_auto_stop_tokens(["DONE"]))
        .await
        .unwrap();

    let first = swarm.run_group_chat(&session, Some("first")).await.unwrap();
    assert_eq!(first.turns, 1);
    let second = swarm.run_group_chat(&session, Some("second")).await.unwrap();
    assert_eq!(second.turns, 1);

    let history = session.history().await;
    let speakers: Vec<&str> = history
        .iter()
        .filter(|m| m.role == Role::Assistant)
        .map(|m| m.speaker())
        .collect();
    assert_eq!(speakers, vec!["Ping", "Pong"]);
}

#[tokio::test]
async fn test_stop_requested_before_run_is_a_no_op() {
    let swarm = team_swarm(&["keep going"]).await;
    let session = swarm
        .create_session(SessionOptions::new(["Planner", "Builder", "Reviewer"]).with_routing(team_rules()))
        .await
        .unwrap();

    swarm.request_stop(session.id()).await.unwrap();
    swarm.request_stop(session.id()).await.unwrap();
    assert!(session.is_stopped().await);

    let summary = swarm
        .run_group_chat(&session, Some("Design a FastAPI service"))
        .await
        .unwrap();
    assert_eq!(summary.turns, 0);
    assert_eq!(summary.stop_reason, StopReason::StopRequested);
    assert!(session.history().await.is_empty());
}

#[tokio::test]
async fn test_clearing_stop_resumes_from_history() {
    let swarm = team_swarm(&["Needs work", "FINAL_ANSWER"]).await;
    let session = swarm
        .create_session(
            SessionOptions::new(["Planner", "Builder", "Reviewer"])
                .with_max_rounds(10)
                .with_routing(team_rules())
                .with_auto_stop_tokens(["FINAL_ANSWER"])
                .with_termination_condition(|state, _swarm| {
                    let reviewed = state.history.iter().any(|m| m.speaker() == "Reviewer");
                    if reviewed && !state.shared_state.is_truthy("paused_once") {
                        state.shared_state.insert("paused_once", true);
                        return true;
                    }
                    false
                }),
        )
        .await
        .unwrap();

    let first = swarm
        .run_group_chat(&session, Some("Design a FastAPI service"))
        .await
        .unwrap();
    assert_eq!(first.stop_reason, StopReason::Condition);
    assert_eq!(first.turns, 3);

    swarm
        .update_shared_state(session.id(), [("stop", json!(true)), ("phase", json!("paused"))])
        .await
        .unwrap();
    let blocked = swarm.run_group_chat(&session, None).await.unwrap();
    assert_eq!(blocked.stop_reason, StopReason::StopRequested);

    swarm.clear_stop(session.id()).await.unwrap();
    let resumed = swarm.run_group_chat(&session, None).await.unwrap();
    assert_eq!(resumed.turns, 3);
    assert_eq!(
        resumed.stop_reason,
        StopReason::StopToken("FINAL_ANSWER".to_string())
    );

    let state = session.snapshot().await;
    assert_eq!(state.round, 6);
    assert_eq!(state.history.len(), 7);
    assert_eq!(state.shared_state.get_str("phase"), Some("paused"));
}

#[tokio::test]
async fn test_stop_during_run_takes_effect_between_turns() {
    let mut swarm = Swarm::new();
    for name in ["Slow1", "Slow2"] {
        swarm
            .register_agent(Agent::new(
                name,
                "worker",
                Arc::new(FnAgentHandle::new(|prompt, ctx| {
                    Box::pin(async move {
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok(ChatMessage::assistant(ctx.agent_name, prompt))
                    })
                })),
            ))
            .unwrap();
    }
    let swarm = Arc::new(swarm);
    let session = swarm
        .create_session(SessionOptions::new(["Slow1", "Slow2"]).with_max_rounds(100))
        .await
        .unwrap();

    let runner = {
        let swarm = Arc::clone(&swarm);
        let session = Arc::clone(&session);
        tokio::spawn(async move { swarm.run_group_chat(&session, Some("go")).await })
    };

    tokio::time::sleep(Duration::from_millis(70)).await;
    swarm.request_stop(session.id()).await.unwrap();

    let summary = runner.await.unwrap().unwrap();
    assert_eq!(summary.stop_reason, StopReason::StopRequested);
    assert!(summary.turns >= 1 && summary.turns < 100);
    assert_eq!(session.history().await.len(), summary.turns + 1);
}

#[tokio::test]
async fn test_invocation_failure_keeps_recorded_turns() {
    let mut swarm = Swarm::new();
    swarm.register_agent(echo("Planner", "planner")).unwrap();
    swarm
        .register_agent(Agent::new(
            "Builder",
            "executor",
            Arc::new(FnAgentHandle::from_fn(|_, ctx| {
                Err(InvocationError::failed(ctx.agent_name.clone(), "503 service unavailable"))
            })),
        ))
        .unwrap();
    let session = swarm
        .create_session(
            SessionOptions::new(["Planner", "Builder"])
                .with_session_id("fail-run")
                .with_routing(RoutingRules::role_based(
                    [("user", "Planner"), ("planner", "Builder")],
                    None,
                )),
        )
        .await
        .unwrap();

    let err = swarm.run_group_chat(&session, Some("plan")).await.unwrap_err();
    match err {
        SwarmError::Invocation {
            session_id,
            agent,
            source,
        } => {
            assert_eq!(session_id.as_deref(), Some("fail-run"));
            assert_eq!(agent, "Builder");
            assert!(source.to_string().contains("503"));
        }
        other => panic!("expected invocation error, got {:?}", other),
    }

    let state = session.snapshot().await;
    assert_eq!(state.history.len(), 2);
    assert_eq!(state.round, 1);
    assert_eq!(state.history[1].speaker(), "Planner");
}

#[tokio::test]
async fn test_missing_transition_is_routing_error() {
    let mut swarm = Swarm::new();
    swarm.register_agent(echo("Planner", "planner")).unwrap();
    let session = swarm
        .create_session(
            SessionOptions::new(["Planner"])
                .with_routing(RoutingRules::role_based([("planner", "Planner")], None)),
        )
        .await
        .unwrap();

    let err = swarm.run_group_chat(&session, Some("go")).await.unwrap_err();
    assert!(matches!(err, SwarmError::Routing { .. }));
    assert_eq!(session.history().await.len(), 1);
    assert_eq!(session.round().await, 0);
}

#[tokio::test]
async fn test_custom_router_can_end_the_run() {
    let mut swarm = Swarm::new();
    swarm
        .register_agents([echo("Writer", "writer"), echo("Editor", "editor")])
        .unwrap();
    let session = swarm
        .create_session(
            SessionOptions::new(["Writer", "Editor"]).with_routing(RoutingRules::custom(
                |history, _shared| match history.last().map(|m| m.speaker()) {
                    Some("Writer") => Some("Editor".to_string()),
                    Some("Editor") => None,
                    _ => Some("Writer".to_string()),
                },
            )),
        )
        .await
        .unwrap();

    let summary = swarm.run_group_chat(&session, Some("draft")).await.unwrap();
    assert_eq!(summary.stop_reason, StopReason::NoNextSpeaker);
    assert_eq!(summary.turns, 2);
}

#[tokio::test]
async fn test_run_without_history_needs_prompt() {
    let mut swarm = Swarm::new();
    swarm.register_agent(echo("Solo", "solo")).unwrap();
    let session = swarm.create_session(SessionOptions::new(["Solo"])).await.unwrap();

    let err = swarm.run_group_chat(&session, None).await.unwrap_err();
    assert!(matches!(err, SwarmError::Configuration(_)));
}

#[tokio::test]
async fn test_agents_see_history_snapshot_and_user_name() {
    let mut swarm = Swarm::new();
    swarm
        .register_agent(Agent::new(
            "Counter",
            "counter",
            Arc::new(FnAgentHandle::from_fn(|_, ctx| {
                Ok(format!(
                    "{} messages, first from {}",
                    ctx.history.len(),
                    ctx.history[0].speaker()
                ))
            })),
        ))
        .unwrap();
    let session = swarm
        .create_session(SessionOptions::new(["Counter"]).with_max_rounds(2))
        .await
        .unwrap();

    swarm
        .run_group_chat_as(&session, Some("count"), "alice")
        .await
        .unwrap();

    let history = session.history().await;
    assert_eq!(history[1].content, "1 messages, first from alice");
    assert_eq!(history[2].content, "2 messages, first from alice");
}

#[tokio::test]
async fn test_events_follow_turn_order() {
    let recorder = Arc::new(Recorder::default());
    let mut swarm = Swarm::new().with_event_handler(recorder.clone());
    swarm.register_agent(echo("Solo", "solo")).unwrap();
    let session = swarm
        .create_session(SessionOptions::new(["Solo"]).with_session_id("ev").with_max_rounds(1))
        .await
        .unwrap();

    swarm.run_group_chat(&session, Some("hi")).await.unwrap();

    let events = recorder.events.lock().unwrap().clone();
    assert_eq!(events.len(), 5);
    assert!(matches!(events[0], SwarmEvent::SessionCreated { .. }));
    assert!(matches!(events[1], SwarmEvent::RunStarted { seeded: true, .. }));
    assert!(matches!(events[2], SwarmEvent::TurnStarted { round: 1, .. }));
    assert!(matches!(events[3], SwarmEvent::TurnCompleted { round: 1, .. }));
    assert_eq!(
        events[4],
        SwarmEvent::RunCompleted {
            session_id: "ev".to_string(),
            turns: 1,
            reason: StopReason::MaxRounds,
        }
    );
}

#[tokio::test]
async fn test_independent_sessions_run_concurrently() {
    let mut swarm = Swarm::new();
    swarm
        .register_agents([echo("Ping", "a"), echo("Pong", "b")])
        .unwrap();
    let swarm = Arc::new(swarm);

    let mut handles = Vec::new();
    for topic in ["alpha", "beta", "gamma"] {
        let swarm = Arc::clone(&swarm);
        handles.push(tokio::spawn(async move {
            let session = swarm
                .create_session(SessionOptions::new(["Ping", "Pong"]).with_max_rounds(3))
                .await?;
            swarm.run_group_chat(&session, Some(topic)).await?;
            Ok::<_, SwarmError>(session.history().await)
        }));
    }

    for (handle, topic) in handles.into_iter().zip(["alpha", "beta", "gamma"]) {
        let history = handle.await.unwrap().unwrap();
        assert_eq!(history.len(), 4);
        assert!(history.iter().all(|m| m.content.contains(topic)));
    }
    assert_eq!(swarm.session_ids().await.len(), 3);
}

struct MockClient {
    response: String,
    seen: Mutex<Vec<Message>>,
}

#[async_trait]
impl ClientWrapper for MockClient {
    async fn send_message(
        &self,
        messages: &[Message],
    ) -> Result<Message, Box<dyn std::error::Error + Send + Sync>> {
        self.seen.lock().unwrap().extend_from_slice(messages);
        Ok(Message::new(Role::Assistant, self.response.clone()))
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}

#[tokio::test]
async fn test_model_backed_agent_receives_instructions() {
    let client = Arc::new(MockClient {
        response: "Plan ready".to_string(),
        seen: Mutex::new(Vec::new()),
    });
    let config = AgentConfig::new("Planner", "planner")
        .with_instructions("Break the request into steps.")
        .with_model("mock");

    let mut swarm = Swarm::new();
    swarm
        .register_agent(Agent::with_client(config, client.clone()))
        .unwrap();
    let session = swarm
        .create_session(SessionOptions::new(["Planner"]).with_max_rounds(1))
        .await
        .unwrap();

    swarm.run_group_chat(&session, Some("Build a CLI")).await.unwrap();

    let seen = client.seen.lock().unwrap().clone();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].role, Role::System);
    assert_eq!(seen[0].content, "Break the request into steps.");
    assert_eq!(seen[1].content, "Build a CLI");
    assert_eq!(session.history().await[1].content, "Plan ready");
}
