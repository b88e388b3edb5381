//! Group-chat runner.
//!
//! Drives one session turn by turn until a termination check fires:
//!
//! ```text
//! Idle ──(termination check)──> Routing ──> Prompting ──> Invoking ──> Recording ─┐
//!  ^                                                                              │
//!  └──────────────────────────────────────────────────────────────────────────────┘
//!       any check fires, or the router names nobody ──> Terminated
//! ```
//!
//! The session state lock is held for the synchronous phases only; it is
//! released while the agent is invoked, so shared-state updates from other
//! tasks land between turns. The session run lock is held for the whole run.

use crate::agent::InvocationContext;
use crate::error::SwarmError;
use crate::event::SwarmEvent;
use crate::message::ChatMessage;
use crate::session::Session;
use crate::termination::{StopReason, Termination};
use crate::Swarm;

/// Outcome of a group-chat run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub session_id: String,
    /// Agent turns recorded during this run.
    pub turns: usize,
    /// Session round counter after the run.
    pub round: usize,
    pub stop_reason: StopReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TurnPhase {
    Idle,
    Routing,
    Prompting,
    Invoking,
    Recording,
    Terminated,
}

pub(crate) struct GroupChatRunner<'a> {
    swarm: &'a Swarm,
    session: &'a Session,
    phase: TurnPhase,
}

impl<'a> GroupChatRunner<'a> {
    pub(crate) fn new(swarm: &'a Swarm, session: &'a Session) -> Self {
        Self {
            swarm,
            session,
            phase: TurnPhase::Idle,
        }
    }

    fn enter(&mut self, phase: TurnPhase) {
        log::trace!(
            "session {}: {:?} -> {:?}",
            self.session.id(),
            self.phase,
            phase
        );
        self.phase = phase;
    }

    pub(crate) async fn run(
        mut self,
        initial_prompt: Option<&str>,
        user_name: &str,
    ) -> Result<RunSummary, SwarmError> {
        let session = self.session;
        let session_id = session.id().to_string();
        let _run = session.acquire_run().await;

        let start_round = {
            let mut state = session.lock_state().await;
            if state.stop_requested() {
                log::info!("session {}: stop already requested, nothing to run", session_id);
                let summary = RunSummary {
                    session_id: session_id.clone(),
                    turns: 0,
                    round: state.round,
                    stop_reason: StopReason::StopRequested,
                };
                drop(state);
                self.enter(TurnPhase::Terminated);
                self.swarm
                    .emit(SwarmEvent::RunCompleted {
                        session_id,
                        turns: 0,
                        reason: StopReason::StopRequested,
                    })
                    .await;
                return Ok(summary);
            }

            if let Some(prompt) = initial_prompt {
                state.history.push(
                    ChatMessage::user(prompt)
                        .with_name(user_name)
                        .with_metadata("seed", "true"),
                );
            }
            if state.history.is_empty() {
                return Err(SwarmError::config(format!(
                    "session {} has no history; an initial prompt is required",
                    session_id
                )));
            }
            state.round
        };

        log::info!(
            "session {}: group chat starting at round {} with {} participants",
            session_id,
            start_round,
            session.participants().len()
        );
        self.swarm
            .emit(SwarmEvent::RunStarted {
                session_id: session_id.clone(),
                round: start_round,
                seeded: initial_prompt.is_some(),
            })
            .await;

        let termination = Termination {
            condition: session.termination_condition.as_ref(),
            stop_tokens: &session.auto_stop_tokens,
        };
        let mut turns = 0;

        let stop_reason = loop {
            self.enter(TurnPhase::Idle);
            let (speaker, prompt, context, round) = {
                let mut state = session.lock_state().await;
                if let Some(reason) = termination.evaluate(&mut state, self.swarm) {
                    break reason;
                }

                self.enter(TurnPhase::Routing);
                let speaker = match session.routing.next_speaker(&state, session.participants()) {
                    Ok(Some(agent)) => agent.clone(),
                    Ok(None) => break StopReason::NoNextSpeaker,
                    Err(e) => {
                        log::error!("session {}: {}", session_id, e);
                        return Err(e);
                    }
                };

                self.enter(TurnPhase::Prompting);
                let last = state.last_message().cloned();
                let prompt = match &session.prompt_builder {
                    Some(builder) => builder(speaker.name(), last.as_ref(), &mut *state),
                    None => last.map(|m| m.content).unwrap_or_default(),
                };
                let context = InvocationContext {
                    session_id: Some(session_id.clone()),
                    agent_name: speaker.name().to_string(),
                    agent_role: speaker.role().to_string(),
                    task_id: None,
                    history: state.history.clone(),
                    shared_state: state.shared_state.clone(),
                };
                (speaker, prompt, context, state.round + 1)
            };

            self.enter(TurnPhase::Invoking);
            log::info!(
                "session {} round {}: {} is speaking",
                session_id,
                round,
                speaker.name()
            );
            self.swarm
                .emit(SwarmEvent::TurnStarted {
                    session_id: session_id.clone(),
                    round,
                    agent: speaker.name().to_string(),
                })
                .await;

            let reply = match speaker.invoke(&prompt, &context).await {
                Ok(reply) => reply,
                Err(source) => {
                    log::error!(
                        "session {} round {}: {} failed: {}",
                        session_id,
                        round,
                        speaker.name(),
                        source
                    );
                    self.swarm
                        .emit(SwarmEvent::TurnFailed {
                            session_id: session_id.clone(),
                            round,
                            agent: speaker.name().to_string(),
                            error: source.to_string(),
                        })
                        .await;
                    return Err(SwarmError::Invocation {
                        session_id: Some(session_id),
                        agent: speaker.name().to_string(),
                        source,
                    });
                }
            };

            self.enter(TurnPhase::Recording);
            let response_length = reply.content.len();
            {
                let mut state = session.lock_state().await;
                state
                    .history
                    .push(reply.with_metadata("round", round.to_string()));
                state.round += 1;
            }
            turns += 1;
            self.swarm
                .emit(SwarmEvent::TurnCompleted {
                    session_id: session_id.clone(),
                    round,
                    agent: speaker.name().to_string(),
                    response_length,
                })
                .await;
        };

        self.enter(TurnPhase::Terminated);
        let round = session.round().await;
        log::info!(
            "session {}: group chat finished after {} turns ({})",
            session_id,
            turns,
            stop_reason
        );
        self.swarm
            .emit(SwarmEvent::RunCompleted {
                session_id: session_id.clone(),
                turns,
                reason: stop_reason.clone(),
            })
            .await;

        Ok(RunSummary {
            session_id,
            turns,
            round,
            stop_reason,
        })
    }
}
