//! Agent System
//!
//! This module provides the [`Agent`] struct registered with a
//! [`Swarm`](crate::Swarm) and the [`AgentHandle`] trait through which the swarm
//! invokes it.
//!
//! The swarm treats an agent as a black box: it hands over a prompt plus an
//! [`InvocationContext`] snapshot of the session and gets a
//! [`ChatMessage`] back, or an [`InvocationError`]. How the reply is produced
//! (a model call, a local function, a remote service) is entirely the handle's
//! business, and so are retries and timeouts.
//!
//! # Core Components
//!
//! - **Agent**: identity (`name`, `role`), the [`AgentConfig`] it was built from, and a handle
//! - **AgentHandle**: the invocation capability, shared as `Arc<dyn AgentHandle>`
//! - **FnAgentHandle**: a handle backed by a Rust closure (local agents, tests)
//! - **LlmAgentHandle**: a handle backed by a [`ClientWrapper`] model client
//!
//! # Example
//!
//! ```rust
//! use lightswarm::agent::{Agent, FnAgentHandle};
//! use std::sync::Arc;
//!
//! let echo = Agent::new(
//!     "Echo",
//!     "assistant",
//!     Arc::new(FnAgentHandle::from_fn(|prompt, _ctx| Ok(format!("echo: {}", prompt)))),
//! );
//! assert_eq!(echo.name(), "Echo");
//! assert_eq!(echo.role(), "assistant");
//! ```

use crate::client_wrapper::{ClientWrapper, Message};
use crate::config::AgentConfig;
use crate::error::InvocationError;
use crate::message::{ChatMessage, Role};
use crate::session::SharedState;
use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Snapshot of the session handed to an agent on each invocation.
///
/// The snapshot is taken right before the call; writes the caller makes to the
/// live session while the call is in flight are not reflected here.
#[derive(Debug, Clone, Default)]
pub struct InvocationContext {
    /// Session the invocation belongs to.
    pub session_id: Option<String>,
    /// Name of the agent being invoked.
    pub agent_name: String,
    /// Role tag of the agent being invoked.
    pub agent_role: String,
    /// Task id when the invocation comes from a task graph.
    pub task_id: Option<String>,
    /// Session history up to (not including) this turn.
    pub history: Vec<ChatMessage>,
    /// Shared state as of this turn.
    pub shared_state: SharedState,
}

/// The invocation capability of an agent.
#[async_trait]
pub trait AgentHandle: Send + Sync {
    /// Produce a reply to `prompt`.
    ///
    /// Implementations should not retry on behalf of the orchestrator unless
    /// that is their configured policy; whatever error they return is
    /// surfaced to the caller of the run.
    async fn invoke(
        &self,
        prompt: &str,
        context: &InvocationContext,
    ) -> Result<ChatMessage, InvocationError>;
}

/// Boxed future returned by [`FnAgentHandle`] closures.
pub type InvocationFuture =
    Pin<Box<dyn Future<Output = Result<ChatMessage, InvocationError>> + Send>>;

type InvokeFn = dyn Fn(String, InvocationContext) -> InvocationFuture + Send + Sync;

/// An [`AgentHandle`] backed by a Rust closure.
///
/// ```rust
/// use lightswarm::agent::FnAgentHandle;
/// use lightswarm::message::ChatMessage;
///
/// // Asynchronous closure
/// let handle = FnAgentHandle::new(|prompt, ctx| {
///     Box::pin(async move {
///         Ok(ChatMessage::assistant(ctx.agent_name, format!("handled: {}", prompt)))
///     })
/// });
///
/// // Synchronous closure returning only the content
/// let handle = FnAgentHandle::from_fn(|prompt, _ctx| Ok(prompt.to_uppercase()));
/// ```
pub struct FnAgentHandle {
    func: Arc<InvokeFn>,
}

impl FnAgentHandle {
    pub fn new<F>(func: F) -> Self
    where
        F: Fn(String, InvocationContext) -> InvocationFuture + Send + Sync + 'static,
    {
        Self {
            func: Arc::new(func),
        }
    }

    /// Wrap a synchronous closure that returns the reply content. The reply is
    /// attributed to the invoked agent.
    pub fn from_fn<F>(func: F) -> Self
    where
        F: Fn(&str, &InvocationContext) -> Result<String, InvocationError> + Send + Sync + 'static,
    {
        let func = Arc::new(func);
        Self::new(move |prompt, ctx| {
            let func = Arc::clone(&func);
            Box::pin(async move {
                let content = func(&prompt, &ctx)?;
                Ok(ChatMessage::assistant(ctx.agent_name.clone(), content))
            })
        })
    }
}

#[async_trait]
impl AgentHandle for FnAgentHandle {
    async fn invoke(
        &self,
        prompt: &str,
        context: &InvocationContext,
    ) -> Result<ChatMessage, InvocationError> {
        (self.func)(prompt.to_string(), context.clone()).await
    }
}

/// An [`AgentHandle`] that forwards each prompt to a model through a
/// [`ClientWrapper`].
///
/// Each invocation sends the agent's instructions as the system message and
/// the turn prompt as the user message. The handle owns the retry and timeout
/// policy: a call that exceeds the timeout surfaces as
/// [`InvocationError::Timeout`], any other client error as
/// [`InvocationError::Failed`], after `max_retries` additional attempts.
pub struct LlmAgentHandle {
    client: Arc<dyn ClientWrapper>,
    instructions: String,
    timeout: Option<Duration>,
    max_retries: usize,
}

impl LlmAgentHandle {
    pub fn new(client: Arc<dyn ClientWrapper>, instructions: impl Into<String>) -> Self {
        Self {
            client,
            instructions: instructions.into(),
            timeout: None,
            max_retries: 0,
        }
    }

    /// Give up on a single attempt after `timeout` (builder pattern).
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Retry failed attempts up to `max_retries` times (builder pattern).
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    fn build_messages(&self, prompt: &str) -> Vec<Message> {
        let mut messages = Vec::with_capacity(2);
        if !self.instructions.is_empty() {
            messages.push(Message::new(Role::System, self.instructions.clone()));
        }
        messages.push(Message::new(Role::User, prompt));
        messages
    }

    async fn attempt(&self, agent: &str, messages: &[Message]) -> Result<Message, InvocationError> {
        let started = Instant::now();
        let call = self.client.send_message(messages);
        let result = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(result) => result,
                Err(_) => {
                    return Err(InvocationError::Timeout {
                        agent: agent.to_string(),
                        elapsed: started.elapsed(),
                    })
                }
            },
            None => call.await,
        };
        result.map_err(|e| InvocationError::failed(agent, e.to_string()))
    }
}

#[async_trait]
impl AgentHandle for LlmAgentHandle {
    async fn invoke(
        &self,
        prompt: &str,
        context: &InvocationContext,
    ) -> Result<ChatMessage, InvocationError> {
        let messages = self.build_messages(prompt);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.attempt(&context.agent_name, &messages).await {
                Ok(reply) => {
                    if let Some(usage) = self.client.get_last_usage() {
                        log::debug!(
                            "'{}' ({}) used {} tokens",
                            context.agent_name,
                            self.client.model_name(),
                            usage.total_tokens
                        );
                    }
                    return Ok(ChatMessage::assistant(context.agent_name.clone(), reply.content));
                }
                Err(e) if attempt <= self.max_retries => {
                    log::warn!(
                        "'{}' attempt {}/{} failed: {}",
                        context.agent_name,
                        attempt,
                        self.max_retries + 1,
                        e
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// An agent registered with a [`Swarm`](crate::Swarm).
///
/// Cloning is cheap: the handle is shared through an `Arc`.
#[derive(Clone)]
pub struct Agent {
    config: AgentConfig,
    handle: Arc<dyn AgentHandle>,
}

impl Agent {
    /// Create an agent from its name, role tag and invocation handle.
    pub fn new(name: impl Into<String>, role: impl Into<String>, handle: Arc<dyn AgentHandle>) -> Self {
        Self::from_config(AgentConfig::new(name, role), handle)
    }

    /// Create an agent from a full configuration bundle.
    pub fn from_config(config: AgentConfig, handle: Arc<dyn AgentHandle>) -> Self {
        Self { config, handle }
    }

    /// Create a model-backed agent whose system prompt is `config.instructions`.
    pub fn with_client(config: AgentConfig, client: Arc<dyn ClientWrapper>) -> Self {
        let handle = LlmAgentHandle::new(client, config.instructions.clone());
        Self::from_config(config, Arc::new(handle))
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn role(&self) -> &str {
        &self.config.role
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Invoke the agent's handle.
    ///
    /// The returned message is normalised: role [`Role::Assistant`] and the
    /// agent's registered name, whatever the handle put there.
    pub async fn invoke(
        &self,
        prompt: &str,
        context: &InvocationContext,
    ) -> Result<ChatMessage, InvocationError> {
        log::debug!("invoking '{}' ({} chars)", self.name(), prompt.len());
        let mut message = self.handle.invoke(prompt, context).await?;
        message.role = Role::Assistant;
        message.name = Some(self.config.name.clone());
        Ok(message)
    }
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.config.name)
            .field("role", &self.config.role)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FlakyClient {
        failures_left: AtomicUsize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ClientWrapper for FlakyClient {
        async fn send_message(
            &self,
            messages: &[Message],
        ) -> Result<Message, Box<dyn Error + Send + Sync>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err("503 service unavailable".into());
            }
            let last = messages.last().map(|m| m.content.clone()).unwrap_or_default();
            Ok(Message::new(Role::Assistant, format!("ack: {}", last)))
        }

        fn model_name(&self) -> &str {
            "flaky"
        }
    }

    struct SlowClient;

    #[async_trait]
    impl ClientWrapper for SlowClient {
        async fn send_message(
            &self,
            _messages: &[Message],
        ) -> Result<Message, Box<dyn Error + Send + Sync>> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Message::new(Role::Assistant, "late"))
        }

        fn model_name(&self) -> &str {
            "slow"
        }
    }

    fn context(name: &str) -> InvocationContext {
        InvocationContext {
            agent_name: name.to_string(),
            agent_role: "assistant".to_string(),
            ..InvocationContext::default()
        }
    }

    #[tokio::test]
    async fn agent_normalises_reply_identity() {
        let handle = FnAgentHandle::new(|_prompt, _ctx| {
            Box::pin(async { Ok(ChatMessage::user("spoofed").with_name("someone-else")) })
        });
        let agent = Agent::new("Builder", "executor", Arc::new(handle));

        let reply = agent.invoke("go", &context("Builder")).await.unwrap();
        assert_eq!(reply.role, Role::Assistant);
        assert_eq!(reply.name.as_deref(), Some("Builder"));
        assert_eq!(reply.content, "spoofed");
    }

    #[tokio::test]
    async fn llm_handle_retries_then_succeeds() {
        let client = Arc::new(FlakyClient {
            failures_left: AtomicUsize::new(2),
            calls: AtomicUsize::new(0),
        });
        let handle = LlmAgentHandle::new(client.clone(), "Be brief.").with_max_retries(2);

        let reply = handle.invoke("ping", &context("Planner")).await.unwrap();
        assert_eq!(reply.content, "ack: ping");
        assert_eq!(client.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn llm_handle_reports_failure_after_retries() {
        let client = Arc::new(FlakyClient {
            failures_left: AtomicUsize::new(5),
            calls: AtomicUsize::new(0),
        });
        let handle = LlmAgentHandle::new(client.clone(), "").with_max_retries(1);

        let err = handle.invoke("ping", &context("Planner")).await.unwrap_err();
        assert!(matches!(err, InvocationError::Failed { ref agent, .. } if agent == "Planner"));
        assert_eq!(client.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn llm_handle_times_out() {
        let handle =
            LlmAgentHandle::new(Arc::new(SlowClient), "").with_timeout(Duration::from_millis(20));

        let err = handle.invoke("ping", &context("Reviewer")).await.unwrap_err();
        assert!(matches!(err, InvocationError::Timeout { .. }));
    }

    #[test]
    fn instructions_become_system_message() {
        let handle = LlmAgentHandle::new(Arc::new(SlowClient), "You review code.");
        let messages = handle.build_messages("Review this");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[1].content, "Review this");
    }
}
