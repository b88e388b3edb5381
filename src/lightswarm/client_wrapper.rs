//! A ClientWrapper is a wrapper around a specific model service.
//! It provides the narrow interface the swarm needs from a model client:
//! send a list of messages, get one reply back.
//! It does not keep track of the conversation; the session history lives in the
//! swarm and the [`LlmAgentHandle`](crate::agent::LlmAgentHandle) decides what
//! to send on each turn.

use async_trait::async_trait;
use std::error::Error;
use std::sync::Mutex;

use crate::message::Role;

/// How many tokens were spent on prompt vs. completion.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub total_tokens: usize,
}

/// Represents a generic message to be sent to a model.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    /// The role associated with the message.
    pub role: Role,
    /// The actual content of the message.
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Trait defining the interface to interact with a model service.
#[async_trait]
pub trait ClientWrapper: Send + Sync {
    /// Send the messages to the model and get a response.
    async fn send_message(
        &self,
        messages: &[Message],
    ) -> Result<Message, Box<dyn Error + Send + Sync>>;

    /// Model identifier, used in logs.
    fn model_name(&self) -> &str;

    /// Hook to retrieve usage from the *last* send_message() call.
    /// Default impl reads [`usage_slot`](ClientWrapper::usage_slot).
    fn get_last_usage(&self) -> Option<TokenUsage> {
        self.usage_slot()
            .and_then(|slot| slot.lock().ok().and_then(|u| u.clone()))
    }

    fn usage_slot(&self) -> Option<&Mutex<Option<TokenUsage>>> {
        // Implementations supporting TokenUsage tracking override this.
        None
    }
}
