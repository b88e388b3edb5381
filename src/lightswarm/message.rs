//! Conversation messages recorded in a session's history.
//!
//! Every seed prompt and every agent reply flowing through a
//! [`Session`](crate::session::Session) is captured as a [`ChatMessage`]. The
//! struct carries speaker identity and timing alongside the text so that a
//! history can be exported with serde and replayed or audited later.
//!
//! # Examples
//!
//! ```
//! use lightswarm::message::{ChatMessage, Role};
//!
//! let seed = ChatMessage::user("Plan a FastAPI service").with_name("alice");
//! assert_eq!(seed.role, Role::User);
//! assert_eq!(seed.speaker(), "alice");
//!
//! let reply = ChatMessage::assistant("Planner", "Step 1: ...")
//!     .with_metadata("round", "1");
//! assert_eq!(reply.metadata["round"], "1");
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Represents the possible roles for a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Set by the developer to steer the responses.
    System,
    /// A message sent by a human user (or the application acting as one).
    User,
    /// A message produced by an agent.
    Assistant,
}

impl Role {
    /// Lowercase label used in logs and as the routing key of the seed turn.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A single message in a session history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Conversation role of the message.
    pub role: Role,

    /// Speaker name. Agent replies always carry the agent's registered name once
    /// recorded; user messages carry the configured user name.
    pub name: Option<String>,

    /// The message body.
    pub content: String,

    /// UTC timestamp recorded when the message was created.
    pub timestamp: DateTime<Utc>,

    /// Free-form key-value metadata.
    ///
    /// The group-chat runner populates:
    /// - `"round"`: the round number an agent reply was recorded in
    /// - `"seed"`: `"true"` on the initial user prompt
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl ChatMessage {
    /// Create a message with the given role and content but no speaker name.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            name: None,
            content: content.into(),
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    /// Create a user-role message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create an assistant-role message attributed to a named agent.
    pub fn assistant(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content).with_name(name)
    }

    /// Set the speaker name (builder pattern).
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Attach a key-value metadata pair (builder pattern).
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// The speaker name, falling back to the role label when no name is set.
    pub fn speaker(&self) -> &str {
        self.name.as_deref().unwrap_or_else(|| self.role.as_str())
    }

    /// Whether the content contains `token` as a substring.
    pub fn contains(&self, token: &str) -> bool {
        self.content.contains(token)
    }
}
