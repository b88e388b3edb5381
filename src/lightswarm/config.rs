//! Configuration for LightSwarm.
//!
//! Provides [`SwarmConfig`] for swarm-wide defaults and [`AgentConfig`], the
//! configuration bundle an agent is built from. Users construct these however
//! they want; `AgentConfig` derives serde so it can also be deserialized from
//! any format the application already uses. No config-file format is imposed.
//!
//! # Example
//!
//! ```rust
//! use lightswarm::config::{AgentConfig, SwarmConfig};
//!
//! let swarm_config = SwarmConfig {
//!     default_max_rounds: 6,
//!     ..SwarmConfig::default()
//! };
//!
//! let planner = AgentConfig::new("Planner", "planner")
//!     .with_instructions("Break the request into steps.")
//!     .with_model("gpt-4o-mini");
//! assert_eq!(planner.role, "planner");
//! ```

use crate::error::SwarmError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Swarm-wide defaults.
#[derive(Debug, Clone)]
pub struct SwarmConfig {
    /// Speaker name given to the seed user message when a run does not
    /// supply one.
    pub default_user_name: String,

    /// Round limit applied to sessions created without an explicit
    /// `max_rounds`.
    pub default_max_rounds: usize,

    /// Upper bound on concurrently running tasks inside one task-graph
    /// frontier. `None` runs the whole frontier at once.
    pub max_parallel_tasks: Option<usize>,
}

impl Default for SwarmConfig {
    /// `"user"` as seed speaker, 10 rounds, unbounded task parallelism.
    fn default() -> Self {
        Self {
            default_user_name: "user".to_string(),
            default_max_rounds: 10,
            max_parallel_tasks: None,
        }
    }
}

/// The configuration bundle an agent is constructed from.
///
/// The swarm itself only reads `name` and `role`. Everything else is carried
/// through untouched for the [`AgentHandle`](crate::agent::AgentHandle)
/// implementation that talks to the model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Unique name within a swarm.
    pub name: String,
    /// Free-form role tag used by role-based routing.
    pub role: String,
    /// System instructions for the model.
    #[serde(default)]
    pub instructions: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub log_level: Option<String>,
    #[serde(default)]
    pub log_file: Option<String>,
    /// Tool endpoint settings (e.g. an MCP settings document). Opaque to the
    /// swarm.
    #[serde(default)]
    pub mcp_settings: Option<serde_json::Value>,
}

impl AgentConfig {
    pub fn new(name: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: role.into(),
            ..Self::default()
        }
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_credentials(mut self, api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_debug(mut self, log_level: impl Into<String>, log_file: Option<String>) -> Self {
        self.debug = true;
        self.log_level = Some(log_level.into());
        self.log_file = log_file;
        self
    }

    pub fn with_mcp_settings(mut self, settings: serde_json::Value) -> Self {
        self.mcp_settings = Some(settings);
        self
    }
}

/// Read a tool settings document (such as an MCP settings file) as opaque JSON.
///
/// The document is only checked for being well-formed JSON; its contents are
/// left for the agent handle to interpret.
///
/// ```rust,no_run
/// use lightswarm::config::{load_mcp_settings, AgentConfig};
///
/// let settings = load_mcp_settings("./mcp/settings.json")?;
/// let config = AgentConfig::new("Weather", "assistant").with_mcp_settings(settings);
/// # Ok::<(), lightswarm::error::SwarmError>(())
/// ```
pub fn load_mcp_settings(path: impl AsRef<Path>) -> Result<serde_json::Value, SwarmError> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|e| {
        SwarmError::config(format!("cannot read tool settings {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&raw).map_err(|e| {
        SwarmError::config(format!("tool settings {} are not valid JSON: {}", path.display(), e))
    })
}
