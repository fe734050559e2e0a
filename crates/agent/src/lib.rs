//! Tool-calling agent core
//!
//! Flattens the tools of every live provider session into one catalog and
//! drives the model through a bounded prompt-to-answer turn.

use std::time::Duration;
use thiserror::Error;

use relay_mcp::McpError;
use relay_provider::ProviderError;

pub mod catalog;
pub mod context;
pub mod loop_agent;
pub mod normalize;

pub use catalog::{ToolCatalog, ToolDescriptor};
pub use context::Conversation;
pub use loop_agent::{AgentLoop, Turn, TurnLimits};
pub use normalize::{ArgumentNormalizer, NormalizeError};

/// Agent errors
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("TOOL NAME COLLISION: '{name}' advertised by {providers:?}")]
    ToolNameCollision { name: String, providers: Vec<String> },

    #[error("TOOL LISTING FAILED FOR '{provider}': {source}")]
    ToolListing {
        provider: String,
        #[source]
        source: McpError,
    },

    #[error("TOOL NOT FOUND: {0}")]
    ToolNotFound(String),

    #[error("TOOL INVOCATION FAILED: {0}")]
    ToolInvocation(String),

    #[error(transparent)]
    Normalize(#[from] NormalizeError),

    #[error("MODEL INFERENCE FAILED: {0}")]
    Provider(#[from] ProviderError),

    #[error("MODEL DID NOT ANSWER WITHIN {after:?}")]
    ModelTimeout { after: Duration },

    #[error("TURN BUDGET EXCEEDED: {limit} inferences requested tools")]
    TurnBudgetExceeded { limit: u32 },

    #[error("TURN TIMED OUT AFTER {after:?}")]
    TurnTimeout { after: Duration },

    #[error("TURN CANCELLED")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, AgentError>;
