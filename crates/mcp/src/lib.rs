//! Capability-provider sessions
//!
//! Launches MCP servers as subprocesses, speaks the stdio protocol to them, and
//! supervises the whole set as one scoped resource.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

pub mod launch;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod supervisor;

pub use launch::{CapabilityProviderSpec, EnvOverlay};
pub use protocol::{CallToolResult, Content, RemoteTool};
pub use registry::CapabilityRegistry;
pub use session::{SessionOptions, StdioSession};
pub use supervisor::{Connector, StdioConnector, Supervisor};

/// Session-level errors
#[derive(Error, Debug)]
pub enum McpError {
    #[error("FAILED TO SPAWN '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("CHANNEL I/O ERROR: {0}")]
    Io(#[from] std::io::Error),

    #[error("MALFORMED MESSAGE: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TIMED OUT AFTER {after:?} WAITING FOR {method}")]
    Timeout { method: String, after: Duration },

    #[error("PROVIDER ERROR {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("PROVIDER CLOSED THE CHANNEL")]
    Closed,

    #[error("PROTOCOL VIOLATION: {0}")]
    Protocol(String),
}

impl McpError {
    /// Whether the provider was slow rather than unreachable or broken
    pub fn is_timeout(&self) -> bool {
        matches!(self, McpError::Timeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, McpError>;

/// Acquisition errors; both abort the whole acquisition
#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("PROVIDER '{name}' FAILED TO LAUNCH: {source}")]
    Launch {
        name: String,
        #[source]
        source: McpError,
    },

    #[error("PROVIDER '{name}' FAILED HANDSHAKE: {source}")]
    Handshake {
        name: String,
        #[source]
        source: McpError,
    },
}

impl SupervisorError {
    /// Name of the provider that failed
    pub fn provider(&self) -> &str {
        match self {
            SupervisorError::Launch { name, .. } | SupervisorError::Handshake { name, .. } => name,
        }
    }

    pub fn cause(&self) -> &McpError {
        match self {
            SupervisorError::Launch { source, .. } | SupervisorError::Handshake { source, .. } => {
                source
            }
        }
    }
}

/// A live, handshaken channel to one capability provider.
///
/// Implementations serialize requests internally: callers may hold a shared
/// reference and still never have two requests in flight on one session.
#[async_trait]
pub trait ToolSession: Send + Sync {
    /// Name of the provider spec this session was started from
    fn provider(&self) -> &str;

    /// Every tool the provider advertises, following pagination
    async fn list_tools(&self) -> Result<Vec<RemoteTool>>;

    /// Invoke one tool by its advertised name
    async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult>;

    /// Close the channel and terminate the provider. Never fails; problems are logged.
    async fn shutdown(&self);
}
