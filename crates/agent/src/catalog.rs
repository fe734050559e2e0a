//! Tool catalog
//!
//! One flat, case-insensitive view over the tools of every live session.

use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, info};

use relay_mcp::{CallToolResult, McpError, Supervisor, ToolSession};
use relay_provider::Tool;

use crate::{AgentError, Result};

/// A tool and the session that serves it
pub struct ToolDescriptor<'s> {
    /// Name as advertised by the provider
    pub name: String,
    pub provider: String,
    pub session: &'s dyn ToolSession,
    pub schema: Tool,
}

impl<'s> ToolDescriptor<'s> {
    /// Invoke through the owning session, using the advertised name
    pub async fn call(&self, arguments: Value) -> std::result::Result<CallToolResult, McpError> {
        self.session.call_tool(&self.name, arguments).await
    }
}

impl std::fmt::Debug for ToolDescriptor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDescriptor")
            .field("name", &self.name)
            .field("provider", &self.provider)
            .finish()
    }
}

/// Tools keyed by lower-cased name, kept in provider then advertised order
#[derive(Debug, Default)]
pub struct ToolCatalog<'s> {
    tools: Vec<ToolDescriptor<'s>>,
    index: HashMap<String, usize>,
}

impl<'s> ToolCatalog<'s> {
    /// List every session's tools and merge them.
    ///
    /// Fails if any listing fails, or if two tools share a name ignoring case.
    pub async fn build<I>(sessions: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'s dyn ToolSession>,
    {
        let sessions: Vec<&'s dyn ToolSession> = sessions.into_iter().collect();
        let mut catalog = ToolCatalog::default();

        for session in sessions {
            let provider = session.provider().to_string();
            let advertised = session
                .list_tools()
                .await
                .map_err(|source| AgentError::ToolListing {
                    provider: provider.clone(),
                    source,
                })?;
            debug!("{}: {} tool(s)", provider, advertised.len());

            for tool in advertised {
                let key = tool.name.to_lowercase();
                if let Some(&existing) = catalog.index.get(&key) {
                    return Err(AgentError::ToolNameCollision {
                        name: tool.name,
                        providers: vec![catalog.tools[existing].provider.clone(), provider],
                    });
                }

                let schema = Tool::new(
                    &tool.name,
                    tool.description.clone().unwrap_or_default(),
                    tool.input_schema.clone(),
                );
                catalog.index.insert(key, catalog.tools.len());
                catalog.tools.push(ToolDescriptor {
                    name: tool.name,
                    provider: provider.clone(),
                    session,
                    schema,
                });
            }
        }

        info!("tool catalog ready: {} tool(s)", catalog.len());
        Ok(catalog)
    }

    /// Catalog over every session a supervisor holds
    pub async fn from_supervisor(supervisor: &'s Supervisor) -> Result<Self> {
        Self::build(supervisor.sessions().map(|(_, session)| session)).await
    }

    /// Case-insensitive lookup
    pub fn resolve(&self, name: &str) -> Option<&ToolDescriptor<'s>> {
        self.index
            .get(&name.to_lowercase())
            .map(|&i| &self.tools[i])
    }

    /// Model-facing tool schemas
    pub fn definitions(&self) -> Vec<Tool> {
        self.tools.iter().map(|t| t.schema.clone()).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ToolDescriptor<'s>> {
        self.tools.iter()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
