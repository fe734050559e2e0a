//! Shared fakes for agent tests

#![allow(dead_code)]

use async_trait::async_trait;
use mockall::mock;
use relay_mcp::{
    CallToolResult, CapabilityProviderSpec, Connector, McpError, RemoteTool, SupervisorError,
    ToolSession,
};
use relay_provider::{ChatParams, ChatResponse, Provider, ProviderError};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;

mock! {
    pub Provider {}

    #[async_trait]
    impl Provider for Provider {
        async fn chat(&self, params: ChatParams) -> Result<ChatResponse, ProviderError>;
        fn default_model(&self) -> String;
        fn is_configured(&self) -> bool;
    }
}

/// Shared record of calls and shutdowns across fake sessions
pub type Journal = Arc<Mutex<Vec<String>>>;

/// In-memory provider session with scripted tools
pub struct FakeSession {
    pub name: String,
    pub tools: Vec<String>,
    pub journal: Journal,
}

impl FakeSession {
    pub fn new(name: &str, tools: &[&str], journal: &Journal) -> Self {
        Self {
            name: name.to_string(),
            tools: tools.iter().map(|t| t.to_string()).collect(),
            journal: journal.clone(),
        }
    }
}

#[async_trait]
impl ToolSession for FakeSession {
    fn provider(&self) -> &str {
        &self.name
    }

    async fn list_tools(&self) -> relay_mcp::Result<Vec<RemoteTool>> {
        Ok(self
            .tools
            .iter()
            .map(|t| RemoteTool::new(t.as_str(), format!("{} tool", t), json!({"type": "object"})))
            .collect())
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> relay_mcp::Result<CallToolResult> {
        self.journal
            .lock()
            .unwrap()
            .push(format!("call {} {}", name, arguments));

        match name {
            "explode" => Err(McpError::Closed),
            "fail" => Ok(CallToolResult::error("ENOENT: no such file")),
            "slow" => Err(McpError::Timeout {
                method: "tools/call".to_string(),
                after: Duration::from_secs(60),
            }),
            _ => Ok(CallToolResult::text(format!("{} ok", name))),
        }
    }

    async fn shutdown(&self) {
        self.journal
            .lock()
            .unwrap()
            .push(format!("shutdown {}", self.name));
    }
}

/// Connector handing out fake sessions with the listed tools per provider
pub struct FakeConnector {
    pub tools: Vec<(String, Vec<String>)>,
    pub journal: Journal,
}

impl FakeConnector {
    pub fn new(journal: &Journal) -> Self {
        Self {
            tools: Vec::new(),
            journal: journal.clone(),
        }
    }

    pub fn provider(mut self, name: &str, tools: &[&str]) -> Self {
        self.tools
            .push((name.to_string(), tools.iter().map(|s| s.to_string()).collect()));
        self
    }

    pub fn specs(&self) -> Vec<CapabilityProviderSpec> {
        self.tools
            .iter()
            .map(|(name, _)| CapabilityProviderSpec::new(name.as_str(), "fake"))
            .collect()
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(
        &self,
        spec: &CapabilityProviderSpec,
    ) -> Result<Box<dyn ToolSession>, SupervisorError> {
        let tools = self
            .tools
            .iter()
            .find(|(name, _)| name == spec.name())
            .map(|(_, tools)| tools.clone())
            .unwrap_or_default();

        Ok(Box::new(FakeSession {
            name: spec.name().to_string(),
            tools,
            journal: self.journal.clone(),
        }))
    }
}

pub fn entries(journal: &Journal) -> Vec<String> {
    journal.lock().unwrap().clone()
}
