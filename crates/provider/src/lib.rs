//! Model provider interface
//!
//! Chat-completions message types, the [`Provider`] trait the dispatch loop
//! drives, and the [`ModelReply`] classification of each response.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use thiserror::Error;
use tracing::{debug, trace};

pub mod backend;
pub mod compat;

pub use backend::ModelBackend;
pub use compat::ChatCompletionsProvider;

/// Model provider errors
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("REQUEST FAILED: {0}")]
    Request(#[from] reqwest::Error),

    #[error("MALFORMED PAYLOAD: {0}")]
    Json(#[from] serde_json::Error),

    #[error("MODEL REJECTED REQUEST: {0}")]
    Api(String),

    #[error("NO API KEY FOR {0}")]
    NoApiKey(String),

    #[error("CORRUPTED RESPONSE")]
    InvalidResponse,

    #[error("RATE LIMITED")]
    RateLimited,

    #[error("UNKNOWN MODEL PROVIDER '{name}' (supported: {supported})")]
    UnknownBackend { name: String, supported: String },
}

pub type Result<T> = std::result::Result<T, ProviderError>;

/// Tool call requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// Raw model response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default)]
    pub finish_reason: String,
    #[serde(default)]
    pub usage: Usage,
}

impl ChatResponse {
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls: Vec::new(),
            finish_reason: "stop".to_string(),
            usage: Usage::default(),
        }
    }

    pub fn with_tool_calls(content: Option<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            content,
            tool_calls,
            finish_reason: "tool_calls".to_string(),
            usage: Usage::default(),
        }
    }

    /// Classify the response once, at the provider boundary
    pub fn into_reply(self) -> ModelReply {
        trace!(
            finish_reason = %self.finish_reason,
            tool_calls = self.tool_calls.len(),
            "classifying model response"
        );

        if self.tool_calls.is_empty() {
            ModelReply::Final {
                content: self.content.unwrap_or_default(),
            }
        } else {
            ModelReply::ToolCalls {
                content: self.content.filter(|c| !c.is_empty()),
                calls: self.tool_calls,
            }
        }
    }
}

/// What the model asked for
#[derive(Debug, Clone, PartialEq)]
pub enum ModelReply {
    /// Terminal answer, no tools requested
    Final { content: String },
    /// One or more tool calls, in emission order
    ToolCalls {
        content: Option<String>,
        calls: Vec<ToolCall>,
    },
}

impl ModelReply {
    /// Assistant message recording this reply in the conversation
    pub fn to_message(&self) -> Message {
        match self {
            ModelReply::Final { content } => Message::assistant(content.clone()),
            ModelReply::ToolCalls { content, calls } => {
                let defs = calls
                    .iter()
                    .map(|c| ToolCallDef::new(&c.id, &c.name, c.arguments.clone()))
                    .collect();
                Message::assistant_tool_calls(content.clone(), defs)
            }
        }
    }

    pub fn is_final(&self) -> bool {
        matches!(self, ModelReply::Final { .. })
    }
}

/// Token usage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Conversation message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallDef>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }

    pub fn assistant_tool_calls(content: Option<String>, tool_calls: Vec<ToolCallDef>) -> Self {
        Self {
            role: "assistant".to_string(),
            content,
            tool_calls: Some(tool_calls),
            tool_call_id: None,
            name: None,
        }
    }

    pub fn tool(
        call_id: impl Into<String>,
        name: impl Into<String>,
        result: impl Into<String>,
    ) -> Self {
        Self {
            role: "tool".to_string(),
            content: Some(result.into()),
            tool_calls: None,
            tool_call_id: Some(call_id.into()),
            name: Some(name.into()),
        }
    }

    pub fn is_tool_result(&self) -> bool {
        self.role == "tool"
    }

    /// Number of tool calls attached to an assistant message
    pub fn tool_call_count(&self) -> usize {
        self.tool_calls.as_ref().map(Vec::len).unwrap_or(0)
    }
}

/// Tool call as echoed back in an assistant message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallDef {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: String,
    pub function: FunctionCall,
}

impl ToolCallDef {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            call_type: "function".to_string(),
            function: FunctionCall {
                name: name.into(),
                arguments,
            },
        }
    }
}

/// Function invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: Value,
}

/// Tool schema offered to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: FunctionDef,
}

impl Tool {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            tool_type: "function".to_string(),
            function: FunctionDef {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }
}

/// Function schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDef {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Inference request
#[derive(Debug, Clone)]
pub struct ChatParams {
    pub model: String,
    pub messages: Vec<Message>,
    pub tools: Vec<Tool>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub tool_choice: ToolChoice,
}

impl Default for ChatParams {
    fn default() -> Self {
        Self {
            model: String::new(),
            messages: Vec::new(),
            tools: Vec::new(),
            max_tokens: 4096,
            temperature: 0.7,
            tool_choice: ToolChoice::Auto,
        }
    }
}

/// Tool selection mode
#[derive(Debug, Clone)]
pub enum ToolChoice {
    Auto,
    Required(String),
    None,
}

/// A model that can answer a message sequence, optionally requesting tools
#[async_trait]
pub trait Provider: Send + Sync {
    async fn chat(&self, params: ChatParams) -> Result<ChatResponse>;
    fn default_model(&self) -> String;
    fn is_configured(&self) -> bool;
}

/// Log a one-line summary of an outgoing request
pub(crate) fn log_request(params: &ChatParams) {
    debug!(
        model = %params.model,
        messages = params.messages.len(),
        tools = params.tools.len(),
        "sending chat request"
    );
}
