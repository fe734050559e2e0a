//! MCP stdio wire format
//!
//! JSON-RPC 2.0 messages, one per line, over the provider's stdin/stdout.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{McpError, Result};

pub const JSONRPC_VERSION: &str = "2.0";

/// Protocol revision offered during `initialize`
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// JSON-RPC "method not found"
pub const METHOD_NOT_FOUND: i64 = -32601;

/// Client-to-provider request
#[derive(Debug, Clone, Serialize)]
pub struct Request {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Request {
    pub fn new(id: u64, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            method: method.into(),
            params,
        }
    }
}

/// Fire-and-forget message
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub jsonrpc: &'static str,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Notification {
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            method: method.into(),
            params,
        }
    }
}

/// Error object carried by a response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl From<RpcError> for McpError {
    fn from(err: RpcError) -> Self {
        McpError::Rpc {
            code: err.code,
            message: err.message,
        }
    }
}

/// Anything a provider may write to stdout
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    Response {
        id: Option<u64>,
        outcome: std::result::Result<Value, RpcError>,
    },
    /// Response whose error object could not be read
    Malformed { id: Option<u64>, reason: String },
    /// Provider-initiated request; `id` is echoed back verbatim
    Request {
        id: Value,
        method: String,
        params: Option<Value>,
    },
    Notification {
        method: String,
        params: Option<Value>,
    },
}

/// Serialize a message as one protocol line (newline included)
pub fn encode<T: Serialize>(message: &T) -> Result<String> {
    let mut line = serde_json::to_string(message)?;
    line.push('\n');
    Ok(line)
}

/// Classify one line read from a provider
pub fn decode(line: &str) -> Result<Incoming> {
    let value: Value = serde_json::from_str(line.trim())?;
    let obj = value
        .as_object()
        .ok_or_else(|| McpError::Protocol("message is not a JSON object".to_string()))?;

    if let Some(method) = obj.get("method").and_then(Value::as_str) {
        let params = obj.get("params").cloned();
        return Ok(match obj.get("id") {
            Some(id) if !id.is_null() => Incoming::Request {
                id: id.clone(),
                method: method.to_string(),
                params,
            },
            _ => Incoming::Notification {
                method: method.to_string(),
                params,
            },
        });
    }

    if !obj.contains_key("id") {
        return Err(McpError::Protocol(
            "message has neither method nor id".to_string(),
        ));
    }

    let id = obj.get("id").and_then(Value::as_u64);
    let outcome = match obj.get("error") {
        Some(err) if !err.is_null() => match serde_json::from_value::<RpcError>(err.clone()) {
            Ok(err) => Err(err),
            Err(e) => {
                return Ok(Incoming::Malformed {
                    id,
                    reason: format!("unreadable error object {}: {}", err, e),
                })
            }
        },
        _ => Ok(obj.get("result").cloned().unwrap_or(Value::Null)),
    };

    Ok(Incoming::Response { id, outcome })
}

/// Reply to a provider-initiated request
pub fn reply_to(id: &Value, method: &str) -> Value {
    if method == "ping" {
        json!({ "jsonrpc": JSONRPC_VERSION, "id": id, "result": {} })
    } else {
        json!({
            "jsonrpc": JSONRPC_VERSION,
            "id": id,
            "error": { "code": METHOD_NOT_FOUND, "message": format!("method not supported: {}", method) }
        })
    }
}

/// `initialize` parameters
pub fn initialize_params(client_name: &str, client_version: &str) -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {},
        "clientInfo": { "name": client_name, "version": client_version }
    })
}

/// Provider or client identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Implementation {
    pub name: String,
    #[serde(default)]
    pub version: String,
}

/// `initialize` result
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    pub protocol_version: String,
    #[serde(default)]
    pub capabilities: Value,
    #[serde(default)]
    pub server_info: Option<Implementation>,
}

/// Tool advertised by a provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteTool {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "empty_schema")]
    pub input_schema: Value,
}

impl RemoteTool {
    pub fn new(name: impl Into<String>, description: impl Into<String>, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: Some(description.into()),
            input_schema,
        }
    }
}

fn empty_schema() -> Value {
    json!({ "type": "object", "properties": {} })
}

/// One page of `tools/list`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolsListResult {
    #[serde(default)]
    pub tools: Vec<RemoteTool>,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

/// Content block in a tool result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Content {
    Text {
        text: String,
    },
    Image {
        #[serde(rename = "mimeType", default)]
        mime_type: String,
    },
    Resource {
        resource: Value,
    },
    #[serde(other)]
    Unsupported,
}

/// `tools/call` result
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    #[serde(default)]
    pub content: Vec<Content>,
    #[serde(default)]
    pub is_error: bool,
}

impl CallToolResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![Content::Text { text: text.into() }],
            is_error: false,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            content: vec![Content::Text { text: text.into() }],
            is_error: true,
        }
    }

    /// Flatten the content blocks into plain text for the model
    pub fn render(&self) -> String {
        let parts: Vec<String> = self
            .content
            .iter()
            .map(|block| match block {
                Content::Text { text } => text.clone(),
                Content::Image { mime_type } => format!("[image: {}]", mime_type),
                Content::Resource { resource } => resource
                    .get("text")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .or_else(|| {
                        resource
                            .get("uri")
                            .and_then(Value::as_str)
                            .map(|uri| format!("[resource: {}]", uri))
                    })
                    .unwrap_or_else(|| resource.to_string()),
                Content::Unsupported => "[unsupported content]".to_string(),
            })
            .collect();

        parts.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_request_is_one_line() {
        let line = encode(&Request::new(7, "tools/list", None)).unwrap();
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);
        assert_eq!(
            line.trim(),
            r#"{"jsonrpc":"2.0","id":7,"method":"tools/list"}"#
        );
    }

    #[test]
    fn test_decode_result_response() {
        let msg = decode(r#"{"jsonrpc":"2.0","id":3,"result":{"tools":[]}}"#).unwrap();
        assert_eq!(
            msg,
            Incoming::Response {
                id: Some(3),
                outcome: Ok(json!({"tools": []}))
            }
        );
    }

    #[test]
    fn test_decode_error_response() {
        let msg =
            decode(r#"{"jsonrpc":"2.0","id":4,"error":{"code":-32602,"message":"bad params"}}"#)
                .unwrap();
        match msg {
            Incoming::Response { id, outcome } => {
                assert_eq!(id, Some(4));
                let err = outcome.unwrap_err();
                assert_eq!(err.code, -32602);
                assert_eq!(err.message, "bad params");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_decode_unreadable_error_keeps_id() {
        let msg = decode(r#"{"jsonrpc":"2.0","id":5,"error":{"code":-1}}"#).unwrap();
        match msg {
            Incoming::Malformed { id, reason } => {
                assert_eq!(id, Some(5));
                assert!(reason.contains("message"), "reason: {}", reason);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_decode_notification_and_server_request() {
        let note = decode(r#"{"jsonrpc":"2.0","method":"notifications/message","params":{}}"#)
            .unwrap();
        assert!(matches!(note, Incoming::Notification { ref method, .. } if method == "notifications/message"));

        let req = decode(r#"{"jsonrpc":"2.0","id":"srv-1","method":"ping"}"#).unwrap();
        assert!(matches!(req, Incoming::Request { ref id, .. } if id == &json!("srv-1")));
    }

    #[test]
    fn test_decode_rejects_non_protocol_lines() {
        assert!(matches!(decode("Server started"), Err(McpError::Json(_))));
        assert!(matches!(decode("[1,2]"), Err(McpError::Protocol(_))));
        assert!(matches!(decode(r#"{"jsonrpc":"2.0"}"#), Err(McpError::Protocol(_))));
    }

    #[test]
    fn test_reply_to_ping_and_unknown() {
        let pong = reply_to(&json!(9), "ping");
        assert_eq!(pong["result"], json!({}));

        let refusal = reply_to(&json!("x"), "roots/list");
        assert_eq!(refusal["error"]["code"], METHOD_NOT_FOUND);
        assert_eq!(refusal["id"], "x");
    }

    #[test]
    fn test_remote_tool_default_schema() {
        let tool: RemoteTool = serde_json::from_value(json!({"name": "read_file"})).unwrap();
        assert_eq!(tool.input_schema["type"], "object");
        assert!(tool.description.is_none());
    }

    #[test]
    fn test_call_result_render() {
        let result: CallToolResult = serde_json::from_value(json!({
            "content": [
                {"type": "text", "text": "line one"},
                {"type": "image", "data": "AAAA", "mimeType": "image/png"},
                {"type": "resource", "resource": {"uri": "file:///a.txt"}},
                {"type": "audio", "data": "..."}
            ],
            "isError": false
        }))
        .unwrap();

        assert_eq!(
            result.render(),
            "line one\n[image: image/png]\n[resource: file:///a.txt]\n[unsupported content]"
        );
    }

    #[test]
    fn test_call_result_is_error_flag() {
        let result: CallToolResult = serde_json::from_value(json!({
            "content": [{"type": "text", "text": "ENOENT"}],
            "isError": true
        }))
        .unwrap();
        assert!(result.is_error);
        assert_eq!(result, CallToolResult::error("ENOENT"));
    }
}
