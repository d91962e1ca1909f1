//! JSON-RPC 2.0 envelopes and the subset of MCP payloads this client speaks.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const JSONRPC_VERSION: &str = "2.0";

/// Protocol revision announced during `initialize`.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

pub const METHOD_INITIALIZE: &str = "initialize";
pub const METHOD_TOOLS_CALL: &str = "tools/call";
pub const METHOD_TOOLS_LIST: &str = "tools/list";

/// An outgoing JSON-RPC request.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: String,
    pub params: Value,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: &str, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            method: method.to_string(),
            params,
        }
    }
}

/// Error object carried by a JSON-RPC error frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcErrorObject {
    /// Build from whatever the server put under `error`. Servers are not always
    /// strict here, so a missing code or a bare string message is tolerated.
    fn from_value(value: &Value) -> Self {
        match value {
            Value::Object(map) => Self {
                code: map.get("code").and_then(Value::as_i64).unwrap_or_default(),
                message: map
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| value.to_string()),
                data: map.get("data").cloned(),
            },
            Value::String(s) => Self {
                code: 0,
                message: s.clone(),
                data: None,
            },
            other => Self {
                code: 0,
                message: other.to_string(),
                data: None,
            },
        }
    }
}

/// The frame that ends processing of one call.
#[derive(Debug, Clone, PartialEq)]
pub enum TerminalFrame {
    Result(Value),
    Error(JsonRpcErrorObject),
}

impl TerminalFrame {
    /// Inspect a decoded frame. Frames with neither `result` nor `error`
    /// (notifications, progress) are not terminal.
    pub fn from_frame(frame: &Value) -> Option<Self> {
        let object = frame.as_object()?;
        if let Some(result) = object.get("result") {
            return Some(TerminalFrame::Result(result.clone()));
        }
        object
            .get("error")
            .map(|error| TerminalFrame::Error(JsonRpcErrorObject::from_value(error)))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInfo {
    pub name: String,
    pub version: String,
}

impl Default for ClientInfo {
    fn default() -> Self {
        Self {
            name: "scale-agents".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ClientCapabilities {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializeParams {
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    pub capabilities: ClientCapabilities,
    #[serde(rename = "clientInfo")]
    pub client_info: ClientInfo,
}

/// A tool advertised by the server in `tools/list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "inputSchema", default)]
    pub input_schema: Value,
}

/// Arguments of a tool call. Key order is irrelevant to the server.
pub type ToolArguments = Map<String, Value>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_serializes_as_jsonrpc_envelope() {
        let request = JsonRpcRequest::new(7, METHOD_TOOLS_LIST, json!({}));
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({"jsonrpc": "2.0", "id": 7, "method": "tools/list", "params": {}})
        );
    }

    #[test]
    fn result_frame_is_terminal() {
        let frame = json!({"jsonrpc": "2.0", "id": 1, "result": {"ok": true}});
        assert_eq!(
            TerminalFrame::from_frame(&frame),
            Some(TerminalFrame::Result(json!({"ok": true})))
        );
    }

    #[test]
    fn null_result_is_still_terminal() {
        let frame = json!({"jsonrpc": "2.0", "id": 1, "result": null});
        assert_eq!(
            TerminalFrame::from_frame(&frame),
            Some(TerminalFrame::Result(Value::Null))
        );
    }

    #[test]
    fn error_frame_keeps_code_and_message() {
        let frame = json!({"id": 1, "error": {"code": -32602, "message": "bad args"}});
        match TerminalFrame::from_frame(&frame) {
            Some(TerminalFrame::Error(err)) => {
                assert_eq!(err.code, -32602);
                assert_eq!(err.message, "bad args");
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn notification_is_not_terminal() {
        let frame = json!({"jsonrpc": "2.0", "method": "notifications/progress", "params": {}});
        assert_eq!(TerminalFrame::from_frame(&frame), None);
    }

    #[test]
    fn tool_descriptor_reads_input_schema() {
        let tool: ToolDescriptor = serde_json::from_value(json!({
            "name": "list_filesets",
            "description": "List filesets",
            "inputSchema": {"type": "object"}
        }))
        .unwrap();
        assert_eq!(tool.name, "list_filesets");
        assert_eq!(tool.input_schema, json!({"type": "object"}));
    }
}
