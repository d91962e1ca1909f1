use serde_json::Value;
use std::fmt;

/// A tool result reduced to the one shape callers deal with.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolContent {
    Text(String),
    Json(Value),
    Empty,
}

impl ToolContent {
    /// Normalize a raw `tools/call` result.
    ///
    /// Servers wrap payloads differently: MCP `content` blocks (usually a
    /// single text block holding JSON), a bare `data` or `result` field, or
    /// the payload itself. Whatever is found first is unwrapped, and text
    /// that parses as JSON is promoted to [`ToolContent::Json`].
    pub fn from_result(result: Value) -> Self {
        let payload = match result {
            Value::Object(mut map) => {
                if let Some(content) = map.remove("content") {
                    unwrap_content(content)
                } else if let Some(data) = map.remove("data") {
                    data
                } else if let Some(inner) = map.remove("result") {
                    inner
                } else {
                    Value::Object(map)
                }
            }
            other => other,
        };

        match payload {
            Value::Null => ToolContent::Empty,
            Value::String(text) => ToolContent::Text(text),
            other => ToolContent::Json(other),
        }
    }

    /// The server flagged the call as failed with `isError`. Returns the
    /// message it gave, or a generic one.
    pub fn reported_error(result: &Value) -> Option<String> {
        let flagged = result
            .get("isError")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if !flagged {
            return None;
        }

        let message = result
            .get("content")
            .and_then(Value::as_array)
            .and_then(|blocks| blocks.first())
            .and_then(|block| block.get("text"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| "tool reported an error".to_string());
        Some(message)
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            ToolContent::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, ToolContent::Empty)
    }
}

fn unwrap_content(content: Value) -> Value {
    match content {
        Value::Array(mut blocks) if !blocks.is_empty() => {
            let first = blocks.swap_remove(0);
            match first.get("text").and_then(Value::as_str) {
                Some(text) => serde_json::from_str(text)
                    .unwrap_or_else(|_| Value::String(text.to_string())),
                None => first,
            }
        }
        Value::Array(_) => Value::Null,
        other => other,
    }
}

impl fmt::Display for ToolContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolContent::Text(text) => f.write_str(text),
            ToolContent::Json(value) => match serde_json::to_string_pretty(value) {
                Ok(pretty) => f.write_str(&pretty),
                Err(_) => write!(f, "{}", value),
            },
            ToolContent::Empty => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_block_holding_json_is_parsed() {
        let result = json!({"content": [{"type": "text", "text": "{\"filesets\": [\"a\"]}"}]});
        assert_eq!(
            ToolContent::from_result(result),
            ToolContent::Json(json!({"filesets": ["a"]}))
        );
    }

    #[test]
    fn plain_text_block_stays_text() {
        let result = json!({"content": [{"type": "text", "text": "all nodes healthy"}]});
        assert_eq!(
            ToolContent::from_result(result),
            ToolContent::Text("all nodes healthy".into())
        );
    }

    #[test]
    fn non_text_block_is_returned_whole() {
        let block = json!({"type": "resource", "uri": "gpfs://fs1"});
        let result = json!({"content": [block.clone()]});
        assert_eq!(ToolContent::from_result(result), ToolContent::Json(block));
    }

    #[test]
    fn data_then_result_then_self() {
        assert_eq!(
            ToolContent::from_result(json!({"data": [1, 2]})),
            ToolContent::Json(json!([1, 2]))
        );
        assert_eq!(
            ToolContent::from_result(json!({"result": "ok"})),
            ToolContent::Text("ok".into())
        );
        assert_eq!(
            ToolContent::from_result(json!({"nodes": 3})),
            ToolContent::Json(json!({"nodes": 3}))
        );
    }

    #[test]
    fn null_and_empty_content_are_empty() {
        assert!(ToolContent::from_result(Value::Null).is_empty());
        assert!(ToolContent::from_result(json!({"content": []})).is_empty());
    }

    #[test]
    fn is_error_flag_is_detected() {
        let result = json!({
            "isError": true,
            "content": [{"type": "text", "text": "fileset x is linked"}]
        });
        assert_eq!(
            ToolContent::reported_error(&result).as_deref(),
            Some("fileset x is linked")
        );
        assert_eq!(ToolContent::reported_error(&json!({"content": []})), None);
    }
}
