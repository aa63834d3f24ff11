//! Tool schemas and normalized tool results.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tool advertised by an MCP server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tool {
    /// Tool name, unique within its server.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// JSON Schema of the tool's arguments.
    #[serde(rename = "inputSchema", default)]
    pub input_schema: Value,
}

/// One content item in a tool result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
#[non_exhaustive]
pub enum ContentPart {
    /// Text content.
    Text {
        /// The text value.
        text: String,
    },
    /// Base64-encoded binary image content.
    Image {
        /// Base64 image bytes.
        data: String,
        /// MIME type of the image.
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
}

impl ContentPart {
    /// Creates a text part.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Returns the text value if this is a text part.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            Self::Image { .. } => None,
        }
    }
}

/// A normalized tool call result.
///
/// `is_error` mirrors the MCP error flag; whether that is a user-facing
/// failure or a structured result is the caller's decision.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    /// Content items returned by the tool.
    #[serde(default)]
    pub content: Vec<ContentPart>,
    /// The raw, unnormalized result value.
    #[serde(default)]
    pub raw: Value,
    /// Whether the tool flagged an error.
    #[serde(default)]
    pub is_error: bool,
}

impl CallToolResult {
    /// Normalizes a raw MCP `tools/call` result value.
    #[must_use]
    pub fn from_raw(raw: Value) -> Self {
        let content = raw
            .get("content")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| serde_json::from_value(item.clone()).ok())
                    .collect()
            })
            .unwrap_or_default();
        let is_error = raw
            .get("isError")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        Self {
            content,
            raw,
            is_error,
        }
    }

    /// Creates an error result with a single text part.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            content: vec![ContentPart::text(format!("Error: {message}"))],
            raw: serde_json::json!({ "error": message }),
            is_error: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn from_raw_extracts_content_and_error_flag() {
        let raw = json!({
            "content": [
                { "type": "text", "text": "hello" },
                { "type": "image", "data": "aGk=", "mimeType": "image/png" },
                { "type": "resource", "uri": "mcp://unsupported" }
            ],
            "isError": false
        });
        let result = CallToolResult::from_raw(raw);
        assert_eq!(result.content.len(), 2);
        assert_eq!(result.content[0].as_text(), Some("hello"));
        assert!(!result.is_error);
    }

    #[test]
    fn error_results_carry_prefixed_text() {
        let result = CallToolResult::error("rate limited");
        assert!(result.is_error);
        assert_eq!(result.content[0].as_text(), Some("Error: rate limited"));
        assert_eq!(result.raw["error"], "rate limited");
    }

    #[test]
    fn tool_schema_round_trips() {
        let tool: Tool = serde_json::from_value(json!({
            "name": "search",
            "description": "Search the index",
            "inputSchema": { "type": "object", "properties": { "q": { "type": "string" } } }
        }))
        .unwrap();
        assert_eq!(tool.name, "search");
        assert_eq!(tool.input_schema["type"], "object");
    }
}
