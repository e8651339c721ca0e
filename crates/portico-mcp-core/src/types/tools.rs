//! Tool definitions, calls, and results.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A callable tool exposed by a server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    /// Unique, non-empty name within the session.
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Object-typed JSON Schema for the call arguments.
    pub input_schema: Value,
    /// Optional object-typed JSON Schema for the structured result.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Value>,
}

impl Tool {
    pub fn new(name: impl Into<String>, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            title: None,
            description: None,
            input_schema,
            output_schema: None,
            annotations: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_output_schema(mut self, schema: Value) -> Self {
        self.output_schema = Some(schema);
        self
    }

    /// Registration-time checks: non-empty name, object-typed schemas.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.name.is_empty() {
            return Err(crate::error::Error::invalid_request("empty tool name"));
        }
        if self.input_schema.get("type").and_then(Value::as_str) != Some("object") {
            return Err(crate::error::Error::invalid_request(format!(
                "tool '{}' input schema must be object-typed",
                self.name
            )));
        }
        if let Some(output) = &self.output_schema {
            if output.get("type").and_then(Value::as_str) != Some("object") {
                return Err(crate::error::Error::invalid_request(format!(
                    "tool '{}' output schema must be object-typed",
                    self.name
                )));
            }
        }
        Ok(())
    }
}

/// Parameters of a `tools/call` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
}

/// A single content block in a tool result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ToolContent {
    Text {
        text: String,
    },
    Image {
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    Resource {
        resource: Value,
    },
}

impl ToolContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

/// Result of a `tools/call`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    pub content: Vec<ToolContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
    /// Structured result, validated against the tool's output schema
    /// when one was declared.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structured_content: Option<Value>,
}

impl ToolResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::text(text)],
            is_error: None,
            structured_content: None,
        }
    }

    pub fn structured(value: Value) -> Self {
        Self {
            content: vec![ToolContent::text(value.to_string())],
            is_error: None,
            structured_content: Some(value),
        }
    }
}

/// `tools/list` request parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListToolsRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

/// `tools/list` response payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListToolsResponse {
    pub tools: Vec<Tool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tool_validation() {
        let ok = Tool::new("add", json!({"type": "object"}));
        assert!(ok.validate().is_ok());

        let unnamed = Tool::new("", json!({"type": "object"}));
        assert!(unnamed.validate().is_err());

        let bad_schema = Tool::new("add", json!({"type": "string"}));
        assert!(bad_schema.validate().is_err());

        let bad_output =
            Tool::new("add", json!({"type": "object"})).with_output_schema(json!({"type": "array"}));
        assert!(bad_output.validate().is_err());
    }

    #[test]
    fn content_block_wire_shape() {
        let result = ToolResult::text("5");
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["content"][0]["type"], "text");
        assert_eq!(value["content"][0]["text"], "5");
    }

    #[test]
    fn image_content_roundtrip() {
        let content = ToolContent::Image {
            data: "aGVsbG8=".to_string(),
            mime_type: "image/png".to_string(),
        };
        let value = serde_json::to_value(&content).unwrap();
        assert_eq!(
            value,
            json!({"type": "image", "data": "aGVsbG8=", "mimeType": "image/png"})
        );
        let back: ToolContent = serde_json::from_value(value).unwrap();
        assert_eq!(content, back);
    }
}
