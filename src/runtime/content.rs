//! Result shaping: handler outputs normalized into transport-ready content.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Prefix on the text item produced for a failed invocation.
pub const ERROR_PREFIX: &str = "Error: ";

/// A single transport-ready content item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentItem {
    Text {
        text: String,
    },
    Image {
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    Resource {
        uri: String,
        #[serde(rename = "mimeType", default, skip_serializing_if = "Option::is_none")]
        mime_type: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
    },
}

impl ContentItem {
    pub fn text(text: impl Into<String>) -> Self {
        ContentItem::Text { text: text.into() }
    }

    /// Text payload, if this is a text item.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentItem::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// What a handler hands back. Each variant has exactly one conversion into
/// content, applied once at the runtime boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutput {
    /// Plain text, becomes one text item.
    Text(String),
    /// Already-shaped content, passed through untouched.
    Content(Vec<ContentItem>),
    /// A structured document, rendered as indented JSON text.
    Structured(Value),
    /// Anything else, already stringified by the handler.
    Other(String),
}

impl ToolOutput {
    /// Stringify an arbitrary displayable value.
    pub fn other(value: impl fmt::Display) -> Self {
        ToolOutput::Other(value.to_string())
    }

    /// Serialize any `Serialize` value into a structured output.
    pub fn structured<T: Serialize>(value: &T) -> crate::types::Result<Self> {
        Ok(ToolOutput::Structured(serde_json::to_value(value)?))
    }

    pub fn into_content(self) -> Vec<ContentItem> {
        match self {
            ToolOutput::Text(text) => vec![ContentItem::text(text)],
            ToolOutput::Content(items) => items,
            ToolOutput::Structured(value) => {
                let rendered =
                    serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string());
                vec![ContentItem::text(rendered)]
            }
            ToolOutput::Other(text) => vec![ContentItem::text(text)],
        }
    }
}

impl From<String> for ToolOutput {
    fn from(text: String) -> Self {
        ToolOutput::Text(text)
    }
}

impl From<&str> for ToolOutput {
    fn from(text: &str) -> Self {
        ToolOutput::Text(text.to_string())
    }
}

impl From<Value> for ToolOutput {
    fn from(value: Value) -> Self {
        ToolOutput::Structured(value)
    }
}

impl From<Vec<ContentItem>> for ToolOutput {
    fn from(items: Vec<ContentItem>) -> Self {
        ToolOutput::Content(items)
    }
}

/// Outcome of one invocation, shaped for the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallToolResult {
    pub content: Vec<ContentItem>,
    #[serde(rename = "isError", default)]
    pub is_error: bool,
}

impl CallToolResult {
    pub fn success(output: ToolOutput) -> Self {
        Self {
            content: output.into_content(),
            is_error: false,
        }
    }

    /// A single error-marked text item.
    pub fn error(message: impl fmt::Display) -> Self {
        Self {
            content: vec![ContentItem::text(format!("{}{}", ERROR_PREFIX, message))],
            is_error: true,
        }
    }

    /// Concatenated text of all text items.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(ContentItem::as_text)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Parse the first text item as JSON (management tools answer in JSON).
    pub fn json(&self) -> Option<Value> {
        self.content
            .iter()
            .find_map(ContentItem::as_text)
            .and_then(|text| serde_json::from_str(text).ok())
    }
}
