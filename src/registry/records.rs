//! Registry records and the persisted snapshot layout.

use crate::runtime::default_input_schema;
use crate::types::ServerStatus;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A remote server and the tool names it advertises.
///
/// Optional timestamps serialize as explicit `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerRecord {
    pub name: String,
    pub endpoint: String,
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub status: ServerStatus,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
    #[serde(default)]
    pub health_check_failures: u32,
    pub registered_at: DateTime<Utc>,
    #[serde(default)]
    pub last_health_check: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
}

/// One tool owned by exactly one server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolRecord {
    pub name: String,
    pub server_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_input_schema")]
    pub input_schema: Value,
    #[serde(default)]
    pub use_count: u64,
    #[serde(default)]
    pub error_count: u64,
    #[serde(default)]
    pub last_used: Option<DateTime<Utc>>,
}

impl ToolRecord {
    pub fn new(server_name: &str, spec: ToolSpec) -> Self {
        let (name, description, input_schema) = spec.into_parts();
        Self {
            name,
            server_name: server_name.to_string(),
            description,
            input_schema: input_schema.unwrap_or_else(default_input_schema),
            use_count: 0,
            error_count: 0,
            last_used: None,
        }
    }

    /// Case-insensitive substring match over name and description.
    /// `needle` must already be lowercase.
    pub(crate) fn matches(&self, needle: &str) -> bool {
        self.name.to_lowercase().contains(needle)
            || self.description.to_lowercase().contains(needle)
    }
}

/// A tool as advertised at registration: a bare name or a full description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum ToolSpec {
    Name(String),
    Detailed {
        name: String,
        #[serde(default)]
        description: String,
        #[serde(default)]
        input_schema: Option<Value>,
    },
}

impl ToolSpec {
    pub fn name(&self) -> &str {
        match self {
            ToolSpec::Name(name) => name,
            ToolSpec::Detailed { name, .. } => name,
        }
    }

    fn into_parts(self) -> (String, String, Option<Value>) {
        match self {
            ToolSpec::Name(name) => (name, String::new(), None),
            ToolSpec::Detailed {
                name,
                description,
                input_schema,
            } => (name, description, input_schema),
        }
    }
}

impl From<&str> for ToolSpec {
    fn from(name: &str) -> Self {
        ToolSpec::Name(name.to_string())
    }
}

/// The whole catalog as written to disk: `{"servers": [...], "tools": [...]}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogSnapshot {
    #[serde(default)]
    pub servers: Vec<ServerRecord>,
    #[serde(default)]
    pub tools: Vec<ToolRecord>,
}
