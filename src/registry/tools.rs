//! Registry management operations exposed as runtime tools.
//!
//! Arguments are typed structs whose JSON schemas double as the tools' input
//! schemas. Responses are JSON documents with a `success` flag; a missing
//! server or tool is `{"success": false, "error": ...}`, not a failure.

use crate::registry::records::ToolSpec;
use crate::registry::{Registry, RegistryInner};
use crate::runtime::{default_input_schema, HandlerResult, ToolHandler, ToolOutput, ToolRuntime};
use crate::types::{Error, Result};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, Weak};

// =============================================================================
// Arguments
// =============================================================================

/// Arguments of `register_server`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RegisterServerRequest {
    /// Unique server name; re-registering replaces the previous entry.
    pub name: String,
    /// URL or launch command the server is reached at.
    pub endpoint: String,
    /// Tool names, or objects with name, description and input_schema.
    #[serde(default)]
    pub tools: Vec<ToolSpec>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Free-form key/value metadata.
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl RegisterServerRequest {
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            tools: Vec::new(),
            version: None,
            description: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<ToolSpec>,
    {
        self.tools = tools.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
struct ServerNameArgs {
    /// Registered server name.
    name: String,
}

fn all_statuses() -> String {
    "all".to_string()
}

#[derive(Debug, Deserialize, JsonSchema)]
struct ListServersArgs {
    /// `all`, or one of unknown, registered, healthy, unhealthy.
    #[serde(default = "all_statuses")]
    status_filter: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct DiscoverToolsArgs {
    /// Only tools owned by this server.
    #[serde(default)]
    server_filter: Option<String>,
    /// Case-insensitive substring over tool name and description.
    #[serde(default)]
    search_term: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct HealthCheckArgs {
    /// Check only this server; omit to sweep all servers.
    #[serde(default)]
    server_name: Option<String>,
}

fn succeeded() -> bool {
    true
}

#[derive(Debug, Deserialize, JsonSchema)]
struct ReportToolUsageArgs {
    server_name: String,
    tool_name: String,
    #[serde(default = "succeeded")]
    success: bool,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct NoArgs {}

// =============================================================================
// Installation
// =============================================================================

/// Register every management operation on `runtime`.
pub(crate) fn install(runtime: &mut ToolRuntime, registry: &Weak<RegistryInner>) {
    add(
        runtime,
        registry,
        "register_server",
        "Register a server and the tools it exposes. Re-registering a name replaces it.",
        |registry, args: RegisterServerRequest| async move { registry.register_server(args).await },
    );
    add(
        runtime,
        registry,
        "unregister_server",
        "Remove a server and all of its tools.",
        |registry, args: ServerNameArgs| async move { registry.unregister_server(&args.name).await },
    );
    add(
        runtime,
        registry,
        "list_servers",
        "List registered servers, optionally filtered by status.",
        |registry, args: ListServersArgs| async move {
            let filter = parse_status_filter(&args.status_filter)?;
            Ok::<_, Error>(registry.list_servers(filter).await)
        },
    );
    add(
        runtime,
        registry,
        "get_server_info",
        "Get a server record together with its tools.",
        |registry, args: ServerNameArgs| async move { registry.get_server_info(&args.name).await },
    );
    add(
        runtime,
        registry,
        "discover_tools",
        "Find tools across servers by owning server and/or search term.",
        |registry, args: DiscoverToolsArgs| async move {
            Ok::<_, Error>(registry
                .discover_tools(args.server_filter.as_deref(), args.search_term.as_deref())
                .await)
        },
    );
    add(
        runtime,
        registry,
        "health_check",
        "Re-evaluate the health of one server, or of every server.",
        |registry, args: HealthCheckArgs| async move {
            registry.health_check(args.server_name.as_deref()).await
        },
    );
    add(
        runtime,
        registry,
        "get_registry_status",
        "Registry totals and monitor status.",
        |registry, _args: NoArgs| async move { Ok::<_, Error>(registry.registry_status().await) },
    );
    add(
        runtime,
        registry,
        "report_tool_usage",
        "Record one invocation of a registered tool.",
        |registry, args: ReportToolUsageArgs| async move {
            registry
                .record_tool_usage(&args.server_name, &args.tool_name, args.success)
                .await
        },
    );
}

fn parse_status_filter(raw: &str) -> Result<Option<crate::types::ServerStatus>> {
    if raw.trim().is_empty() || raw.eq_ignore_ascii_case("all") {
        return Ok(None);
    }
    raw.parse().map(Some).map_err(Error::validation)
}

fn add<A, F, Fut, T>(
    runtime: &mut ToolRuntime,
    registry: &Weak<RegistryInner>,
    name: &'static str,
    description: &str,
    op: F,
) where
    A: DeserializeOwned + JsonSchema + Send + 'static,
    F: Fn(Registry, A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
    T: Serialize + Send + 'static,
{
    let registry = registry.clone();
    let op = Arc::new(op);
    runtime.register(
        name,
        description,
        Some(input_schema::<A>()),
        ToolHandler::from_async(move |args| {
            dispatch::<A, F, Fut, T>(registry.clone(), op.clone(), name, args)
        }),
    );
}

async fn dispatch<A, F, Fut, T>(
    registry: Weak<RegistryInner>,
    op: Arc<F>,
    name: &'static str,
    args: Value,
) -> HandlerResult
where
    A: DeserializeOwned,
    F: Fn(Registry, A) -> Fut,
    Fut: Future<Output = Result<T>>,
    T: Serialize,
{
    let registry = Registry::from_weak(&registry)?;
    let args = parse_args::<A>(name, args)?;
    respond(op(registry, args).await)
}

fn parse_args<A: DeserializeOwned>(operation: &str, args: Value) -> Result<A> {
    let args = if args.is_null() { json!({}) } else { args };
    serde_json::from_value(args)
        .map_err(|e| Error::validation(format!("Invalid arguments for {}: {}", operation, e)))
}

fn input_schema<A: JsonSchema>() -> Value {
    serde_json::to_value(schemars::schema_for!(A)).unwrap_or_else(|_| default_input_schema())
}

/// Shape an operation result: objects gain `"success": true`, not-found
/// becomes a structured failure, anything else is a handler error.
fn respond<T: Serialize>(result: Result<T>) -> HandlerResult {
    match result {
        Ok(value) => {
            let body = match serde_json::to_value(&value)? {
                Value::Object(mut map) => {
                    map.insert("success".to_string(), Value::Bool(true));
                    Value::Object(map)
                }
                other => json!({"success": true, "result": other}),
            };
            Ok(ToolOutput::Structured(body))
        }
        Err(e) if e.is_not_found() => Ok(ToolOutput::Structured(json!({
            "success": false,
            "error": e.to_string(),
        }))),
        Err(e) => Err(e.into()),
    }
}
