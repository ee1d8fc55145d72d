//! Tool runtime: named operations and their dispatch.
//!
//! The runtime owns the name → handler mapping. Invoking an unknown name is a
//! hard `NotFound` error; everything that goes wrong *inside* a handler
//! (returned error or panic) is caught here and becomes a single error-marked
//! text item, so one failing tool never ends the surrounding request cycle.

pub mod content;
pub mod handler;

pub use content::{CallToolResult, ContentItem, ToolOutput, ERROR_PREFIX};
pub use handler::{HandlerError, HandlerResult, ToolHandler};

use crate::recovery::{panic_message, with_recovery_async};
use crate::types::{Error, Result, RuntimeConfig};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;

/// Schema substituted when an operation is registered without one.
pub fn default_input_schema() -> Value {
    json!({"type": "object", "properties": {}})
}

/// A registered operation.
#[derive(Debug, Clone, Serialize)]
pub struct OperationDescriptor {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
    #[serde(skip_serializing)]
    pub handler: ToolHandler,
}

/// Name → handler dispatch table with crash-isolated invocation.
#[derive(Debug)]
pub struct ToolRuntime {
    operations: Vec<OperationDescriptor>,
    index: HashMap<String, usize>,
    blocking_permits: Arc<Semaphore>,
    registrations: AtomicU64,
    invocations: AtomicU64,
}

impl ToolRuntime {
    pub fn new(config: &RuntimeConfig) -> Self {
        Self {
            operations: Vec::new(),
            index: HashMap::new(),
            blocking_permits: Arc::new(Semaphore::new(config.max_blocking_workers.max(1))),
            registrations: AtomicU64::new(0),
            invocations: AtomicU64::new(0),
        }
    }

    /// Register an operation, overwriting any previous one of the same name.
    ///
    /// An overwritten operation keeps its original position in the listing.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Option<Value>,
        handler: ToolHandler,
    ) {
        let descriptor = OperationDescriptor {
            name: name.into(),
            description: description.into(),
            input_schema: input_schema.unwrap_or_else(default_input_schema),
            handler,
        };

        tracing::debug!(
            operation = %descriptor.name,
            blocking = descriptor.handler.is_blocking(),
            "operation_registered"
        );

        match self.index.get(&descriptor.name) {
            Some(&slot) => self.operations[slot] = descriptor,
            None => {
                self.index
                    .insert(descriptor.name.clone(), self.operations.len());
                self.operations.push(descriptor);
            }
        }
        self.registrations.fetch_add(1, Ordering::Relaxed);
    }

    /// All operations in registration order.
    pub fn list_operations(&self) -> &[OperationDescriptor] {
        &self.operations
    }

    pub fn get(&self, name: &str) -> Option<&OperationDescriptor> {
        self.index.get(name).map(|&slot| &self.operations[slot])
    }

    pub fn has_operation(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Number of `register` calls so far, overwrites included.
    pub fn registration_count(&self) -> u64 {
        self.registrations.load(Ordering::Relaxed)
    }

    /// Number of `invoke` attempts so far, unknown names included.
    pub fn invocation_count(&self) -> u64 {
        self.invocations.load(Ordering::Relaxed)
    }

    /// Invoke an operation by name.
    ///
    /// Returns `Err(Error::NotFound)` only for an unknown name. Handler
    /// failures are reported inside the `CallToolResult`.
    pub async fn invoke(&self, name: &str, arguments: Value) -> Result<CallToolResult> {
        self.invocations.fetch_add(1, Ordering::Relaxed);

        let handler = self
            .get(name)
            .map(|op| op.handler.clone())
            .ok_or_else(|| Error::not_found(format!("Unknown operation: {}", name)))?;

        let started = Instant::now();
        let outcome = match handler {
            ToolHandler::Async(call) => {
                match with_recovery_async(move || call(arguments), name).await {
                    Ok(result) => result,
                    Err(panic) => Err(panic.into()),
                }
            }
            ToolHandler::Blocking(call) => self.run_blocking(call, arguments).await,
        };
        let elapsed_ms = started.elapsed().as_millis();

        Ok(match outcome {
            Ok(output) => {
                tracing::debug!(operation = name, elapsed_ms, "operation_completed");
                CallToolResult::success(output)
            }
            Err(e) => {
                tracing::warn!(operation = name, elapsed_ms, error = %e, "operation_failed");
                CallToolResult::error(e)
            }
        })
    }

    async fn run_blocking(
        &self,
        call: Arc<dyn Fn(Value) -> HandlerResult + Send + Sync>,
        arguments: Value,
    ) -> HandlerResult {
        let permit = self
            .blocking_permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| Error::internal("blocking worker pool closed"))?;

        let joined = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            call(arguments)
        })
        .await;

        match joined {
            Ok(result) => result,
            Err(join_err) if join_err.is_panic() => {
                let panic_msg = panic_message(join_err.into_panic().as_ref());
                tracing::error!(panic = %panic_msg, "blocking_panic_recovered");
                Err(Error::internal(format!("Panic in blocking handler: {}", panic_msg)).into())
            }
            Err(join_err) => {
                Err(Error::internal(format!("blocking handler cancelled: {}", join_err)).into())
            }
        }
    }
}

impl Default for ToolRuntime {
    fn default() -> Self {
        Self::new(&RuntimeConfig::default())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn echo_runtime() -> ToolRuntime {
        let mut runtime = ToolRuntime::default();
        runtime.register(
            "echo",
            "Echo the message argument",
            None,
            ToolHandler::from_async(|args: Value| async move {
                let msg = args.get("message").and_then(Value::as_str).unwrap_or("");
                Ok::<_, HandlerError>(ToolOutput::from(msg.to_string()))
            }),
        );
        runtime
    }

    #[test]
    fn test_register_default_schema() {
        let runtime = echo_runtime();
        let op = runtime.get("echo").unwrap();
        assert_eq!(op.input_schema, default_input_schema());
        assert_eq!(runtime.registration_count(), 1);
    }

    #[test]
    fn test_register_overwrite_keeps_slot() {
        let mut runtime = echo_runtime();
        runtime.register(
            "second",
            "Second op",
            Some(json!({"type": "object", "required": ["x"]})),
            ToolHandler::from_blocking(|_| Ok(ToolOutput::from("2"))),
        );
        runtime.register(
            "echo",
            "Echo v2",
            None,
            ToolHandler::from_blocking(|_| Ok(ToolOutput::from("v2"))),
        );

        let names: Vec<&str> = runtime
            .list_operations()
            .iter()
            .map(|op| op.name.as_str())
            .collect();
        assert_eq!(names, vec!["echo", "second"]);
        assert_eq!(runtime.get("echo").unwrap().description, "Echo v2");
        assert_eq!(runtime.len(), 2);
        assert_eq!(runtime.registration_count(), 3);
    }

    #[test]
    fn test_descriptor_serialization_omits_handler() {
        let runtime = echo_runtime();
        let value = serde_json::to_value(runtime.get("echo").unwrap()).unwrap();
        assert_eq!(value["name"], "echo");
        assert!(value.get("inputSchema").is_some());
        assert!(value.get("handler").is_none());
    }

    #[tokio::test]
    async fn test_invoke_async_handler() {
        let runtime = echo_runtime();
        let result = runtime
            .invoke("echo", json!({"message": "hi"}))
            .await
            .unwrap();
        assert!(!result.is_error);
        assert_eq!(result.text(), "hi");
        assert_eq!(runtime.invocation_count(), 1);
    }

    #[tokio::test]
    async fn test_invoke_unknown_is_not_found() {
        let runtime = echo_runtime();
        let err = runtime.invoke("does_not_exist", json!({})).await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(runtime.invocation_count(), 1);
    }

    #[tokio::test]
    async fn test_handler_error_isolated() {
        let mut runtime = echo_runtime();
        runtime.register(
            "explode",
            "Always fails",
            None,
            ToolHandler::from_async(|_| async { Err::<ToolOutput, HandlerError>("boom".into()) }),
        );

        let result = runtime.invoke("explode", json!({})).await.unwrap();
        assert!(result.is_error);
        assert_eq!(result.content.len(), 1);
        assert!(result.text().starts_with(ERROR_PREFIX));
        assert!(result.text().contains("boom"));

        let next = runtime.invoke("echo", json!({"message": "still here"})).await.unwrap();
        assert!(!next.is_error);
        assert_eq!(next.text(), "still here");
    }

    async fn panicking(_args: Value) -> HandlerResult {
        panic!("kaboom")
    }

    #[tokio::test]
    async fn test_async_panic_isolated() {
        let mut runtime = ToolRuntime::default();
        runtime.register("panics", "Panics", None, ToolHandler::from_async(panicking));
        let result = runtime.invoke("panics", json!({})).await.unwrap();
        assert!(result.is_error);
        assert!(result.text().contains("kaboom"));
    }

    #[tokio::test]
    async fn test_blocking_handler_and_panic() {
        let mut runtime = ToolRuntime::default();
        runtime.register(
            "sum",
            "Add two numbers",
            None,
            ToolHandler::from_blocking(|args| {
                let a = args["a"].as_i64().ok_or("missing a")?;
                let b = args["b"].as_i64().ok_or("missing b")?;
                Ok(ToolOutput::other(a + b))
            }),
        );
        runtime.register(
            "blocking_panic",
            "Panics on the blocking pool",
            None,
            ToolHandler::from_blocking(|_| panic!("thread down")),
        );

        let ok = runtime.invoke("sum", json!({"a": 2, "b": 3})).await.unwrap();
        assert_eq!(ok.text(), "5");

        let missing = runtime.invoke("sum", json!({"a": 2})).await.unwrap();
        assert!(missing.is_error);
        assert!(missing.text().contains("missing b"));

        let panicked = runtime.invoke("blocking_panic", json!({})).await.unwrap();
        assert!(panicked.is_error);
        assert!(panicked.text().contains("thread down"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_slow_blocking_handler_does_not_stall_async() {
        let mut runtime = echo_runtime();
        runtime.register(
            "slow",
            "Sleeps on a worker thread",
            None,
            ToolHandler::from_blocking(|_| {
                std::thread::sleep(Duration::from_millis(300));
                Ok(ToolOutput::from("done"))
            }),
        );
        let runtime = Arc::new(runtime);

        let slow = {
            let runtime = runtime.clone();
            tokio::spawn(async move { runtime.invoke("slow", json!({})).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let started = Instant::now();
        let fast = runtime.invoke("echo", json!({"message": "fast"})).await.unwrap();
        assert_eq!(fast.text(), "fast");
        assert!(started.elapsed() < Duration::from_millis(250));

        assert_eq!(slow.await.unwrap().unwrap().text(), "done");
    }

    #[tokio::test]
    async fn test_structured_output_rendered() {
        let mut runtime = ToolRuntime::default();
        runtime.register(
            "doc",
            "Structured",
            None,
            ToolHandler::from_async(|_| async {
                Ok::<_, HandlerError>(ToolOutput::from(json!({"a": [1, 2]})))
            }),
        );
        let result = runtime.invoke("doc", json!({})).await.unwrap();
        assert_eq!(result.json().unwrap(), json!({"a": [1, 2]}));
    }
}
