//! Handler references, the callable half of an operation descriptor.

use crate::runtime::content::ToolOutput;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Error type handlers may return. Anything implementing `std::error::Error`
/// converts with `?`, as do `&str` and `String`.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Result of running a handler.
pub type HandlerResult = std::result::Result<ToolOutput, HandlerError>;

type AsyncFn = dyn Fn(Value) -> BoxFuture<'static, HandlerResult> + Send + Sync;
type BlockingFn = dyn Fn(Value) -> HandlerResult + Send + Sync;

/// A tool handler.
///
/// `Async` handlers run on the caller's runtime. `Blocking` handlers are
/// moved to the blocking pool so a slow handler cannot stall other
/// invocations.
#[derive(Clone)]
pub enum ToolHandler {
    Async(Arc<AsyncFn>),
    Blocking(Arc<BlockingFn>),
}

impl ToolHandler {
    pub fn from_async<F, Fut>(handler: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        ToolHandler::Async(Arc::new(move |args| handler(args).boxed()))
    }

    pub fn from_blocking<F>(handler: F) -> Self
    where
        F: Fn(Value) -> HandlerResult + Send + Sync + 'static,
    {
        ToolHandler::Blocking(Arc::new(handler))
    }

    pub fn is_blocking(&self) -> bool {
        matches!(self, ToolHandler::Blocking(_))
    }
}

impl fmt::Debug for ToolHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolHandler::Async(_) => f.write_str("ToolHandler::Async"),
            ToolHandler::Blocking(_) => f.write_str("ToolHandler::Blocking"),
        }
    }
}
