//! Panic recovery utilities.
//!
//! Tool handlers and health probes are third-party code; a panic in one of
//! them is captured here, logged, and converted to an error instead of
//! tearing down the task that drove it.

use crate::types::{Error, Result};
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;

/// Drive a future to completion, converting a panic into `Error::Internal`.
///
/// The future is constructed lazily by `operation` so a panic while building
/// it is captured too.
pub async fn with_recovery_async<F, Fut, T>(operation: F, operation_name: &str) -> Result<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = T>,
{
    let guarded = AssertUnwindSafe(async move { operation().await }).catch_unwind();

    match guarded.await {
        Ok(value) => Ok(value),
        Err(panic_payload) => {
            let panic_msg = panic_message(panic_payload.as_ref());
            tracing::error!(
                operation = operation_name,
                panic = %panic_msg,
                "async_panic_recovered"
            );
            Err(Error::internal(format!(
                "Panic in {}: {}",
                operation_name, panic_msg
            )))
        }
    }
}

/// Extract a readable message from a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic (no message)".to_string()
    }
}
