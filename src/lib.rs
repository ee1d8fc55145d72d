//! # Switchboard Core - Control Plane for Tool Servers
//!
//! Building blocks for hosting tool servers and keeping track of them:
//! - Tool runtime: named operations with JSON-schema inputs, invoked with
//!   failure isolation and uniform result shaping
//! - Health monitor: probes with consecutive-failure hysteresis, aggregate
//!   status, invocation metrics and a cancellable background loop
//! - Registry: a persisted catalog of servers and their tools, exposed as a
//!   set of management operations on its own tool runtime
//!
//! ## Architecture
//!
//! ```text
//!                  ┌──────────────────────────────────────┐
//!   invoke(op) →   │               Registry               │
//!                  │  ┌─────────────┐   ┌──────────────┐  │
//!                  │  │ ToolRuntime │ → │   Catalog    │  │
//!                  │  │ (mgmt ops)  │   │ servers/tools│  │
//!                  │  └─────────────┘   └──────┬───────┘  │
//!                  │  ┌─────────────┐          │ snapshot │
//!                  │  │HealthMonitor│   ┌──────▼───────┐  │
//!                  │  │ probes/loop │   │ CatalogStore │  │
//!                  │  └─────────────┘   └──────────────┘  │
//!                  └──────────────────────────────────────┘
//! ```

// Enforce strict safety at compile time
#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]
#![warn(rust_2018_idioms)]

pub mod health;
pub mod registry;
pub mod runtime;
pub mod types;

// Internal utilities
pub mod observability;
pub mod recovery;

pub use health::HealthMonitor;
pub use registry::Registry;
pub use runtime::ToolRuntime;
pub use types::{Config, Error, Result};
