//! Server and tool registry.
//!
//! The registry keeps a catalog of remote tool servers and the tools each one
//! exposes, persists it as a JSON snapshot, and tracks server reachability.
//! Its management surface is a [`ToolRuntime`] whose operations call back into
//! the typed methods on [`Registry`]; an embedded [`HealthMonitor`] watches
//! the registry's own liveness and periodically sweeps every server.
//!
//! Every mutation runs under a write gate that is held until the resulting
//! snapshot has been handed to the store, so persisted snapshots are applied
//! in the same order as the mutations that produced them.

pub mod catalog;
pub mod probe;
pub mod records;
pub mod store;
pub mod tools;

pub use catalog::{Catalog, CatalogCounts};
pub use probe::{AssumeReachable, EndpointProbe, HttpEndpointProbe};
pub use records::{CatalogSnapshot, ServerRecord, ToolRecord, ToolSpec};
pub use store::{CatalogStore, JsonFileStore, MemoryStore};
pub use tools::RegisterServerRequest;

use crate::health::{HealthMonitor, HealthReport, ProbeCheck, ProbeError, SimpleStatus};
use crate::recovery::with_recovery_async;
use crate::runtime::{CallToolResult, ContentItem, OperationDescriptor, ToolRuntime};
use crate::types::{Config, Error, RegistryConfig, Result, ServerInfo, ServerStatus};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::{Arc, Weak};
use std::time::Instant;
use tokio::sync::{Mutex, RwLock};
use tracing::Instrument;

/// Name of the probe that checks the registry can serve reads.
pub const LIVENESS_PROBE: &str = "registry_liveness";
/// Name of the probe that re-checks every registered server.
pub const SWEEP_PROBE: &str = "server_sweep";

// =============================================================================
// Responses
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationSummary {
    pub server: String,
    pub status: ServerStatus,
    pub tools_registered: usize,
    /// Whether an existing registration was replaced.
    pub replaced: bool,
    /// Tool records dropped from the replaced registration.
    pub tools_replaced: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnregisterSummary {
    pub server: String,
    pub tools_removed: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerList {
    pub servers: Vec<ServerRecord>,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerDetails {
    pub server: ServerRecord,
    pub tools: Vec<ToolRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolList {
    pub tools: Vec<ToolRecord>,
    pub count: usize,
}

/// Outcome of checking one server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerHealth {
    pub server: String,
    pub status: ServerStatus,
    pub reachable: bool,
    pub health_check_failures: u32,
    pub last_health_check: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthSweep {
    pub results: Vec<ServerHealth>,
    pub checked: usize,
    pub healthy: usize,
    pub unhealthy: usize,
}

/// Registry-wide totals plus the monitor's view of the registry itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryStatus {
    pub registry: ServerInfo,
    pub total_servers: usize,
    pub total_tools: usize,
    pub healthy_servers: usize,
    pub unhealthy_servers: usize,
    pub total_tool_uses: u64,
    pub total_tool_errors: u64,
    pub uptime_seconds: i64,
    pub health: SimpleStatus,
    pub registry_file: String,
}

// =============================================================================
// Registry
// =============================================================================

/// Cheap-to-clone handle to one registry instance.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

pub(crate) struct RegistryInner {
    info: ServerInfo,
    config: RegistryConfig,
    catalog: RwLock<Catalog>,
    write_gate: Mutex<()>,
    store: Arc<dyn CatalogStore>,
    prober: Arc<dyn EndpointProbe>,
    monitor: Arc<HealthMonitor>,
    runtime: ToolRuntime,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("name", &self.inner.info.name)
            .field("store", &self.inner.store.location())
            .field("operations", &self.inner.runtime.len())
            .finish()
    }
}

impl Registry {
    /// Build a registry, load its catalog from `store`, and install the
    /// monitor probes. A catalog that cannot be loaded is logged and the
    /// registry starts empty.
    pub async fn open(
        config: &Config,
        store: Arc<dyn CatalogStore>,
        prober: Arc<dyn EndpointProbe>,
    ) -> Self {
        let monitor = Arc::new(HealthMonitor::new(config.health.clone()));
        let inner = Arc::new_cyclic(|weak: &Weak<RegistryInner>| {
            let mut runtime = ToolRuntime::new(&config.runtime);
            tools::install(&mut runtime, weak);
            RegistryInner {
                info: config.server.clone(),
                config: config.registry.clone(),
                catalog: RwLock::new(Catalog::new()),
                write_gate: Mutex::new(()),
                store,
                prober,
                monitor,
                runtime,
            }
        });

        let registry = Self { inner };
        registry.load().await;
        registry.install_probes().await;
        registry
    }

    /// Registry backed by [`MemoryStore`] that treats every endpoint as reachable.
    pub async fn in_memory(config: &Config) -> Self {
        Self::open(config, Arc::new(MemoryStore::new()), Arc::new(AssumeReachable)).await
    }

    pub(crate) fn from_weak(inner: &Weak<RegistryInner>) -> Result<Self> {
        inner
            .upgrade()
            .map(|inner| Self { inner })
            .ok_or_else(|| Error::internal("Registry has been shut down"))
    }

    pub fn info(&self) -> &ServerInfo {
        &self.inner.info
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.inner.config
    }

    pub fn monitor(&self) -> &Arc<HealthMonitor> {
        &self.inner.monitor
    }

    async fn load(&self) {
        let location = self.inner.store.location();
        match self.inner.store.load().await {
            Ok(Some(snapshot)) => {
                let catalog = Catalog::from_snapshot(snapshot);
                let counts = catalog.counts();
                *self.inner.catalog.write().await = catalog;
                tracing::info!(
                    location = %location,
                    servers = counts.servers,
                    tools = counts.tools,
                    "registry_loaded"
                );
            }
            Ok(None) => {
                tracing::info!(location = %location, "registry_store_empty");
            }
            Err(e) => {
                tracing::warn!(
                    location = %location,
                    error = %e,
                    "registry_load_failed_starting_empty"
                );
            }
        }
    }

    async fn install_probes(&self) {
        let weak = Arc::downgrade(&self.inner);
        let liveness = ProbeCheck::new(move || {
            let weak = weak.clone();
            async move {
                let registry = Registry::from_weak(&weak)?;
                let _catalog = registry.inner.catalog.read().await;
                Ok::<_, ProbeError>(true)
            }
        });

        let weak = Arc::downgrade(&self.inner);
        let sweep = ProbeCheck::new(move || {
            let weak = weak.clone();
            async move {
                let registry = Registry::from_weak(&weak)?;
                registry.health_check(None).await?;
                Ok::<_, ProbeError>(true)
            }
        });

        // Endpoint probes finish within probe_timeout; the sweep also has to
        // apply and save their results, so it gets check_timeout on top.
        let monitor = &self.inner.monitor;
        let sweep_settings = monitor
            .default_settings()
            .with_timeout(self.inner.config.probe_timeout + monitor.config().check_timeout);
        monitor.add_probe(LIVENESS_PROBE, liveness, None).await;
        monitor
            .add_probe(SWEEP_PROBE, sweep, Some(sweep_settings))
            .await;
    }

    /// Apply `op` to the catalog and persist the result if it reports a change.
    ///
    /// The commit runs on its own task, so a caller that stops waiting (a
    /// timed-out check, a cancelled monitor tick) cannot separate a mutation
    /// from its save. The write gate spans mutation and save, so snapshots
    /// reach the store in mutation order.
    async fn mutate<T, F>(&self, op: F) -> Option<T>
    where
        F: FnOnce(&mut Catalog) -> Option<T> + Send + 'static,
        T: Send + 'static,
    {
        let registry = self.clone();
        let commit = tokio::spawn(async move {
            let _gate = registry.inner.write_gate.lock().await;
            let (value, snapshot) = {
                let mut catalog = registry.inner.catalog.write().await;
                let value = op(&mut catalog)?;
                (value, catalog.snapshot())
            };
            registry.persist(&snapshot).await;
            Some(value)
        });

        match commit.await {
            Ok(value) => value,
            Err(e) => {
                tracing::error!(error = %e, "registry_commit_failed");
                None
            }
        }
    }

    async fn persist(&self, snapshot: &CatalogSnapshot) {
        if let Err(e) = self.inner.store.save(snapshot).await {
            tracing::error!(
                location = %self.inner.store.location(),
                error = %e,
                "registry_save_failed"
            );
        }
    }

    // =========================================================================
    // Registry operations
    // =========================================================================

    /// Register a server, replacing any previous registration of the same
    /// name together with all of its tools.
    pub async fn register_server(&self, request: RegisterServerRequest) -> Result<RegistrationSummary> {
        let name = request.name.trim().to_string();
        if name.is_empty() {
            return Err(Error::validation("Server name must not be empty"));
        }
        if request.endpoint.trim().is_empty() {
            return Err(Error::validation(format!(
                "Server '{}' needs an endpoint",
                name
            )));
        }
        if request.tools.iter().any(|t| t.name().trim().is_empty()) {
            return Err(Error::validation(format!(
                "Server '{}' advertises a tool without a name",
                name
            )));
        }

        let record = ServerRecord {
            name: name.clone(),
            endpoint: request.endpoint,
            tools: Vec::new(),
            status: ServerStatus::Registered,
            version: request.version,
            description: request.description,
            metadata: request.metadata,
            health_check_failures: 0,
            registered_at: Utc::now(),
            last_health_check: None,
            last_seen: None,
        };

        let tools = request.tools;
        let server_name = name.clone();
        let summary = self
            .mutate(move |catalog| {
                let replaced = catalog.contains_server(&server_name);
                let tools_replaced = catalog.upsert_server(record, tools);
                let tools_registered = catalog.server(&server_name).map_or(0, |s| s.tools.len());
                Some(RegistrationSummary {
                    server: server_name,
                    status: ServerStatus::Registered,
                    tools_registered,
                    replaced,
                    tools_replaced,
                })
            })
            .await
            .ok_or_else(|| Error::internal(format!("Registration of '{}' was lost", name)))?;

        tracing::info!(
            server = %summary.server,
            tools = summary.tools_registered,
            replaced = summary.replaced,
            "server_registered"
        );
        Ok(summary)
    }

    /// Remove a server and every tool it owns.
    pub async fn unregister_server(&self, name: &str) -> Result<UnregisterSummary> {
        let (server, tools_removed) = self
            .mutate({
                let name = name.to_string();
                move |catalog| catalog.remove_server(&name)
            })
            .await
            .ok_or_else(|| server_not_found(name))?;

        tracing::info!(server = %server.name, tools_removed, "server_unregistered");
        Ok(UnregisterSummary {
            server: server.name,
            tools_removed,
        })
    }

    /// Servers in name order, optionally only those with `status`.
    pub async fn list_servers(&self, status: Option<ServerStatus>) -> ServerList {
        let servers = self.inner.catalog.read().await.servers(status);
        ServerList {
            count: servers.len(),
            servers,
        }
    }

    pub async fn get_server_info(&self, name: &str) -> Result<ServerDetails> {
        let catalog = self.inner.catalog.read().await;
        let server = catalog.server(name).cloned().ok_or_else(|| server_not_found(name))?;
        let tools = catalog.tools_for(name).cloned().collect();
        Ok(ServerDetails { server, tools })
    }

    /// Tools across servers, scoped by owner and/or a case-insensitive term.
    pub async fn discover_tools(
        &self,
        server_filter: Option<&str>,
        search_term: Option<&str>,
    ) -> ToolList {
        let tools = self
            .inner
            .catalog
            .read()
            .await
            .discover(server_filter, search_term);
        ToolList {
            count: tools.len(),
            tools,
        }
    }

    /// Probe one server, or every server, and fold the results into the
    /// catalog.
    ///
    /// Endpoints are probed concurrently without holding any catalog lock;
    /// the results are then applied and persisted as one mutation. A server
    /// removed while its probe was in flight is skipped.
    pub async fn health_check(&self, server_name: Option<&str>) -> Result<HealthSweep> {
        let targets: Vec<ServerRecord> = {
            let catalog = self.inner.catalog.read().await;
            match server_name {
                Some(name) => vec![catalog.server(name).cloned().ok_or_else(|| server_not_found(name))?],
                None => catalog.servers(None),
            }
        };

        let timeout = self.inner.config.probe_timeout;
        let prober = &self.inner.prober;
        let probes = targets.iter().map(|server| async move {
            let attempt = with_recovery_async(|| prober.probe(server), "endpoint_probe");
            match tokio::time::timeout(timeout, attempt).await {
                Ok(Ok(Ok(()))) => None,
                Ok(Ok(Err(e))) | Ok(Err(e)) => Some(e.to_string()),
                Err(_) => Some(
                    Error::timeout(format!("endpoint probe timed out after {:?}", timeout)).to_string(),
                ),
            }
        });
        let failures = join_all(probes).await;

        let now = Utc::now();
        let max_failures = self.inner.config.max_health_failures;
        let results = self
            .mutate(move |catalog| {
                let results: Vec<ServerHealth> = targets
                    .iter()
                    .zip(failures)
                    .filter_map(|(target, error)| {
                        let server = catalog.apply_health(&target.name, error.is_none(), max_failures, now)?;
                        if server.status != target.status {
                            tracing::info!(
                                server = %server.name,
                                from = %target.status,
                                to = %server.status,
                                failures = server.health_check_failures,
                                "server_status_changed"
                            );
                        }
                        Some(ServerHealth {
                            server: server.name.clone(),
                            status: server.status,
                            reachable: error.is_none(),
                            health_check_failures: server.health_check_failures,
                            last_health_check: server.last_health_check,
                            last_seen: server.last_seen,
                            error,
                        })
                    })
                    .collect();
                (!results.is_empty()).then_some(results)
            })
            .await
            .unwrap_or_default();

        let healthy = results
            .iter()
            .filter(|r| r.status == ServerStatus::Healthy)
            .count();
        tracing::debug!(checked = results.len(), healthy, "health_check_complete");
        Ok(HealthSweep {
            checked: results.len(),
            healthy,
            unhealthy: results.len() - healthy,
            results,
        })
    }

    pub async fn registry_status(&self) -> RegistryStatus {
        let counts = self.inner.catalog.read().await.counts();
        let monitor = &self.inner.monitor;
        RegistryStatus {
            registry: self.inner.info.clone(),
            total_servers: counts.servers,
            total_tools: counts.tools,
            healthy_servers: counts.healthy,
            unhealthy_servers: counts.unhealthy,
            total_tool_uses: counts.tool_uses,
            total_tool_errors: counts.tool_errors,
            uptime_seconds: monitor.uptime().num_seconds(),
            health: monitor.simple_status().await,
            registry_file: self.inner.store.location(),
        }
    }

    /// Count one use of a registered tool.
    pub async fn record_tool_usage(
        &self,
        server_name: &str,
        tool_name: &str,
        success: bool,
    ) -> Result<ToolRecord> {
        let now = Utc::now();
        let (server, tool) = (server_name.to_string(), tool_name.to_string());
        self.mutate(move |catalog| {
            catalog
                .record_usage(&server, &tool, success, now)
                .cloned()
        })
        .await
        .ok_or_else(|| {
            Error::not_found(format!(
                "Tool '{}' is not registered on server '{}'",
                tool_name, server_name
            ))
        })
    }

    pub async fn snapshot(&self) -> CatalogSnapshot {
        self.inner.catalog.read().await.snapshot()
    }

    // =========================================================================
    // Operation surface
    // =========================================================================

    pub fn list_operations(&self) -> &[OperationDescriptor] {
        self.inner.runtime.list_operations()
    }

    pub fn runtime(&self) -> &ToolRuntime {
        &self.inner.runtime
    }

    /// Invoke a management operation by name.
    ///
    /// Never fails: unknown operations, bad arguments and handler faults all
    /// come back as a result with `is_error` set. Every call is timed into
    /// the monitor's invocation metrics.
    pub async fn invoke(&self, name: &str, arguments: Value) -> CallToolResult {
        let span = tracing::info_span!(
            "invoke",
            operation = %name,
            invocation_id = %uuid::Uuid::new_v4()
        );
        async move {
            let started = Instant::now();
            let result = match self.inner.runtime.invoke(name, arguments).await {
                Ok(result) => result,
                Err(e) => {
                    tracing::warn!(error = %e, "invoke_rejected");
                    let body = json!({
                        "success": false,
                        "error": e.to_string(),
                        "code": e.code(),
                    });
                    CallToolResult {
                        content: vec![ContentItem::text(body.to_string())],
                        is_error: true,
                    }
                }
            };
            let elapsed = started.elapsed();
            self.inner
                .monitor
                .record_invocation(elapsed, !result.is_error)
                .await;
            tracing::debug!(elapsed_ms = elapsed.as_millis() as u64, is_error = result.is_error, "invoke_complete");
            result
        }
        .instrument(span)
        .await
    }

    // =========================================================================
    // Monitoring
    // =========================================================================

    /// Start the monitor loop. Returns false if it was already running.
    pub async fn start_monitoring(&self) -> bool {
        self.inner.monitor.start_monitoring().await
    }

    pub async fn stop_monitoring(&self) {
        self.inner.monitor.stop_monitoring().await
    }

    pub async fn health_report(&self) -> HealthReport {
        self.inner.monitor.detailed_status().await
    }
}

fn server_not_found(name: &str) -> Error {
    Error::not_found(format!("Server '{}' is not registered", name))
}
