//! In-memory catalog of servers and their tools.
//!
//! Every method is synchronous: a logical mutation such as "remove server and
//! its tools" completes inside one call, so callers holding the catalog lock
//! never leave it half-applied.

use crate::registry::records::{CatalogSnapshot, ServerRecord, ToolRecord, ToolSpec};
use crate::types::ServerStatus;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};

type ToolKey = (String, String);

/// Servers keyed by name, tools keyed by `(server_name, tool_name)`.
#[derive(Debug, Default)]
pub struct Catalog {
    servers: BTreeMap<String, ServerRecord>,
    tools: BTreeMap<ToolKey, ToolRecord>,
}

/// Aggregate counters over the catalog.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CatalogCounts {
    pub servers: usize,
    pub tools: usize,
    pub healthy: usize,
    pub unhealthy: usize,
    pub tool_uses: u64,
    pub tool_errors: u64,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from a snapshot, dropping tool records whose server is gone
    /// and filling in records for advertised names that lack one. A record
    /// whose server does not advertise it is appended to that server's list.
    pub fn from_snapshot(snapshot: CatalogSnapshot) -> Self {
        let mut catalog = Self::new();
        for server in snapshot.servers {
            catalog.servers.insert(server.name.clone(), server);
        }
        for tool in snapshot.tools {
            let Some(server) = catalog.servers.get_mut(&tool.server_name) else {
                tracing::warn!(
                    server = %tool.server_name,
                    tool = %tool.name,
                    "dropping_orphan_tool_record"
                );
                continue;
            };
            if !server.tools.contains(&tool.name) {
                tracing::warn!(
                    server = %tool.server_name,
                    tool = %tool.name,
                    "adopting_unlisted_tool_record"
                );
                server.tools.push(tool.name.clone());
            }
            catalog
                .tools
                .insert((tool.server_name.clone(), tool.name.clone()), tool);
        }
        for server in catalog.servers.values() {
            for tool_name in &server.tools {
                let key = (server.name.clone(), tool_name.clone());
                catalog
                    .tools
                    .entry(key)
                    .or_insert_with(|| ToolRecord::new(&server.name, ToolSpec::Name(tool_name.clone())));
            }
        }
        catalog
    }

    pub fn snapshot(&self) -> CatalogSnapshot {
        CatalogSnapshot {
            servers: self.servers.values().cloned().collect(),
            tools: self
                .servers
                .values()
                .flat_map(|server| self.tools_for(&server.name))
                .cloned()
                .collect(),
        }
    }

    /// Insert or fully replace a server and its tool set.
    ///
    /// Duplicate tool names keep their first occurrence. Returns the number of
    /// tool records discarded from a previous registration.
    pub fn upsert_server(&mut self, mut server: ServerRecord, specs: Vec<ToolSpec>) -> usize {
        let discarded = self.remove_tools_of(&server.name);

        let mut seen = HashSet::new();
        server.tools.clear();
        for spec in specs {
            if !seen.insert(spec.name().to_string()) {
                continue;
            }
            let record = ToolRecord::new(&server.name, spec);
            server.tools.push(record.name.clone());
            self.tools
                .insert((server.name.clone(), record.name.clone()), record);
        }
        self.servers.insert(server.name.clone(), server);
        discarded
    }

    /// Remove a server and every tool it owns.
    pub fn remove_server(&mut self, name: &str) -> Option<(ServerRecord, usize)> {
        let server = self.servers.remove(name)?;
        let removed = self.remove_tools_of(name);
        Some((server, removed))
    }

    fn remove_tools_of(&mut self, server_name: &str) -> usize {
        let before = self.tools.len();
        self.tools.retain(|(owner, _), _| owner != server_name);
        before - self.tools.len()
    }

    pub fn server(&self, name: &str) -> Option<&ServerRecord> {
        self.servers.get(name)
    }

    pub fn contains_server(&self, name: &str) -> bool {
        self.servers.contains_key(name)
    }

    pub fn servers(&self, status: Option<ServerStatus>) -> Vec<ServerRecord> {
        self.servers
            .values()
            .filter(|s| status.map_or(true, |wanted| s.status == wanted))
            .cloned()
            .collect()
    }

    /// Tools owned by `server_name`, in the server's advertised order.
    pub fn tools_for<'a>(&'a self, server_name: &str) -> impl Iterator<Item = &'a ToolRecord> + 'a {
        let names = self
            .servers
            .get(server_name)
            .map(|s| s.tools.as_slice())
            .unwrap_or_default();
        let owner = server_name.to_string();
        names
            .iter()
            .filter_map(move |tool| self.tools.get(&(owner.clone(), tool.clone())))
    }

    /// Tools across all servers, optionally scoped to one server and/or
    /// filtered by a case-insensitive term over name and description.
    pub fn discover(&self, server_filter: Option<&str>, search_term: Option<&str>) -> Vec<ToolRecord> {
        let needle = search_term
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase);

        self.servers
            .keys()
            .filter(|name| server_filter.map_or(true, |wanted| name.as_str() == wanted))
            .flat_map(|name| self.tools_for(name))
            .filter(|tool| needle.as_deref().map_or(true, |n| tool.matches(n)))
            .cloned()
            .collect()
    }

    /// Bump usage counters on one tool.
    pub fn record_usage(
        &mut self,
        server_name: &str,
        tool_name: &str,
        success: bool,
        at: DateTime<Utc>,
    ) -> Option<&ToolRecord> {
        let tool = self
            .tools
            .get_mut(&(server_name.to_string(), tool_name.to_string()))?;
        tool.use_count += 1;
        if !success {
            tool.error_count += 1;
        }
        tool.last_used = Some(at);
        Some(tool)
    }

    /// Apply one endpoint probe result to a server.
    ///
    /// Success resets the failure counter and stamps `last_seen`; either way
    /// `last_health_check` is stamped. Status is `healthy` while failures stay
    /// below `max_failures`.
    pub fn apply_health(
        &mut self,
        name: &str,
        reachable: bool,
        max_failures: u32,
        at: DateTime<Utc>,
    ) -> Option<&ServerRecord> {
        let server = self.servers.get_mut(name)?;
        if reachable {
            server.health_check_failures = 0;
            server.last_seen = Some(at);
        } else {
            server.health_check_failures = server.health_check_failures.saturating_add(1);
        }
        server.last_health_check = Some(at);
        server.status = if server.health_check_failures < max_failures {
            ServerStatus::Healthy
        } else {
            ServerStatus::Unhealthy
        };
        Some(server)
    }

    pub fn counts(&self) -> CatalogCounts {
        let mut counts = CatalogCounts {
            servers: self.servers.len(),
            tools: self.tools.len(),
            ..Default::default()
        };
        for server in self.servers.values() {
            match server.status {
                ServerStatus::Healthy => counts.healthy += 1,
                ServerStatus::Unhealthy => counts.unhealthy += 1,
                ServerStatus::Registered | ServerStatus::Unknown => {}
            }
        }
        for tool in self.tools.values() {
            counts.tool_uses += tool.use_count;
            counts.tool_errors += tool.error_count;
        }
        counts
    }
}
