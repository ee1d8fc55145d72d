//! Registry integration tests: operations through the public surface,
//! persistence across instances, and health sweeps against a mocked prober.

use async_trait::async_trait;
use mockall::mock;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use switchboard_core::registry::{
    AssumeReachable, CatalogStore, EndpointProbe, JsonFileStore, MemoryStore,
    RegisterServerRequest, Registry, ServerRecord, ToolSpec, SWEEP_PROBE,
};
use switchboard_core::types::{HealthStatus, ServerStatus};
use switchboard_core::{Config, Error, Result};

mock! {
    pub Prober {}

    #[async_trait]
    impl EndpointProbe for Prober {
        async fn probe(&self, server: &ServerRecord) -> Result<()>;
    }
}

/// Endpoint that never answers.
struct Hanging;

#[async_trait]
impl EndpointProbe for Hanging {
    async fn probe(&self, _server: &ServerRecord) -> Result<()> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(())
    }
}

async fn registry() -> Registry {
    Registry::in_memory(&Config::default()).await
}

fn request(name: &str, tools: &[&str]) -> RegisterServerRequest {
    RegisterServerRequest::new(name, format!("http://{}.local", name)).with_tools(tools.iter().copied())
}

fn tool_names(body: &Value) -> Vec<(String, String)> {
    body["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| {
            (
                t["server_name"].as_str().unwrap().to_string(),
                t["name"].as_str().unwrap().to_string(),
            )
        })
        .collect()
}

#[tokio::test]
async fn test_reregistration_replaces_tool_set() {
    let registry = registry().await;
    registry.register_server(request("S", &["a", "b"])).await.unwrap();
    let summary = registry.register_server(request("S", &["c"])).await.unwrap();
    assert!(summary.replaced);
    assert_eq!(summary.tools_replaced, 2);

    let body = registry
        .invoke("discover_tools", json!({"server_filter": "S"}))
        .await
        .json()
        .unwrap();
    assert_eq!(tool_names(&body), vec![("S".to_string(), "c".to_string())]);
    assert_eq!(registry.list_servers(None).await.count, 1);
}

#[tokio::test]
async fn test_unregister_cascades_to_tools() {
    let registry = registry().await;
    registry.register_server(request("S", &["a", "b"])).await.unwrap();
    registry.register_server(request("T", &["a"])).await.unwrap();

    let body = registry
        .invoke("unregister_server", json!({"name": "S"}))
        .await
        .json()
        .unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["tools_removed"], 2);

    let remaining = registry.discover_tools(None, None).await;
    assert_eq!(remaining.count, 1);
    assert!(remaining.tools.iter().all(|t| t.server_name == "T"));

    let again = registry
        .invoke("unregister_server", json!({"name": "S"}))
        .await;
    assert!(!again.is_error);
    assert_eq!(again.json().unwrap()["success"], false);
}

#[tokio::test]
async fn test_discovery_filters() {
    let registry = registry().await;
    registry.register_server(request("A", &["x", "y"])).await.unwrap();
    registry.register_server(request("B", &["y", "z"])).await.unwrap();

    let body = registry
        .invoke("discover_tools", json!({"server_filter": "A"}))
        .await
        .json()
        .unwrap();
    assert_eq!(
        tool_names(&body),
        vec![
            ("A".to_string(), "x".to_string()),
            ("A".to_string(), "y".to_string())
        ]
    );

    let body = registry
        .invoke("discover_tools", json!({"search_term": "y"}))
        .await
        .json()
        .unwrap();
    assert_eq!(
        tool_names(&body),
        vec![
            ("A".to_string(), "y".to_string()),
            ("B".to_string(), "y".to_string())
        ]
    );

    let body = registry
        .invoke("discover_tools", json!({"server_filter": "B", "search_term": "y"}))
        .await
        .json()
        .unwrap();
    assert_eq!(tool_names(&body), vec![("B".to_string(), "y".to_string())]);
    assert_eq!(body["count"], 1);
}

#[tokio::test]
async fn test_search_matches_descriptions() {
    let registry = registry().await;
    registry
        .register_server(RegisterServerRequest::new("db", "stdio://db").with_tools([
            ToolSpec::Detailed {
                name: "run_query".into(),
                description: "Execute a SQL statement".into(),
                input_schema: Some(json!({"type": "object", "properties": {"sql": {"type": "string"}}})),
            },
            ToolSpec::from("vacuum"),
        ]))
        .await
        .unwrap();

    let found = registry.discover_tools(None, Some("sql")).await;
    assert_eq!(found.count, 1);
    assert_eq!(found.tools[0].name, "run_query");
    assert_eq!(found.tools[0].input_schema["properties"]["sql"]["type"], "string");
}

#[tokio::test]
async fn test_round_trip_through_json_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("registry.json");
    let config = Config::default();

    let first = Registry::open(
        &config,
        Arc::new(JsonFileStore::new(&path)),
        Arc::new(AssumeReachable),
    )
    .await;
    first
        .register_server(request("git", &["status", "commit", "push"]).with_version("2.1.0"))
        .await
        .unwrap();
    first.register_server(request("docker", &["ps", "run"])).await.unwrap();
    first.record_tool_usage("git", "push", false).await.unwrap();
    first.health_check(Some("docker")).await.unwrap();
    let before = first.snapshot().await;
    drop(first);

    let second = Registry::open(
        &config,
        Arc::new(JsonFileStore::new(&path)),
        Arc::new(AssumeReachable),
    )
    .await;
    let after = second.snapshot().await;
    assert_eq!(after, before);
    assert_eq!(after.servers.len(), 2);
    assert_eq!(after.tools.len(), 5);

    let docker = second.get_server_info("docker").await.unwrap();
    assert_eq!(docker.server.status, ServerStatus::Healthy);
    assert!(docker.server.last_seen.is_some());
    let git = second.get_server_info("git").await.unwrap();
    assert_eq!(git.server.version.as_deref(), Some("2.1.0"));
    assert_eq!(git.tools[2].error_count, 1);
}

#[tokio::test]
async fn test_corrupt_catalog_starts_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("registry.json");
    std::fs::write(&path, "{\"servers\": [ oops").unwrap();

    let registry = Registry::open(
        &Config::default(),
        Arc::new(JsonFileStore::new(&path)),
        Arc::new(AssumeReachable),
    )
    .await;
    assert_eq!(registry.list_servers(None).await.count, 0);

    // The next mutation overwrites the corrupt file with a valid snapshot
    registry.register_server(request("a", &["x"])).await.unwrap();
    let reloaded = JsonFileStore::new(&path).load().await.unwrap().unwrap();
    assert_eq!(reloaded.servers.len(), 1);
}

#[tokio::test]
async fn test_unknown_operation_leaves_catalog_unchanged() {
    let store = Arc::new(MemoryStore::new());
    let registry = Registry::open(&Config::default(), store.clone(), Arc::new(AssumeReachable)).await;
    registry.register_server(request("a", &["x"])).await.unwrap();
    let before = registry.snapshot().await;
    let saves = store.save_count().await;

    let result = registry.invoke("drop_everything", json!({"force": true})).await;
    assert!(result.is_error);
    assert_eq!(result.json().unwrap()["success"], false);

    assert_eq!(registry.snapshot().await, before);
    assert_eq!(store.save_count().await, saves);
}

#[tokio::test]
async fn test_health_check_with_mocked_prober() {
    let mut prober = MockProber::new();
    prober.expect_probe().returning(|server| {
        if server.name == "down" {
            Err(Error::internal("connection refused"))
        } else {
            Ok(())
        }
    });

    let mut config = Config::default();
    config.registry.max_health_failures = 2;
    let registry = Registry::open(&config, Arc::new(MemoryStore::new()), Arc::new(prober)).await;
    registry.register_server(request("up", &["a"])).await.unwrap();
    registry.register_server(request("down", &["b"])).await.unwrap();

    let body = registry.invoke("health_check", json!({})).await.json().unwrap();
    assert_eq!(body["checked"], 2);
    // One failure is below the limit
    assert_eq!(body["healthy"], 2);

    let sweep = registry.health_check(None).await.unwrap();
    assert_eq!(sweep.healthy, 1);
    assert_eq!(sweep.unhealthy, 1);
    let down = sweep.results.iter().find(|r| r.server == "down").unwrap();
    assert_eq!(down.health_check_failures, 2);
    assert!(!down.reachable);
    assert!(down.last_seen.is_none());

    let unhealthy = registry
        .invoke("list_servers", json!({"status_filter": "unhealthy"}))
        .await
        .json()
        .unwrap();
    assert_eq!(unhealthy["count"], 1);
    assert_eq!(unhealthy["servers"][0]["name"], "down");
}

#[tokio::test]
async fn test_single_server_health_check_calls_prober_once() {
    let mut prober = MockProber::new();
    prober
        .expect_probe()
        .withf(|server| server.name == "solo")
        .times(1)
        .returning(|_| Ok(()));

    let registry = Registry::open(&Config::default(), Arc::new(MemoryStore::new()), Arc::new(prober)).await;
    registry.register_server(request("solo", &[])).await.unwrap();
    registry.register_server(request("other", &[])).await.unwrap();

    let body = registry
        .invoke("health_check", json!({"server_name": "solo"}))
        .await
        .json()
        .unwrap();
    assert_eq!(body["results"][0]["status"], "healthy");
    assert_eq!(
        registry.get_server_info("other").await.unwrap().server.status,
        ServerStatus::Registered
    );
}

#[tokio::test]
async fn test_registry_status_totals() {
    let registry = registry().await;
    registry.register_server(request("a", &["x", "y"])).await.unwrap();
    registry.register_server(request("b", &["z"])).await.unwrap();
    registry.health_check(Some("a")).await.unwrap();
    registry
        .invoke(
            "report_tool_usage",
            json!({"server_name": "b", "tool_name": "z", "success": false}),
        )
        .await;

    let body = registry
        .invoke("get_registry_status", json!({}))
        .await
        .json()
        .unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["total_servers"], 2);
    assert_eq!(body["total_tools"], 3);
    assert_eq!(body["healthy_servers"], 1);
    assert_eq!(body["total_tool_uses"], 1);
    assert_eq!(body["total_tool_errors"], 1);
    assert!(body["registry"]["version"].is_string());
}

#[tokio::test]
async fn test_concurrent_registrations_all_persisted() {
    let store = Arc::new(MemoryStore::new());
    let registry = Registry::open(&Config::default(), store.clone(), Arc::new(AssumeReachable)).await;

    let tasks: Vec<_> = (0..16)
        .map(|i| {
            let registry = registry.clone();
            tokio::spawn(async move {
                registry
                    .register_server(request(&format!("s{}", i), &["t"]))
                    .await
                    .unwrap();
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(store.save_count().await, 16);
    let saved = store.current().await.unwrap();
    assert_eq!(saved.servers.len(), 16);
    assert_eq!(saved.tools.len(), 16);
}

#[tokio::test]
async fn test_sweep_with_hanging_endpoint_persists_and_passes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("registry.json");
    let mut config = Config::default();
    config.health.check_timeout = Duration::from_millis(500);
    config.registry.probe_timeout = Duration::from_millis(100);
    config.registry.max_health_failures = 3;

    let registry = Registry::open(&config, Arc::new(JsonFileStore::new(&path)), Arc::new(Hanging)).await;
    registry.register_server(request("stuck", &["x"])).await.unwrap();

    let monitor = registry.monitor();
    for _ in 0..3 {
        let outcome = monitor.run_probe(SWEEP_PROBE).await.unwrap();
        assert!(outcome.passed, "sweep failed: {:?}", outcome.error);
    }

    let server = registry.get_server_info("stuck").await.unwrap().server;
    assert_eq!(server.health_check_failures, 3);
    assert_eq!(server.status, ServerStatus::Unhealthy);

    let saved = JsonFileStore::new(&path).load().await.unwrap().unwrap();
    assert_eq!(saved.servers[0].health_check_failures, 3);
    assert_eq!(saved.servers[0].status, ServerStatus::Unhealthy);

    // An unhealthy server does not make the registry itself unhealthy
    assert_eq!(monitor.overall_status().await, HealthStatus::Healthy);
}

#[tokio::test]
async fn test_endpoint_timeout_reported_as_timeout() {
    let mut config = Config::default();
    config.registry.probe_timeout = Duration::from_millis(50);
    let registry = Registry::open(&config, Arc::new(MemoryStore::new()), Arc::new(Hanging)).await;
    registry.register_server(request("stuck", &[])).await.unwrap();

    let sweep = registry.health_check(Some("stuck")).await.unwrap();
    let error = sweep.results[0].error.as_deref().unwrap();
    assert!(error.starts_with("timeout:"), "{}", error);
}

#[tokio::test(start_paused = true)]
async fn test_monitor_loop_marks_unreachable_server_unhealthy_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("registry.json");

    let mut prober = MockProber::new();
    prober
        .expect_probe()
        .returning(|_| Err(Error::internal("connection refused")));

    let mut config = Config::default();
    config.health.check_tick = Duration::from_secs(1);
    config.health.check_interval = Duration::from_secs(1);
    config.registry.max_health_failures = 2;
    let registry = Registry::open(&config, Arc::new(JsonFileStore::new(&path)), Arc::new(prober)).await;
    registry.register_server(request("db", &["query"])).await.unwrap();

    assert!(registry.start_monitoring().await);
    tokio::time::sleep(Duration::from_secs(5)).await;
    registry.stop_monitoring().await;

    // Queues behind any commit still in flight from the last tick
    registry.record_tool_usage("db", "query", true).await.unwrap();

    let server = registry.get_server_info("db").await.unwrap().server;
    assert_eq!(server.status, ServerStatus::Unhealthy);
    assert!(server.health_check_failures >= 2);

    let saved = JsonFileStore::new(&path).load().await.unwrap().unwrap();
    assert_eq!(saved.servers[0].status, ServerStatus::Unhealthy);
    assert_eq!(saved.servers[0].health_check_failures, server.health_check_failures);
    assert_eq!(registry.monitor().overall_status().await, HealthStatus::Healthy);
}
