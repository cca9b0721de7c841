//! Offline resilience integration tests
//!
//! Drives the cache side end to end through the public API:
//! - registration and lifecycle settling
//! - app-shell install and cache-first serving
//! - dynamic capture of runtime fetches
//! - entry-point fallback while the origin is unreachable
//! - generation sweep across version bumps
//! - sync trigger firing on the reconnect edge

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;

use canopy::cache::{
    AssetRequest, CacheConfig, CacheManager, ResourceKind, StoredResponse, Upstream, WorkerRegistry,
};
use canopy::connectivity::ConnectivityMonitor;
use canopy::sync::{spawn_reconnect_task, SyncTrigger};
use canopy::CanopyError;

// =============================================================================
// Scripted origin fixture
// =============================================================================

/// An origin with fixed routes and a reachability switch
struct ScriptedOrigin {
    routes: DashMap<String, StoredResponse>,
    online: AtomicBool,
    calls: AtomicUsize,
}

impl ScriptedOrigin {
    fn new() -> Self {
        let origin = Self {
            routes: DashMap::new(),
            online: AtomicBool::new(true),
            calls: AtomicUsize::new(0),
        };
        origin.route("/", "<html>canopy shell</html>");
        origin.route("/index.html", "<html>canopy shell</html>");
        origin.route("/icon.png", "png-bytes");
        origin.route("/data/feed.json", "{\"items\":[1,2,3]}");
        origin
    }

    fn route(&self, path: &str, body: &'static str) {
        self.routes.insert(
            path.to_string(),
            StoredResponse::new(200, vec![], Bytes::from_static(body.as_bytes())),
        );
    }

    fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Upstream for ScriptedOrigin {
    async fn fetch(&self, request: &AssetRequest) -> canopy::Result<StoredResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.online.load(Ordering::SeqCst) {
            return Err(CanopyError::Network("origin unreachable".to_string()));
        }
        match self.routes.get(request.key()) {
            Some(response) => Ok(response.clone()),
            None => Ok(StoredResponse::new(404, vec![], Bytes::new())),
        }
    }
}

fn test_config() -> CacheConfig {
    CacheConfig {
        version: 2,
        app_shell: vec![
            "/".to_string(),
            "/index.html".to_string(),
            "/icon.png".to_string(),
        ],
        fallback_path: "/index.html".to_string(),
        event_queue_size: 16,
    }
}

fn build_stack() -> (Arc<ScriptedOrigin>, Arc<CacheManager>, Arc<WorkerRegistry>) {
    let origin = Arc::new(ScriptedOrigin::new());
    let manager = Arc::new(CacheManager::new(test_config(), origin.clone()));
    let registry = Arc::new(WorkerRegistry::new("/", manager.clone()));
    (origin, manager, registry)
}

// =============================================================================
// Lifecycle and install
// =============================================================================

#[tokio::test]
async fn test_registration_installs_shell_and_activates() {
    let (_origin, manager, registry) = build_stack();

    let registration = registry.register().await.unwrap();
    registration.handle().wait_until_active().await.unwrap();

    let shell = manager.store().get("appShell_v2").unwrap();
    assert_eq!(shell.len(), 3);
    assert!(shell.contains("/"));
    assert!(shell.contains("/index.html"));
    assert!(shell.contains("/icon.png"));
    assert!(manager.store().has("dynamic_v2"));
}

#[tokio::test]
async fn test_activation_sweeps_previous_generations() {
    let (_origin, manager, registry) = build_stack();

    // Leftovers from earlier versions, including an oddly named one
    for stale in ["appShell_v1", "dynamic_v1", "media_v7"] {
        let generation = manager.store().open(stale);
        generation
            .put("/old", StoredResponse::new(200, vec![], Bytes::from_static(b"old")))
            .unwrap();
    }

    let registration = registry.register().await.unwrap();
    registration.handle().wait_until_active().await.unwrap();

    let mut names = manager.store().names();
    names.sort();
    assert_eq!(names, vec!["appShell_v2", "dynamic_v2"]);
}

// =============================================================================
// Cache-first serving
// =============================================================================

#[tokio::test]
async fn test_shell_served_without_refetching() {
    let (origin, _manager, registry) = build_stack();

    let registration = registry.register().await.unwrap();
    registration.handle().wait_until_active().await.unwrap();
    let calls_after_install = origin.call_count();

    let handle = registration.handle();
    for _ in 0..2 {
        let response = handle.fetch(AssetRequest::get("/index.html")).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(&response.body[..], b"<html>canopy shell</html>");
    }

    assert_eq!(origin.call_count(), calls_after_install);
}

#[tokio::test]
async fn test_miss_is_fetched_then_reused_offline() {
    let (origin, manager, registry) = build_stack();

    let registration = registry.register().await.unwrap();
    registration.handle().wait_until_active().await.unwrap();
    let handle = registration.handle();

    // First request goes to the origin and is captured
    let first = handle.fetch(AssetRequest::get("/data/feed.json")).await.unwrap();
    assert_eq!(&first.body[..], b"{\"items\":[1,2,3]}");
    let dynamic = manager.store().get("dynamic_v2").unwrap();
    assert!(dynamic.contains("/data/feed.json"));

    // Second request is served from cache even with the origin gone
    origin.set_online(false);
    let second = handle.fetch(AssetRequest::get("/data/feed.json")).await.unwrap();
    assert_eq!(second.body, first.body);
}

// =============================================================================
// Offline fallback
// =============================================================================

#[tokio::test]
async fn test_unreachable_origin_falls_back_to_entry_point() {
    let (origin, _manager, registry) = build_stack();

    let registration = registry.register().await.unwrap();
    registration.handle().wait_until_active().await.unwrap();
    origin.set_online(false);

    // A navigation the cache has never seen
    let request = AssetRequest::get("/articles/42").with_kind(ResourceKind::Document);
    let response = registration.handle().fetch(request).await.unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(&response.body[..], b"<html>canopy shell</html>");
}

#[tokio::test]
async fn test_reachable_origin_404_is_not_a_fallback() {
    let (_origin, _manager, registry) = build_stack();

    let registration = registry.register().await.unwrap();
    registration.handle().wait_until_active().await.unwrap();

    // The origin answers, just negatively: the answer passes through
    let response = registration
        .handle()
        .fetch(AssetRequest::get("/missing"))
        .await
        .unwrap();
    assert_eq!(response.status, 404);
}

// =============================================================================
// Reconnect sync
// =============================================================================

#[tokio::test]
async fn test_reconnect_edge_fires_sync_toward_active_worker() {
    let (origin, _manager, registry) = build_stack();

    let registration = registry.register().await.unwrap();
    registration.handle().wait_until_active().await.unwrap();

    let monitor = ConnectivityMonitor::default();
    let trigger = SyncTrigger::new(registry.clone());
    let _task = spawn_reconnect_task(monitor.watch(), trigger.clone());
    tokio::time::sleep(std::time::Duration::from_millis(10)).await;

    // The watch carries the latest state only, so let the task observe the
    // outage before restoring connectivity
    origin.set_online(false);
    monitor.set_offline();
    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    monitor.set_online();
    origin.set_online(true);

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(trigger.fired_count(), 1);
}
