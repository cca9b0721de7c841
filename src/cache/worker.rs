//! Cache-context worker - the separate execution context
//!
//! The cache context runs as a detached task owning the `CacheManager`. The
//! page side reaches it only through message passing: fetches ride an mpsc
//! event with a oneshot reply, page messages are one-way with no delivery
//! guarantee. Lifecycle phases are broadcast over a watch channel so handles
//! can gate on "is there an active controller" without calling in.
//!
//! Each fetch event is served by its own spawned task; concurrent fetches
//! have no ordering guarantee between them, which is safe because cache
//! writes are insert-or-overwrite.

use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch, Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::cache::lifecycle::LifecyclePhase;
use crate::cache::manager::{AssetRequest, CacheManager};
use crate::cache::store::StoredResponse;
use crate::sync::PageMessage;
use crate::types::{CanopyError, Result};

// ============================================================================
// Events
// ============================================================================

/// Event delivered into the cache context
pub enum CacheEvent {
    /// A page fetch to intercept
    Fetch {
        request: AssetRequest,
        /// Channel to send the response back
        response_tx: oneshot::Sender<Result<StoredResponse>>,
    },
    /// One-way page message
    Message(PageMessage),
}

// ============================================================================
// Handle
// ============================================================================

/// Cloneable handle into one cache context
#[derive(Clone)]
pub struct CacheHandle {
    event_tx: mpsc::Sender<CacheEvent>,
    phase_rx: watch::Receiver<LifecyclePhase>,
}

impl CacheHandle {
    /// Route a request through the cache context and wait for the response
    pub async fn fetch(&self, request: AssetRequest) -> Result<StoredResponse> {
        let (response_tx, response_rx) = oneshot::channel();

        self.event_tx
            .send(CacheEvent::Fetch {
                request,
                response_tx,
            })
            .await
            .map_err(|_| CanopyError::Network("cache context is gone".into()))?;

        response_rx
            .await
            .map_err(|_| CanopyError::Internal("Response channel closed".into()))?
    }

    /// Fire-and-forget page message. Returns whether the context accepted
    /// it; a full queue or a dead context just drops the message.
    pub fn post_message(&self, message: PageMessage) -> bool {
        match self.event_tx.try_send(CacheEvent::Message(message)) {
            Ok(()) => true,
            Err(_) => {
                debug!("Page message dropped, cache context not receiving");
                false
            }
        }
    }

    /// Current lifecycle phase
    pub fn phase(&self) -> LifecyclePhase {
        *self.phase_rx.borrow()
    }

    pub fn is_active(&self) -> bool {
        self.phase().can_intercept()
    }

    /// Wait for the context to become active. Errors if it went redundant
    /// (failed install/activation) instead.
    pub async fn wait_until_active(&self) -> Result<()> {
        let mut phase_rx = self.phase_rx.clone();
        loop {
            let phase = *phase_rx.borrow_and_update();
            match phase {
                LifecyclePhase::Active => return Ok(()),
                LifecyclePhase::Redundant => {
                    return Err(CanopyError::Registration(
                        "cache context went redundant before activating".into(),
                    ))
                }
                _ => {}
            }
            if phase_rx.changed().await.is_err() {
                return Err(CanopyError::Registration("cache context is gone".into()));
            }
        }
    }
}

// ============================================================================
// Worker
// ============================================================================

/// Spawn the cache context for `manager`. The returned handle is live
/// immediately; until activation completes, fetches pass straight through
/// to the upstream.
pub fn spawn_cache_worker(manager: Arc<CacheManager>) -> CacheHandle {
    let (event_tx, event_rx) = mpsc::channel::<CacheEvent>(manager.config().event_queue_size);
    let (phase_tx, phase_rx) = watch::channel(LifecyclePhase::Installing);
    let phase_tx = Arc::new(phase_tx);

    tokio::spawn(async move {
        worker_task(manager, event_rx, phase_tx).await;
    });

    CacheHandle { event_tx, phase_rx }
}

/// Event loop of the cache context
async fn worker_task(
    manager: Arc<CacheManager>,
    mut event_rx: mpsc::Receiver<CacheEvent>,
    phase_tx: Arc<watch::Sender<LifecyclePhase>>,
) {
    // Drive install/activate alongside the event loop; events arriving
    // before activation are served by passthrough.
    {
        let manager = Arc::clone(&manager);
        let phase_tx = Arc::clone(&phase_tx);
        tokio::spawn(async move {
            drive_lifecycle(manager, phase_tx).await;
        });
    }

    while let Some(event) = event_rx.recv().await {
        match event {
            CacheEvent::Fetch {
                request,
                response_tx,
            } => {
                let phase = *phase_tx.borrow();
                let manager = Arc::clone(&manager);
                tokio::spawn(async move {
                    let result = if phase.can_intercept() {
                        manager.handle_fetch(&request).await
                    } else {
                        // Not controlling fetches in this phase
                        manager.passthrough(&request).await
                    };
                    let _ = response_tx.send(result);
                });
            }
            CacheEvent::Message(message) => match message {
                PageMessage::SyncOfflineData => {
                    debug!("Sync requested by page, no offline outbox is configured, dropping");
                }
            },
        }
    }

    debug!("Cache context event channel closed, shutting down");
}

/// Walk the state machine: Installing → Waiting → Activating → Active,
/// Redundant on any failure. Skips the wait-for-clients step so a fresh
/// generation takes over immediately.
async fn drive_lifecycle(manager: Arc<CacheManager>, phase_tx: Arc<watch::Sender<LifecyclePhase>>) {
    info!(generation = %manager.config().shell_name(), "Cache context installing");
    if let Err(e) = manager.install().await {
        error!(error = %e, "Install failed, cache context abandoned");
        transition(&phase_tx, LifecyclePhase::Redundant);
        return;
    }
    transition(&phase_tx, LifecyclePhase::Waiting);

    // Skip waiting for clients to close
    transition(&phase_tx, LifecyclePhase::Activating);
    if let Err(e) = manager.activate().await {
        error!(error = %e, "Activation failed, cache context abandoned");
        transition(&phase_tx, LifecyclePhase::Redundant);
        return;
    }
    transition(&phase_tx, LifecyclePhase::Active);
    info!("Cache context active");
}

fn transition(phase_tx: &watch::Sender<LifecyclePhase>, next: LifecyclePhase) {
    let current = *phase_tx.borrow();
    if !current.can_transition_to(next) {
        warn!(from = %current, to = %next, "Refusing invalid lifecycle transition");
        return;
    }
    // send_replace: the phase must advance even with no observers left
    phase_tx.send_replace(next);
    debug!(phase = %next, "Cache context phase");
}

// ============================================================================
// Registry
// ============================================================================

/// Registration handle for one cache context
pub struct WorkerRegistration {
    scope: String,
    handle: CacheHandle,
}

impl WorkerRegistration {
    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn handle(&self) -> &CacheHandle {
        &self.handle
    }
}

/// Hands out the cache-context registration for one scope. Registering twice
/// yields the same registration; the context is only spawned once.
pub struct WorkerRegistry {
    scope: String,
    manager: Arc<CacheManager>,
    registration: RwLock<Option<Arc<WorkerRegistration>>>,
    /// Guards concurrent first registrations
    registering: Mutex<()>,
}

impl WorkerRegistry {
    pub fn new(scope: impl Into<String>, manager: Arc<CacheManager>) -> Self {
        Self {
            scope: scope.into(),
            manager,
            registration: RwLock::new(None),
            registering: Mutex::new(()),
        }
    }

    /// Register the cache context, or return the existing registration
    pub async fn register(&self) -> Result<Arc<WorkerRegistration>> {
        if let Some(existing) = self.registration.read().await.as_ref() {
            return Ok(existing.clone());
        }

        let _guard = self.registering.lock().await;

        // Double-check: another caller may have registered while we waited
        if let Some(existing) = self.registration.read().await.as_ref() {
            return Ok(existing.clone());
        }

        info!(scope = %self.scope, "Registering cache context");
        let handle = spawn_cache_worker(Arc::clone(&self.manager));
        let registration = Arc::new(WorkerRegistration {
            scope: self.scope.clone(),
            handle,
        });
        *self.registration.write().await = Some(registration.clone());
        Ok(registration)
    }

    /// Handle to the active context, if one controls this scope. Absent
    /// while installing/activating and after going redundant.
    pub async fn controller(&self) -> Option<CacheHandle> {
        let registration = self.registration.read().await.clone()?;
        if registration.handle.is_active() {
            Some(registration.handle.clone())
        } else {
            None
        }
    }

    /// Current registration without spawning anything
    pub async fn registration(&self) -> Option<Arc<WorkerRegistration>> {
        self.registration.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::manager::{CacheConfig, Upstream};
    use bytes::Bytes;
    use dashmap::DashMap;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct StaticUpstream {
        routes: DashMap<String, Bytes>,
        offline: AtomicBool,
    }

    impl StaticUpstream {
        fn serving(routes: &[(&str, &str)]) -> Arc<Self> {
            let map = DashMap::new();
            for (path, body) in routes {
                map.insert(path.to_string(), Bytes::copy_from_slice(body.as_bytes()));
            }
            Arc::new(Self {
                routes: map,
                offline: AtomicBool::new(false),
            })
        }
    }

    #[async_trait::async_trait]
    impl Upstream for StaticUpstream {
        async fn fetch(&self, request: &AssetRequest) -> Result<StoredResponse> {
            if self.offline.load(Ordering::SeqCst) {
                return Err(CanopyError::Network("offline".into()));
            }
            match self.routes.get(&request.path) {
                Some(body) => Ok(StoredResponse::new(200, vec![], body.clone())),
                None => Ok(StoredResponse::new(404, vec![], Bytes::new())),
            }
        }
    }

    fn test_config() -> CacheConfig {
        CacheConfig {
            version: 2,
            app_shell: vec!["/index.html".to_string()],
            fallback_path: "/index.html".to_string(),
            event_queue_size: 16,
        }
    }

    #[tokio::test]
    async fn test_worker_reaches_active() {
        let upstream = StaticUpstream::serving(&[("/index.html", "shell")]);
        let manager = Arc::new(CacheManager::new(test_config(), upstream));
        let handle = spawn_cache_worker(manager);

        handle.wait_until_active().await.unwrap();
        assert!(handle.is_active());
        assert_eq!(handle.phase(), LifecyclePhase::Active);
    }

    #[tokio::test]
    async fn test_fetch_through_handle_serves_cache() {
        let upstream = StaticUpstream::serving(&[("/index.html", "shell")]);
        let manager = Arc::new(CacheManager::new(test_config(), upstream.clone()));
        let handle = spawn_cache_worker(manager);
        handle.wait_until_active().await.unwrap();

        upstream.offline.store(true, Ordering::SeqCst);
        let response = handle
            .fetch(AssetRequest::get("/index.html"))
            .await
            .unwrap();
        assert_eq!(response.body, Bytes::from_static(b"shell"));
    }

    #[tokio::test]
    async fn test_failed_install_goes_redundant_and_passes_through() {
        let upstream = StaticUpstream::serving(&[]);
        upstream.offline.store(true, Ordering::SeqCst);
        let manager = Arc::new(CacheManager::new(test_config(), upstream.clone()));
        let handle = spawn_cache_worker(manager);

        let err = handle.wait_until_active().await.unwrap_err();
        assert!(matches!(err, CanopyError::Registration(_)));
        assert_eq!(handle.phase(), LifecyclePhase::Redundant);

        // A redundant context never intercepts; the upstream error comes
        // back untouched instead of an offline fallback.
        let err = handle.fetch(AssetRequest::get("/anything")).await.unwrap_err();
        assert!(matches!(err, CanopyError::Network(_)));
    }

    #[tokio::test]
    async fn test_registry_is_idempotent() {
        let upstream = StaticUpstream::serving(&[("/index.html", "shell")]);
        let manager = Arc::new(CacheManager::new(test_config(), upstream));
        let registry = WorkerRegistry::new("/", manager);

        let first = registry.register().await.unwrap();
        let second = registry.register().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.scope(), "/");
    }

    #[tokio::test]
    async fn test_controller_absent_for_redundant_context() {
        let upstream = StaticUpstream::serving(&[]);
        upstream.offline.store(true, Ordering::SeqCst);
        let manager = Arc::new(CacheManager::new(test_config(), upstream));
        let registry = WorkerRegistry::new("/", manager);

        let registration = registry.register().await.unwrap();
        let _ = registration.handle().wait_until_active().await;
        assert!(registry.controller().await.is_none());
    }

    #[tokio::test]
    async fn test_controller_present_once_active() {
        let upstream = StaticUpstream::serving(&[("/index.html", "shell")]);
        let manager = Arc::new(CacheManager::new(test_config(), upstream));
        let registry = WorkerRegistry::new("/", manager);

        let registration = registry.register().await.unwrap();
        registration.handle().wait_until_active().await.unwrap();
        assert!(registry.controller().await.is_some());
    }

    #[tokio::test]
    async fn test_post_message_accepted_by_live_context() {
        let upstream = StaticUpstream::serving(&[("/index.html", "shell")]);
        let manager = Arc::new(CacheManager::new(test_config(), upstream));
        let handle = spawn_cache_worker(manager);
        handle.wait_until_active().await.unwrap();

        assert!(handle.post_message(PageMessage::SyncOfflineData));
    }
}
