//! Cache manager - install/activate cycle and fetch strategy
//!
//! Owns the generation store and implements the three lifecycle operations
//! of the cache context:
//!
//! - **install**: populate the current app-shell generation from the upstream
//! - **activate**: sweep every generation not carrying a current name
//! - **fetch**: cache-first lookup, opportunistic dynamic caching, and the
//!   entry-point fallback when the upstream is unreachable
//!
//! The manager is phase-unaware; the worker task (worker.rs) drives these
//! operations in state-machine order.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cache::store::{GenerationStore, StoredResponse};
use crate::types::{CanopyError, Result};

// ============================================================================
// Configuration
// ============================================================================

/// Cache-context configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Generation version; both current generation names carry it
    pub version: u32,
    /// Asset paths populated into the app-shell generation at install
    pub app_shell: Vec<String>,
    /// Entry-point document path served as the offline fallback
    pub fallback_path: String,
    /// Depth of the worker event queue
    pub event_queue_size: usize,
}

impl CacheConfig {
    /// Name of the current app-shell generation, e.g. "appShell_v2"
    pub fn shell_name(&self) -> String {
        format!("appShell_v{}", self.version)
    }

    /// Name of the current dynamic generation, e.g. "dynamic_v2"
    pub fn dynamic_name(&self) -> String {
        format!("dynamic_v{}", self.version)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            version: 1,
            app_shell: vec!["/".to_string(), "/index.html".to_string()],
            fallback_path: "/index.html".to_string(),
            event_queue_size: 256,
        }
    }
}

// ============================================================================
// Requests
// ============================================================================

/// Request methods the cache context distinguishes. Only GET is ever
/// intercepted; everything else passes straight to the upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetMethod {
    Get,
    Head,
    Post,
    Put,
    Delete,
    Patch,
    Options,
}

impl AssetMethod {
    pub fn is_get(&self) -> bool {
        matches!(self, AssetMethod::Get)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AssetMethod::Get => "GET",
            AssetMethod::Head => "HEAD",
            AssetMethod::Post => "POST",
            AssetMethod::Put => "PUT",
            AssetMethod::Delete => "DELETE",
            AssetMethod::Patch => "PATCH",
            AssetMethod::Options => "OPTIONS",
        }
    }
}

/// What kind of resource a request is for. The offline fallback deliberately
/// ignores this: a script or image miss while offline still receives the
/// entry-point document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResourceKind {
    Document,
    Script,
    Style,
    Image,
    Font,
    #[default]
    Other,
}

/// One request as seen by the cache context
#[derive(Debug, Clone, PartialEq)]
pub struct AssetRequest {
    pub method: AssetMethod,
    pub path: String,
    pub kind: ResourceKind,
}

impl AssetRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: AssetMethod::Get,
            path: path.into(),
            kind: ResourceKind::default(),
        }
    }

    pub fn new(method: AssetMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            kind: ResourceKind::default(),
        }
    }

    pub fn with_kind(mut self, kind: ResourceKind) -> Self {
        self.kind = kind;
        self
    }

    /// Cache key for this request
    pub fn key(&self) -> &str {
        &self.path
    }
}

// ============================================================================
// Upstream Trait (for dependency injection)
// ============================================================================

/// Trait for reaching the application origin (allows mocking in tests)
#[async_trait::async_trait]
pub trait Upstream: Send + Sync {
    /// Perform the request against the origin. `Err(Network)` means
    /// transport-level failure; HTTP error statuses come back as responses.
    async fn fetch(&self, request: &AssetRequest) -> Result<StoredResponse>;
}

/// Upstream over HTTP, for production use
pub struct HttpUpstream {
    base_url: String,
    http_client: reqwest::Client,
}

impl HttpUpstream {
    pub fn new(base_url: impl Into<String>, request_timeout_ms: u64) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(request_timeout_ms))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http_client,
        }
    }
}

#[async_trait::async_trait]
impl Upstream for HttpUpstream {
    async fn fetch(&self, request: &AssetRequest) -> Result<StoredResponse> {
        let url = format!("{}{}", self.base_url, request.path);
        let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())
            .map_err(|e| CanopyError::Internal(format!("invalid method: {}", e)))?;

        let response = self
            .http_client
            .request(method, &url)
            .send()
            .await
            .map_err(|e| CanopyError::Network(format!("fetch {} failed: {}", url, e)))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| CanopyError::Network(format!("read body from {} failed: {}", url, e)))?;

        Ok(StoredResponse::new(status, headers, body))
    }
}

// ============================================================================
// Cache Manager
// ============================================================================

/// Owns generation storage and the fetch strategy for one cache context
pub struct CacheManager {
    config: CacheConfig,
    store: GenerationStore,
    upstream: Arc<dyn Upstream>,
}

impl CacheManager {
    pub fn new(config: CacheConfig, upstream: Arc<dyn Upstream>) -> Self {
        Self {
            config,
            store: GenerationStore::new(),
            upstream,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn store(&self) -> &GenerationStore {
        &self.store
    }

    /// Populate the current app-shell generation with the configured asset
    /// list. All-or-nothing: the first fetch or store failure aborts the
    /// install and the incomplete generation must not be promoted.
    pub async fn install(&self) -> Result<()> {
        let shell_name = self.config.shell_name();
        let shell = self.store.open(&shell_name);

        for path in &self.config.app_shell {
            let request = AssetRequest::get(path.clone());
            let response = self.upstream.fetch(&request).await?;
            if !response.ok() {
                return Err(CanopyError::Network(format!(
                    "install fetch for {} returned {}",
                    path, response.status
                )));
            }
            shell.put(path, response)?;
        }

        info!(
            generation = %shell_name,
            assets = shell.len(),
            bytes = shell.body_bytes(),
            "App shell installed"
        );
        Ok(())
    }

    /// Make the current generations the only ones in storage. The sweep
    /// enumerates everything present rather than working from a list of
    /// known prior names, so skipped versions cannot leak storage.
    pub async fn activate(&self) -> Result<()> {
        let shell_name = self.config.shell_name();
        let dynamic_name = self.config.dynamic_name();

        // Both current generations exist from here on
        self.store.open(&shell_name);
        self.store.open(&dynamic_name);

        let mut swept = Vec::new();
        for name in self.store.names() {
            if name != shell_name && name != dynamic_name {
                self.store.delete(&name);
                swept.push(name);
            }
        }

        info!(
            shell = %shell_name,
            dynamic = %dynamic_name,
            swept = swept.len(),
            "Cache generations activated"
        );
        if !swept.is_empty() {
            debug!(generations = ?swept, "Swept non-current generations");
        }
        Ok(())
    }

    /// Forward a request to the upstream untouched. Used for everything the
    /// context does not intercept (wrong phase, non-GET methods).
    pub async fn passthrough(&self, request: &AssetRequest) -> Result<StoredResponse> {
        self.upstream.fetch(request).await
    }

    /// Cache-first fetch strategy. Non-GET requests pass straight through.
    pub async fn handle_fetch(&self, request: &AssetRequest) -> Result<StoredResponse> {
        if !request.method.is_get() {
            return self.passthrough(request).await;
        }

        if let Some(cached) = self.store.match_any(request.key()) {
            debug!(path = %request.path, "Cache hit");
            return Ok(cached);
        }

        match self.upstream.fetch(request).await {
            Ok(response) => {
                // Best-effort: a store failure never fails the request
                let dynamic = self.store.open(&self.config.dynamic_name());
                if let Err(e) = dynamic.put(request.key(), response.clone()) {
                    warn!(path = %request.path, error = %e, "Dynamic cache store failed");
                } else {
                    debug!(path = %request.path, status = response.status, "Cached dynamic response");
                }
                Ok(response)
            }
            Err(CanopyError::Network(reason)) => {
                warn!(path = %request.path, reason = %reason, "Upstream unreachable, trying fallback");
                match self.store.match_any(&self.config.fallback_path) {
                    Some(fallback) => Ok(fallback),
                    None => Err(CanopyError::Network(reason)),
                }
            }
            Err(e) => Err(e),
        }
    }
}
