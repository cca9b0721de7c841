//! Configuration for Canopy
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;

use crate::cache::CacheConfig;
use crate::push::NotificationConfig;

/// Canopy - offline-resilience runtime for web clients
///
/// "A shelter and a shade" - Isaiah 4:6
#[derive(Parser, Debug, Clone)]
#[command(name = "canopy")]
#[command(about = "Offline-resilience runtime for web clients")]
pub struct Args {
    /// Origin base URL the cache context fetches application assets from
    #[arg(long, env = "ORIGIN_URL", default_value = "http://localhost:8080")]
    pub origin_url: String,

    /// Base URL of the notification server (public-key, subscribe, send endpoints)
    /// Defaults to the same origin as the application
    #[arg(long, env = "API_BASE_URL")]
    pub api_base_url: Option<String>,

    /// Cache generation version; bumping it installs fresh generations and
    /// sweeps every older one on activation
    #[arg(long, env = "CACHE_VERSION", default_value = "1")]
    pub cache_version: u32,

    /// Comma-separated list of app-shell asset paths populated at install
    #[arg(
        long,
        env = "APP_SHELL_ASSETS",
        default_value = "/,/index.html,/manifest.json,/icon.png"
    )]
    pub app_shell_assets: String,

    /// Path of the entry-point document served when an upstream fetch fails
    #[arg(long, env = "FALLBACK_PATH", default_value = "/index.html")]
    pub fallback_path: String,

    /// Scope the cache context registration is keyed by
    #[arg(long, env = "WORKER_SCOPE", default_value = "/")]
    pub worker_scope: String,

    /// Upstream request timeout in milliseconds
    #[arg(long, env = "REQUEST_TIMEOUT_MS", default_value = "10000")]
    pub request_timeout_ms: u64,

    /// Depth of the cache-context event queue; messages beyond it are dropped
    #[arg(long, env = "EVENT_QUEUE_SIZE", default_value = "256")]
    pub event_queue_size: usize,

    /// Icon path attached to outgoing notifications
    #[arg(long, env = "NOTIFY_ICON", default_value = "/icon.png")]
    pub notify_icon: String,

    /// Click-through URL attached to outgoing notifications
    #[arg(long, env = "NOTIFY_URL", default_value = "/")]
    pub notify_url: String,

    /// If set, send a test notification to this user id after startup
    #[arg(long, env = "NOTIFY_USER")]
    pub notify_user: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Enable development mode (keeps running when the origin is unreachable)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,
}

impl Args {
    /// Get effective notification server base URL (falls back to the origin)
    pub fn api_base(&self) -> &str {
        self.api_base_url.as_deref().unwrap_or(&self.origin_url)
    }

    /// Get the app-shell asset list, split and trimmed
    pub fn app_shell_list(&self) -> Vec<String> {
        self.app_shell_assets
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Build the cache-context configuration
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            version: self.cache_version,
            app_shell: self.app_shell_list(),
            fallback_path: self.fallback_path.clone(),
            event_queue_size: self.event_queue_size,
        }
    }

    /// Build the notification-server configuration
    pub fn notification_config(&self) -> NotificationConfig {
        NotificationConfig {
            base_url: self.api_base().trim_end_matches('/').to_string(),
            default_icon: self.notify_icon.clone(),
            default_url: self.notify_url.clone(),
            request_timeout_ms: self.request_timeout_ms,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.cache_version == 0 {
            return Err("CACHE_VERSION must be at least 1".to_string());
        }

        // tokio's bounded mpsc panics on a zero buffer
        if self.event_queue_size == 0 {
            return Err("EVENT_QUEUE_SIZE must be at least 1".to_string());
        }

        let assets = self.app_shell_list();
        if assets.is_empty() {
            return Err("APP_SHELL_ASSETS must list at least one asset path".to_string());
        }

        if let Some(bad) = assets.iter().find(|a| !a.starts_with('/')) {
            return Err(format!("App-shell asset paths must start with '/': {}", bad));
        }

        if !assets.iter().any(|a| a == &self.fallback_path) {
            return Err(format!(
                "FALLBACK_PATH {} must be part of APP_SHELL_ASSETS, or offline fallback cannot work",
                self.fallback_path
            ));
        }

        Ok(())
    }
}
