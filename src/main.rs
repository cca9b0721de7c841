//! Canopy - offline-resilience runtime for web clients
//!
//! "A shelter and a shade" - Isaiah 4:6

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use canopy::{
    cache::{CacheManager, HttpUpstream, WorkerRegistry},
    config::Args,
    connectivity::ConnectivityMonitor,
    push::{HttpNotificationApi, NotificationGateway, SendRequest},
    sync::{spawn_reconnect_task, SyncTrigger},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    // Parse command line arguments
    let args = Args::parse();

    // Initialize tracing/logging
    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("canopy={},info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Validate configuration
    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    let cache_config = args.cache_config();

    // Print startup banner
    info!("======================================");
    info!("  Canopy - Offline Resilience Runtime");
    info!("  \"A shelter and a shade\"");
    info!("======================================");
    info!(
        "Version: {} ({})",
        env!("CARGO_PKG_VERSION"),
        option_env!("GIT_COMMIT_SHORT").unwrap_or("unknown")
    );
    info!("Origin: {}", args.origin_url);
    info!("API base: {}", args.api_base());
    info!(
        "Caches: {} / {}",
        cache_config.shell_name(),
        cache_config.dynamic_name()
    );
    info!("App shell: {} asset(s)", cache_config.app_shell.len());
    info!("Fallback: {}", cache_config.fallback_path);
    info!("Scope: {}", args.worker_scope);
    info!(
        "Mode: {}",
        if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" }
    );
    info!("======================================");

    // Wire the cache side: upstream HTTP origin, generation store, worker
    let upstream = Arc::new(HttpUpstream::new(&args.origin_url, args.request_timeout_ms));
    let manager = Arc::new(CacheManager::new(cache_config, upstream));
    let registry = Arc::new(WorkerRegistry::new(&args.worker_scope, manager));

    // Register and wait for the lifecycle to settle (optional in dev mode)
    match registry.register().await {
        Ok(registration) => {
            info!(scope = %registration.scope(), "Cache worker registered");
            if let Err(e) = registration.handle().wait_until_active().await {
                if args.dev_mode {
                    warn!("Cache worker did not activate (dev mode, continuing): {}", e);
                } else {
                    error!("Cache worker did not activate: {}", e);
                    std::process::exit(1);
                }
            } else {
                info!("Cache worker active, fetch interception enabled");
            }
        }
        Err(e) => {
            if args.dev_mode {
                warn!("Cache worker registration failed (dev mode, continuing): {}", e);
            } else {
                error!("Cache worker registration failed: {}", e);
                std::process::exit(1);
            }
        }
    }

    // Connectivity monitoring with sync-on-reconnect
    let monitor = ConnectivityMonitor::default();
    let trigger = SyncTrigger::new(Arc::clone(&registry));
    let _reconnect_handle = spawn_reconnect_task(monitor.watch(), trigger);
    info!("Connectivity monitor started (sync fires on reconnect)");

    // Optional startup test notification
    if let Some(ref user_id) = args.notify_user {
        let config = args.notification_config();
        let api = HttpNotificationApi::new(config.clone());
        let request = SendRequest {
            user_id: user_id.clone(),
            title: "Canopy online".to_string(),
            body: "Offline resilience is active".to_string(),
            icon: config.default_icon.clone(),
            url: config.default_url.clone(),
        };
        match api.send_notification(&request).await {
            Ok(()) => info!(user_id = %user_id, "Startup test notification accepted"),
            Err(e) => warn!(user_id = %user_id, "Startup test notification failed (non-fatal): {}", e),
        }
    }

    // Park until shutdown
    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    Ok(())
}
