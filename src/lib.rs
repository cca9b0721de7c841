//! Canopy - offline-resilience runtime for web clients
//!
//! "A shelter and a shade" - Isaiah 4:6
//!
//! Canopy keeps a web client usable when the network is not: a versioned
//! asset cache with cache-first interception and entry-point fallback, push
//! notification subscription management, and connectivity-edge sync
//! triggering.
//!
//! ## Components
//!
//! - **Cache**: versioned cache generations with an install/activate
//!   lifecycle and cache-first fetch handling
//! - **Push**: capability probing, permission handling, and push
//!   subscription upkeep against the application server
//! - **Connectivity**: edge-triggered online/offline state with observer
//!   subscriptions
//! - **Sync**: fire-and-forget sync requests toward the active cache
//!   context on reconnect

pub mod cache;
pub mod config;
pub mod connectivity;
pub mod push;
pub mod sync;
pub mod types;

pub use cache::{CacheConfig, CacheManager, HttpUpstream, LifecyclePhase, WorkerRegistry};
pub use config::Args;
pub use connectivity::{ConnectivityMonitor, ConnectivityState};
pub use push::{HttpNotificationApi, SubscriptionManager};
pub use sync::{spawn_reconnect_task, SyncTrigger};
pub use types::{CanopyError, Result};
