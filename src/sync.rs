//! Sync trigger - fire-and-forget page → cache-context messaging
//!
//! The page can nudge the cache context to sync deferred offline data. The
//! message is one-way: no acknowledgment, no delivery guarantee, and no
//! consumer is obligated to exist on the receiving side. Callers must not
//! assume a sync actually happens.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::worker::WorkerRegistry;
use crate::connectivity::ConnectivityWatch;

/// One-way messages a page can post into the cache context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PageMessage {
    #[serde(rename = "SYNC_OFFLINE_DATA")]
    SyncOfflineData,
}

/// Posts sync requests at the active cache context, if there is one
#[derive(Clone)]
pub struct SyncTrigger {
    registry: Arc<WorkerRegistry>,
    fired: Arc<AtomicU64>,
}

impl SyncTrigger {
    pub fn new(registry: Arc<WorkerRegistry>) -> Self {
        Self {
            registry,
            fired: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Fire one sync request. Returns whether a controller accepted it.
    pub async fn trigger(&self) -> bool {
        match self.registry.controller().await {
            Some(controller) => {
                let accepted = controller.post_message(PageMessage::SyncOfflineData);
                if accepted {
                    self.fired.fetch_add(1, Ordering::Relaxed);
                    debug!("Sync request posted to cache context");
                }
                accepted
            }
            None => {
                debug!("Sync trigger skipped, no active cache context");
                false
            }
        }
    }

    /// How many sync requests have been accepted by a controller
    pub fn fired_count(&self) -> u64 {
        self.fired.load(Ordering::Relaxed)
    }
}

/// Fire the trigger once per offline→online transition, so deferred data
/// gets its sync nudge as soon as connectivity returns. Manual triggering
/// stays available and unconditional.
pub fn spawn_reconnect_task(mut watch: ConnectivityWatch, trigger: SyncTrigger) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut was_online = watch.is_online();
        while let Some(state) = watch.changed().await {
            let online = state.is_online();
            if online && !was_online {
                info!("Connection restored, requesting offline-data sync");
                trigger.trigger().await;
            }
            was_online = online;
        }
        debug!("Connectivity monitor gone, reconnect task exiting");
    })
}
