//! Cache module - generations, lifecycle, and the cache context
//!
//! Layout mirrors the runtime split:
//! - **store**: named generation buckets and stored responses
//! - **lifecycle**: the install/activate state machine
//! - **manager**: fetch strategy and the upstream seam
//! - **worker**: the separate execution context and its registry

pub mod lifecycle;
pub mod manager;
pub mod store;
pub mod worker;

pub use lifecycle::LifecyclePhase;
pub use manager::{
    AssetMethod, AssetRequest, CacheConfig, CacheManager, HttpUpstream, ResourceKind, Upstream,
};
pub use store::{CacheGeneration, GenerationStore, StoreStats, StoredResponse};
pub use worker::{
    spawn_cache_worker, CacheEvent, CacheHandle, WorkerRegistration, WorkerRegistry,
};
