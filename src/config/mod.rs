//! Configuration data model: bridge records and the mirrored cache side.

mod bridge;
mod cache;

pub use bridge::{
    BridgeConfiguration, CacheStatus, QueueConfig, TargetCacheConfiguration, MAX_BRIDGE_NODES,
    MAX_TARGET_CACHES,
};
pub use cache::{BridgeLink, CacheCredentials, CacheServerConfig, LOCAL_CACHE_TYPE};
