//! Cache server configuration records.
//!
//! [`CacheServerConfig`] is owned by the cache registries; the topology
//! manager only rewrites its `bridge` link and bumps `config_version` so
//! the cache server can detect and hot-apply the change.

use serde::{Deserialize, Serialize};

use crate::address;
use crate::config::bridge::CacheStatus;

/// Cache type string that refuses bridging.
pub const LOCAL_CACHE_TYPE: &str = "local-cache";

/// The bridge side of a cache's configuration.
///
/// Mirrors the bridge's node list and port so the cache cluster knows
/// where its replication relay lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeLink {
    /// The bridge node addresses.
    pub servers: Vec<String>,
    /// The bridge port.
    pub port: u16,
    /// This cache side's replication status.
    pub status: CacheStatus,
}

impl BridgeLink {
    /// Comma-joined boundary form of the bridge node list.
    pub fn servers_string(&self) -> String {
        address::join_list(&self.servers)
    }
}

/// Per-cache configuration held by the cache registries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheServerConfig {
    /// The cache's registered name.
    pub cache_id: String,
    /// Cache deployment type; `"local-cache"` cannot bridge.
    pub cache_type: String,
    /// Every server hosting this cache cluster.
    pub servers: Vec<String>,
    /// Bridge attachment, `None` when detached.
    pub bridge: Option<BridgeLink>,
    /// Incremented on every write so the cache server can hot-apply.
    pub config_version: u64,
}

impl CacheServerConfig {
    /// Record a configuration write.
    pub fn bump_version(&mut self) {
        self.config_version += 1;
    }

    /// Whether this cache is a local (non-clustered) deployment.
    pub fn is_local(&self) -> bool {
        self.cache_type.eq_ignore_ascii_case(LOCAL_CACHE_TYPE)
    }
}

/// Opaque pre-encrypted credentials passed through to cache registries.
///
/// The topology manager never inspects or decrypts these; encryption is an
/// external collaborator concern.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheCredentials {
    /// Encrypted user id bytes.
    pub user_id: Option<Vec<u8>>,
    /// Encrypted password bytes.
    pub password: Option<Vec<u8>>,
}
