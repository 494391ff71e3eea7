//! Bridge configuration records.
//!
//! [`BridgeConfiguration`] is the root of bridge state: one record per
//! bridge identifier, held authoritatively by the bridge registries and
//! re-fetched before every mutation. The topology manager mutates a copy
//! in memory, bumps `deployment_version`, and pushes the result to every
//! bridge node and affected cache server.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::address;

/// Maximum bridge nodes per bridge (an active/passive relay pair).
pub const MAX_BRIDGE_NODES: usize = 2;

/// Maximum caches attached to a bridge (one per replication side).
pub const MAX_TARGET_CACHES: usize = 2;

/// Whether a cache side is an active or passive replication endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CacheStatus {
    /// The side participates in replication normally.
    Active,
    /// The side is a standby endpoint; at most one per bridge.
    Passive,
}

impl std::fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheStatus::Active => write!(f, "Active"),
            CacheStatus::Passive => write!(f, "Passive"),
        }
    }
}

/// Replication-queue tuning, opaque to the topology manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueConfig {
    /// Maximum queued operations.
    pub size: u64,
    /// Whether queue optimization is enabled.
    pub optimization_enabled: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            size: 1024,
            optimization_enabled: false,
        }
    }
}

/// One cache cluster attached to a bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetCacheConfiguration {
    /// The cache's registered name; unique within a bridge.
    pub cache_id: String,
    /// Alternate name distinguishing otherwise-identical cache IDs.
    pub cache_alias: Option<String>,
    /// Every node serving this cache cluster, used for config fan-out.
    pub servers: Vec<String>,
    /// Exactly one attached cache is the write-master at any time.
    pub is_master: bool,
    /// Whether this side is currently live-replicating.
    pub is_connected: bool,
    /// Active or passive side.
    pub status: CacheStatus,
}

impl TargetCacheConfiguration {
    /// Comma-joined boundary form of the server list.
    pub fn servers_string(&self) -> String {
        address::join_list(&self.servers)
    }

    /// Whether this entry matches a cache id and, when supplied, an alias.
    pub fn matches(&self, cache_id: &str, alias: Option<&str>) -> bool {
        if self.cache_id != cache_id {
            return false;
        }
        match alias {
            Some(a) => self.cache_alias.as_deref() == Some(a),
            None => true,
        }
    }
}

/// Root of bridge state; one record per bridge identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeConfiguration {
    /// Logical bridge name, unique cluster-wide. Immutable once created.
    pub id: String,
    /// Opaque identity assigned at creation, surviving config rewrites.
    pub config_id: Uuid,
    /// The hosts running a bridge relay for this bridge. At most 2.
    pub bridge_nodes: Vec<String>,
    /// The node currently acting as the active relay. Empty when
    /// `bridge_nodes` is empty, otherwise a member of it.
    pub bridge_active: String,
    /// TCP port the bridge nodes communicate on; unique among all bridges
    /// registered across the node set.
    pub bridge_port: u16,
    /// Incremented on every structural change so receivers can detect
    /// stale pushes. Advisory last-writer-wins, not compare-and-swap.
    pub deployment_version: u64,
    /// Replicator virtual queue size, opaque tuning.
    pub replicator_virtual_queue_size: u64,
    /// Replication-queue tuning, opaque here.
    pub queue_config: QueueConfig,
    /// The caches attached to this bridge. At most 2, unique cache ids.
    pub target_cache_config_list: Vec<TargetCacheConfiguration>,
}

impl BridgeConfiguration {
    /// Create a fresh configuration with a new `config_id`.
    ///
    /// The first structural state counts as version 1.
    pub fn new(id: impl Into<String>, bridge_port: u16) -> Self {
        Self {
            id: id.into(),
            config_id: Uuid::new_v4(),
            bridge_nodes: Vec::new(),
            bridge_active: String::new(),
            bridge_port,
            deployment_version: 1,
            replicator_virtual_queue_size: 0,
            queue_config: QueueConfig::default(),
            target_cache_config_list: Vec::new(),
        }
    }

    /// Comma-joined boundary form of the node list.
    pub fn nodes_string(&self) -> String {
        address::join_list(&self.bridge_nodes)
    }

    /// Record a structural change.
    pub fn bump_version(&mut self) {
        self.deployment_version += 1;
    }

    /// The attached cache matching `cache_id` (and `alias`, when supplied).
    pub fn find_cache(
        &self,
        cache_id: &str,
        alias: Option<&str>,
    ) -> Option<&TargetCacheConfiguration> {
        self.target_cache_config_list
            .iter()
            .find(|c| c.matches(cache_id, alias))
    }

    /// Mutable variant of [`find_cache`](Self::find_cache).
    pub fn find_cache_mut(
        &mut self,
        cache_id: &str,
        alias: Option<&str>,
    ) -> Option<&mut TargetCacheConfiguration> {
        self.target_cache_config_list
            .iter_mut()
            .find(|c| c.matches(cache_id, alias))
    }

    /// The current master entry, if any.
    pub fn master(&self) -> Option<&TargetCacheConfiguration> {
        self.target_cache_config_list.iter().find(|c| c.is_master)
    }

    /// Whether any connected attached cache is currently master.
    ///
    /// Master assignment on attach only counts connected entries.
    pub fn has_connected_master(&self) -> bool {
        self.target_cache_config_list
            .iter()
            .any(|c| c.is_master && c.is_connected)
    }

    /// Count of passive entries among the attached caches.
    pub fn passive_count(&self) -> usize {
        self.target_cache_config_list
            .iter()
            .filter(|c| c.status == CacheStatus::Passive)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_target(cache_id: &str, status: CacheStatus) -> TargetCacheConfiguration {
        TargetCacheConfiguration {
            cache_id: cache_id.to_string(),
            cache_alias: None,
            servers: vec!["server1".to_string()],
            is_master: false,
            is_connected: true,
            status,
        }
    }

    #[test]
    fn test_new_bridge_starts_at_version_one() {
        let config = BridgeConfiguration::new("B1", 10000);
        assert_eq!(config.id, "B1");
        assert_eq!(config.deployment_version, 1);
        assert!(config.bridge_nodes.is_empty());
        assert!(config.bridge_active.is_empty());
    }

    #[test]
    fn test_fresh_config_ids_are_distinct() {
        let a = BridgeConfiguration::new("B1", 10000);
        let b = BridgeConfiguration::new("B1", 10000);
        assert_ne!(a.config_id, b.config_id);
    }

    #[test]
    fn test_nodes_string_boundary_form() {
        let mut config = BridgeConfiguration::new("B1", 10000);
        config.bridge_nodes = vec!["nodeA".to_string(), "nodeB".to_string()];
        assert_eq!(config.nodes_string(), "nodeA,nodeB");
    }

    #[test]
    fn test_find_cache_with_alias() {
        let mut config = BridgeConfiguration::new("B1", 10000);
        let mut aliased = make_target("cacheX", CacheStatus::Active);
        aliased.cache_alias = Some("east".to_string());
        config.target_cache_config_list.push(aliased);

        assert!(config.find_cache("cacheX", None).is_some());
        assert!(config.find_cache("cacheX", Some("east")).is_some());
        assert!(config.find_cache("cacheX", Some("west")).is_none());
    }

    #[test]
    fn test_passive_count() {
        let mut config = BridgeConfiguration::new("B1", 10000);
        config
            .target_cache_config_list
            .push(make_target("cacheX", CacheStatus::Passive));
        config
            .target_cache_config_list
            .push(make_target("cacheY", CacheStatus::Active));
        assert_eq!(config.passive_count(), 1);
    }

    #[test]
    fn test_serde_round_trip_uses_camel_case() {
        let mut config = BridgeConfiguration::new("B1", 10000);
        config.bridge_nodes = vec!["nodeA".to_string()];
        config.bridge_active = "nodeA".to_string();

        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"bridgeNodes\""));
        assert!(json.contains("\"deploymentVersion\""));

        let back: BridgeConfiguration = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
