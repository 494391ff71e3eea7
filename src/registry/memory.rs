//! In-memory registries and a fake cluster.
//!
//! [`MemoryCluster`] stands in for a real deployment: it owns one
//! [`MemoryBridgeRegistry`] per bridge-node address and one
//! [`MemoryCacheRegistry`] per cache-server address, and implements both
//! connector traits so a [`TopologyManager`](crate::topology::TopologyManager)
//! can run against it unchanged. Reachability and apply-failure toggles
//! make partial-propagation scenarios reproducible without a network.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use super::{BridgeConnector, BridgeRegistry, CacheConnector, CacheRegistry};
use crate::config::{BridgeConfiguration, CacheCredentials, CacheServerConfig};
use crate::error::{Error, Result};

/// A stored record with its last-write timestamp.
#[derive(Debug, Clone)]
struct Stored<T> {
    record: T,
    updated_at: i64,
}

impl<T> Stored<T> {
    fn new(record: T) -> Self {
        Self {
            record,
            updated_at: chrono::Utc::now().timestamp_millis(),
        }
    }
}

// ── Bridge Registry ──────────────────────────────────────────────────────────

/// In-memory bridge registry for a single node address.
pub struct MemoryBridgeRegistry {
    node: String,
    bridges: DashMap<String, Stored<BridgeConfiguration>>,
}

impl MemoryBridgeRegistry {
    /// Create an empty registry for `node`.
    pub fn new(node: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            bridges: DashMap::new(),
        }
    }

    /// The node address this registry belongs to.
    pub fn node(&self) -> &str {
        &self.node
    }

    /// Direct read of a stored configuration, bypassing the RPC surface.
    pub fn stored(&self, bridge_id: &str) -> Option<BridgeConfiguration> {
        self.bridges.get(bridge_id).map(|s| s.record.clone())
    }

    /// Millisecond timestamp of the last write for `bridge_id`.
    pub fn last_updated(&self, bridge_id: &str) -> Option<i64> {
        self.bridges.get(bridge_id).map(|s| s.updated_at)
    }

    /// Number of bridges registered on this node.
    pub fn len(&self) -> usize {
        self.bridges.len()
    }

    /// Whether no bridge is registered on this node.
    pub fn is_empty(&self) -> bool {
        self.bridges.is_empty()
    }
}

#[async_trait]
impl BridgeRegistry for MemoryBridgeRegistry {
    async fn get_bridge(&self, bridge_id: &str) -> Result<Option<BridgeConfiguration>> {
        Ok(self.stored(bridge_id))
    }

    async fn register_bridge(
        &self,
        config: &BridgeConfiguration,
        notify_peers: bool,
        config_only: bool,
    ) -> Result<()> {
        tracing::info!(
            node = self.node.as_str(),
            bridge_id = config.id.as_str(),
            version = config.deployment_version,
            notify_peers,
            config_only,
            "[Registry] Registering bridge config"
        );
        self.bridges
            .insert(config.id.clone(), Stored::new(config.clone()));
        Ok(())
    }

    async fn unregister_bridge(&self, bridge_id: &str) -> Result<()> {
        if self.bridges.remove(bridge_id).is_none() {
            return Err(Error::NotFound(format!(
                "bridge '{bridge_id}' is not registered on '{}'",
                self.node
            )));
        }
        tracing::info!(
            node = self.node.as_str(),
            bridge_id,
            "[Registry] Bridge config unregistered"
        );
        Ok(())
    }

    async fn list_bridges(&self) -> Result<Vec<BridgeConfiguration>> {
        Ok(self.bridges.iter().map(|s| s.value().record.clone()).collect())
    }
}

// ── Cache Registry ───────────────────────────────────────────────────────────

/// In-memory cache registry for a single server address.
pub struct MemoryCacheRegistry {
    server: String,
    caches: DashMap<String, Stored<CacheServerConfig>>,
    running: DashMap<String, bool>,
    fail_applies: AtomicBool,
}

impl MemoryCacheRegistry {
    /// Create an empty registry for `server`.
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            caches: DashMap::new(),
            running: DashMap::new(),
            fail_applies: AtomicBool::new(false),
        }
    }

    /// Seed a cache configuration directly, bypassing the RPC surface.
    pub fn seed(&self, config: CacheServerConfig) {
        self.running.insert(config.cache_id.clone(), true);
        self.caches
            .insert(config.cache_id.clone(), Stored::new(config));
    }

    /// Direct read of a stored configuration, bypassing the RPC surface.
    pub fn stored(&self, cache_id: &str) -> Option<CacheServerConfig> {
        self.caches.get(cache_id).map(|s| s.record.clone())
    }

    /// Make every subsequent `apply_bridge_to_cache` call fail.
    pub fn set_apply_failure(&self, fail: bool) {
        self.fail_applies.store(fail, Ordering::SeqCst);
    }

    /// Mark a cache process as running or stopped.
    pub fn set_running(&self, cache_id: &str, running: bool) {
        self.running.insert(cache_id.to_string(), running);
    }
}

#[async_trait]
impl CacheRegistry for MemoryCacheRegistry {
    async fn get_cache(&self, cache_id: &str) -> Result<Option<CacheServerConfig>> {
        Ok(self.stored(cache_id))
    }

    async fn apply_bridge_to_cache(
        &self,
        config: &CacheServerConfig,
        _credentials: Option<&CacheCredentials>,
        hot_apply: bool,
    ) -> Result<()> {
        if self.fail_applies.load(Ordering::SeqCst) {
            return Err(Error::Connection(format!(
                "cache server '{}' rejected the configuration write",
                self.server
            )));
        }
        tracing::info!(
            server = self.server.as_str(),
            cache_id = config.cache_id.as_str(),
            version = config.config_version,
            bridged = config.bridge.is_some(),
            hot_apply,
            "[Registry] Applied cache config"
        );
        self.caches
            .insert(config.cache_id.clone(), Stored::new(config.clone()));
        Ok(())
    }

    async fn hot_apply_replicator(&self, cache_id: &str, stop: bool) -> Result<()> {
        if self.fail_applies.load(Ordering::SeqCst) {
            return Err(Error::Connection(format!(
                "cache server '{}' rejected the replicator signal",
                self.server
            )));
        }
        if !self.caches.contains_key(cache_id) {
            return Err(Error::NotFound(format!(
                "cache '{cache_id}' is not registered on '{}'",
                self.server
            )));
        }
        tracing::info!(
            server = self.server.as_str(),
            cache_id,
            stop,
            "[Registry] Replicator signal"
        );
        Ok(())
    }

    async fn is_running(&self, cache_id: &str) -> Result<bool> {
        Ok(self.running.get(cache_id).map(|r| *r).unwrap_or(false))
    }
}

// ── Cluster ──────────────────────────────────────────────────────────────────

/// A fake deployment: addressable bridge-node and cache-server registries.
///
/// Implements [`BridgeConnector`] and [`CacheConnector`]; connecting to an
/// address that was never added, or one marked unreachable, fails with a
/// connection error the way a dead host would.
#[derive(Default)]
pub struct MemoryCluster {
    bridge_nodes: DashMap<String, Arc<MemoryBridgeRegistry>>,
    cache_servers: DashMap<String, Arc<MemoryCacheRegistry>>,
    unreachable: DashMap<String, ()>,
}

impl MemoryCluster {
    /// Create an empty cluster.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a bridge node at `address`, returning its registry.
    pub fn add_bridge_node(&self, address: &str) -> Arc<MemoryBridgeRegistry> {
        let registry = Arc::new(MemoryBridgeRegistry::new(address));
        self.bridge_nodes
            .insert(address.to_string(), Arc::clone(&registry));
        registry
    }

    /// Add a cache server at `address`, returning its registry.
    pub fn add_cache_server(&self, address: &str) -> Arc<MemoryCacheRegistry> {
        let registry = Arc::new(MemoryCacheRegistry::new(address));
        self.cache_servers
            .insert(address.to_string(), Arc::clone(&registry));
        registry
    }

    /// Seed the same cache configuration on every server in its list.
    pub fn seed_cache(&self, config: &CacheServerConfig) {
        for server in &config.servers {
            let registry = self
                .cache_servers
                .get(server)
                .map(|r| Arc::clone(&r))
                .unwrap_or_else(|| self.add_cache_server(server));
            registry.seed(config.clone());
        }
    }

    /// Mark an address unreachable (or reachable again).
    pub fn set_unreachable(&self, address: &str, unreachable: bool) {
        if unreachable {
            self.unreachable.insert(address.to_string(), ());
        } else {
            self.unreachable.remove(address);
        }
    }

    /// The bridge registry at `address`, if one was added.
    pub fn bridge_node(&self, address: &str) -> Option<Arc<MemoryBridgeRegistry>> {
        self.bridge_nodes.get(address).map(|r| Arc::clone(&r))
    }

    /// The cache registry at `address`, if one was added.
    pub fn cache_server(&self, address: &str) -> Option<Arc<MemoryCacheRegistry>> {
        self.cache_servers.get(address).map(|r| Arc::clone(&r))
    }

    /// The bridge config stored on a given node, bypassing the RPC surface.
    pub fn bridge_config_on(&self, address: &str, bridge_id: &str) -> Option<BridgeConfiguration> {
        self.bridge_node(address)?.stored(bridge_id)
    }

    /// The cache config stored on a given server, bypassing the RPC surface.
    pub fn cache_config_on(&self, address: &str, cache_id: &str) -> Option<CacheServerConfig> {
        self.cache_server(address)?.stored(cache_id)
    }

    fn check_reachable(&self, address: &str) -> Result<()> {
        if self.unreachable.contains_key(address) {
            return Err(Error::Connection(format!("'{address}' is unreachable")));
        }
        Ok(())
    }
}

#[async_trait]
impl BridgeConnector for MemoryCluster {
    async fn connect(&self, address: &str) -> Result<Arc<dyn BridgeRegistry>> {
        self.check_reachable(address)?;
        match self.bridge_nodes.get(address) {
            Some(registry) => Ok(Arc::clone(&registry) as Arc<dyn BridgeRegistry>),
            None => Err(Error::Connection(format!(
                "no bridge service listening on '{address}'"
            ))),
        }
    }
}

#[async_trait]
impl CacheConnector for MemoryCluster {
    async fn connect(&self, address: &str) -> Result<Arc<dyn CacheRegistry>> {
        self.check_reachable(address)?;
        match self.cache_servers.get(address) {
            Some(registry) => Ok(Arc::clone(&registry) as Arc<dyn CacheRegistry>),
            None => Err(Error::Connection(format!(
                "no cache service listening on '{address}'"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheStatus;

    fn make_bridge(id: &str) -> BridgeConfiguration {
        let mut config = BridgeConfiguration::new(id, 10000);
        config.bridge_nodes = vec!["nodeA".to_string()];
        config.bridge_active = "nodeA".to_string();
        config
    }

    #[tokio::test]
    async fn test_register_and_get_round_trip() {
        let registry = MemoryBridgeRegistry::new("nodeA");
        let config = make_bridge("B1");

        registry.register_bridge(&config, false, false).await.unwrap();
        let fetched = registry.get_bridge("B1").await.unwrap().unwrap();
        assert_eq!(fetched, config);
        assert!(registry.get_bridge("B2").await.unwrap().is_none());
        assert!(registry.last_updated("B1").is_some());
        assert!(registry.last_updated("B2").is_none());
    }

    #[tokio::test]
    async fn test_unregister_missing_bridge_is_not_found() {
        let registry = MemoryBridgeRegistry::new("nodeA");
        let err = registry.unregister_bridge("B1").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_unreachable_node_refuses_connections() {
        let cluster = MemoryCluster::new();
        cluster.add_bridge_node("nodeA");
        cluster.set_unreachable("nodeA", true);

        let err = BridgeConnector::connect(&cluster, "nodeA").await.err().unwrap();
        assert!(matches!(err, Error::Connection(_)));

        cluster.set_unreachable("nodeA", false);
        assert!(BridgeConnector::connect(&cluster, "nodeA").await.is_ok());
    }

    #[tokio::test]
    async fn test_apply_failure_injection() {
        let cluster = MemoryCluster::new();
        let server = cluster.add_cache_server("server1");
        let config = CacheServerConfig {
            cache_id: "cacheX".to_string(),
            cache_type: "replicated".to_string(),
            servers: vec!["server1".to_string()],
            bridge: None,
            config_version: 0,
        };

        server.set_apply_failure(true);
        let err = server
            .apply_bridge_to_cache(&config, None, true)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Connection(_)));

        server.set_apply_failure(false);
        server.apply_bridge_to_cache(&config, None, true).await.unwrap();
        assert_eq!(server.stored("cacheX").unwrap(), config);
    }

    #[tokio::test]
    async fn test_seed_cache_reaches_every_server() {
        let cluster = MemoryCluster::new();
        cluster.add_cache_server("server1");
        let config = CacheServerConfig {
            cache_id: "cacheX".to_string(),
            cache_type: "partitioned".to_string(),
            servers: vec!["server1".to_string(), "server2".to_string()],
            bridge: Some(crate::config::BridgeLink {
                servers: vec!["nodeA".to_string()],
                port: 10000,
                status: CacheStatus::Active,
            }),
            config_version: 1,
        };

        cluster.seed_cache(&config);
        assert!(cluster.cache_config_on("server1", "cacheX").is_some());
        // server2 was created on demand
        assert!(cluster.cache_config_on("server2", "cacheX").is_some());
    }
}
