//! Collaborator contracts for the two remote registries.
//!
//! The topology manager never talks to a wire protocol directly; it is
//! constructed with a [`BridgeConnector`] and a [`CacheConnector`] and
//! obtains per-node handles from them for every operation. Handles are
//! explicit client objects passed by parameter, never module-level
//! singletons, so the fan-out loops are testable with in-memory fakes.

mod memory;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::{BridgeConfiguration, CacheCredentials, CacheServerConfig};
use crate::error::{Error, Result};

pub use memory::{MemoryBridgeRegistry, MemoryCacheRegistry, MemoryCluster};

/// Per-bridge-node registry holding [`BridgeConfiguration`] records.
#[async_trait]
pub trait BridgeRegistry: Send + Sync {
    /// Fetch the configuration registered for `bridge_id`, if any.
    async fn get_bridge(&self, bridge_id: &str) -> Result<Option<BridgeConfiguration>>;

    /// Register (create or overwrite) a bridge configuration.
    ///
    /// `notify_peers` asks the node to notify its peer relay; `config_only`
    /// updates the stored record without restarting the relay process.
    async fn register_bridge(
        &self,
        config: &BridgeConfiguration,
        notify_peers: bool,
        config_only: bool,
    ) -> Result<()>;

    /// Remove the configuration registered for `bridge_id`.
    async fn unregister_bridge(&self, bridge_id: &str) -> Result<()>;

    /// Every bridge configuration registered on this node.
    async fn list_bridges(&self) -> Result<Vec<BridgeConfiguration>>;
}

/// Per-cache-server registry holding [`CacheServerConfig`] records.
#[async_trait]
pub trait CacheRegistry: Send + Sync {
    /// Fetch the configuration registered for `cache_id`, if any.
    async fn get_cache(&self, cache_id: &str) -> Result<Option<CacheServerConfig>>;

    /// Write a cache configuration (its bridge link in particular).
    ///
    /// Credentials, when supplied, are opaque pre-encrypted bytes.
    /// `hot_apply` asks the server to apply the change without restart.
    async fn apply_bridge_to_cache(
        &self,
        config: &CacheServerConfig,
        credentials: Option<&CacheCredentials>,
        hot_apply: bool,
    ) -> Result<()>;

    /// Start or stop the bridge replicator for a cache.
    async fn hot_apply_replicator(&self, cache_id: &str, stop: bool) -> Result<()>;

    /// Whether the cache process is currently running on this server.
    async fn is_running(&self, cache_id: &str) -> Result<bool>;
}

/// Connects to the bridge registry on a given node address.
#[async_trait]
pub trait BridgeConnector: Send + Sync {
    /// Open a handle to the bridge registry at `address`.
    async fn connect(&self, address: &str) -> Result<Arc<dyn BridgeRegistry>>;
}

/// Connects to the cache registry on a given server address.
#[async_trait]
pub trait CacheConnector: Send + Sync {
    /// Open a handle to the cache registry at `address`.
    ///
    /// `address` is a single `"host"` or `"host:port"` entry; list
    /// failover lives in [`connect_any_cache`].
    async fn connect(&self, address: &str) -> Result<Arc<dyn CacheRegistry>>;
}

/// Connect to a bridge registry with the operation's RPC deadline applied.
pub async fn connect_bridge(
    connector: &dyn BridgeConnector,
    address: &str,
    deadline: Duration,
) -> Result<Arc<dyn BridgeRegistry>> {
    tokio::time::timeout(deadline, connector.connect(address))
        .await
        .map_err(|_| Error::Timeout(format!("connecting to bridge node '{address}'")))?
}

/// Connect to the first reachable server in a cache address list.
///
/// Addresses are tried in order; each attempt gets the full RPC deadline.
/// Exhausting the list is a terminal connection error naming every server
/// tried.
pub async fn connect_any_cache(
    connector: &dyn CacheConnector,
    addresses: &[String],
    deadline: Duration,
) -> Result<(Arc<dyn CacheRegistry>, String)> {
    if addresses.is_empty() {
        return Err(Error::Validation("no cache server address given".into()));
    }

    for address in addresses {
        let attempt = tokio::time::timeout(deadline, connector.connect(address)).await;
        match attempt {
            Ok(Ok(handle)) => return Ok((handle, address.clone())),
            Ok(Err(e)) => {
                tracing::warn!(
                    server = address.as_str(),
                    error = %e,
                    "Cache server unreachable, trying next"
                );
            }
            Err(_) => {
                tracing::warn!(
                    server = address.as_str(),
                    "Cache server timed out, trying next"
                );
            }
        }
    }

    Err(Error::Connection(format!(
        "no cache server reachable, tried: {}",
        addresses.join(", ")
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn deadline() -> Duration {
        Duration::from_secs(5)
    }

    #[tokio::test]
    async fn test_connect_any_cache_fails_over_to_next_server() {
        let cluster = MemoryCluster::new();
        cluster.add_cache_server("server1");
        cluster.add_cache_server("server2");
        cluster.set_unreachable("server1", true);

        let addresses = vec!["server1".to_string(), "server2".to_string()];
        let (_, resolved) = connect_any_cache(&cluster, &addresses, deadline())
            .await
            .unwrap();
        assert_eq!(resolved, "server2");
    }

    #[tokio::test]
    async fn test_connect_any_cache_exhaustion_is_terminal() {
        let cluster = MemoryCluster::new();
        cluster.add_cache_server("server1");
        cluster.set_unreachable("server1", true);

        let addresses = vec!["server1".to_string()];
        let err = connect_any_cache(&cluster, &addresses, deadline())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::Connection(_)));
        assert!(err.to_string().contains("server1"));
    }

    #[tokio::test]
    async fn test_connect_any_cache_rejects_empty_list() {
        let cluster = MemoryCluster::new();
        let err = connect_any_cache(&cluster, &[], deadline()).await.err().unwrap();
        assert!(matches!(err, Error::Validation(_)));
    }
}
