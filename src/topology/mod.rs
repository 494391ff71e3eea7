//! # Bridge Topology Manager
//!
//! The control plane for bridge replication: maintains the shared,
//! versioned [`BridgeConfiguration`] describing which caches are attached
//! to a bridge, which cache is the write-master, and how that
//! configuration propagates to every bridge node and affected cache
//! server.
//!
//! ## How an operation runs
//!
//! 1. Fetch the current config from the contacted registry (the registry
//!    copy is authoritative; nothing is cached across operations).
//! 2. Validate invariants; violations abort before any remote write.
//! 3. Mutate the in-memory config and bump its version counter.
//! 4. Push the result to every bridge node and affected cache server,
//!    sequentially, catching failures per target.
//! 5. Report per-target success/failure; no retry, no rollback, no
//!    quorum. Convergence is eventual and operator-driven.

mod attachment;
mod lifecycle;
mod ports;
mod propagation;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{
    BridgeConfiguration, CacheCredentials, CacheStatus, TargetCacheConfiguration,
};
use crate::error::{Error, Result};
use crate::registry::{connect_bridge, BridgeConnector, CacheConnector};
use crate::report::Reporter;

pub use attachment::{AddCacheRequest, ConnectionAction};
pub use lifecycle::CreateBridgeRequest;
pub use ports::{allocate_port, BRIDGE_PORT_FLOOR};
pub use propagation::{FanoutReport, PushOutcome, PushTarget};

/// Fixed deadline applied to every registry RPC.
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(30);

/// Result of a mutating topology operation: the config as written plus the
/// per-target outcome of the fan-out, so operators can target retries.
#[derive(Debug)]
pub struct TopologyOutcome {
    /// The bridge configuration after mutation.
    pub bridge: BridgeConfiguration,
    /// Per-target push results, in push order.
    pub fanout: FanoutReport,
}

/// Drives bridge lifecycle, cache attachment, and config propagation.
///
/// Constructed per invocation with explicit connectors and a reporter;
/// holds no state between operations; all state lives in the remote
/// registries and is re-fetched before every mutation.
pub struct TopologyManager {
    bridges: Arc<dyn BridgeConnector>,
    caches: Arc<dyn CacheConnector>,
    reporter: Arc<dyn Reporter>,
    rpc_timeout: Duration,
    credentials: Option<CacheCredentials>,
}

impl TopologyManager {
    /// Create a manager over the given connectors and reporter.
    pub fn new(
        bridges: Arc<dyn BridgeConnector>,
        caches: Arc<dyn CacheConnector>,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        Self {
            bridges,
            caches,
            reporter,
            rpc_timeout: DEFAULT_RPC_TIMEOUT,
            credentials: None,
        }
    }

    /// Override the per-RPC deadline.
    pub fn with_rpc_timeout(mut self, rpc_timeout: Duration) -> Self {
        self.rpc_timeout = rpc_timeout;
        self
    }

    /// Attach opaque pre-encrypted credentials passed through to every
    /// cache configuration write.
    pub fn with_credentials(mut self, credentials: CacheCredentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub(crate) fn credentials(&self) -> Option<&CacheCredentials> {
        self.credentials.as_ref()
    }

    pub(crate) fn bridges(&self) -> &dyn BridgeConnector {
        self.bridges.as_ref()
    }

    pub(crate) fn caches(&self) -> &dyn CacheConnector {
        self.caches.as_ref()
    }

    pub(crate) fn reporter(&self) -> &dyn Reporter {
        self.reporter.as_ref()
    }

    pub(crate) fn rpc_timeout(&self) -> Duration {
        self.rpc_timeout
    }

    /// Run a registry call under the RPC deadline.
    pub(crate) async fn with_deadline<T, F>(&self, label: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.rpc_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(label.to_string())),
        }
    }

    /// Fetch the bridge config registered on `server`, failing with
    /// [`Error::NotFound`] when the node has no record of it.
    pub(crate) async fn fetch_bridge(
        &self,
        server: &str,
        bridge_id: &str,
    ) -> Result<BridgeConfiguration> {
        let handle = connect_bridge(self.bridges(), server, self.rpc_timeout).await?;
        let config = self
            .with_deadline(
                &format!("fetching bridge '{bridge_id}' from '{server}'"),
                handle.get_bridge(bridge_id),
            )
            .await?;
        config.ok_or_else(|| {
            Error::NotFound(format!("bridge '{bridge_id}' is not registered on '{server}'"))
        })
    }

    /// Reject empty required string inputs.
    pub(crate) fn require(value: &str, what: &str) -> Result<()> {
        if value.trim().is_empty() {
            return Err(Error::Validation(format!("{what} must not be empty")));
        }
        Ok(())
    }
}

/// At most one passive entry may exist among the attached caches.
///
/// Checked before every mutation that touches statuses, and defensively on
/// the remaining set after a removal.
pub(crate) fn validate_passive_cap(list: &[TargetCacheConfiguration]) -> Result<()> {
    let passives: Vec<&str> = list
        .iter()
        .filter(|c| c.status == CacheStatus::Passive)
        .map(|c| c.cache_id.as_str())
        .collect();
    if passives.len() > 1 {
        return Err(Error::DualPassive(passives.join(", ")));
    }
    Ok(())
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
    fn test_require_rejects_blank_input() {
        assert!(TopologyManager::require("nodeA", "server").is_ok());
        assert!(matches!(
            TopologyManager::require("  ", "server"),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_passive_cap_validation() {
        let one_passive = vec![
            make_target("cacheX", CacheStatus::Passive),
            make_target("cacheY", CacheStatus::Active),
        ];
        assert!(validate_passive_cap(&one_passive).is_ok());

        let two_passive = vec![
            make_target("cacheX", CacheStatus::Passive),
            make_target("cacheY", CacheStatus::Passive),
        ];
        let err = validate_passive_cap(&two_passive).unwrap_err();
        assert!(matches!(err, Error::DualPassive(_)));
        assert!(err.to_string().contains("cacheX"));
    }
}
