//! Push-and-report propagation primitive.
//!
//! Every mutating operation shares the same pattern: mutate the in-memory
//! config, then push it to each target in a sequential loop, catching
//! failures per target and recording them in a [`FanoutReport`]. A failed
//! target never aborts the remaining fan-out and nothing is rolled back;
//! the operator retries against the specific failed node.

use crate::config::{
    BridgeConfiguration, CacheCredentials, CacheServerConfig, TargetCacheConfiguration,
};
use crate::error::{Error, Result};
use crate::registry::{connect_any_cache, connect_bridge};

use super::TopologyManager;

// ── Report Types ─────────────────────────────────────────────────────────────

/// A single fan-out destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushTarget {
    /// A bridge relay node.
    BridgeNode(String),
    /// One server of an attached cache cluster.
    CacheServer {
        /// The cache whose config was pushed.
        cache_id: String,
        /// The server the push targeted.
        server: String,
    },
}

impl std::fmt::Display for PushTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PushTarget::BridgeNode(node) => write!(f, "bridge node '{node}'"),
            PushTarget::CacheServer { cache_id, server } => {
                write!(f, "cache '{cache_id}' on '{server}'")
            }
        }
    }
}

/// Outcome of one push attempt.
#[derive(Debug)]
pub struct PushOutcome {
    /// Where the push went.
    pub target: PushTarget,
    /// `Ok` on success, the caught error otherwise.
    pub result: Result<()>,
}

/// Accumulated per-target outcomes of an operation's fan-out.
#[derive(Debug, Default)]
pub struct FanoutReport {
    outcomes: Vec<PushOutcome>,
}

impl FanoutReport {
    /// An empty report.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one outcome.
    pub fn record(&mut self, target: PushTarget, result: Result<()>) {
        self.outcomes.push(PushOutcome { target, result });
    }

    /// Every outcome, in push order.
    pub fn outcomes(&self) -> &[PushOutcome] {
        &self.outcomes
    }

    /// Targets that failed, with the caught errors.
    pub fn failed(&self) -> Vec<(&PushTarget, &Error)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (&o.target, e)))
            .collect()
    }

    /// Targets that succeeded.
    pub fn succeeded(&self) -> Vec<&PushTarget> {
        self.outcomes
            .iter()
            .filter(|o| o.result.is_ok())
            .map(|o| &o.target)
            .collect()
    }

    /// Whether every push landed.
    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(|o| o.result.is_ok())
    }

    /// Number of recorded outcomes.
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    /// Whether nothing was pushed.
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

// ── Fan-out Loops ────────────────────────────────────────────────────────────

impl TopologyManager {
    /// Register `config` on every node in `nodes`, sequentially.
    ///
    /// `config_only` is passed through to the registry: `false` on a
    /// first-time registration (the relay process picks the bridge up),
    /// `true` when refreshing an existing registration in place.
    pub(crate) async fn push_to_bridge_nodes(
        &self,
        config: &BridgeConfiguration,
        nodes: &[String],
        config_only: bool,
        report: &mut FanoutReport,
    ) {
        for node in nodes {
            let result = self.register_on_node(config, node, config_only).await;
            match &result {
                Ok(()) => self.reporter().write_line(&format!(
                    "Bridge '{}' configuration registered on '{node}'",
                    config.id
                )),
                Err(e) => self.reporter().write_error_line(&format!(
                    "Failed to register bridge '{}' on '{node}': {e}",
                    config.id
                )),
            }
            report.record(PushTarget::BridgeNode(node.clone()), result);
        }
    }

    /// Register on a single node. Peers are not asked to re-propagate;
    /// the manager pushes to every node itself.
    pub(crate) async fn register_on_node(
        &self,
        config: &BridgeConfiguration,
        node: &str,
        config_only: bool,
    ) -> Result<()> {
        let handle = connect_bridge(self.bridges(), node, self.rpc_timeout()).await?;
        self.with_deadline(
            &format!("registering bridge '{}' on '{node}'", config.id),
            handle.register_bridge(config, false, config_only),
        )
        .await
    }

    /// Unregister from a single node, best-effort, recording the outcome.
    pub(crate) async fn unregister_on_node(
        &self,
        bridge_id: &str,
        node: &str,
        report: &mut FanoutReport,
    ) {
        let result = async {
            let handle = connect_bridge(self.bridges(), node, self.rpc_timeout()).await?;
            self.with_deadline(
                &format!("unregistering bridge '{bridge_id}' from '{node}'"),
                handle.unregister_bridge(bridge_id),
            )
            .await
        }
        .await;

        match &result {
            Ok(()) => self
                .reporter()
                .write_line(&format!("Bridge '{bridge_id}' unregistered from '{node}'")),
            Err(e) => self.reporter().write_error_line(&format!(
                "Failed to unregister bridge '{bridge_id}' from '{node}': {e}"
            )),
        }
        report.record(PushTarget::BridgeNode(node.to_string()), result);
    }

    /// Push a cache configuration to every server hosting that cache.
    pub(crate) async fn push_cache_config(
        &self,
        config: &CacheServerConfig,
        credentials: Option<&CacheCredentials>,
        report: &mut FanoutReport,
    ) {
        for server in &config.servers {
            let result = self.apply_on_server(config, credentials, server).await;
            match &result {
                Ok(()) => self.reporter().write_line(&format!(
                    "Cache '{}' configuration applied on '{server}'",
                    config.cache_id
                )),
                Err(e) => self.reporter().write_error_line(&format!(
                    "Failed to apply cache '{}' configuration on '{server}': {e}",
                    config.cache_id
                )),
            }
            report.record(
                PushTarget::CacheServer {
                    cache_id: config.cache_id.clone(),
                    server: server.clone(),
                },
                result,
            );
        }
    }

    async fn apply_on_server(
        &self,
        config: &CacheServerConfig,
        credentials: Option<&CacheCredentials>,
        server: &str,
    ) -> Result<()> {
        let handle = tokio::time::timeout(self.rpc_timeout(), self.caches().connect(server))
            .await
            .map_err(|_| Error::Timeout(format!("connecting to cache server '{server}'")))??;
        self.with_deadline(
            &format!("applying cache '{}' config on '{server}'", config.cache_id),
            handle.apply_bridge_to_cache(config, credentials, true),
        )
        .await
    }

    /// Rewrite the bridge link of every attached cache after the node list
    /// changed, and push each rewritten config to that cache's servers.
    ///
    /// A cache whose config cannot even be fetched is recorded as a single
    /// failed target and skipped; the loop always continues.
    pub(crate) async fn refresh_attached_caches(
        &self,
        bridge: &BridgeConfiguration,
        credentials: Option<&CacheCredentials>,
        report: &mut FanoutReport,
    ) {
        for target in &bridge.target_cache_config_list {
            match self.fetch_cache_for_target(target).await {
                Ok(mut cache_config) => {
                    if let Some(link) = cache_config.bridge.as_mut() {
                        link.servers = bridge.bridge_nodes.clone();
                        link.port = bridge.bridge_port;
                    }
                    cache_config.bump_version();
                    self.push_cache_config(&cache_config, credentials, report).await;
                }
                Err(e) => {
                    self.reporter().write_error_line(&format!(
                        "Failed to fetch cache '{}' configuration: {e}",
                        target.cache_id
                    ));
                    report.record(
                        PushTarget::CacheServer {
                            cache_id: target.cache_id.clone(),
                            server: target.servers_string(),
                        },
                        Err(e),
                    );
                }
            }
        }
    }

    /// Null an attached cache's bridge link and push the detached config
    /// to its servers. Best-effort like every other fan-out step.
    pub(crate) async fn detach_cache(
        &self,
        target: &TargetCacheConfiguration,
        credentials: Option<&CacheCredentials>,
        report: &mut FanoutReport,
    ) {
        match self.fetch_cache_for_target(target).await {
            Ok(mut cache_config) => {
                cache_config.bridge = None;
                cache_config.bump_version();
                self.push_cache_config(&cache_config, credentials, report).await;
            }
            Err(e) => {
                self.reporter().write_error_line(&format!(
                    "Failed to fetch cache '{}' configuration: {e}",
                    target.cache_id
                ));
                report.record(
                    PushTarget::CacheServer {
                        cache_id: target.cache_id.clone(),
                        server: target.servers_string(),
                    },
                    Err(e),
                );
            }
        }
    }

    /// Start or stop the bridge replicator on an attached cache.
    pub(crate) async fn signal_replicator(
        &self,
        target: &TargetCacheConfiguration,
        stop: bool,
        report: &mut FanoutReport,
    ) {
        let result = async {
            let (handle, server) =
                connect_any_cache(self.caches(), &target.servers, self.rpc_timeout()).await?;
            self.with_deadline(
                &format!("signaling replicator for cache '{}'", target.cache_id),
                handle.hot_apply_replicator(&target.cache_id, stop),
            )
            .await
            .map(|()| server)
        }
        .await;

        let verb = if stop { "stopped" } else { "started" };
        match result {
            Ok(server) => {
                self.reporter().write_line(&format!(
                    "Replicator {verb} for cache '{}' on '{server}'",
                    target.cache_id
                ));
                report.record(
                    PushTarget::CacheServer {
                        cache_id: target.cache_id.clone(),
                        server,
                    },
                    Ok(()),
                );
            }
            Err(e) => {
                self.reporter().write_error_line(&format!(
                    "Failed to signal replicator for cache '{}': {e}",
                    target.cache_id
                ));
                report.record(
                    PushTarget::CacheServer {
                        cache_id: target.cache_id.clone(),
                        server: target.servers_string(),
                    },
                    Err(e),
                );
            }
        }
    }

    pub(crate) async fn fetch_cache_for_target(
        &self,
        target: &TargetCacheConfiguration,
    ) -> Result<CacheServerConfig> {
        let (handle, server) =
            connect_any_cache(self.caches(), &target.servers, self.rpc_timeout()).await?;
        let config = self
            .with_deadline(
                &format!("fetching cache '{}' from '{server}'", target.cache_id),
                handle.get_cache(&target.cache_id),
            )
            .await?;
        config.ok_or_else(|| {
            Error::NotFound(format!(
                "cache '{}' is not registered on '{server}'",
                target.cache_id
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::config::CacheStatus;
    use crate::registry::MemoryCluster;
    use crate::report::BufferReporter;

    fn make_manager(cluster: &Arc<MemoryCluster>) -> (TopologyManager, Arc<BufferReporter>) {
        let reporter = Arc::new(BufferReporter::new());
        let manager = TopologyManager::new(
            Arc::clone(cluster) as _,
            Arc::clone(cluster) as _,
            Arc::clone(&reporter) as _,
        );
        (manager, reporter)
    }

    fn make_bridge(id: &str, nodes: &[&str]) -> BridgeConfiguration {
        let mut config = BridgeConfiguration::new(id, 10000);
        config.bridge_nodes = nodes.iter().map(|n| n.to_string()).collect();
        config.bridge_active = nodes.first().map(|n| n.to_string()).unwrap_or_default();
        config
    }

    #[test]
    fn test_fanout_report_bookkeeping() {
        let mut report = FanoutReport::new();
        report.record(PushTarget::BridgeNode("nodeA".into()), Ok(()));
        report.record(
            PushTarget::BridgeNode("nodeB".into()),
            Err(Error::Connection("refused".into())),
        );

        assert_eq!(report.len(), 2);
        assert!(!report.all_succeeded());
        assert_eq!(report.succeeded(), vec![&PushTarget::BridgeNode("nodeA".into())]);
        let failed = report.failed();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].0, &PushTarget::BridgeNode("nodeB".into()));
    }

    #[test]
    fn test_push_target_display() {
        let target = PushTarget::CacheServer {
            cache_id: "cacheX".into(),
            server: "server1".into(),
        };
        assert_eq!(target.to_string(), "cache 'cacheX' on 'server1'");
    }

    #[tokio::test]
    async fn test_node_push_continues_past_unreachable_node() {
        let cluster = Arc::new(MemoryCluster::new());
        cluster.add_bridge_node("nodeA");
        cluster.add_bridge_node("nodeB");
        cluster.set_unreachable("nodeA", true);

        let (manager, reporter) = make_manager(&cluster);
        let config = make_bridge("B1", &["nodeA", "nodeB"]);

        let mut report = FanoutReport::new();
        manager
            .push_to_bridge_nodes(&config, &config.bridge_nodes.clone(), false, &mut report)
            .await;

        assert_eq!(report.len(), 2);
        assert_eq!(report.failed().len(), 1);
        assert!(cluster.bridge_config_on("nodeB", "B1").is_some());
        assert!(reporter.contains("Failed to register bridge 'B1' on 'nodeA'"));
    }

    #[tokio::test]
    async fn test_cache_push_reports_each_server() {
        let cluster = Arc::new(MemoryCluster::new());
        cluster.add_cache_server("server1");
        let flaky = cluster.add_cache_server("server2");
        cluster.add_cache_server("server3");
        flaky.set_apply_failure(true);

        let (manager, _) = make_manager(&cluster);
        let config = CacheServerConfig {
            cache_id: "cacheX".into(),
            cache_type: "replicated".into(),
            servers: vec!["server1".into(), "server2".into(), "server3".into()],
            bridge: Some(crate::config::BridgeLink {
                servers: vec!["nodeA".into()],
                port: 10000,
                status: CacheStatus::Active,
            }),
            config_version: 1,
        };

        let mut report = FanoutReport::new();
        manager.push_cache_config(&config, None, &mut report).await;

        assert_eq!(report.len(), 3);
        assert_eq!(report.succeeded().len(), 2);
        assert_eq!(report.failed().len(), 1);
        // servers 1 and 3 still received the config
        assert!(cluster.cache_config_on("server1", "cacheX").is_some());
        assert!(cluster.cache_config_on("server3", "cacheX").is_some());
    }
}
