//! Cache attachment: attach/detach caches, set mode, set connection.
//!
//! The master/passive invariants live here and are validated before any
//! remote write, so a violation never leaves partial state: exactly one
//! attached cache is master whenever the list is non-empty, at most one
//! entry is passive, and the master can neither be removed, disconnected,
//! nor demoted without mastership moving first.

use crate::address;
use crate::config::{BridgeLink, CacheStatus, TargetCacheConfiguration, MAX_TARGET_CACHES};
use crate::error::{Error, Result};
use crate::registry::connect_any_cache;

use super::{validate_passive_cap, FanoutReport, TopologyManager, TopologyOutcome};

/// Connect or disconnect an attached cache from replication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionAction {
    /// Resume live replication for this side.
    Connect,
    /// Pause live replication for this side.
    Disconnect,
}

impl std::fmt::Display for ConnectionAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionAction::Connect => write!(f, "connect"),
            ConnectionAction::Disconnect => write!(f, "disconnect"),
        }
    }
}

/// Parameters for [`TopologyManager::add_cache`].
#[derive(Debug, Clone)]
pub struct AddCacheRequest {
    /// The bridge to attach to.
    pub bridge_id: String,
    /// The bridge node whose registry is consulted.
    pub bridge_server: String,
    /// The cache's registered name.
    pub cache_id: String,
    /// Cache server address, or a comma-separated list tried in order.
    pub cache_server: String,
    /// Alternate name distinguishing otherwise-identical cache ids.
    pub cache_alias: Option<String>,
    /// Requested replication status for this side.
    pub status: CacheStatus,
}

impl AddCacheRequest {
    /// A request attaching `cache_id` as an active side.
    pub fn new(
        bridge_id: impl Into<String>,
        bridge_server: impl Into<String>,
        cache_id: impl Into<String>,
        cache_server: impl Into<String>,
    ) -> Self {
        Self {
            bridge_id: bridge_id.into(),
            bridge_server: bridge_server.into(),
            cache_id: cache_id.into(),
            cache_server: cache_server.into(),
            cache_alias: None,
            status: CacheStatus::Active,
        }
    }

    /// Set the cache alias.
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.cache_alias = Some(alias.into());
        self
    }

    /// Request a replication status for this side.
    pub fn with_status(mut self, status: CacheStatus) -> Self {
        self.status = status;
        self
    }
}

impl TopologyManager {
    /// Attach a cache cluster to a bridge.
    ///
    /// The cache's own configuration gains a bridge link mirroring the
    /// node list and port; the bridge gains a target entry. The first
    /// cache attached to an empty list becomes master regardless of its
    /// requested status.
    pub async fn add_cache(&self, request: AddCacheRequest) -> Result<TopologyOutcome> {
        Self::require(&request.bridge_id, "bridge id")?;
        Self::require(&request.bridge_server, "bridge server")?;
        Self::require(&request.cache_id, "cache id")?;
        Self::require(&request.cache_server, "cache server")?;

        let addresses = address::split_list(&request.cache_server);
        let (cache_handle, resolved) =
            connect_any_cache(self.caches(), &addresses, self.rpc_timeout()).await?;

        let mut cache_config = self
            .with_deadline(
                &format!("fetching cache '{}' from '{resolved}'", request.cache_id),
                cache_handle.get_cache(&request.cache_id),
            )
            .await?
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "cache '{}' is not registered on '{resolved}'",
                    request.cache_id
                ))
            })?;

        if cache_config.is_local() {
            return Err(Error::Validation(format!(
                "cache '{}' is a local cache and cannot be bridged",
                request.cache_id
            )));
        }

        // Advisory only: a stopped cache still attaches, the link applies
        // when it starts.
        if let Ok(false) = self
            .with_deadline(
                &format!("checking cache '{}' on '{resolved}'", request.cache_id),
                cache_handle.is_running(&request.cache_id),
            )
            .await
        {
            self.reporter().write_line(&format!(
                "Cache '{}' is not running; the bridge link will apply when it starts",
                request.cache_id
            ));
        }

        let mut bridge = self
            .fetch_bridge(&request.bridge_server, &request.bridge_id)
            .await?;

        if bridge.find_cache(&request.cache_id, None).is_some() {
            return Err(Error::DuplicateCache(request.cache_id));
        }
        if request.status == CacheStatus::Passive && bridge.passive_count() >= 1 {
            return Err(Error::DualPassive(format!(
                "'{}' requested passive but a passive cache is already attached",
                request.cache_id
            )));
        }
        if bridge.target_cache_config_list.len() >= MAX_TARGET_CACHES {
            return Err(Error::Capacity(format!(
                "bridge '{}' already has {MAX_TARGET_CACHES} caches attached",
                request.bridge_id
            )));
        }

        // First attached (connected) cache becomes master even when the
        // requested status is passive.
        let is_master = !bridge.has_connected_master();

        let servers = if cache_config.servers.is_empty() {
            addresses
        } else {
            cache_config.servers.clone()
        };
        let entry = TargetCacheConfiguration {
            cache_id: request.cache_id.clone(),
            cache_alias: request.cache_alias.clone(),
            servers,
            is_master,
            is_connected: true,
            status: request.status,
        };

        let mut report = FanoutReport::new();

        // Cache side first: mirror the bridge into the cache's own config
        // and push it to every server hosting the cluster.
        cache_config.bridge = Some(BridgeLink {
            servers: bridge.bridge_nodes.clone(),
            port: bridge.bridge_port,
            status: request.status,
        });
        cache_config.bump_version();
        self.push_cache_config(&cache_config, self.credentials(), &mut report)
            .await;

        // Bridge side: both relay nodes must converge on the new list.
        bridge.target_cache_config_list.push(entry);
        bridge.bump_version();
        let nodes = bridge.bridge_nodes.clone();
        self.push_to_bridge_nodes(&bridge, &nodes, true, &mut report)
            .await;

        self.reporter().write_line(&format!(
            "Cache '{}' attached to bridge '{}' as {}{}",
            request.cache_id,
            request.bridge_id,
            request.status,
            if is_master { " (master)" } else { "" }
        ));

        Ok(TopologyOutcome {
            bridge,
            fanout: report,
        })
    }

    /// Detach a cache from a bridge.
    ///
    /// Refuses to remove the master; mastership must be moved first. The
    /// detached cache's bridge link is nulled and pushed to its servers.
    pub async fn remove_cache(
        &self,
        bridge_id: &str,
        bridge_server: &str,
        cache_id: &str,
        alias: Option<&str>,
    ) -> Result<TopologyOutcome> {
        Self::require(bridge_id, "bridge id")?;
        Self::require(bridge_server, "bridge server")?;
        Self::require(cache_id, "cache id")?;

        let mut bridge = self.fetch_bridge(bridge_server, bridge_id).await?;

        let entry = bridge
            .find_cache(cache_id, alias)
            .cloned()
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "cache '{cache_id}' is not attached to bridge '{bridge_id}'"
                ))
            })?;

        if entry.is_master {
            return Err(Error::MasterRemoval(cache_id.to_string()));
        }

        bridge
            .target_cache_config_list
            .retain(|c| !c.matches(cache_id, alias));
        // Defensive re-check on what remains.
        validate_passive_cap(&bridge.target_cache_config_list)?;
        bridge.bump_version();

        let mut report = FanoutReport::new();
        self.detach_cache(&entry, self.credentials(), &mut report)
            .await;

        let nodes = bridge.bridge_nodes.clone();
        self.push_to_bridge_nodes(&bridge, &nodes, true, &mut report)
            .await;

        self.reporter().write_line(&format!(
            "Cache '{cache_id}' detached from bridge '{bridge_id}'"
        ));

        Ok(TopologyOutcome {
            bridge,
            fanout: report,
        })
    }

    /// Change an attached cache's replication mode.
    ///
    /// The master cannot change mode; mastership must be transferred
    /// first. Setting the only other side passive is refused when a
    /// passive entry already exists.
    pub async fn set_cache_mode(
        &self,
        bridge_id: &str,
        bridge_server: &str,
        cache_id: &str,
        new_status: CacheStatus,
    ) -> Result<TopologyOutcome> {
        Self::require(bridge_id, "bridge id")?;
        Self::require(bridge_server, "bridge server")?;
        Self::require(cache_id, "cache id")?;

        let mut bridge = self.fetch_bridge(bridge_server, bridge_id).await?;

        let index = bridge
            .target_cache_config_list
            .iter()
            .position(|c| c.cache_id == cache_id)
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "cache '{cache_id}' is not attached to bridge '{bridge_id}'"
                ))
            })?;

        if bridge.target_cache_config_list[index].is_master {
            return Err(Error::MasterNotEligible(cache_id.to_string()));
        }
        if new_status == CacheStatus::Passive {
            let other_passive = bridge
                .target_cache_config_list
                .iter()
                .enumerate()
                .any(|(i, c)| i != index && c.status == CacheStatus::Passive);
            if other_passive {
                return Err(Error::DualPassive(format!(
                    "'{cache_id}' requested passive but a passive cache is already attached"
                )));
            }
        }
        if bridge.target_cache_config_list[index].status == new_status {
            return Err(Error::NoChange(format!(
                "cache '{cache_id}' is already {new_status}"
            )));
        }

        bridge.target_cache_config_list[index].status = new_status;
        bridge.bump_version();
        let entry = bridge.target_cache_config_list[index].clone();

        let mut report = FanoutReport::new();

        // Mirror the new status into the cache's own config.
        match self.fetch_cache_for_target(&entry).await {
            Ok(mut cache_config) => {
                if let Some(link) = cache_config.bridge.as_mut() {
                    link.status = new_status;
                }
                cache_config.bump_version();
                self.push_cache_config(&cache_config, self.credentials(), &mut report)
                    .await;
            }
            Err(e) => {
                self.reporter().write_error_line(&format!(
                    "Failed to fetch cache '{cache_id}' configuration: {e}"
                ));
                report.record(
                    super::PushTarget::CacheServer {
                        cache_id: cache_id.to_string(),
                        server: entry.servers_string(),
                    },
                    Err(e),
                );
            }
        }

        let nodes = bridge.bridge_nodes.clone();
        self.push_to_bridge_nodes(&bridge, &nodes, true, &mut report)
            .await;

        self.reporter().write_line(&format!(
            "Cache '{cache_id}' on bridge '{bridge_id}' set to {new_status}"
        ));

        Ok(TopologyOutcome {
            bridge,
            fanout: report,
        })
    }

    /// Connect or disconnect an attached cache from replication.
    ///
    /// Disconnecting the master is refused; it would stop the bridge's
    /// only write source.
    pub async fn set_cache_connection(
        &self,
        bridge_id: &str,
        bridge_server: &str,
        cache_id: &str,
        action: ConnectionAction,
    ) -> Result<TopologyOutcome> {
        Self::require(bridge_id, "bridge id")?;
        Self::require(bridge_server, "bridge server")?;
        Self::require(cache_id, "cache id")?;

        let mut bridge = self.fetch_bridge(bridge_server, bridge_id).await?;

        let index = bridge
            .target_cache_config_list
            .iter()
            .position(|c| c.cache_id == cache_id)
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "cache '{cache_id}' is not attached to bridge '{bridge_id}'"
                ))
            })?;

        if action == ConnectionAction::Disconnect
            && bridge.target_cache_config_list[index].is_master
        {
            return Err(Error::MasterDisconnect(cache_id.to_string()));
        }

        bridge.target_cache_config_list[index].is_connected =
            action == ConnectionAction::Connect;
        bridge.bump_version();
        let entry = bridge.target_cache_config_list[index].clone();

        let mut report = FanoutReport::new();
        let nodes = bridge.bridge_nodes.clone();
        self.push_to_bridge_nodes(&bridge, &nodes, true, &mut report)
            .await;

        // Tell the cache side to start or stop its replicator.
        self.signal_replicator(&entry, action == ConnectionAction::Disconnect, &mut report)
            .await;

        self.reporter().write_line(&format!(
            "Cache '{cache_id}' on bridge '{bridge_id}': {action} requested"
        ));

        Ok(TopologyOutcome {
            bridge,
            fanout: report,
        })
    }
}
