//! Bridge lifecycle: create/remove a bridge, add/remove a bridge node.
//!
//! A bridge is created on first registration for an id, mutated in place
//! by every later operation, and destroyed when its last node is removed
//! or it is removed explicitly. Every structural change bumps
//! `deployment_version` and is pushed to all current bridge nodes and the
//! attached caches.

use crate::address;
use crate::config::{BridgeConfiguration, MAX_BRIDGE_NODES};
use crate::error::{Error, Result};
use crate::registry::connect_bridge;

use super::{FanoutReport, TopologyManager, TopologyOutcome};

/// Parameters for [`TopologyManager::create_bridge`].
#[derive(Debug, Clone)]
pub struct CreateBridgeRequest {
    /// Logical bridge name, unique cluster-wide.
    pub bridge_id: String,
    /// The node that becomes the active relay.
    pub active_node: String,
    /// Optional standby relay node.
    pub passive_node: Option<String>,
    /// Requested bridge port; auto-allocated when `None`.
    pub port: Option<u16>,
    /// Replicator virtual queue size.
    pub replicator_queue_size: u64,
    /// Maximum replication queue size.
    pub queue_size: u64,
    /// Whether queue optimization is enabled.
    pub queue_optimized: bool,
}

impl CreateBridgeRequest {
    /// A request with default queue tuning and auto-allocated port.
    pub fn new(bridge_id: impl Into<String>, active_node: impl Into<String>) -> Self {
        let queue = crate::config::QueueConfig::default();
        Self {
            bridge_id: bridge_id.into(),
            active_node: active_node.into(),
            passive_node: None,
            port: None,
            replicator_queue_size: 0,
            queue_size: queue.size,
            queue_optimized: queue.optimization_enabled,
        }
    }

    /// Set the standby relay node.
    pub fn with_passive_node(mut self, node: impl Into<String>) -> Self {
        self.passive_node = Some(node.into());
        self
    }

    /// Request a specific bridge port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }
}

impl TopologyManager {
    /// Create a new bridge and register it on its node(s).
    ///
    /// When a passive node is given it is registered first; a failure
    /// there aborts the creation before the active side is written. A
    /// failure on the active side is reported but the passive-side
    /// registration is not rolled back.
    pub async fn create_bridge(&self, request: CreateBridgeRequest) -> Result<TopologyOutcome> {
        Self::require(&request.bridge_id, "bridge id")?;
        Self::require(&request.active_node, "active node")?;

        let existing_handle =
            connect_bridge(self.bridges(), &request.active_node, self.rpc_timeout()).await?;
        let existing = self
            .with_deadline(
                &format!(
                    "fetching bridge '{}' from '{}'",
                    request.bridge_id, request.active_node
                ),
                existing_handle.get_bridge(&request.bridge_id),
            )
            .await?;
        if existing.is_some() {
            return Err(Error::AlreadyExists(request.bridge_id));
        }

        let mut nodes = vec![request.active_node.clone()];
        if let Some(passive) = request.passive_node.as_deref() {
            if !passive.trim().is_empty() {
                address::add_member(&mut nodes, passive.trim());
            }
        }

        let port = self.resolve_port(request.port, &nodes).await?;

        let mut config = BridgeConfiguration::new(&request.bridge_id, port);
        config.bridge_nodes = nodes;
        config.bridge_active = request.active_node.clone();
        config.replicator_virtual_queue_size = request.replicator_queue_size;
        config.queue_config.size = request.queue_size;
        config.queue_config.optimization_enabled = request.queue_optimized;

        let mut report = FanoutReport::new();

        // Passive side first: a failure here aborts before anything is
        // written on the active side.
        if let Some(passive) = config
            .bridge_nodes
            .iter()
            .find(|n| **n != request.active_node)
            .cloned()
        {
            if let Err(e) = self.register_on_node(&config, &passive, false).await {
                self.reporter().write_error_line(&format!(
                    "Failed to register bridge '{}' on passive node '{passive}': {e}",
                    config.id
                ));
                return Err(e);
            }
            self.reporter().write_line(&format!(
                "Bridge '{}' configuration registered on '{passive}'",
                config.id
            ));
            report.record(super::PushTarget::BridgeNode(passive), Ok(()));
        }

        match self
            .register_on_node(&config, &request.active_node, false)
            .await
        {
            Ok(()) => {
                self.reporter().write_line(&format!(
                    "Bridge '{}' created on '{}' with port {port}",
                    config.id, request.active_node
                ));
                report.record(
                    super::PushTarget::BridgeNode(request.active_node.clone()),
                    Ok(()),
                );
            }
            Err(e) => {
                // Passive registration, if any, stays in place.
                self.reporter().write_error_line(&format!(
                    "Failed to register bridge '{}' on '{}': {e}",
                    config.id, request.active_node
                ));
                report.record(
                    super::PushTarget::BridgeNode(request.active_node.clone()),
                    Err(e),
                );
            }
        }

        Ok(TopologyOutcome {
            bridge: config,
            fanout: report,
        })
    }

    /// Add a node to an existing bridge.
    ///
    /// The updated config is pushed to the contacted server and to the new
    /// node, then the new node list is fanned out to every attached cache.
    pub async fn add_node(
        &self,
        bridge_id: &str,
        existing_server: &str,
        new_node: &str,
    ) -> Result<TopologyOutcome> {
        Self::require(bridge_id, "bridge id")?;
        Self::require(existing_server, "existing server")?;
        Self::require(new_node, "new node")?;

        let mut config = self.fetch_bridge(existing_server, bridge_id).await?;

        // Drift self-check: the contacted server must be part of the node
        // list it handed us.
        if !config.bridge_nodes.is_empty()
            && !config.bridge_nodes.iter().any(|n| n == existing_server)
        {
            return Err(Error::ConfigMismatch(format!(
                "'{existing_server}' is not in bridge '{bridge_id}' node list [{}]",
                config.nodes_string()
            )));
        }

        if config.bridge_nodes.len() >= MAX_BRIDGE_NODES {
            return Err(Error::Capacity(format!(
                "bridge '{bridge_id}' already has {MAX_BRIDGE_NODES} nodes"
            )));
        }
        if config.bridge_nodes.iter().any(|n| n == new_node) {
            return Err(Error::AlreadyMember(new_node.to_string()));
        }

        let was_empty = config.bridge_nodes.is_empty();
        address::add_member(&mut config.bridge_nodes, new_node);
        if was_empty {
            config.bridge_active = new_node.to_string();
        }
        config.bump_version();

        let mut report = FanoutReport::new();
        if existing_server != new_node {
            self.push_to_bridge_nodes(
                &config,
                std::slice::from_ref(&existing_server.to_string()),
                true,
                &mut report,
            )
            .await;
        }
        // First registration on the joining node.
        self.push_to_bridge_nodes(
            &config,
            std::slice::from_ref(&new_node.to_string()),
            false,
            &mut report,
        )
        .await;

        self.refresh_attached_caches(&config, self.credentials(), &mut report)
            .await;

        Ok(TopologyOutcome {
            bridge: config,
            fanout: report,
        })
    }

    /// Remove a node from a bridge.
    ///
    /// The bridge is unregistered from the removed node, re-registered
    /// with whichever node remains, and the new node list is fanned out
    /// to every attached cache.
    pub async fn remove_node(
        &self,
        bridge_id: &str,
        server: &str,
        node_to_remove: &str,
    ) -> Result<TopologyOutcome> {
        Self::require(bridge_id, "bridge id")?;
        Self::require(server, "server")?;
        Self::require(node_to_remove, "node to remove")?;

        let mut config = self.fetch_bridge(server, bridge_id).await?;

        if !config.bridge_nodes.iter().any(|n| n == node_to_remove) {
            return Err(Error::NotFound(format!(
                "node '{node_to_remove}' is not a member of bridge '{bridge_id}'"
            )));
        }

        let mut report = FanoutReport::new();
        self.unregister_on_node(bridge_id, node_to_remove, &mut report)
            .await;

        address::remove_member(&mut config.bridge_nodes, node_to_remove);
        config.bridge_active = config
            .bridge_nodes
            .first()
            .cloned()
            .unwrap_or_default();
        config.bump_version();

        if !config.bridge_nodes.is_empty() {
            let remaining = config.bridge_nodes.clone();
            self.push_to_bridge_nodes(&config, &remaining, true, &mut report)
                .await;
        }

        self.refresh_attached_caches(&config, self.credentials(), &mut report)
            .await;

        Ok(TopologyOutcome {
            bridge: config,
            fanout: report,
        })
    }

    /// Remove a bridge entirely.
    ///
    /// Unregisters from every bridge node and detaches every attached
    /// cache by nulling its bridge link. All steps are best-effort.
    pub async fn remove_bridge(&self, bridge_id: &str, server: &str) -> Result<TopologyOutcome> {
        Self::require(bridge_id, "bridge id")?;
        Self::require(server, "server")?;

        let config = self.fetch_bridge(server, bridge_id).await?;

        let nodes = if config.bridge_nodes.is_empty() {
            vec![server.to_string()]
        } else {
            config.bridge_nodes.clone()
        };

        let mut report = FanoutReport::new();
        for node in &nodes {
            self.unregister_on_node(bridge_id, node, &mut report).await;
        }

        for target in &config.target_cache_config_list {
            self.detach_cache(target, self.credentials(), &mut report)
                .await;
        }

        self.reporter()
            .write_line(&format!("Bridge '{bridge_id}' removed"));

        Ok(TopologyOutcome {
            bridge: config,
            fanout: report,
        })
    }
}
