//! Bridge port allocation.
//!
//! A bridge's port must be unique among all bridges registered across its
//! node set. Allocation scans every node's registry for known bridges;
//! the scan is best-effort: an unreachable node is reported and skipped,
//! since allocation is advisory rather than transactional.

use crate::config::BridgeConfiguration;
use crate::error::{Error, Result};
use crate::registry::connect_bridge;

use super::TopologyManager;

/// Lowest port handed out by auto-allocation.
pub const BRIDGE_PORT_FLOOR: u16 = 10000;

/// Pick a bridge port given every bridge known across the node set.
///
/// A requested port must not collide with any known bridge; otherwise the
/// next port above the highest known one is allocated, never below
/// [`BRIDGE_PORT_FLOOR`].
pub fn allocate_port(known: &[BridgeConfiguration], requested: Option<u16>) -> Result<u16> {
    if let Some(port) = requested {
        if let Some(holder) = known.iter().find(|b| b.bridge_port == port) {
            return Err(Error::PortUnavailable(port, holder.id.clone()));
        }
        return Ok(port);
    }

    match known.iter().map(|b| b.bridge_port).max() {
        None => Ok(BRIDGE_PORT_FLOOR),
        Some(highest) => {
            let next = highest
                .checked_add(1)
                .ok_or_else(|| Error::Internal("bridge port space exhausted".into()))?;
            Ok(next.max(BRIDGE_PORT_FLOOR))
        }
    }
}

impl TopologyManager {
    /// Every bridge configuration registered across `nodes`.
    ///
    /// Nodes that cannot be reached are reported as warnings and skipped.
    pub(crate) async fn collect_known_bridges(
        &self,
        nodes: &[String],
    ) -> Vec<BridgeConfiguration> {
        let mut known = Vec::new();
        for node in nodes {
            let listed = async {
                let handle = connect_bridge(self.bridges(), node, self.rpc_timeout()).await?;
                self.with_deadline(
                    &format!("listing bridges on '{node}'"),
                    handle.list_bridges(),
                )
                .await
            }
            .await;

            match listed {
                Ok(bridges) => known.extend(bridges),
                Err(e) => {
                    tracing::warn!(node = node.as_str(), error = %e, "Port scan skipped node");
                    self.reporter().write_error_line(&format!(
                        "Could not list bridges on '{node}' for port allocation: {e}"
                    ));
                }
            }
        }
        known
    }

    /// Resolve the port for a new bridge across its node set.
    pub(crate) async fn resolve_port(
        &self,
        requested: Option<u16>,
        nodes: &[String],
    ) -> Result<u16> {
        let known = self.collect_known_bridges(nodes).await;
        allocate_port(&known, requested)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_bridge(id: &str, port: u16) -> BridgeConfiguration {
        BridgeConfiguration::new(id, port)
    }

    #[test]
    fn test_first_allocation_starts_at_floor() {
        assert_eq!(allocate_port(&[], None).unwrap(), 10000);
    }

    #[test]
    fn test_allocation_picks_max_plus_one() {
        let known = vec![make_bridge("B1", 10000), make_bridge("B2", 10003)];
        assert_eq!(allocate_port(&known, None).unwrap(), 10004);
    }

    #[test]
    fn test_allocation_never_goes_below_floor() {
        // A legacy bridge on a low port must not drag allocation under 10000.
        let known = vec![make_bridge("B1", 80)];
        assert_eq!(allocate_port(&known, None).unwrap(), 10000);
    }

    #[test]
    fn test_requested_port_collision() {
        let known = vec![make_bridge("B1", 10000)];
        let err = allocate_port(&known, Some(10000)).unwrap_err();
        match err {
            Error::PortUnavailable(port, holder) => {
                assert_eq!(port, 10000);
                assert_eq!(holder, "B1");
            }
            other => panic!("expected PortUnavailable, got {other:?}"),
        }
    }

    #[test]
    fn test_requested_free_port_is_kept() {
        let known = vec![make_bridge("B1", 10000)];
        assert_eq!(allocate_port(&known, Some(10500)).unwrap(), 10500);
    }
}
