//! # cachebridge
//!
//! Bridge topology manager for WAN cache replication.
//!
//! A *bridge* pairs two cache clusters across a WAN so writes on one
//! propagate to the other, relayed by an active/passive pair of *bridge
//! nodes*. This crate implements the control plane for that topology: the
//! shared, versioned [`BridgeConfiguration`] describing which caches are
//! attached, which cache is the write-master, and how configuration
//! changes propagate so every bridge node and cache server converges on a
//! consistent view.
//!
//! ## How it works
//!
//! 1. Each operation re-fetches the authoritative config from a bridge
//!    node's registry; nothing is cached across invocations.
//! 2. Invariants are validated before any remote write: at most 2 bridge
//!    nodes, at most 2 attached caches with unique ids, exactly one
//!    master, at most one passive side.
//! 3. The mutated config (version counter bumped) is pushed to every
//!    bridge node and affected cache server in a sequential loop.
//! 4. Push failures are caught per target and reported; there is no
//!    retry, rollback, or quorum: convergence is eventual and
//!    operator-driven.
//!
//! ## Module Hierarchy
//!
//! - [`error`] - Error taxonomy for the whole crate
//! - [`config`] - Bridge and cache configuration records
//! - [`registry`] - Collaborator contracts and in-memory fakes
//! - [`topology`] - The topology manager and its operations
//! - [`report`] - Operator-facing output sink
//! - [`address`] - Node-address list handling
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use cachebridge::registry::MemoryCluster;
//! use cachebridge::report::TracingReporter;
//! use cachebridge::topology::{CreateBridgeRequest, TopologyManager};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> cachebridge::Result<()> {
//! let cluster = Arc::new(MemoryCluster::new());
//! cluster.add_bridge_node("nodeA");
//!
//! let manager = TopologyManager::new(
//!     Arc::clone(&cluster) as _,
//!     Arc::clone(&cluster) as _,
//!     Arc::new(TracingReporter),
//! );
//!
//! let outcome = manager
//!     .create_bridge(CreateBridgeRequest::new("B1", "nodeA"))
//!     .await?;
//! assert_eq!(outcome.bridge.bridge_port, 10000);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod address;
pub mod config;
pub mod error;
pub mod registry;
pub mod report;
pub mod topology;

pub use config::{
    BridgeConfiguration, BridgeLink, CacheCredentials, CacheServerConfig, CacheStatus,
    QueueConfig, TargetCacheConfiguration,
};
pub use error::{Error, Result};
pub use report::{Reporter, TracingReporter};
pub use topology::{
    AddCacheRequest, ConnectionAction, CreateBridgeRequest, FanoutReport, PushOutcome,
    PushTarget, TopologyManager, TopologyOutcome,
};
