//! # Error Handling
//!
//! Error types for the bridge topology manager.
//!
//! Every failure an operation can produce is a distinct kind so callers
//! (operators and automation alike) can branch on the kind instead of
//! string-matching messages. Pre-mutation invariant violations abort an
//! operation before any remote write; connection-class failures during
//! fan-out are caught per target and accumulated in the operation's
//! [`FanoutReport`](crate::topology::FanoutReport) rather than escalated.

use thiserror::Error;

/// Result type alias for topology operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the bridge topology manager.
///
/// Errors are grouped by category: input validation, existence conflicts,
/// master/passive invariant violations, network failures, and internal
/// errors.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Validation Errors (100-199)
    // ========================================================================

    /// Missing or malformed required input.
    #[error("Invalid input: {0}")]
    Validation(String),

    /// The entry's state already matches the requested state.
    #[error("No change: {0}")]
    NoChange(String),

    // ========================================================================
    // Existence Errors (200-299)
    // ========================================================================

    /// Referenced bridge or cache does not exist on the target server.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A bridge with this identifier is already registered.
    #[error("Bridge '{0}' already exists")]
    AlreadyExists(String),

    /// The cache is already attached to this bridge.
    #[error("Cache '{0}' is already attached to this bridge")]
    DuplicateCache(String),

    /// The node is already a member of the bridge.
    #[error("Node '{0}' is already a member of this bridge")]
    AlreadyMember(String),

    // ========================================================================
    // Invariant Errors (300-399)
    // ========================================================================

    /// The 2-node or 2-cache ceiling would be exceeded.
    #[error("Capacity exceeded: {0}")]
    Capacity(String),

    /// Two attached caches cannot both be passive.
    #[error("Both bridge caches cannot be passive: {0}")]
    DualPassive(String),

    /// The master cache cannot be removed without reassigning mastership.
    #[error("Cache '{0}' is the bridge master and cannot be removed")]
    MasterRemoval(String),

    /// The master cache cannot be set passive without transferring mastership.
    #[error("Cache '{0}' is the bridge master and cannot change mode")]
    MasterNotEligible(String),

    /// Disconnecting the master would break replication entirely.
    #[error("Cache '{0}' is the bridge master and cannot be disconnected")]
    MasterDisconnect(String),

    /// The requested bridge port collides with an existing registration.
    #[error("Port {0} is already in use by bridge '{1}'")]
    PortUnavailable(u16, String),

    // ========================================================================
    // Network Errors (500-599)
    // ========================================================================

    /// RPC to a required node failed.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// RPC to a required node exceeded the deadline.
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// The bridge config held by the contacted node disagrees with its peers.
    #[error("Configuration mismatch: {0}")]
    ConfigMismatch(String),

    // ========================================================================
    // Internal Errors (900-999)
    // ========================================================================

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal error (should not happen in normal operation).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Stable numeric code for this error kind.
    ///
    /// Codes are grouped by category:
    /// - 100-199: Validation
    /// - 200-299: Existence
    /// - 300-399: Invariants
    /// - 500-599: Network
    /// - 900-999: Internal
    pub fn code(&self) -> i32 {
        match self {
            Error::Validation(_) => 100,
            Error::NoChange(_) => 101,

            Error::NotFound(_) => 200,
            Error::AlreadyExists(_) => 201,
            Error::DuplicateCache(_) => 202,
            Error::AlreadyMember(_) => 203,

            Error::Capacity(_) => 300,
            Error::DualPassive(_) => 301,
            Error::MasterRemoval(_) => 302,
            Error::MasterNotEligible(_) => 303,
            Error::MasterDisconnect(_) => 304,
            Error::PortUnavailable(_, _) => 305,

            Error::Connection(_) => 500,
            Error::Timeout(_) => 501,
            Error::ConfigMismatch(_) => 502,

            Error::Serialization(_) => 900,
            Error::Internal(_) => 901,
        }
    }

    /// Whether retrying the operation can plausibly succeed.
    ///
    /// Connection-class failures are transient; invariant violations are not.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Connection(_) | Error::Timeout(_) | Error::ConfigMismatch(_)
        )
    }

    /// Whether this error is a connection-class failure counted per target
    /// during fan-out instead of aborting the whole operation.
    pub fn is_connection_failure(&self) -> bool {
        matches!(self, Error::Connection(_) | Error::Timeout(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::Validation("x".into()).code(), 100);
        assert_eq!(Error::NotFound("x".into()).code(), 200);
        assert_eq!(Error::Capacity("x".into()).code(), 300);
        assert_eq!(Error::Connection("x".into()).code(), 500);
        assert_eq!(Error::Internal("x".into()).code(), 901);
    }

    #[test]
    fn test_recoverable_errors() {
        assert!(Error::Connection("refused".into()).is_recoverable());
        assert!(Error::Timeout("30s".into()).is_recoverable());
        assert!(!Error::DualPassive("cacheY".into()).is_recoverable());
        assert!(!Error::MasterRemoval("cacheX".into()).is_recoverable());
    }

    #[test]
    fn test_connection_failure_classification() {
        assert!(Error::Timeout("30s".into()).is_connection_failure());
        assert!(!Error::ConfigMismatch("drift".into()).is_connection_failure());
    }
}
