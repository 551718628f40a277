//! Error taxonomy shared by every rowguard crate.

use thiserror::Error;

use crate::model::SecurityObjectKind;

/// Errors surfaced by the administration layer.
///
/// Validation failures (`InvalidIdentifier`, `InvalidLiteral`) are raised
/// before anything reaches the database. `ContextLeakRisk` means a
/// connection's session context could not be proven clean; the connection
/// has already been discarded when this error is returned.
#[derive(Debug, Error)]
pub enum Error {
    /// Input rejected by the identifier validator; never sent downstream.
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// Input rejected by the literal validator; never sent downstream.
    #[error("invalid literal: {0}")]
    InvalidLiteral(String),

    /// No physical connection became available within the acquire timeout.
    #[error("connection pool exhausted after {waited_ms} ms")]
    PoolExhausted {
        /// How long the acquire waited before giving up.
        waited_ms: u64,
    },

    /// The database call did not complete within the operation timeout.
    #[error("operation timed out after {elapsed_ms} ms")]
    OperationTimeout {
        /// How long the call ran before being abandoned.
        elapsed_ms: u64,
    },

    /// The session context could not be cleared; the connection was
    /// discarded rather than returned to the pool.
    #[error("session context could not be proven clean; connection discarded")]
    ContextLeakRisk,

    /// A drop was rejected because other objects still reference the target.
    #[error("{kind} '{name}' is still referenced by {dependents} dependent(s)")]
    ObjectInUse {
        /// Kind of the object being dropped.
        kind: SecurityObjectKind,
        /// Name of the object being dropped.
        name: String,
        /// Number of dependents blocking the drop.
        dependents: usize,
    },

    /// The database itself rejected the statement. The diagnostic code and
    /// text are surfaced verbatim, never swallowed.
    #[error("rejected by database ({code}): {message}")]
    UpstreamRejected {
        /// Database diagnostic code.
        code: String,
        /// Database diagnostic text.
        message: String,
    },
}

/// Result type for rowguard operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::ObjectInUse {
            kind: SecurityObjectKind::Profile,
            name: "LIMITED".to_string(),
            dependents: 3,
        };
        assert!(err.to_string().contains("profile 'LIMITED'"));
        assert!(err.to_string().contains("3 dependent"));

        let err = Error::UpstreamRejected {
            code: "ORA-01920".to_string(),
            message: "user name conflicts with another user".to_string(),
        };
        assert!(err.to_string().contains("ORA-01920"));
        assert!(err.to_string().contains("conflicts"));
    }
}
