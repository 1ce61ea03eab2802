//! Typed error definitions for the sync core.
//!
//! NO PANICS in the sync path — every failure mode in spec §7 is a typed,
//! recoverable error. Mirrors the taxonomy table 1:1.

use thiserror::Error;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors raised by the sync core (timestamp, merkle, codec, engine layers).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    // ==================== CLOCK ERRORS ====================
    #[error("clock drift: new millis {new_millis} is more than {window_ms}ms beyond wall clock {wall_millis}")]
    ClockDrift {
        new_millis: i64,
        wall_millis: i64,
        window_ms: i64,
    },

    #[error("clock counter overflow: counter would exceed {max}")]
    ClockOverflow { max: u16 },

    #[error("invalid timestamp string: {0}")]
    InvalidTimestamp(String),

    // ==================== CODEC ERRORS ====================
    #[error("protobuf decode error: {0}")]
    ProtobufDecodeError(String),

    #[error("codec error: {0}")]
    CodecError(String),

    // ==================== CRYPTO ERRORS ====================
    #[error("failed to decrypt envelope: {0}")]
    DecryptFailure(String),

    // ==================== TRANSPORT ERRORS ====================
    #[error("transport failure: {0}")]
    TransportFailure(String),

    #[error("authentication failure: {0}")]
    AuthFailure(String),

    // ==================== REPOSITORY ERRORS ====================
    #[error("database transaction error: {0}")]
    DbTransactionError(String),

    // ==================== MERKLE ERRORS ====================
    #[error("merkle trie error: {0}")]
    MerkleError(String),

    // ==================== GENERAL ====================
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl SyncError {
    /// Whether a caller should retry the operation that produced this error
    /// (spec §7 recovery column).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::TransportFailure(_)
                | Self::ProtobufDecodeError(_)
                | Self::DbTransactionError(_)
                | Self::ClockOverflow { .. }
        )
    }

    /// Whether this error should abort the in-flight mutation/sync without
    /// mutating clock or merkle state (spec §7 policy: "the clock must
    /// never advance past an envelope that failed to apply").
    pub fn must_not_advance_clock(&self) -> bool {
        matches!(
            self,
            Self::ClockDrift { .. }
                | Self::DecryptFailure(_)
                | Self::DbTransactionError(_)
                | Self::AuthFailure(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_failure_is_retryable() {
        assert!(SyncError::TransportFailure("timeout".into()).is_retryable());
    }

    #[test]
    fn clock_drift_must_not_advance_clock() {
        assert!(SyncError::ClockDrift {
            new_millis: 100,
            wall_millis: 0,
            window_ms: 60_000
        }
        .must_not_advance_clock());
    }

    #[test]
    fn invalid_input_is_neither() {
        let e = SyncError::InvalidInput("bad".into());
        assert!(!e.is_retryable());
        assert!(!e.must_not_advance_clock());
    }
}
