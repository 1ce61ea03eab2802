//! actual-sync-core - client-side CRDT sync core for an offline-first
//! personal-finance app.
//!
//! # Architecture
//!
//! - **timestamp**: Hybrid logical clock (`Timestamp`, `MutableClock`)
//! - **murmur3**: MurmurHash3 x86_32 (seed 0), used by the merkle trie
//! - **merkle**: Ternary XOR time-trie over minute-bucketed timestamps
//! - **protobuf**: Hand-rolled varint / length-delimited wire codec
//! - **message**: `Message`, `MessageEnvelope`, `EncryptedData`, `SyncRequest`/`SyncResponse`
//! - **crypto**: AES-GCM-256 envelope encryption
//! - **clock_manager**: Persist/restore clock + merkle via sync metadata
//! - **repository**: `Repository` storage contract (implemented by the host)
//! - **transport**: `Transport` network contract (implemented by the host)
//! - **sync_engine**: Compose requests, diff merkles, apply responses
//! - **sync_manager**: Facade serializing access to one `SyncEngine`
//! - **errors**: Typed error handling, no panics in the sync path
//! - **config**: Tunable limits (drift window, merkle depth, prune fanout)
//!
//! # Usage
//!
//! ```rust
//! use actual_sync_core::timestamp::MutableClock;
//!
//! let mut clock = MutableClock::new("0123456789abcdef").unwrap();
//! let ts = clock.send(0).unwrap();
//! assert_eq!(ts.node, "0123456789abcdef");
//! ```

pub mod clock_manager;
pub mod config;
pub mod crypto;
pub mod errors;
pub mod merkle;
pub mod message;
pub mod murmur3;
pub mod protobuf;
pub mod repository;
pub mod sync_engine;
pub mod sync_manager;
pub mod timestamp;
pub mod transport;

pub use errors::{Result, SyncError};
pub use message::{EncryptedData, Message, MessageEnvelope, SyncRequest, SyncResponse};
pub use merkle::{MerkleTrie, TrieNode};
pub use repository::Repository;
pub use sync_engine::SyncEngine;
pub use sync_manager::SyncManager;
pub use timestamp::{make_client_id, MutableClock, Timestamp};
pub use transport::Transport;

/// Library version (matches Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name.
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Returns a short version string, e.g. for client-identification headers.
pub fn version_info() -> String {
    format!("{NAME} v{VERSION}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_info() {
        let info = version_info();
        assert!(info.contains("actual-sync-core"));
    }
}
