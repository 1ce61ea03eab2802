//! The `Repository` contract: the local message log and domain tables this
//! crate mutates but never owns. A host application implements this trait
//! against its actual SQLite (or other) storage; this crate only depends on
//! the contract.

use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;

use crate::errors::Result;
use crate::message::Message;

/// A transaction body: an async closure producing `Result<()>`, boxed since
/// async closures aren't expressible directly in a trait object signature.
pub type TransactionBody<'a> =
    Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> + Send + 'a>;

/// One stored row of the message log, as read back by `get_messages_since`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    pub timestamp: String,
    pub message: Message,
}

/// Storage contract for the message log, domain tables, and sync metadata.
///
/// Implementations must guarantee: `insert_message` is idempotent on
/// `timestamp` (duplicate inserts are a no-op, not an error); `transaction`
/// is atomic (on error, nothing committed); `apply_lww` is itself
/// idempotent (re-applying the same `(dataset,row,column,value,timestamp)`
/// is a no-op).
#[async_trait]
pub trait Repository: Send + Sync {
    /// Inserts a message keyed by `timestamp`. Duplicate inserts (same
    /// timestamp already present) succeed without mutating anything.
    async fn insert_message(
        &self,
        timestamp: &str,
        dataset: &str,
        row: &str,
        column: &str,
        value: &str,
    ) -> Result<()>;

    /// Whether a message with this timestamp has already been stored.
    async fn message_exists(&self, timestamp: &str) -> Result<bool>;

    /// All stored messages with `timestamp > since`, ascending by timestamp.
    async fn get_messages_since(&self, since: &str) -> Result<Vec<StoredMessage>>;

    /// Applies a last-writer-wins mutation to the domain table identified by
    /// `dataset`, upserting `row` if it does not yet exist. The caller
    /// (`SyncEngine`) has already checked `timestamp` is newer than what is
    /// currently stamped on this cell; the implementation still records the
    /// stamping timestamp so future calls can make that comparison.
    async fn apply_lww(
        &self,
        dataset: &str,
        row: &str,
        column: &str,
        value: &str,
        timestamp: &str,
    ) -> Result<()>;

    /// The HLC timestamp currently stamped on `(dataset, row, column)`, or
    /// `None` if the cell has never been written.
    async fn current_stamp(&self, dataset: &str, row: &str, column: &str) -> Result<Option<String>>;

    async fn get_sync_metadata(&self, key: &str) -> Result<Option<String>>;

    async fn set_sync_metadata(&self, key: &str, value: &str) -> Result<()>;

    /// Runs `body` inside a single atomic transaction. On `Err`, nothing the
    /// body did is persisted.
    async fn transaction<'a>(&'a self, body: TransactionBody<'a>) -> Result<()>;
}
