//! The `Transport` contract: the HTTP client a host application supplies for
//! login and the sync/budget RPCs. This crate only depends on the shape of
//! the calls — it never opens a socket itself.

use async_trait::async_trait;

use crate::errors::Result;
use crate::message::{SyncRequest, SyncResponse};

/// Network boundary for authentication and the sync/budget RPCs. `4xx`/`5xx`
/// and I/O errors surface as `SyncError::TransportFailure` or
/// `SyncError::AuthFailure` (for `401`/`403`), never as a panic.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Exchanges a password for a process-scoped auth token.
    async fn login(&self, password: &str) -> Result<String>;

    /// POSTs a protobuf-encoded `SyncRequest`, returns the decoded
    /// `SyncResponse`.
    async fn sync(&self, request: &SyncRequest) -> Result<SyncResponse>;

    /// Downloads a budget file (zip archive containing `db.sqlite` and
    /// `metadata.json`) for `file_id`.
    async fn download_budget(&self, file_id: &str) -> Result<Vec<u8>>;

    /// Uploads a budget file, returning the server-assigned file id.
    async fn upload_budget(
        &self,
        file_id: &str,
        name: &str,
        bytes: &[u8],
        group_id: &str,
    ) -> Result<String>;
}
