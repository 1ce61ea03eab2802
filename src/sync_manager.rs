//! Facade orchestrating local mutations and sync cycles: wraps a
//! `SyncEngine` behind `Arc<tokio::sync::Mutex<_>>` so every clock
//! read-modify-write and merkle mutation is serialized, matching the
//! single-logical-writer scheduling model.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::errors::Result;
use crate::merkle::MerkleTrie;
use crate::message::MessageEnvelope;
use crate::repository::Repository;
use crate::sync_engine::SyncEngine;
use crate::transport::Transport;

/// Entry point a host application holds onto for the lifetime of an open
/// budget file.
pub struct SyncManager {
    engine: Arc<Mutex<SyncEngine>>,
    transport: Arc<dyn Transport>,
    file_id: String,
    group_id: String,
}

impl SyncManager {
    pub async fn open(
        repo: Arc<dyn Repository>,
        transport: Arc<dyn Transport>,
        file_id: impl Into<String>,
        group_id: impl Into<String>,
        encryption_key: Option<[u8; 32]>,
    ) -> Result<Self> {
        let engine = SyncEngine::initialize(repo, encryption_key).await?;
        Ok(Self {
            engine: Arc::new(Mutex::new(engine)),
            transport,
            file_id: file_id.into(),
            group_id: group_id.into(),
        })
    }

    /// Records a local mutation and returns the envelope that represents it.
    pub async fn create_change(
        &self,
        dataset: &str,
        row: &str,
        column: &str,
        value: &str,
    ) -> Result<MessageEnvelope> {
        let mut engine = self.engine.lock().await;
        engine.create_change(dataset, row, column, value).await
    }

    /// Soft-deletes a row by setting its `tombstone` column.
    pub async fn delete_row(&self, dataset: &str, row: &str) -> Result<MessageEnvelope> {
        self.create_change(dataset, row, "tombstone", "1").await
    }

    /// Runs one full sync cycle: build request, call transport, apply
    /// response. Network I/O happens before any database transaction is
    /// opened, so no transaction is ever held across the `Transport` call.
    pub async fn sync(&self, full_sync: bool) -> Result<usize> {
        let request = {
            let engine = self.engine.lock().await;
            engine
                .build_sync_request(&self.file_id, &self.group_id, full_sync)
                .await?
        };

        let response = self.transport.sync(&request).await?;

        let mut engine = self.engine.lock().await;
        let applied = engine.process_sync_response(&response.messages).await?;

        if !response.merkle.is_empty() {
            if let Ok(server_merkle) = MerkleTrie::from_canonical_json(&response.merkle) {
                if !engine.is_in_sync(server_merkle.root.hash) {
                    info!("local merkle still diverges from server after sync, will resync next cycle");
                }
            } else {
                warn!("server returned an unparseable merkle snapshot");
            }
        }

        info!(applied, full_sync, "sync cycle complete");
        Ok(applied)
    }

    /// Runs an incremental sync scoped to a known merkle divergence against
    /// `server_merkle`, rather than a full from-scratch exchange.
    pub async fn sync_incremental(&self, server_merkle: &MerkleTrie) -> Result<usize> {
        let request = {
            let engine = self.engine.lock().await;
            engine
                .build_incremental_sync_request(&self.file_id, &self.group_id, server_merkle)
                .await?
        };

        let response = self.transport.sync(&request).await?;

        let mut engine = self.engine.lock().await;
        engine.process_sync_response(&response.messages).await
    }

    /// Whether the local merkle agrees with a previously observed server hash.
    pub async fn is_in_sync(&self, server_root_hash: u32) -> bool {
        let engine = self.engine.lock().await;
        engine.is_in_sync(server_root_hash)
    }
}
