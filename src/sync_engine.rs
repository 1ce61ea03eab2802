//! Compose pending messages, diff merkles against a remote peer, and apply
//! sync responses. Owns its `MutableClock` and `MerkleTrie` as plain fields
//! (no module-level singleton, per the "avoid global state" design note);
//! callers serialize access via `Arc<tokio::sync::Mutex<SyncEngine>>`
//! (see `sync_manager`).

use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::clock_manager;
use crate::crypto;
use crate::errors::{Result, SyncError};
use crate::merkle::MerkleTrie;
use crate::message::{EncryptedData, Message, MessageEnvelope, SyncRequest};
use crate::repository::Repository;
use crate::timestamp::{MutableClock, Timestamp};

/// Current wall-clock time in epoch milliseconds.
fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// The sync state machine: one instance per locally-opened budget file.
pub struct SyncEngine {
    repo: Arc<dyn Repository>,
    clock: MutableClock,
    merkle: MerkleTrie,
    /// AES-GCM-256 key used to encrypt outbound / decrypt inbound envelopes.
    /// `None` means this file is unencrypted.
    encryption_key: Option<[u8; 32]>,
}

impl SyncEngine {
    /// Loads persisted clock/merkle state (or creates fresh state), rebuilding
    /// the merkle from the message log when no snapshot was found.
    pub async fn initialize(
        repo: Arc<dyn Repository>,
        encryption_key: Option<[u8; 32]>,
    ) -> Result<Self> {
        let (clock, mut merkle) = clock_manager::load_or_init(repo.as_ref()).await?;
        let had_no_snapshot = merkle.root.hash == 0 && merkle.root.children.is_empty();

        if had_no_snapshot {
            let zero = Timestamp::zero(clock.node.clone())?;
            let all = repo
                .get_messages_since(&zero.to_canonical_string())
                .await?;
            for stored in &all {
                if let Some(ts) = Timestamp::parse(&stored.timestamp) {
                    merkle.insert(&ts);
                }
            }
        }

        debug!(node = %clock.node, "sync engine initialized");
        Ok(Self {
            repo,
            clock,
            merkle,
            encryption_key,
        })
    }

    /// Applies a local mutation: advances the clock, persists the message,
    /// applies it to the domain table, updates the merkle, and returns the
    /// envelope that would be sent to the server.
    pub async fn create_change(
        &mut self,
        dataset: &str,
        row: &str,
        column: &str,
        value: &str,
    ) -> Result<MessageEnvelope> {
        let ts = self.clock.send(now_millis())?;
        let ts_str = ts.to_canonical_string();
        let message = Message {
            dataset: dataset.to_string(),
            row: row.to_string(),
            column: column.to_string(),
            value: value.to_string(),
        };

        let envelope = self.encode_envelope(&ts_str, &message)?;

        let repo_for_txn = Arc::clone(&self.repo);
        let dataset_owned = dataset.to_string();
        let row_owned = row.to_string();
        let column_owned = column.to_string();
        let value_owned = value.to_string();
        let ts_for_txn = ts_str.clone();

        self.repo
            .transaction(Box::new(move || {
            let repo = repo_for_txn;
            Box::pin(async move {
                repo.insert_message(
                    &ts_for_txn,
                    &dataset_owned,
                    &row_owned,
                    &column_owned,
                    &value_owned,
                )
                .await?;
                repo.apply_lww(
                    &dataset_owned,
                    &row_owned,
                    &column_owned,
                    &value_owned,
                    &ts_for_txn,
                )
                .await
            })
        }))
        .await?;

        // No suspension between clock.send() (above) and the insert that just
        // committed; the clock snapshot is only written to disk now, after
        // the transaction committed.
        self.merkle.insert(&ts);
        clock_manager::persist(self.repo.as_ref(), &self.clock, &self.merkle).await?;

        debug!(timestamp = %ts_str, dataset, row, column, "change created");
        Ok(envelope)
    }

    /// Builds a `SyncRequest` for all local envelopes newer than
    /// `lastSyncedTimestamp`, or all of them if `full_sync` is set.
    pub async fn build_sync_request(
        &self,
        file_id: &str,
        group_id: &str,
        full_sync: bool,
    ) -> Result<SyncRequest> {
        let since = if full_sync {
            Timestamp::zero(self.clock.node.clone())?
        } else {
            clock_manager::last_synced_timestamp(self.repo.as_ref(), &self.clock.node).await?
        };

        let messages = self.envelopes_since(&since).await?;
        debug!(count = messages.len(), full_sync, "built sync request");

        Ok(SyncRequest {
            messages,
            file_id: file_id.to_string(),
            group_id: group_id.to_string(),
            key_id: String::new(),
            since: since.to_canonical_string(),
        })
    }

    /// Builds a `SyncRequest` scoped to only what's needed to resolve a
    /// known merkle divergence against `server_merkle`.
    pub async fn build_incremental_sync_request(
        &self,
        file_id: &str,
        group_id: &str,
        server_merkle: &MerkleTrie,
    ) -> Result<SyncRequest> {
        let diffs = self.merkle.diff(server_merkle);
        let since = match diffs.iter().map(|p| path_to_minute_bucket(p)).min() {
            Some(bucket) => {
                Timestamp::new(bucket * crate::config::MINUTE_MS, 0, "0".repeat(16))?
            }
            None => Timestamp::zero(self.clock.node.clone())?,
        };

        let messages = self.envelopes_since(&since).await?;
        debug!(
            count = messages.len(),
            since = %since,
            "built incremental sync request"
        );

        Ok(SyncRequest {
            messages,
            file_id: file_id.to_string(),
            group_id: group_id.to_string(),
            key_id: String::new(),
            since: since.to_canonical_string(),
        })
    }

    /// Applies every envelope in a `SyncResponse`, in ascending timestamp
    /// order, skipping any whose timestamp is already in the log. Returns
    /// the number of envelopes actually applied (not skipped).
    pub async fn process_sync_response(
        &mut self,
        messages: &[MessageEnvelope],
    ) -> Result<usize> {
        let mut ordered: Vec<&MessageEnvelope> = messages.iter().collect();
        ordered.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));

        let mut applied = 0usize;
        let mut max_ts: Option<Timestamp> = None;

        for envelope in ordered {
            let ts = match Timestamp::parse(&envelope.timestamp) {
                Some(ts) => ts,
                None => {
                    warn!(raw = %envelope.timestamp, "dropping envelope with invalid timestamp");
                    continue;
                }
            };
            let ts_str = ts.to_canonical_string();

            if self.repo.message_exists(&ts_str).await? {
                trace!(timestamp = %ts_str, "envelope already applied, skipping");
                continue;
            }

            let message = match self.decode_envelope(envelope) {
                Ok(m) => m,
                Err(e) => {
                    warn!(timestamp = %ts_str, error = %e, "failed to decode envelope, skipping");
                    continue;
                }
            };

            let repo_for_txn = Arc::clone(&self.repo);
            let ts_for_txn = ts_str.clone();
            let message_for_txn = message.clone();

            let txn_result = self
                .repo
                .transaction(Box::new(move || {
                    let repo = repo_for_txn;
                    Box::pin(async move {
                        repo.insert_message(
                            &ts_for_txn,
                            &message_for_txn.dataset,
                            &message_for_txn.row,
                            &message_for_txn.column,
                            &message_for_txn.value,
                        )
                        .await?;

                        let current = repo
                            .current_stamp(
                                &message_for_txn.dataset,
                                &message_for_txn.row,
                                &message_for_txn.column,
                            )
                            .await?;
                        let is_newer = match &current {
                            Some(existing) => ts_for_txn.as_str() > existing.as_str(),
                            None => true,
                        };
                        if is_newer {
                            repo.apply_lww(
                                &message_for_txn.dataset,
                                &message_for_txn.row,
                                &message_for_txn.column,
                                &message_for_txn.value,
                                &ts_for_txn,
                            )
                            .await?;
                        }
                        Ok(())
                    })
                }))
                .await;

            if let Err(e) = txn_result {
                warn!(timestamp = %ts_str, error = %e, "transaction failed, leaving envelope for retry");
                continue;
            }

            self.clock.recv(&ts, now_millis())?;
            self.merkle.insert(&ts);
            applied += 1;
            max_ts = Some(match max_ts {
                Some(m) if m >= ts => m,
                _ => ts,
            });
        }

        if let Some(new_since) = &max_ts {
            let existing = clock_manager::last_synced_timestamp(self.repo.as_ref(), &self.clock.node).await?;
            let winner = std::cmp::max(existing, new_since.clone());
            clock_manager::set_last_synced_timestamp(self.repo.as_ref(), &winner).await?;
        }
        clock_manager::persist(self.repo.as_ref(), &self.clock, &self.merkle).await?;

        debug!(applied, "processed sync response");
        Ok(applied)
    }

    /// Compares the local merkle root hash against a server-reported hash.
    pub fn is_in_sync(&self, server_root_hash: u32) -> bool {
        self.merkle.root.hash == server_root_hash
    }

    /// Read-only access to the current merkle trie, e.g. for diagnostics.
    pub fn merkle(&self) -> &MerkleTrie {
        &self.merkle
    }

    async fn envelopes_since(&self, since: &Timestamp) -> Result<Vec<MessageEnvelope>> {
        let stored = self
            .repo
            .get_messages_since(&since.to_canonical_string())
            .await?;
        stored
            .iter()
            .map(|s| self.encode_envelope(&s.timestamp, &s.message))
            .collect()
    }

    fn encode_envelope(&self, timestamp: &str, message: &Message) -> Result<MessageEnvelope> {
        let plaintext = message.encode();
        match &self.encryption_key {
            Some(key) => {
                let encrypted = crypto::encrypt(key, &plaintext)?;
                Ok(MessageEnvelope {
                    timestamp: timestamp.to_string(),
                    is_encrypted: true,
                    content: encrypted.encode(),
                })
            }
            None => Ok(MessageEnvelope {
                timestamp: timestamp.to_string(),
                is_encrypted: false,
                content: plaintext,
            }),
        }
    }

    fn decode_envelope(&self, envelope: &MessageEnvelope) -> Result<Message> {
        if envelope.is_encrypted {
            let key = self
                .encryption_key
                .ok_or_else(|| SyncError::DecryptFailure("no encryption key configured".to_string()))?;
            let encrypted = EncryptedData::decode(&envelope.content)?;
            let plaintext = crypto::decrypt(&key, &encrypted)?;
            Message::decode(&plaintext)
        } else {
            Message::decode(&envelope.content)
        }
    }
}

fn path_to_minute_bucket(path: &str) -> i64 {
    path.chars().fold(0i64, |acc, c| {
        let digit = c.to_digit(3).unwrap_or(0) as i64;
        acc * 3 + digit
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_to_minute_bucket_matches_base3_encoding() {
        assert_eq!(path_to_minute_bucket("0"), 0);
        assert_eq!(path_to_minute_bucket("1"), 1);
        assert_eq!(path_to_minute_bucket("10"), 3);
        assert_eq!(path_to_minute_bucket("22"), 8);
    }
}
