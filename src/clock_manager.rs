//! Persists and restores clock + merkle state against `Repository` sync
//! metadata, without any module-level mutable singleton — callers own a
//! `MutableClock`/`MerkleTrie` pair and pass them through explicitly.

use crate::errors::{Result, SyncError};
use crate::merkle::MerkleTrie;
use crate::repository::Repository;
use crate::timestamp::{make_client_id, MutableClock, Timestamp};

pub const KEY_CLIENT_ID: &str = "clientId";
pub const KEY_GROUP_ID: &str = "groupId";
pub const KEY_FILE_ID: &str = "fileId";
pub const KEY_LAST_SYNCED_TIMESTAMP: &str = "lastSyncedTimestamp";
pub const KEY_CLOCK: &str = "clock";
pub const KEY_MERKLE: &str = "merkle";

/// On-disk snapshot of clock + merkle state, restored at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClockState {
    pub timestamp: String,
    pub merkle: MerkleTrie,
}

/// Loads persisted clock + merkle state, or creates a fresh clock (with a
/// newly generated client id) and empty merkle if none is stored.
pub async fn load_or_init(repo: &dyn Repository) -> Result<(MutableClock, MerkleTrie)> {
    let stored_clock = repo.get_sync_metadata(KEY_CLOCK).await?;

    match stored_clock {
        Some(raw) => {
            let state = decode_clock_state(&raw)?;
            let ts = Timestamp::parse(&state.timestamp).ok_or_else(|| {
                SyncError::InvalidTimestamp(format!(
                    "stored clock timestamp is malformed: {}",
                    state.timestamp
                ))
            })?;
            Ok((MutableClock::from_timestamp(&ts), state.merkle))
        }
        None => {
            let client_id = match repo.get_sync_metadata(KEY_CLIENT_ID).await? {
                Some(existing) => existing,
                None => {
                    let fresh = make_client_id();
                    repo.set_sync_metadata(KEY_CLIENT_ID, &fresh).await?;
                    fresh
                }
            };
            let clock = MutableClock::new(client_id)?;
            Ok((clock, MerkleTrie::new()))
        }
    }
}

/// Persists the current clock + merkle snapshot. Called once per batch
/// (per `create_change` or `process_sync_response` call), never per message.
pub async fn persist(repo: &dyn Repository, clock: &MutableClock, merkle: &MerkleTrie) -> Result<()> {
    let ts = clock.as_timestamp()?;
    let encoded = encode_clock_state(&ClockState {
        timestamp: ts.to_canonical_string(),
        merkle: merkle.clone(),
    })?;
    repo.set_sync_metadata(KEY_CLOCK, &encoded).await
}

/// Reads `lastSyncedTimestamp`, defaulting to the clock's node-zero timestamp
/// if never set.
pub async fn last_synced_timestamp(repo: &dyn Repository, node: &str) -> Result<Timestamp> {
    match repo.get_sync_metadata(KEY_LAST_SYNCED_TIMESTAMP).await? {
        Some(raw) => Timestamp::parse(&raw)
            .ok_or_else(|| SyncError::InvalidTimestamp(format!("bad lastSyncedTimestamp: {raw}"))),
        None => Timestamp::zero(node),
    }
}

pub async fn set_last_synced_timestamp(repo: &dyn Repository, ts: &Timestamp) -> Result<()> {
    repo.set_sync_metadata(KEY_LAST_SYNCED_TIMESTAMP, &ts.to_canonical_string())
        .await
}

fn encode_clock_state(state: &ClockState) -> Result<String> {
    let merkle_json = state.merkle.to_canonical_json()?;
    serde_json::to_string(&serde_json::json!({
        "timestamp": state.timestamp,
        "merkle": serde_json::from_str::<serde_json::Value>(&merkle_json)
            .map_err(|e| SyncError::MerkleError(format!("re-parse trie json: {e}")))?,
    }))
    .map_err(|e| SyncError::CodecError(format!("encode clock state: {e}")))
}

fn decode_clock_state(raw: &str) -> Result<ClockState> {
    let value: serde_json::Value = serde_json::from_str(raw)
        .map_err(|e| SyncError::CodecError(format!("decode clock state: {e}")))?;
    let timestamp = value
        .get("timestamp")
        .and_then(|v| v.as_str())
        .ok_or_else(|| SyncError::CodecError("clock state missing timestamp".to_string()))?
        .to_string();
    let merkle_json = value
        .get("merkle")
        .ok_or_else(|| SyncError::CodecError("clock state missing merkle".to_string()))?
        .to_string();
    let merkle = MerkleTrie::from_canonical_json(&merkle_json)?;
    Ok(ClockState { timestamp, merkle })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_state_round_trips_through_json() {
        let mut merkle = MerkleTrie::new();
        merkle.insert(&Timestamp::new(60_000, 0, "0123456789abcdef").unwrap());
        let state = ClockState {
            timestamp: "2024-01-01T00:00:00.000Z-0000-0123456789abcdef".to_string(),
            merkle,
        };
        let encoded = encode_clock_state(&state).unwrap();
        let decoded = decode_clock_state(&encoded).unwrap();
        assert_eq!(state, decoded);
    }
}
