//! Hybrid logical clock timestamps.
//!
//! `Timestamp` is the wire/storage form: a canonical string
//! `YYYY-MM-DDTHH:MM:SS.sssZ-CCCC-NNNNNNNNNNNNNNNN` (millis, counter in hex,
//! 16-hex-char node id). Ordering is derived from that string, never from
//! comparing fields independently, so lexicographic order and chronological
//! HLC order always agree.
//!
//! `MutableClock` is the mutable cursor a single writer advances via
//! `send`/`recv`.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use rand::RngCore;

use crate::config::{COUNTER_MAX, DRIFT_WINDOW_MS};
use crate::errors::{Result, SyncError};

/// A single point in the hybrid logical clock's domain.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Timestamp {
    pub millis: i64,
    pub counter: u16,
    pub node: String,
}

impl Timestamp {
    /// Builds a timestamp, validating that `node` is exactly 16 lowercase hex chars.
    pub fn new(millis: i64, counter: u16, node: impl Into<String>) -> Result<Self> {
        let node = node.into();
        if !is_valid_node(&node) {
            return Err(SyncError::InvalidInput(format!(
                "node id must be 16 lowercase hex chars, got {node:?}"
            )));
        }
        Ok(Self {
            millis,
            counter,
            node,
        })
    }

    /// The zero timestamp for a given node: epoch millis, zero counter.
    pub fn zero(node: impl Into<String>) -> Result<Self> {
        Self::new(0, 0, node)
    }

    /// The maximal representable timestamp for a given node: millis at the
    /// last instant of the year 9999, counter at its ceiling.
    pub fn max(node: impl Into<String>) -> Result<Self> {
        let millis = NaiveDate::from_ymd_opt(9999, 12, 31)
            .and_then(|d| d.and_hms_milli_opt(23, 59, 59, 999))
            .map(|naive| Utc.from_utc_datetime(&naive).timestamp_millis())
            .expect("year 9999 end-of-year is a representable date");
        Self::new(millis, COUNTER_MAX, node)
    }

    /// Canonical string form, the only form ever compared or hashed on the wire.
    pub fn to_canonical_string(&self) -> String {
        let dt = millis_to_datetime(self.millis);
        format!(
            "{}-{:04X}-{}",
            dt.format("%Y-%m-%dT%H:%M:%S%.3fZ"),
            self.counter,
            self.node
        )
    }

    /// Parses a canonical string back into a `Timestamp`. Returns `None` on
    /// any malformed input rather than panicking.
    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = s.rsplitn(3, '-');
        let node = parts.next()?;
        let counter_hex = parts.next()?;
        let date_part = parts.next()?;

        if !is_valid_node(node) {
            return None;
        }
        let counter = u16::from_str_radix(counter_hex, 16).ok()?;
        let dt = DateTime::parse_from_str(
            &format!("{date_part} +0000"),
            "%Y-%m-%dT%H:%M:%S%.3fZ %z",
        )
        .ok()?;
        let millis = dt.timestamp_millis();

        Some(Self {
            millis,
            counter,
            node: node.to_string(),
        })
    }
}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.to_canonical_string().cmp(&other.to_canonical_string())
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_canonical_string())
    }
}

fn millis_to_datetime(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis).single().unwrap_or_else(|| {
        if millis < 0 {
            DateTime::<Utc>::MIN_UTC
        } else {
            DateTime::<Utc>::MAX_UTC
        }
    })
}

fn is_valid_node(node: &str) -> bool {
    node.len() == 16 && node.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase())
}

/// Generates a fresh random 16-hex-char client/node id.
pub fn make_client_id() -> String {
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// The mutable cursor a single logical writer advances over time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutableClock {
    pub millis: i64,
    pub counter: u16,
    pub node: String,
}

impl MutableClock {
    pub fn new(node: impl Into<String>) -> Result<Self> {
        let node = node.into();
        if !is_valid_node(&node) {
            return Err(SyncError::InvalidInput(format!(
                "node id must be 16 lowercase hex chars, got {node:?}"
            )));
        }
        Ok(Self {
            millis: 0,
            counter: 0,
            node,
        })
    }

    /// Restores a clock from a previously persisted timestamp.
    pub fn from_timestamp(ts: &Timestamp) -> Self {
        Self {
            millis: ts.millis,
            counter: ts.counter,
            node: ts.node.clone(),
        }
    }

    /// Snapshots the current clock state as a `Timestamp`.
    pub fn as_timestamp(&self) -> Result<Timestamp> {
        Timestamp::new(self.millis, self.counter, self.node.clone())
    }

    /// Advances the clock for a locally-originated event, given the current
    /// wall-clock time in millis. Mirrors the HLC `send` rule: physical time
    /// wins unless it hasn't moved, in which case the counter increments.
    pub fn send(&mut self, wall_millis: i64) -> Result<Timestamp> {
        let new_millis = wall_millis.max(self.millis);

        if new_millis - wall_millis > DRIFT_WINDOW_MS {
            return Err(SyncError::ClockDrift {
                new_millis,
                wall_millis,
                window_ms: DRIFT_WINDOW_MS,
            });
        }

        let new_counter = if new_millis == self.millis {
            self.counter
                .checked_add(1)
                .ok_or(SyncError::ClockOverflow { max: COUNTER_MAX })?
        } else {
            0
        };
        if new_counter > COUNTER_MAX {
            return Err(SyncError::ClockOverflow { max: COUNTER_MAX });
        }

        self.millis = new_millis;
        self.counter = new_counter;
        self.as_timestamp()
    }

    /// Merges in a remote timestamp, advancing the local clock per the HLC
    /// `recv` rule so that the result is causally after both inputs.
    pub fn recv(&mut self, remote: &Timestamp, wall_millis: i64) -> Result<Timestamp> {
        if remote.millis - wall_millis > DRIFT_WINDOW_MS {
            return Err(SyncError::ClockDrift {
                new_millis: remote.millis,
                wall_millis,
                window_ms: DRIFT_WINDOW_MS,
            });
        }

        let new_millis = wall_millis.max(self.millis).max(remote.millis);

        let new_counter = if new_millis == self.millis && new_millis == remote.millis {
            self.counter.max(remote.counter).checked_add(1)
        } else if new_millis == self.millis {
            self.counter.checked_add(1)
        } else if new_millis == remote.millis {
            remote.counter.checked_add(1)
        } else {
            Some(0)
        }
        .ok_or(SyncError::ClockOverflow { max: COUNTER_MAX })?;

        if new_counter > COUNTER_MAX {
            return Err(SyncError::ClockOverflow { max: COUNTER_MAX });
        }

        self.millis = new_millis;
        self.counter = new_counter;
        self.as_timestamp()
    }

    /// Convenience parse helper used when restoring `lastSyncedTimestamp`
    /// from sync metadata.
    pub fn since(iso: &str) -> Option<Timestamp> {
        Timestamp::parse(iso)
    }
}
