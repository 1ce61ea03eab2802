//! Tunable limits for the sync core (drift window, merkle depth, prune fanout).
//!
//! Small, `Copy` configuration struct, mirroring the shape of a budget type:
//! named constructors for the common profiles, a `Default` for production use.

/// Maximum counter value before a clock send/recv overflows (spec §3: 0..65535).
pub const COUNTER_MAX: u16 = 0xFFFF;

/// Allowed physical-time drift window for `MutableClock::send`/`recv` (spec §4.A).
pub const DRIFT_WINDOW_MS: i64 = 60_000;

/// Merkle trie path-length cap — minute buckets in base 3 (spec §4.C).
pub const MERKLE_DEPTH_CAP: usize = 20;

/// Default `MerkleTrie::prune` fanout (spec §9 Open Question: defensive only).
pub const DEFAULT_PRUNE_FANOUT: usize = 3;

/// Minute bucket size in milliseconds (spec §3).
pub const MINUTE_MS: i64 = 60_000;

/// Runtime-tunable limits for a `SyncEngine` instance.
///
/// All fields default to the spec's fixed constants; exposed as fields
/// (rather than baked-in constants) so tests can exercise drift/overflow
/// edge cases without waiting on real wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncConfig {
    /// Allowed drift between a clock's physical time and wall time, in ms.
    pub drift_window_ms: i64,
    /// Maximum counter value before `OverflowError`.
    pub counter_max: u16,
    /// Depth cap applied when walking/pruning the merkle trie.
    pub merkle_depth_cap: usize,
    /// Default fanout used by `MerkleTrie::prune`.
    pub prune_fanout: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            drift_window_ms: DRIFT_WINDOW_MS,
            counter_max: COUNTER_MAX,
            merkle_depth_cap: MERKLE_DEPTH_CAP,
            prune_fanout: DEFAULT_PRUNE_FANOUT,
        }
    }
}

impl SyncConfig {
    /// Config matching the spec's fixed constants exactly (alias for `default`).
    pub fn spec_default() -> Self {
        Self::default()
    }

    /// A config with a tightened drift window, useful for drift-injection tests.
    pub fn with_drift_window_ms(mut self, ms: i64) -> Self {
        self.drift_window_ms = ms;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_spec_constants() {
        let cfg = SyncConfig::default();
        assert_eq!(cfg.drift_window_ms, 60_000);
        assert_eq!(cfg.counter_max, 0xFFFF);
        assert_eq!(cfg.merkle_depth_cap, 20);
        assert_eq!(cfg.prune_fanout, 3);
    }

    #[test]
    fn builder_overrides_drift_window() {
        let cfg = SyncConfig::default().with_drift_window_ms(5_000);
        assert_eq!(cfg.drift_window_ms, 5_000);
    }
}
