//! Ternary (radix-3) XOR merkle time-trie.
//!
//! Keys are base-3 strings of a timestamp's minute bucket
//! (`floor(millis / 60_000)`); each node's hash is the XOR of the
//! MurmurHash3 digests of every timestamp string inserted beneath it, so
//! insertion order never affects the resulting hash and `diff` can walk two
//! tries in lockstep to find the minute buckets that disagree.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::{MERKLE_DEPTH_CAP, MINUTE_MS};
use crate::errors::{Result, SyncError};
use crate::murmur3;
use crate::timestamp::Timestamp;

/// A single node of the trie: an XOR-accumulated hash plus up to 3 children,
/// keyed by the base-3 digit `'0'`, `'1'`, `'2'`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrieNode {
    pub hash: u32,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub children: BTreeMap<char, TrieNode>,
}

impl TrieNode {
    pub fn new() -> Self {
        Self::default()
    }
}

/// The merkle time-trie itself: a root `TrieNode` plus the bookkeeping
/// needed to insert timestamps and diff against a remote trie.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleTrie {
    pub root: TrieNode,
}

impl MerkleTrie {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a trie from a batch of timestamps (order-independent result).
    pub fn build(timestamps: &[Timestamp]) -> Self {
        let mut trie = Self::new();
        for ts in timestamps {
            trie.insert(ts);
        }
        trie
    }

    /// Inserts a single timestamp, XORing its hash into every node on its
    /// base-3 path from the root down to the minute-bucket leaf.
    pub fn insert(&mut self, ts: &Timestamp) {
        let key = Self::path_key(ts);
        let digest = murmur3::hash32(&ts.to_canonical_string());

        self.root.hash ^= digest;
        let mut node = &mut self.root;
        for ch in key.chars().take(MERKLE_DEPTH_CAP) {
            node = node.children.entry(ch).or_default();
            node.hash ^= digest;
        }
    }

    /// The minute bucket a timestamp falls into.
    pub fn minute_bucket(ts: &Timestamp) -> i64 {
        ts.millis.div_euclid(MINUTE_MS)
    }

    /// Base-3 string representation of a minute bucket, used as the trie path.
    pub fn base3(bucket: i64) -> String {
        if bucket == 0 {
            return "0".to_string();
        }
        let mut n = bucket;
        let mut digits = Vec::new();
        while n > 0 {
            digits.push(std::char::from_digit((n % 3) as u32, 3).unwrap());
            n /= 3;
        }
        digits.iter().rev().collect()
    }

    fn path_key(ts: &Timestamp) -> String {
        Self::base3(Self::minute_bucket(ts))
    }

    /// Finds the base-3 paths at which two tries' hashes diverge, descending
    /// only where hashes disagree. Missing branches are treated as hash 0.
    /// Ties between sibling branches are broken in ascending key order
    /// (`'0' < '1' < '2'`).
    pub fn diff(&self, other: &MerkleTrie) -> Vec<String> {
        let mut out = Vec::new();
        Self::diff_node(&self.root, &other.root, String::new(), 0, &mut out);
        out
    }

    fn diff_node(a: &TrieNode, b: &TrieNode, path: String, depth: usize, out: &mut Vec<String>) {
        if a.hash == b.hash {
            return;
        }
        if depth >= MERKLE_DEPTH_CAP || (a.children.is_empty() && b.children.is_empty()) {
            out.push(if path.is_empty() { "0".to_string() } else { path });
            return;
        }

        let empty = TrieNode::default();
        for key in ['0', '1', '2'] {
            let child_a = a.children.get(&key).unwrap_or(&empty);
            let child_b = b.children.get(&key).unwrap_or(&empty);
            if child_a.hash != child_b.hash {
                let mut next_path = path.clone();
                next_path.push(key);
                Self::diff_node(child_a, child_b, next_path, depth + 1, out);
            }
        }
    }

    /// Keeps only the top-`n` children by hash magnitude at every level,
    /// to cap wire size. Purely defensive; not called automatically by the
    /// sync engine.
    pub fn prune(&mut self, n: usize) {
        Self::prune_node(&mut self.root, n);
    }

    fn prune_node(node: &mut TrieNode, n: usize) {
        if node.children.len() > n {
            let mut entries: Vec<(char, TrieNode)> = std::mem::take(&mut node.children)
                .into_iter()
                .collect();
            entries.sort_by(|a, b| b.1.hash.cmp(&a.1.hash));
            entries.truncate(n);
            node.children = entries.into_iter().collect();
        }
        for child in node.children.values_mut() {
            Self::prune_node(child, n);
        }
    }

    /// Canonical JSON serialization with sorted keys (guaranteed by
    /// `BTreeMap`'s iteration order).
    pub fn to_canonical_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| SyncError::MerkleError(format!("serialize trie: {e}")))
    }

    pub fn from_canonical_json(s: &str) -> Result<Self> {
        serde_json::from_str(s).map_err(|e| SyncError::MerkleError(format!("parse trie: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const NODE: &str = "0123456789abcdef";

    fn ts(millis: i64, counter: u16) -> Timestamp {
        Timestamp::new(millis, counter, NODE).unwrap()
    }

    #[test]
    fn insert_order_does_not_affect_hash() {
        let a = MerkleTrie::build(&[ts(60_000, 0), ts(120_000, 1), ts(180_000, 2)]);
        let b = MerkleTrie::build(&[ts(180_000, 2), ts(60_000, 0), ts(120_000, 1)]);
        assert_eq!(a.root.hash, b.root.hash);
        assert_eq!(a, b);
    }

    #[test]
    fn base3_round_trips_small_values() {
        assert_eq!(MerkleTrie::base3(0), "0");
        assert_eq!(MerkleTrie::base3(1), "1");
        assert_eq!(MerkleTrie::base3(3), "10");
        assert_eq!(MerkleTrie::base3(8), "22");
    }

    #[test]
    fn diff_is_empty_for_identical_tries() {
        let a = MerkleTrie::build(&[ts(60_000, 0), ts(7_260_000, 3)]);
        let b = a.clone();
        assert!(a.diff(&b).is_empty());
    }

    #[test]
    fn diff_pinpoints_changed_bucket() {
        let a = MerkleTrie::build(&[ts(60_000, 0), ts(7_260_000, 3)]);
        let mut b = a.clone();
        b.insert(&ts(600_000_000, 9));
        let diffs = a.diff(&b);
        assert!(!diffs.is_empty());
    }

    #[test]
    fn xor_insert_is_commutative_with_removal_by_reinsertion() {
        let mut trie = MerkleTrie::new();
        let t = ts(60_000, 0);
        trie.insert(&t);
        let after_one = trie.root.hash;
        trie.insert(&t);
        // XOR of the same digest twice cancels out
        assert_ne!(after_one, 0);
        assert_eq!(trie.root.hash, 0);
    }

    #[test]
    fn canonical_json_round_trips() {
        let trie = MerkleTrie::build(&[ts(60_000, 0), ts(120_000, 1)]);
        let json = trie.to_canonical_json().unwrap();
        let back = MerkleTrie::from_canonical_json(&json).unwrap();
        assert_eq!(trie, back);
    }

    #[test]
    fn prune_keeps_at_most_n_children_per_node() {
        let mut trie = MerkleTrie::build(&[
            ts(60_000, 0),
            ts(180_000, 1),
            ts(300_000, 2),
            ts(420_000, 3),
        ]);
        trie.prune(1);
        assert!(trie.root.children.len() <= 1);
    }

    proptest::proptest! {
        #[test]
        fn xor_insert_is_order_independent(
            millis in proptest::collection::vec(0i64..100_000_000, 1..12),
        ) {
            let timestamps: Vec<Timestamp> = millis
                .iter()
                .enumerate()
                .map(|(i, m)| ts(*m, i as u16))
                .collect();

            let forward = MerkleTrie::build(&timestamps);
            let mut reversed_ts = timestamps.clone();
            reversed_ts.reverse();
            let backward = MerkleTrie::build(&reversed_ts);

            prop_assert_eq!(forward.root.hash, backward.root.hash);
        }

        #[test]
        fn diff_pinpoints_the_extra_minute_bucket(
            base_minutes in proptest::collection::vec(0i64..10_000, 1..8),
            extra_minute in 10_001i64..20_000,
        ) {
            let base: Vec<Timestamp> = base_minutes
                .iter()
                .enumerate()
                .map(|(i, m)| ts(m * crate::config::MINUTE_MS, i as u16))
                .collect();
            let a = MerkleTrie::build(&base);
            let mut b = a.clone();
            let extra_ts = ts(extra_minute * crate::config::MINUTE_MS, 0);
            b.insert(&extra_ts);

            let diffs = a.diff(&b);
            prop_assert!(!diffs.is_empty());

            let extra_path = MerkleTrie::base3(extra_minute);
            prop_assert!(diffs.iter().any(|p| extra_path.starts_with(p.as_str()) || p.starts_with(extra_path.as_str())));
        }
    }
}
