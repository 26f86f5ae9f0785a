#![warn(missing_docs)]
//! Finger table: the per-node routing cache.

use std::ops::Index;

use serde::Deserialize;
use serde::Serialize;

use super::key::between;
use super::key::Key;
use super::peer::PeerInfo;
use crate::consts::M;

/// A fixed array of `M` peer descriptors indexed by finger exponent.
///
/// Entry `i` is the node responsible for `(own.id + 2^i) mod 2^M`; entry 0
/// is the successor. Every entry starts out pointing at the owning node
/// itself, so a fresh node routes everything back to itself until it joins
/// a ring.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FingerTable {
    own: PeerInfo,
    entries: Vec<PeerInfo>,
}

impl FingerTable {
    /// Build a table for `own` with all entries pointing at `own`.
    pub fn new(own: PeerInfo) -> Self {
        let entries = vec![own.clone(); M];
        FingerTable { own, entries }
    }

    /// The next node on the ring.
    pub fn successor(&self) -> &PeerInfo {
        &self.entries[0]
    }

    /// Replace the successor entry.
    pub fn set_successor(&mut self, peer: PeerInfo) {
        self.entries[0] = peer;
    }

    /// getter
    pub fn get(&self, index: usize) -> Option<&PeerInfo> {
        self.entries.get(index)
    }

    /// setter
    pub fn set(&mut self, index: usize, peer: PeerInfo) {
        if index >= self.entries.len() {
            tracing::error!("finger index {index} out of range, ignored");
            return;
        }
        self.entries[index] = peer;
    }

    /// All entries, in finger-exponent order.
    pub fn entries(&self) -> &[PeerInfo] {
        &self.entries
    }

    /// Select the next hop for a lookup of `key`.
    ///
    /// The successor is returned when it covers the key directly; otherwise
    /// the first finger whose arc to the next finger contains the key, and
    /// as a last resort the farthest known hop.
    pub fn finger_for_key(&self, key: Key) -> &PeerInfo {
        if between(key, self.own.id, self.entries[0].id) {
            return &self.entries[0];
        }
        for pair in self.entries.windows(2) {
            if between(key, pair[0].id, pair[1].id) {
                return &pair[0];
            }
        }
        &self.entries[M - 1]
    }
}

impl Index<usize> for FingerTable {
    type Output = PeerInfo;

    fn index(&self, index: usize) -> &PeerInfo {
        &self.entries[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(port: u16) -> PeerInfo {
        PeerInfo::new("127.0.0.1", port)
    }

    // Fabricate a descriptor at an exact ring position; routing only looks
    // at ids.
    fn peer_at(id: u64) -> PeerInfo {
        PeerInfo {
            address: "127.0.0.1".into(),
            port: 0,
            id: Key::from(id),
        }
    }

    #[test]
    fn fresh_table_points_at_self() {
        let own = peer(50001);
        let table = FingerTable::new(own.clone());
        assert_eq!(table.entries().len(), M);
        assert_eq!(*table.successor(), own);
        assert_eq!(table[M - 1], own);
    }

    #[test]
    fn set_out_of_range_is_ignored() {
        let mut table = FingerTable::new(peer(50001));
        table.set(M, peer(50002));
        assert_eq!(table[M - 1], peer(50001));
    }

    #[test]
    fn successor_covers_near_keys() {
        let own = peer_at(100);
        let mut table = FingerTable::new(own);
        table.set_successor(peer_at(200));
        assert_eq!(table.finger_for_key(Key::from(150)).id, Key::from(200));
        assert_eq!(table.finger_for_key(Key::from(200)).id, Key::from(200));
    }

    #[test]
    fn scan_picks_the_covering_finger() {
        let own = peer_at(0);
        let mut table = FingerTable::new(own);
        // Successor at 10, a mid finger at 1000, the tail at 100_000.
        for i in 0..M {
            let id = if i < 8 {
                10
            } else if i < 16 {
                1000
            } else {
                100_000
            };
            table.set(i, peer_at(id));
        }
        // Covered by the (10, 1000] arc: hop through the node at 10.
        assert_eq!(table.finger_for_key(Key::from(500)).id, Key::from(10));
        // Covered by the (1000, 100_000] arc.
        assert_eq!(table.finger_for_key(Key::from(5000)).id, Key::from(1000));
        // Past every finger: farthest known hop.
        assert_eq!(
            table.finger_for_key(Key::from(200_000)).id,
            Key::from(100_000)
        );
    }
}
