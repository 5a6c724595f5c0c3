use std::cmp::Ordering;

use crate::ids::PeerId;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// One `(peer, count)` pair of a vector clock.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ClockEntry {
    pub peer: PeerId,
    pub count: u64,
}

/// Per-object record of how many local edits each peer has made.
///
/// Entries keep the order in which peers first wrote to the object; there is at most one
/// entry per peer, and counts never decrease.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct VectorClock {
    entries: Vec<ClockEntry>,
}

impl VectorClock {
    /// Create a new empty vector clock.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Build a clock from decoded entries. Later duplicates of a peer are folded in with `max`.
    pub fn from_entries(entries: impl IntoIterator<Item = ClockEntry>) -> Self {
        let mut clock = Self::new();
        for entry in entries {
            clock.observe(&entry.peer, entry.count);
        }
        clock
    }

    /// Count recorded for `peer`, or 0 if it never wrote.
    pub fn get(&self, peer: &PeerId) -> u64 {
        self.entry(peer).map(|e| e.count).unwrap_or(0)
    }

    /// Record one more local edit by `peer` and return its new count.
    ///
    /// A peer without an entry is added with count 0 first, so its first edit yields 1.
    pub fn increment(&mut self, peer: &PeerId) -> u64 {
        let idx = match self.entries.iter().position(|e| &e.peer == peer) {
            Some(idx) => idx,
            None => {
                self.entries.push(ClockEntry {
                    peer: *peer,
                    count: 0,
                });
                self.entries.len() - 1
            }
        };
        let entry = &mut self.entries[idx];
        entry.count += 1;
        entry.count
    }

    /// Raise `peer`'s count to at least `count`.
    pub fn observe(&mut self, peer: &PeerId, count: u64) {
        match self.entries.iter_mut().find(|e| &e.peer == peer) {
            Some(entry) => entry.count = entry.count.max(count),
            None => self.entries.push(ClockEntry { peer: *peer, count }),
        }
    }

    /// Pointwise maximum with `other`.
    pub fn merge(&mut self, other: &VectorClock) {
        for entry in &other.entries {
            self.observe(&entry.peer, entry.count);
        }
    }

    /// True when this clock has seen at least every edit `other` has seen.
    pub fn dominates(&self, other: &VectorClock) -> bool {
        other.entries.iter().all(|e| self.get(&e.peer) >= e.count)
    }

    /// Causal comparison; `None` means the clocks are concurrent.
    pub fn partial_cmp_causal(&self, other: &VectorClock) -> Option<Ordering> {
        match (self.dominates(other), other.dominates(self)) {
            (true, true) => Some(Ordering::Equal),
            (true, false) => Some(Ordering::Greater),
            (false, true) => Some(Ordering::Less),
            (false, false) => None,
        }
    }

    /// Sum of all counts.
    pub fn sum(&self) -> u64 {
        self.entries.iter().map(|e| e.count).sum()
    }

    pub fn entries(&self) -> &[ClockEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    fn entry(&self, peer: &PeerId) -> Option<&ClockEntry> {
        self.entries.iter().find(|e| &e.peer == peer)
    }
}

/// `(last writer, vector clock sum)` attached to every versioned field value.
///
/// Stamps are totally ordered by clock sum, ties broken by writer id, which gives a
/// deterministic winner when two peers wrote the same field concurrently.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct VersionStamp {
    pub last_writer: PeerId,
    pub clock_sum: u64,
}

impl VersionStamp {
    pub fn new(last_writer: PeerId, clock_sum: u64) -> Self {
        Self {
            last_writer,
            clock_sum,
        }
    }

    /// Stamp for a local write by `writer` whose clock is `clock` (after incrementing).
    pub fn local(writer: &PeerId, clock: &VectorClock) -> Self {
        Self::new(*writer, clock.sum())
    }
}

impl Ord for VersionStamp {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.clock_sum, self.last_writer).cmp(&(other.clock_sum, other.last_writer))
    }
}

impl PartialOrd for VersionStamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
