//! Out-of-order partial suppression at ingest (spec §4.9).
//!
//! For each `sourceSeqId` the gate remembers the highest `eventSeqId` it has
//! admitted as a partial; anything older is dropped before it ever reaches a
//! listener queue. After a final, the tracker is pinned to `u64::MAX` so a
//! late-arriving partial for that segment can never sneak through.

use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct IngestGate {
    highest_seen: HashMap<u64, u64>,
}

impl IngestGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if this partial should be admitted; false if it is stale and
    /// must be dropped without reaching any listener.
    pub fn admit_partial(&mut self, source_seq_id: u64, event_seq_id: u64) -> bool {
        let highest = self.highest_seen.entry(source_seq_id).or_insert(0);
        if event_seq_id <= *highest {
            return false;
        }
        *highest = event_seq_id;
        true
    }

    /// A final was published for `source_seq_id`: block every subsequent
    /// partial for it, forever.
    pub fn mark_final(&mut self, source_seq_id: u64) {
        self.highest_seen.insert(source_seq_id, u64::MAX);
    }

    /// Drop bookkeeping for a segment no longer of interest (session end).
    pub fn forget(&mut self, source_seq_id: u64) {
        self.highest_seen.remove(&source_seq_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn older_event_seq_id_is_suppressed() {
        let mut gate = IngestGate::new();
        assert!(gate.admit_partial(1, 5));
        assert!(!gate.admit_partial(1, 4));
        assert!(gate.admit_partial(1, 7));
    }

    #[test]
    fn final_blocks_any_later_partial() {
        let mut gate = IngestGate::new();
        gate.admit_partial(1, 5);
        gate.mark_final(1);
        assert!(!gate.admit_partial(1, 6));
        assert!(!gate.admit_partial(1, u64::MAX - 1));
    }

    #[test]
    fn independent_source_seq_ids_track_separately() {
        let mut gate = IngestGate::new();
        gate.admit_partial(1, 100);
        assert!(gate.admit_partial(2, 1));
    }

    #[test]
    fn scenario_out_of_order_partial() {
        // eventSeqId=5 "Hello", eventSeqId=4 "Hell" (stale, dropped),
        // eventSeqId=7 final "Hello there."; spec §8 scenario 6.
        let mut gate = IngestGate::new();
        assert!(gate.admit_partial(1, 5));
        assert!(!gate.admit_partial(1, 4));
        gate.mark_final(1);
        assert!(gate.highest_seen.get(&1).copied() == Some(u64::MAX));
    }
}
