//! The unit of finality (spec §3). A `Segment` is mutable only through its
//! owning `Pipeline`; no other component holds a reference to one across
//! a commit.

use std::collections::HashMap;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentState {
    Open,
    FinalCandidate,
    ForcedBuffered,
    Recovering,
    Committed,
    Dropped,
}

#[derive(Debug, Clone)]
pub struct Segment {
    pub source_seq_id: Option<u64>,
    pub state: SegmentState,
    pub original_text: String,
    pub corrected_text: Option<String>,
    pub translations: HashMap<String, String>,
    /// Snapshot of the longest partial at the moment this segment was
    /// promoted to FINAL_CANDIDATE or FORCED_BUFFERED (Invariant 2).
    pub partial_snapshot: Option<String>,
    pub created_at: Instant,
    pub candidate_at: Option<Instant>,
    pub committed_at: Option<Instant>,
    pub forced: bool,
    pub recovery_epoch: u32,
}

impl Segment {
    pub fn open(now: Instant) -> Self {
        Self {
            source_seq_id: None,
            state: SegmentState::Open,
            original_text: String::new(),
            corrected_text: None,
            translations: HashMap::new(),
            partial_snapshot: None,
            created_at: now,
            candidate_at: None,
            committed_at: None,
            forced: false,
            recovery_epoch: 0,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, SegmentState::Committed | SegmentState::Dropped)
    }
}

/// Outward-facing description of a segment that just committed, handed to
/// the driver for event publication and translation dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedSegment {
    pub source_seq_id: u64,
    pub original_text: String,
    pub forced: bool,
}
