//! Literal timing and threshold defaults named in the caption stabilization
//! design (spec §5, §6). These are the defaults `captionrelay-config`
//! exposes as overridable options; the pipeline itself only ever reads them
//! through a `PipelineConfig`.

/// How long after `candidateAt`, with a non-extending partial, a
/// FINAL_CANDIDATE commits early and opens a new segment.
pub const SEGMENT_BREAK_MS: u64 = 600;

/// How long a forced final may be extended or superseded before it commits
/// as buffered.
pub const CAPTURE_WINDOW_MS: u64 = 2200;

/// A segment with no partial follow-up within this window, before ever
/// reaching FINAL_CANDIDATE, is dropped rather than left floating.
pub const MIN_PARTIAL_IDLE_MS: u64 = 3000;

pub const FINALIZATION_BASE_WAIT_MS: u64 = 1000;
pub const FINALIZATION_MAX_WAIT_MS: u64 = 8000;
pub const FALSE_FINAL_BASE_MS: u64 = 3000;
pub const FALSE_FINAL_SHORT_LEN: usize = 25;

/// Minimum partial length that triggers the new-segment partial rule.
pub const NEW_SEGMENT_PARTIAL_MIN_LEN: usize = 15;
pub const NEW_SEGMENT_PARTIAL_WAIT_BASE_MS: u64 = 1500;

/// How stale a tracked partial may be and still be offered as a substitute
/// for a shorter final.
pub const PARTIAL_EXTEND_MAX_AGE_MS: u64 = 5000;

pub const DEDUP_TIME_WINDOW_MS: u64 = 5000;
pub const DEDUP_MAX_WORDS_TO_CHECK: usize = 10;
pub const DEDUP_MIN_OVERLAP_WORDS: usize = 1;
