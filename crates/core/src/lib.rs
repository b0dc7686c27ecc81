//! Caption stabilization pipeline: turns a noisy stream of STT partial and
//! final hypotheses into a well-ordered sequence of at-most-one-final-per-
//! segment, with deduplication, recovery-merged forced commits and
//! sentence-boundary segmentation. Synchronous and free of I/O so the whole
//! protocol is unit-testable without a network or a clock service.

mod constants;
mod deduplicator;
mod error;
mod finalization;
mod forced_commit;
mod partial_tracker;
mod segment;
mod sentence_segmenter;
mod state_machine;
mod text;

pub use deduplicator::{dedup, DeduplicatorConfig};
pub use error::InvariantViolation;
pub use finalization::{FinalizationConfig, FinalizationEngine};
pub use forced_commit::{ForcedBuffer, ForcedCommitConfig, ForcedCommitEngine};
pub use partial_tracker::PartialTracker;
pub use segment::{CommittedSegment, Segment, SegmentState};
pub use sentence_segmenter::{SentenceSegmenter, SentenceSplit};
pub use state_machine::{Pipeline, PipelineConfig};
pub use text::{extends, normalize_word, normalize_ws_lower};
