//! Pipeline-local error type.
//!
//! Every other failure mode in the caption stabilization design is handled
//! internally (retried, dropped, or surfaced as telemetry); per spec §7,
//! an invariant violation is the one case that is fatal and must never be
//! suppressed. It exists here purely so a caller can detect "this pipeline
//! is no longer trustworthy" and terminate the session.

#[derive(Debug, thiserror::Error, PartialEq, Eq, Clone)]
pub enum InvariantViolation {
    #[error("attempted to commit sourceSeqId {0} a second time")]
    DoubleCommit(u64),
    #[error("a new segment was opened while the previous segment ({0}) was neither committed nor dropped")]
    FloatingSegment(u64),
}
