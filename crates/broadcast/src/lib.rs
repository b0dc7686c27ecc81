//! Per-session listener fan-out (spec §4.9, "ListenerBroadcaster").
//!
//! Assigns the global monotonic `eventSeqId`, suppresses out-of-order
//! partials at ingest, and delivers to each listener through a bounded,
//! drop-oldest-partial queue with bounded retry on finals.

mod broadcaster;
mod ingest;
mod queue;
mod sink;

pub use broadcaster::{BroadcastConfig, ListenerBroadcaster, ListenerId, Publication, PublishOutcome};
pub use ingest::IngestGate;
pub use queue::{ListenerQueue, PushOutcome, QueueConfig};
pub use sink::ListenerSink;

#[derive(Debug, thiserror::Error)]
pub enum BroadcastError {
    #[error("listener delivery failed: {0}")]
    DeliveryFailed(String),
}

pub type Result<T> = std::result::Result<T, BroadcastError>;
