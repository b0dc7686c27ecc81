//! The provider-facing contract a speech-to-text backend implements.
//!
//! A provider is anything that can turn a stream of audio bytes into a
//! stream of partial and final hypotheses; a hosted streaming API, a local
//! model, or (in tests) a scripted fake. The pool only depends on this
//! trait, never on a specific vendor SDK.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::Result;

/// One recognized word with its timing, as reported by the provider.
#[derive(Debug, Clone, PartialEq)]
pub struct Word {
    pub text: String,
    pub start_ms: u64,
    pub end_ms: u64,
    pub confidence: f32,
}

/// A raw hypothesis from the provider, before the core pipeline applies
/// stability tracking, deduplication, or sentence segmentation.
#[derive(Debug, Clone, PartialEq)]
pub struct RawHypothesis {
    pub text: String,
    pub start_ms: u64,
    pub end_ms: u64,
    pub words: Vec<Word>,
}

/// Events a session pushes as recognition progresses. Delivered out of band
/// from `send_audio`/`force_commit`, since providers are free to batch or
/// delay their output.
#[derive(Debug, Clone)]
pub enum SttEvent {
    /// An unstable, still-revisable hypothesis for the segment in progress.
    Partial(RawHypothesis),
    /// A hypothesis the provider considers settled.
    Final(RawHypothesis),
    /// The provider reported an error that does not necessarily end the
    /// session (e.g. one bad audio frame).
    Error(crate::SttError),
}

/// A live connection to one STT backend instance.
#[async_trait]
pub trait SttSession: Send + Sync {
    /// Feed raw PCM bytes to the provider. Never blocks on provider network
    /// I/O longer than necessary to hand the bytes to a local buffer.
    async fn send_audio(&self, bytes: &[u8]) -> Result<()>;

    /// Ask the provider to flush whatever hypothesis it is holding as a
    /// final, immediately, instead of waiting for its own endpointing.
    async fn force_commit(&self) -> Result<()>;

    /// Tear the session down. Idempotent.
    async fn close(&self) -> Result<()>;
}

/// Connects to a backend and produces sessions.
///
/// Implementors hand the pool a fresh `SttSession` each time `connect` is
/// called; the pool is responsible for retrying on disconnect.
#[async_trait]
pub trait SttProvider: Send + Sync {
    /// Open one session. Events recognized on this session are pushed to
    /// `events`; the provider owns that sender's lifetime (it should drop
    /// it, or send nothing further, once the session ends).
    async fn connect(&self, events: mpsc::Sender<SttEvent>) -> Result<Box<dyn SttSession>>;

    fn model_name(&self) -> &str;
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    /// A provider whose sessions never error, used to exercise the pool's
    /// dispatch and reconnect logic without a real backend.
    pub struct AlwaysUpProvider;

    #[async_trait]
    impl SttProvider for AlwaysUpProvider {
        async fn connect(&self, events: mpsc::Sender<SttEvent>) -> Result<Box<dyn SttSession>> {
            Ok(Box::new(FakeSession {
                events,
                closed: Arc::new(AtomicBool::new(false)),
            }))
        }

        fn model_name(&self) -> &str {
            "fake-always-up"
        }
    }

    struct FakeSession {
        events: mpsc::Sender<SttEvent>,
        closed: Arc<AtomicBool>,
    }

    #[async_trait]
    impl SttSession for FakeSession {
        async fn send_audio(&self, bytes: &[u8]) -> Result<()> {
            let _ = self
                .events
                .send(SttEvent::Partial(RawHypothesis {
                    text: format!("{} bytes", bytes.len()),
                    start_ms: 0,
                    end_ms: 0,
                    words: Vec::new(),
                }))
                .await;
            Ok(())
        }

        async fn force_commit(&self) -> Result<()> {
            Ok(())
        }

        async fn close(&self) -> Result<()> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    /// A provider whose first `connect` call fails, to exercise reconnect
    /// backoff.
    pub struct FlakyOnceProvider {
        pub failed: AtomicBool,
    }

    impl FlakyOnceProvider {
        pub fn new() -> Self {
            Self {
                failed: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl SttProvider for FlakyOnceProvider {
        async fn connect(&self, events: mpsc::Sender<SttEvent>) -> Result<Box<dyn SttSession>> {
            if !self.failed.swap(true, Ordering::SeqCst) {
                return Err(crate::SttError::ConnectionFailed(
                    "simulated first-connect failure".into(),
                ));
            }
            Ok(Box::new(FakeSession {
                events,
                closed: Arc::new(AtomicBool::new(false)),
            }))
        }

        fn model_name(&self) -> &str {
            "fake-flaky-once"
        }
    }
}
