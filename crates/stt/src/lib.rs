//! The boundary between a caption session and whatever speech-to-text
//! backend it is wired to (spec §4.7, "STTSessionPool").
//!
//! `captionrelay-core` never talks to a vendor SDK directly; it consumes
//! [`SttEvent`]s produced by an [`SttSessionPool`], which in turn is built
//! from any [`SttProvider`] implementation.

mod engine;
mod pool;

pub use engine::{RawHypothesis, SttEvent, SttProvider, SttSession, Word};
pub use pool::{SttPoolConfig, SttSessionPool};

#[derive(Debug, thiserror::Error)]
pub enum SttError {
    #[error("stt connection failed: {0}")]
    ConnectionFailed(String),
    #[error("stt session closed")]
    SessionClosed,
    #[error("transcription failed: {0}")]
    TranscriptionFailed(String),
    #[error("invalid audio format")]
    InvalidAudioFormat,
}

pub type Result<T> = std::result::Result<T, SttError>;
