//! Wire-level contracts published by a caption session.
//!
//! This crate defines the `CaptionEvent` schema that crosses the boundary to
//! listeners, and the `EventBus` trait that decouples the session loop from
//! whatever transport actually delivers events (websocket, SSE, an in-memory
//! channel in tests). Using one shared type here prevents the field-name
//! drift that hand-written JSON on both sides invites.

mod bus;
mod ids;

pub use bus::{EmittedEvent, EventBus, EventBusRef, InMemoryEventBus, NullEventBus};
pub use ids::{is_transcription_mode, LanguageTag, SessionId};

use serde::{Deserialize, Serialize};

/// A single published caption event.
///
/// Field names are the contract: listeners deserialize this exact shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CaptionEvent {
    #[serde(rename = "type")]
    pub kind: CaptionEventKind,
    /// Global monotonic sequence number for this session.
    pub event_seq_id: u64,
    /// Segment identity; absent on live-only partials that precede a final
    /// candidate ever being declared.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_seq_id: Option<u64>,
    pub is_partial: bool,
    /// Only true on forced (pause-induced) finals.
    #[serde(default)]
    pub force_final: bool,
    pub original_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub corrected_text: Option<String>,
    /// Absent when `is_partial` and this is pure transcription (no
    /// translation requested for this listener).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub translated_text: Option<String>,
    pub source_lang: String,
    pub target_lang: String,
    pub has_translation: bool,
    pub has_correction: bool,
    /// Unix milliseconds.
    pub timestamp: i64,
}

/// Discriminant for `CaptionEvent::kind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptionEventKind {
    Translation,
}

/// Other event types published on the same per-session channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    SessionJoined { listener_id: String },
    SessionReady,
    SessionEnded,
    Error { message: String, code: ErrorCode },
    SessionStats { listener_count: usize },
}

/// Error taxonomy surfaced to listeners (never raw vendor strings, per the
/// error-handling design).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    TransientProvider,
    Protocol,
    Invariant,
    Backpressure,
}
