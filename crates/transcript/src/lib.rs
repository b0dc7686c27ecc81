//! The append-only transcript log contract (spec §6, "Persistence
//! contract").
//!
//! This crate defines the domain-level `Segment` record that a session
//! commits to history, and `TranscriptRepository`, the trait a storage
//! backend implements. There is deliberately no `update` or `delete` method:
//! Invariant 8 ("History is append-only") means a correction surfaces as a
//! new segment, never a mutation of one already written.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use captionrelay_events::{LanguageTag, SessionId};

/// One recognized word with its timing, when the STT provider supplies word-
/// level detail. Not every provider does; nothing in a committed segment
/// depends on its presence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Word {
    pub text: String,
    pub start_ms: u64,
    pub end_ms: u64,
    pub confidence: f32,
}

/// A committed segment as it is written to the transcript log.
///
/// Unlike the live, mutable segment the state machine works with
/// (`captionrelay-core::Segment`), this is the immutable record: once
/// appended, none of its fields change.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Segment {
    /// Monotonically increasing per session; identifies the segment.
    pub source_seq_id: u64,
    /// Source-language text the segment actually committed as.
    pub original_text: String,
    /// Post grammar-correction text, if correction ran for this segment.
    pub corrected_text: Option<String>,
    /// Target language -> translated text.
    pub translations: HashMap<String, String>,
    /// True if this segment resulted from a forced (pause-induced) commit.
    pub forced: bool,
    pub created_at: DateTime<Utc>,
    pub candidate_at: DateTime<Utc>,
    pub committed_at: DateTime<Utc>,
    /// Word-level timing, if the provider supplied it for this segment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub words: Option<Vec<Word>>,
}

impl Segment {
    pub fn translation_for(&self, target: &LanguageTag) -> Option<&str> {
        self.translations.get(target.as_str()).map(String::as_str)
    }
}

/// The full append-only log for one session, as read back from storage.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Transcript {
    pub segments: Vec<Segment>,
}

impl Transcript {
    pub fn full_text(&self) -> String {
        self.segments
            .iter()
            .map(|s| s.original_text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// The highest committed `source_seq_id`, or `None` for an empty log.
    pub fn last_source_seq_id(&self) -> Option<u64> {
        self.segments.iter().map(|s| s.source_seq_id).max()
    }
}

/// Repository trait for transcript persistence.
///
/// Implemented by the storage layer so the core pipeline stays decoupled
/// from any particular database. `append` is the only write operation;
/// reads are not on the hot path (spec §6).
pub trait TranscriptRepository: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Append one committed segment. Calling this twice with the same
    /// `source_seq_id` for the same session is a logic error in the caller
    /// (Invariant 6: exactly one final per segment); implementations may
    /// reject it, but are not required to detect it.
    fn append(&self, session_id: SessionId, segment: &Segment) -> Result<(), Self::Error>;

    /// Read the full transcript for a session, oldest first.
    fn read_all(&self, session_id: SessionId) -> Result<Transcript, Self::Error>;

    /// Read only segments committed after `after_source_seq_id`.
    fn read_since(
        &self,
        session_id: SessionId,
        after_source_seq_id: u64,
    ) -> Result<Vec<Segment>, Self::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(source_seq_id: u64, text: &str) -> Segment {
        let now = Utc::now();
        Segment {
            source_seq_id,
            original_text: text.to_string(),
            corrected_text: None,
            translations: HashMap::new(),
            forced: false,
            created_at: now,
            candidate_at: now,
            committed_at: now,
            words: None,
        }
    }

    #[test]
    fn full_text_joins_segments_in_order() {
        let transcript = Transcript {
            segments: vec![seg(0, "Bend."), seg(1, "Oh boy.")],
        };
        assert_eq!(transcript.full_text(), "Bend. Oh boy.");
    }

    #[test]
    fn last_source_seq_id_tracks_max() {
        let transcript = Transcript {
            segments: vec![seg(0, "a"), seg(2, "b"), seg(1, "c")],
        };
        assert_eq!(transcript.last_source_seq_id(), Some(2));
    }

    #[test]
    fn empty_transcript_has_no_last_seq_id() {
        let transcript = Transcript::default();
        assert_eq!(transcript.last_source_seq_id(), None);
    }

    #[test]
    fn translation_for_looks_up_by_tag() {
        let mut segment = seg(0, "Bend.");
        segment
            .translations
            .insert("es".to_string(), "Doblar.".to_string());
        assert_eq!(
            segment.translation_for(&LanguageTag::new("es")),
            Some("Doblar.")
        );
        assert_eq!(segment.translation_for(&LanguageTag::new("fr")), None);
    }
}
