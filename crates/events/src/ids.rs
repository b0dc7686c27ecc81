//! Session-scoped identifiers shared by every crate that talks about a
//! caption session from the outside.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque identifier generated at session start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for SessionId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A language tag, treated as an opaque equality-comparable string.
///
/// Normalization across providers (`pt-BR` vs `pt`, `cmn-CN` vs `zh`) is
/// deferred to the glue layer that sits outside the core; this type stays
/// an opaque equality-comparable string rather than a validated locale.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LanguageTag(String);

impl LanguageTag {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LanguageTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for LanguageTag {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for LanguageTag {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// True when the target language equals the source language; the session
/// is running in pure transcription mode.
pub fn is_transcription_mode(source: &LanguageTag, target: &LanguageTag) -> bool {
    source == target
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_roundtrips_through_json() {
        let id = SessionId::new();
        let json = serde_json::to_string(&id).unwrap();
        let back: SessionId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }

    #[test]
    fn transcription_mode_detection() {
        let en = LanguageTag::new("en");
        let en2 = LanguageTag::new("en");
        let es = LanguageTag::new("es");
        assert!(is_transcription_mode(&en, &en2));
        assert!(!is_transcription_mode(&en, &es));
    }
}
