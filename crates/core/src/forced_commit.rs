//! Buffers a forced (pause-induced) final while a short recovery window is
//! open to extend or supersede it (spec §4.5).

use std::time::Instant;

use crate::text::extends;

#[derive(Debug, Clone)]
pub struct ForcedCommitConfig {
    pub capture_window_ms: u64,
    pub post_commit_gap_ms: u64,
}

impl Default for ForcedCommitConfig {
    fn default() -> Self {
        Self {
            capture_window_ms: crate::constants::CAPTURE_WINDOW_MS,
            post_commit_gap_ms: 250,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ForcedBuffer {
    pub text: String,
    pub timestamp: Instant,
    /// Snapshot of the context the Deduplicator needs when this buffer
    /// eventually commits; captured once, at buffer creation, per spec's
    /// "snapshot isolation" invariant.
    pub last_committed_original: String,
    pub last_committed_at: Option<Instant>,
    pub recovery_in_progress: bool,
    pub recovery_epoch: u32,
}

#[derive(Debug, Default)]
pub struct ForcedCommitEngine {
    buffer: Option<ForcedBuffer>,
}

impl ForcedCommitEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_buffer(
        &mut self,
        text: &str,
        now: Instant,
        prev_original: &str,
        prev_at: Option<Instant>,
    ) {
        self.buffer = Some(ForcedBuffer {
            text: text.to_string(),
            timestamp: now,
            last_committed_original: prev_original.to_string(),
            last_committed_at: prev_at,
            recovery_in_progress: false,
            recovery_epoch: 0,
        });
    }

    pub fn buffer(&self) -> Option<&ForcedBuffer> {
        self.buffer.as_ref()
    }

    /// `(extended_text, added_suffix)` if `partial` (normalized) is a
    /// strict extension of the buffered text.
    pub fn check_partial_extends(&self, partial: &str) -> Option<(String, String)> {
        let buffer = self.buffer.as_ref()?;
        if !extends(partial, &buffer.text) {
            return None;
        }
        let suffix: String = partial
            .chars()
            .skip(buffer.text.chars().count())
            .collect::<String>()
            .trim_start()
            .to_string();
        Some((partial.to_string(), suffix))
    }

    /// True if `partial` is not an extension of the buffer; i.e. the
    /// speaker has moved on and this belongs to a new segment.
    pub fn is_new_segment(&self, partial: &str) -> bool {
        match &self.buffer {
            Some(buffer) => !extends(partial, &buffer.text),
            None => true,
        }
    }

    pub fn update_text(&mut self, text: &str) {
        if let Some(buffer) = &mut self.buffer {
            buffer.text = text.to_string();
        }
    }

    /// Marks (or clears) an in-flight recovery attempt. Entering
    /// recovery bumps `recoveryEpoch`; the returned epoch is the one a
    /// subsequent recovery response must match or exceed (recovery
    /// dominance, Invariant 4).
    pub fn set_recovery_in_progress(&mut self, in_progress: bool) -> u32 {
        let Some(buffer) = &mut self.buffer else {
            return 0;
        };
        if in_progress {
            buffer.recovery_epoch += 1;
        }
        buffer.recovery_in_progress = in_progress;
        buffer.recovery_epoch
    }

    pub fn current_epoch(&self) -> u32 {
        self.buffer.as_ref().map_or(0, |b| b.recovery_epoch)
    }

    pub fn clear_buffer(&mut self) {
        self.buffer = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_partial_extends_returns_added_suffix() {
        let mut engine = ForcedCommitEngine::new();
        engine.create_buffer("love this quote", Instant::now(), "", None);

        let (extended, suffix) = engine
            .check_partial_extends("love this quote: biblical hospitality")
            .unwrap();
        assert_eq!(extended, "love this quote: biblical hospitality");
        assert_eq!(suffix, ": biblical hospitality");
    }

    #[test]
    fn is_new_segment_true_when_partial_does_not_extend() {
        let mut engine = ForcedCommitEngine::new();
        engine.create_buffer("love this quote", Instant::now(), "", None);
        assert!(engine.is_new_segment("Own self-centered desires"));
        assert!(!engine.is_new_segment("love this quote and more"));
    }

    #[test]
    fn entering_recovery_increments_epoch() {
        let mut engine = ForcedCommitEngine::new();
        engine.create_buffer("text", Instant::now(), "", None);
        assert_eq!(engine.set_recovery_in_progress(true), 1);
        assert_eq!(engine.set_recovery_in_progress(false), 1);
        assert_eq!(engine.set_recovery_in_progress(true), 2);
    }
}
