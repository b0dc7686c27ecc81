//! Holds the pending final candidate for the currently open segment and
//! decides how long to wait before committing it (spec §4.4).
//!
//! The engine never commits anything itself; it only tracks a deadline;
//! `Pipeline` polls that deadline and performs the commit. This keeps the
//! component synchronous and unit-testable without a real timer.

use std::time::Instant;

#[derive(Debug, Clone)]
pub struct FinalizationConfig {
    pub base_wait_ms: u64,
    pub max_wait_ms: u64,
    pub false_final_short_len: usize,
    pub false_final_base_ms: u64,
    /// Known-incomplete sentence prefixes (normalized, lowercase, no
    /// trailing period) that make a short, period-terminated final suspect.
    pub false_final_patterns: Vec<String>,
    /// Minimum wait for a final with no sentence terminator.
    pub sentence_incomplete_floor_ms: u64,
    /// Maximum wait for a final with no sentence terminator.
    pub sentence_incomplete_ceiling_ms: u64,
}

impl Default for FinalizationConfig {
    fn default() -> Self {
        Self {
            base_wait_ms: crate::constants::FINALIZATION_BASE_WAIT_MS,
            max_wait_ms: crate::constants::FINALIZATION_MAX_WAIT_MS,
            false_final_short_len: crate::constants::FALSE_FINAL_SHORT_LEN,
            false_final_base_ms: crate::constants::FALSE_FINAL_BASE_MS,
            false_final_patterns: default_false_final_patterns(),
            sentence_incomplete_floor_ms: 1500,
            sentence_incomplete_ceiling_ms: 3000,
        }
    }
}

/// Common incomplete-sentence openings a vendor STT will sometimes
/// prematurely end-of-turn on. Kept here only as the built-in default;
/// callers configure their own list through `captionrelay-config`.
fn default_false_final_patterns() -> Vec<String> {
    vec![
        "you just can't".to_string(),
        "i just can't".to_string(),
        "that's just".to_string(),
        "this is just".to_string(),
        "we're just".to_string(),
    ]
}

#[derive(Debug, Clone)]
struct Pending {
    text: String,
    created_at: Instant,
    max_wait_at: Instant,
}

#[derive(Debug, Default)]
pub struct FinalizationEngine {
    pending: Option<Pending>,
}

impl FinalizationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self, text: &str, now: Instant, max_wait_ms: u64) {
        self.pending = Some(Pending {
            text: text.to_string(),
            created_at: now,
            max_wait_at: now + std::time::Duration::from_millis(max_wait_ms),
        });
    }

    /// Replace the pending text (a later partial extended it) and postpone
    /// the timer, without ever pushing it past `max_wait_at`.
    pub fn update_text(&mut self, text: &str, now: Instant) {
        if let Some(p) = &mut self.pending {
            p.text = text.to_string();
            p.created_at = now;
        }
    }

    /// The instant at which a commit scheduled `wait_ms` after `created_at`
    /// should fire, clamped to `max_wait_at`.
    pub fn deadline(&self, wait_ms: u64) -> Option<Instant> {
        let p = self.pending.as_ref()?;
        let desired = p.created_at + std::time::Duration::from_millis(wait_ms);
        Some(desired.min(p.max_wait_at))
    }

    pub fn text(&self) -> Option<&str> {
        self.pending.as_ref().map(|p| p.text.as_str())
    }

    pub fn clear(&mut self) {
        self.pending = None;
    }

    /// Base wait before committing, adjusted for sentence completeness:
    /// text with no terminator gets a longer floor so a trailing partial
    /// word has a chance to arrive.
    pub fn calculate_wait_time(text: &str, base_ms: u64, config: &FinalizationConfig) -> u64 {
        let trimmed = text.trim_end();
        let ends_with_terminator = trimmed
            .chars()
            .last()
            .map(|c| matches!(c, '.' | '!' | '?' | '…'))
            .unwrap_or(false);

        if ends_with_terminator {
            base_ms
        } else {
            let scaled = (text.chars().count() as u64) * 10;
            base_ms.max(scaled.clamp(
                config.sentence_incomplete_floor_ms,
                config.sentence_incomplete_ceiling_ms,
            ))
        }
    }

    /// A final is suspect; likely truncated by the provider's own
    /// endpointing; if it is short, ends with a period, and matches a
    /// known incomplete-sentence opening.
    pub fn is_false_final(text: &str, config: &FinalizationConfig) -> bool {
        let trimmed = text.trim();
        if trimmed.chars().count() >= config.false_final_short_len {
            return false;
        }
        if !trimmed.ends_with('.') {
            return false;
        }
        let normalized = trimmed.trim_end_matches('.').trim().to_lowercase();
        config
            .false_final_patterns
            .iter()
            .any(|pattern| normalized == pattern.to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn calculate_wait_time_uses_floor_for_incomplete_text() {
        let config = FinalizationConfig::default();
        assert_eq!(
            FinalizationEngine::calculate_wait_time("Bend.", 1000, &config),
            1000
        );
        assert_eq!(
            FinalizationEngine::calculate_wait_time("You just can't beat", 1000, &config),
            1500
        );
    }

    #[test]
    fn false_final_matches_known_incomplete_pattern() {
        let config = FinalizationConfig::default();
        assert!(FinalizationEngine::is_false_final("You just can't.", &config));
        assert!(!FinalizationEngine::is_false_final(
            "You just can't beat people up with doctrine",
            &config
        ));
    }

    #[test]
    fn update_text_postpones_but_never_exceeds_max_wait() {
        let t0 = Instant::now();
        let mut engine = FinalizationEngine::new();
        engine.create("Bend", t0, 2000);

        let t1 = t0 + Duration::from_millis(1900);
        engine.update_text("Bend.", t1);

        // Deadline would be t1 + 1000 = t0 + 2900, but max_wait_at caps at t0 + 2000.
        assert_eq!(engine.deadline(1000), Some(t0 + Duration::from_millis(2000)));
    }

    #[test]
    fn clear_drops_pending_state() {
        let mut engine = FinalizationEngine::new();
        engine.create("hi", Instant::now(), 1000);
        engine.clear();
        assert_eq!(engine.text(), None);
    }
}
