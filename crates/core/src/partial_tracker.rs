//! Tracks the current segment's best partial hypotheses (spec §4.1).
//!
//! STT providers routinely emit a final that is shorter than the most
//! recent partial they themselves produced moments earlier; the provider's
//! own end-of-turn heuristic truncates where its streaming decode did not.
//! This tracker lets the finalizer substitute the longer captured
//! hypothesis instead of committing the truncated one.

use std::time::{Duration, Instant};

use crate::text::extends;

#[derive(Debug, Clone)]
struct Tracked {
    text: String,
    at: Instant,
}

#[derive(Debug, Default)]
pub struct PartialTracker {
    latest: Option<Tracked>,
    longest: Option<Tracked>,
}

impl PartialTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new partial. Always becomes `latest`; becomes `longest`
    /// iff strictly longer (by character count) than the current longest.
    pub fn update(&mut self, text: &str, now: Instant) {
        self.latest = Some(Tracked {
            text: text.to_string(),
            at: now,
        });
        let is_longer = self
            .longest
            .as_ref()
            .map_or(true, |l| text.chars().count() > l.text.chars().count());
        if is_longer {
            self.longest = Some(Tracked {
                text: text.to_string(),
                at: now,
            });
        }
    }

    pub fn check_longest_extends(&self, final_text: &str, max_age: Duration, now: Instant) -> Option<String> {
        Self::check(&self.longest, final_text, max_age, now)
    }

    pub fn check_latest_extends(&self, final_text: &str, max_age: Duration, now: Instant) -> Option<String> {
        Self::check(&self.latest, final_text, max_age, now)
    }

    fn check(tracked: &Option<Tracked>, final_text: &str, max_age: Duration, now: Instant) -> Option<String> {
        let t = tracked.as_ref()?;
        if now.saturating_duration_since(t.at) > max_age {
            return None;
        }
        if extends(&t.text, final_text) {
            Some(t.text.clone())
        } else {
            None
        }
    }

    pub fn reset(&mut self) {
        self.latest = None;
        self.longest = None;
    }
}
