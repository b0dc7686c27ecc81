//! Splits a cumulative live text into completed sentences and a residual
//! live tail (spec §4.3). Lets a long multi-sentence utterance commit
//! sentence-by-sentence while the speaker keeps talking.

/// Result of processing one cumulative partial.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SentenceSplit {
    /// Residual text after the last completed sentence.
    pub live_text: String,
    /// Sentences newly completed by this call, in order.
    pub flushed_sentences: Vec<String>,
}

#[derive(Debug, Default)]
pub struct SentenceSegmenter {
    /// Sentences already handed off for the current segment, in order.
    flushed: Vec<String>,
    /// Running count of sentences flushed over the life of the session, not
    /// cleared by a segment-boundary reset. Session-scoped telemetry only;
    /// plays no role in dedup/flush logic.
    total_flushed: u64,
}

impl SentenceSegmenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// `cumulative` is the full live text of the segment so far (not a
    /// delta). Returns any sentences newly completed since the last call,
    /// plus the residual tail.
    ///
    /// A sentence is only flushed once there is real trailing content after
    /// it; i.e. the cumulative text has moved on to something new. A
    /// cumulative string that happens to end exactly on a terminator (no
    /// trailing fragment yet) holds everything not already flushed as
    /// `live_text` instead, since the speaker may still be mid-thought.
    pub fn process_partial(&mut self, cumulative: &str) -> SentenceSplit {
        let (sentences, tail) = split_sentences(cumulative);
        if tail.is_empty() {
            let pending = sentences[self.flushed.len().min(sentences.len())..].join(" ");
            return SentenceSplit {
                live_text: pending,
                flushed_sentences: Vec::new(),
            };
        }
        let newly_flushed = self.take_new(&sentences);
        SentenceSplit {
            live_text: tail,
            flushed_sentences: newly_flushed,
        }
    }

    /// Treat `text` as a final: return the sentences in it not already
    /// flushed, including a trailing fragment with no terminator.
    pub fn process_final(&mut self, text: &str) -> Vec<String> {
        let (mut sentences, tail) = split_sentences(text);
        if !tail.is_empty() {
            sentences.push(tail);
        }
        self.take_new(&sentences)
    }

    fn take_new(&mut self, sentences: &[String]) -> Vec<String> {
        if sentences.len() <= self.flushed.len() {
            return Vec::new();
        }
        let newly: Vec<String> = sentences[self.flushed.len()..].to_vec();
        self.total_flushed += newly.len() as u64;
        self.flushed.extend(newly.clone());
        newly
    }

    /// Clear tracking between segments (a committed segment's sentences are
    /// no longer relevant to the next one). An alias for `soft_reset`, kept
    /// as the default entry point for callers that don't care about the
    /// segment/session distinction.
    pub fn reset(&mut self) {
        self.soft_reset();
    }

    /// Segment-boundary reset: clears the per-segment flushed high-water
    /// mark so the next segment's sentences can flush again, without
    /// touching session-scoped bookkeeping.
    pub fn soft_reset(&mut self) {
        self.flushed.clear();
    }

    /// Session-boundary reset: clears per-segment tracking and session-scoped
    /// bookkeeping together.
    pub fn hard_reset(&mut self) {
        self.flushed.clear();
        self.total_flushed = 0;
    }

    /// Total sentences flushed since the last `hard_reset` (or construction).
    pub fn total_flushed(&self) -> u64 {
        self.total_flushed
    }
}

fn is_terminator(c: char) -> bool {
    matches!(c, '.' | '!' | '?' | '…')
}

fn is_closing(c: char) -> bool {
    matches!(c, '"' | '\'' | '”' | '’' | ')' | ']')
}

/// Split `text` into complete sentences (terminator, plus any trailing
/// closing quotes/brackets) and a residual tail with no terminator.
fn split_sentences(text: &str) -> (Vec<String>, String) {
    let chars: Vec<char> = text.chars().collect();
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < chars.len() {
        if is_terminator(chars[i]) {
            let mut end = i + 1;
            while end < chars.len() && is_terminator(chars[end]) {
                end += 1;
            }
            while end < chars.len() && is_closing(chars[end]) {
                end += 1;
            }
            let sentence: String = chars[start..end].iter().collect();
            let trimmed = sentence.trim().to_string();
            if !trimmed.is_empty() {
                sentences.push(trimmed);
            }
            start = end;
            i = end;
            continue;
        }
        i += 1;
    }

    let tail: String = chars[start..].iter().collect();
    (sentences, tail.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_partial_flushes_completed_sentences_only() {
        let mut seg = SentenceSegmenter::new();
        let split = seg.process_partial("Bend. Oh boy, I've been to the");
        assert_eq!(split.flushed_sentences, vec!["Bend.".to_string()]);
        assert_eq!(split.live_text, "Oh boy, I've been to the");
    }

    #[test]
    fn repeated_calls_do_not_reflush_the_same_sentence() {
        let mut seg = SentenceSegmenter::new();
        let first = seg.process_partial("Bend. Oh boy");
        assert_eq!(first.flushed_sentences, vec!["Bend.".to_string()]);

        // Cumulative text now ends exactly on a terminator again, with no
        // further trailing content; held as live rather than re-flushed.
        let split = seg.process_partial("Bend. Oh boy, it's late.");
        assert!(split.flushed_sentences.is_empty());
        assert_eq!(split.live_text, "Oh boy, it's late.");
    }

    #[test]
    fn process_final_includes_trailing_fragment() {
        let mut seg = SentenceSegmenter::new();
        let sentences = seg.process_final("Bend. Oh boy");
        assert_eq!(sentences, vec!["Bend.".to_string(), "Oh boy".to_string()]);
    }

    #[test]
    fn handles_ellipsis_and_closing_quotes() {
        let (sentences, tail) = split_sentences("She said \"wait…\" and left.");
        assert_eq!(sentences, vec!["She said \"wait…\"".to_string(), "and left.".to_string()]);
        assert_eq!(tail, "");
    }

    #[test]
    fn reset_allows_sentences_to_flush_again() {
        let mut seg = SentenceSegmenter::new();
        seg.process_partial("Bend. Oh boy");
        seg.reset();
        let split = seg.process_partial("Bend. Oh boy");
        assert_eq!(split.flushed_sentences, vec!["Bend.".to_string()]);
    }

    #[test]
    fn a_sentence_ending_exactly_at_the_cumulative_tail_is_held_back() {
        let mut seg = SentenceSegmenter::new();
        let split = seg.process_partial("Bend.");
        assert!(split.flushed_sentences.is_empty());
        assert_eq!(split.live_text, "Bend.");
    }

    #[test]
    fn soft_reset_clears_flush_tracking_but_not_the_session_total() {
        let mut seg = SentenceSegmenter::new();
        seg.process_partial("Bend. Oh boy");
        assert_eq!(seg.total_flushed(), 1);

        seg.soft_reset();
        let split = seg.process_partial("Bend. Oh boy");
        assert_eq!(split.flushed_sentences, vec!["Bend.".to_string()]);
        assert_eq!(seg.total_flushed(), 2);
    }

    #[test]
    fn hard_reset_clears_the_session_total_too() {
        let mut seg = SentenceSegmenter::new();
        seg.process_partial("Bend. Oh boy");
        assert_eq!(seg.total_flushed(), 1);

        seg.hard_reset();
        assert_eq!(seg.total_flushed(), 0);
        let split = seg.process_partial("Bend. Oh boy");
        assert_eq!(split.flushed_sentences, vec!["Bend.".to_string()]);
    }
}
