//! Removes leading-word overlap between a newer final and the previous
//! final (spec §4.2). A pure function over its four inputs; it never
//! errors and holds no state of its own.

use crate::text::normalize_word;

#[derive(Debug, Clone)]
pub struct DeduplicatorConfig {
    /// Only dedup within this many milliseconds of the previous commit.
    pub time_window_ms: u64,
    /// Compare at most this many trailing/leading words.
    pub max_words_to_check: usize,
    /// Minimum overlap, in words, before any text is stripped.
    pub min_overlap_words: usize,
}

impl Default for DeduplicatorConfig {
    fn default() -> Self {
        Self {
            time_window_ms: crate::constants::DEDUP_TIME_WINDOW_MS,
            max_words_to_check: crate::constants::DEDUP_MAX_WORDS_TO_CHECK,
            min_overlap_words: crate::constants::DEDUP_MIN_OVERLAP_WORDS,
        }
    }
}

/// Strip the longest leading-word overlap of `new_text` that duplicates the
/// trailing words of `previous_text`, provided `previous_age_ms` is within
/// `config.time_window_ms`. Returns the (possibly unchanged) text and the
/// number of words skipped.
pub fn dedup(
    new_text: &str,
    previous_text: &str,
    previous_age_ms: u64,
    config: &DeduplicatorConfig,
) -> (String, usize) {
    if previous_text.trim().is_empty() || previous_age_ms > config.time_window_ms {
        return (new_text.to_string(), 0);
    }

    let prev_words: Vec<&str> = previous_text.split_whitespace().collect();
    let new_words: Vec<&str> = new_text.split_whitespace().collect();
    let max_check = config
        .max_words_to_check
        .min(prev_words.len())
        .min(new_words.len());

    let mut overlap = 0;
    for len in (1..=max_check).rev() {
        let prev_suffix = &prev_words[prev_words.len() - len..];
        let new_prefix = &new_words[..len];
        let matches = prev_suffix
            .iter()
            .zip(new_prefix.iter())
            .all(|(a, b)| normalize_word(a) == normalize_word(b));
        if matches {
            overlap = len;
            break;
        }
    }

    if overlap >= config.min_overlap_words {
        (new_words[overlap..].join(" "), overlap)
    } else {
        (new_text.to_string(), 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_overlapping_prefix_above_minimum() {
        let config = DeduplicatorConfig::default();
        let (text, skipped) = dedup(
            "Own self-centered desires cordoned off from others.",
            "...fulfill our own.",
            900,
            &config,
        );
        assert_eq!(text, "self-centered desires cordoned off from others.");
        assert_eq!(skipped, 1);
    }

    #[test]
    fn leaves_text_unchanged_when_no_words_overlap() {
        let config = DeduplicatorConfig::default();
        let (text, skipped) = dedup("completely different words", "hello world", 0, &config);
        assert_eq!(text, "completely different words");
        assert_eq!(skipped, 0);
    }

    #[test]
    fn outside_time_window_is_unchanged() {
        let config = DeduplicatorConfig::default();
        let (text, skipped) = dedup("hello world", "hello", 10_000, &config);
        assert_eq!(text, "hello world");
        assert_eq!(skipped, 0);
    }

    #[test]
    fn longest_overlap_wins_over_shorter_match() {
        let config = DeduplicatorConfig::default();
        let (text, skipped) = dedup(
            "grocery store today",
            "we went to the grocery store",
            0,
            &config,
        );
        assert_eq!(text, "today");
        assert_eq!(skipped, 2);
    }
}
