//! The "is this new text an extension of the one we already started
//! translating" check that drives partial-worker cancellation (spec §4.8,
//! §9 REDESIGN FLAGS: an explicit, unit-testable decision instead of the
//! source's fuzzy promise-coalescing heuristic).

const LEADING_CHARS: usize = 100;
const MIN_RETAINED_FRACTION: f64 = 0.6;

fn char_prefix(text: &str, n: usize) -> &str {
    match text.char_indices().nth(n) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// True if `new_text` is a plausible continuation of `previous`; long
/// enough relative to it and sharing the same leading 100 characters.
pub fn is_extension(previous: &str, new_text: &str) -> bool {
    if previous.is_empty() {
        return true;
    }
    let prev_len = previous.chars().count();
    let new_len = new_text.chars().count();
    if (new_len as f64) < (prev_len as f64) * MIN_RETAINED_FRACTION {
        return false;
    }
    char_prefix(previous, LEADING_CHARS) == char_prefix(new_text, LEADING_CHARS)
}

/// True if a request in flight for `previous` should be cancelled in favor
/// of translating `new_text` instead.
pub fn should_cancel(previous: &str, new_text: &str) -> bool {
    !is_extension(previous, new_text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn an_extending_continuation_is_not_cancelled() {
        assert!(!should_cancel("Hello there", "Hello there, how are you"));
    }

    #[test]
    fn a_much_shorter_replacement_is_cancelled() {
        assert!(should_cancel("Hello there, how are you doing today", "Hi"));
    }

    #[test]
    fn a_different_leading_clause_is_cancelled_even_at_similar_length() {
        assert!(should_cancel(
            "Hello there, how are you doing",
            "Goodbye then, see you around"
        ));
    }

    #[test]
    fn nothing_in_flight_never_needs_cancelling() {
        assert!(!should_cancel("", "anything at all"));
    }
}
