//! Small text-normalization helpers shared by the components that compare
//! hypotheses across decodes (`PartialTracker`, `Deduplicator`,
//! `ForcedCommitEngine`). Kept free of any one component's state so the
//! comparison rules stay consistent everywhere they're used.

use unicode_normalization::UnicodeNormalization;

/// Case-fold, Unicode-normalize (NFKC) and collapse whitespace, for
/// comparisons that should ignore incidental formatting differences.
pub fn normalize_ws_lower(text: &str) -> String {
    text.nfkc()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Strip non-alphanumeric characters and lowercase, for word-level identity
/// comparisons that should ignore punctuation (`"Hello,"` vs `"hello"`).
pub fn normalize_word(word: &str) -> String {
    word.chars()
        .filter(|c| c.is_alphanumeric())
        .collect::<String>()
        .to_lowercase()
}

/// True if `candidate` (normalized) begins with `base` (normalized) and is
/// strictly longer; the shape of check used throughout §4 to decide
/// whether a hypothesis "extends" a shorter one.
///
/// `base`'s trailing sentence terminator is ignored for the prefix match: a
/// vendor that ends a turn on a premature `.` (a false final) still counts
/// as extended by a continuation that drops that punctuation.
pub fn extends(candidate: &str, base: &str) -> bool {
    if candidate.chars().count() <= base.chars().count() {
        return false;
    }
    let norm_candidate = normalize_ws_lower(candidate);
    let norm_base = normalize_ws_lower(base);
    let trimmed_base = norm_base.trim_end_matches(['.', '!', '?', '…', ',']);
    if trimmed_base.is_empty() {
        return false;
    }
    norm_candidate.starts_with(trimmed_base)
}
