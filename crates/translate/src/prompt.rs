//! Pure prompt formatting for a translation/correction worker request (spec
//! §9 REDESIGN FLAGS: "model as a pure function ... with quantified byte
//! limits and UTF-8-safe truncation that does not leave replacement
//! characters").

pub const PROMPT_BYTE_LIMIT: usize = 4_000;
pub const TEXT_BYTE_LIMIT: usize = 4_000;
pub const COMBINED_BYTE_LIMIT: usize = 8_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TruncationReason {
    PromptTooLong,
    TextTooLong,
    CombinedTooLong,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormattedPrompt {
    pub prompt: String,
    pub truncated_text: String,
    pub truncation_reason: Option<TruncationReason>,
}

/// Truncate `s` to at most `max_bytes` bytes, cutting at the nearest
/// preceding `char` boundary so the result is always valid UTF-8 (never a
/// partial multi-byte sequence, never a replacement character).
fn truncate_utf8(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Build the prompt a translation worker sends, given a preset name, an
/// optional user-supplied custom prompt, an intensity in `[0.0, 1.0]`, and
/// the source text. Truncates whichever part(s) are needed to respect the
/// byte limits, preferring to keep the prompt whole and trim the text.
pub fn format_prompt(
    preset: &str,
    custom_prompt: Option<&str>,
    intensity: f32,
    text: &str,
) -> FormattedPrompt {
    let mut reason = None;

    let mut prompt = match custom_prompt {
        Some(custom) if !custom.trim().is_empty() => {
            format!("{custom} (preset: {preset}, intensity: {intensity:.2})")
        }
        _ => format!("Translate using preset \"{preset}\" at intensity {intensity:.2}."),
    };
    if prompt.len() > PROMPT_BYTE_LIMIT {
        prompt = truncate_utf8(&prompt, PROMPT_BYTE_LIMIT).to_string();
        reason = Some(TruncationReason::PromptTooLong);
    }

    let mut truncated_text = text.to_string();
    if truncated_text.len() > TEXT_BYTE_LIMIT {
        truncated_text = truncate_utf8(&truncated_text, TEXT_BYTE_LIMIT).to_string();
        reason = Some(TruncationReason::TextTooLong);
    }

    if prompt.len() + truncated_text.len() > COMBINED_BYTE_LIMIT {
        let text_budget = COMBINED_BYTE_LIMIT.saturating_sub(prompt.len());
        truncated_text = truncate_utf8(&truncated_text, text_budget).to_string();
        reason = Some(TruncationReason::CombinedTooLong);
    }

    FormattedPrompt {
        prompt,
        truncated_text,
        truncation_reason: reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_inputs_need_no_truncation() {
        let result = format_prompt("formal", None, 0.5, "Hello there.");
        assert_eq!(result.truncation_reason, None);
        assert_eq!(result.truncated_text, "Hello there.");
    }

    #[test]
    fn oversized_text_is_truncated_at_a_char_boundary() {
        let text = "é".repeat(3_000); // 6000 bytes, well over the 4000 limit
        let result = format_prompt("formal", None, 0.5, &text);
        assert_eq!(result.truncation_reason, Some(TruncationReason::TextTooLong));
        assert!(result.truncated_text.len() <= TEXT_BYTE_LIMIT);
        assert!(result.truncated_text.chars().all(|c| c == 'é'));
    }

    #[test]
    fn oversized_prompt_is_truncated() {
        let custom = "x".repeat(5_000);
        let result = format_prompt("formal", Some(&custom), 0.5, "short text");
        assert_eq!(result.prompt.len(), PROMPT_BYTE_LIMIT);
        assert!(matches!(
            result.truncation_reason,
            Some(TruncationReason::PromptTooLong)
        ));
    }

    #[test]
    fn combined_byte_budget_is_never_exceeded() {
        // Each leg is already capped at 4000 bytes, so the 8000-byte combined
        // budget is a backstop rather than a tighter bound in practice. It
        // still must hold at the worst case of both legs maxed out.
        let custom = "x".repeat(4_100);
        let text = "y".repeat(4_100);
        let result = format_prompt("formal", Some(&custom), 0.5, &text);
        assert!(result.prompt.len() + result.truncated_text.len() <= COMBINED_BYTE_LIMIT);
    }
}
