//! Cache keying for the partial and final translation workers (spec §4.8).
//!
//! Long texts key on a length bucket plus a prefix and suffix rather than
//! the full string, so near-identical partials (a few trailing words
//! different) still hit; short texts key on the prefix alone since there's
//! nothing meaningful left to bucket.

use std::time::Duration;

use moka::future::Cache;

/// Below this length a text is keyed by its full (normalized) prefix rather
/// than a length bucket, since bucketing a short string buys nothing.
const SHORT_TEXT_CHARS: usize = 48;
const PREFIX_CHARS: usize = 60;
const SUFFIX_CHARS: usize = 30;
const LENGTH_BUCKET_SIZE: usize = 50;

pub const PARTIAL_CACHE_TTL: Duration = Duration::from_secs(120);
pub const FINAL_CACHE_TTL: Duration = Duration::from_secs(600);
pub const PARTIAL_CACHE_CAPACITY: u64 = 200;
pub const FINAL_CACHE_CAPACITY: u64 = 100;

fn char_prefix(text: &str, n: usize) -> &str {
    match text.char_indices().nth(n) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn char_suffix(text: &str, n: usize) -> &str {
    let total = text.chars().count();
    if total <= n {
        return text;
    }
    match text.char_indices().nth(total - n) {
        Some((idx, _)) => &text[idx..],
        None => text,
    }
}

/// Cache key for a partial translation request.
pub fn partial_cache_key(source: &str, target: &str, text: &str) -> String {
    let len = text.chars().count();
    if len < SHORT_TEXT_CHARS {
        format!("{source}:{target}:p:{}", char_prefix(text, PREFIX_CHARS))
    } else {
        let bucket = len / LENGTH_BUCKET_SIZE;
        format!(
            "{source}:{target}:b{bucket}:{}:{}",
            char_prefix(text, PREFIX_CHARS),
            char_suffix(text, SUFFIX_CHARS)
        )
    }
}

pub fn final_cache_key(source: &str, target: &str, text: &str) -> String {
    format!("{source}:{target}:f:{text}")
}

/// True if a cached entry keyed for `cached_source_len` is stale for a
/// `new_len`-character request; i.e. the live text has grown so much past
/// what was cached that serving the cached value would be visibly wrong.
pub fn is_stale_for_extension(cached_source_len: usize, new_len: usize) -> bool {
    (cached_source_len as f64) < (new_len as f64) * 0.9
}

pub fn new_cache<V>(capacity: u64, ttl: Duration) -> Cache<String, V>
where
    V: Clone + Send + Sync + 'static,
{
    Cache::builder().max_capacity(capacity).time_to_live(ttl).build()
}
