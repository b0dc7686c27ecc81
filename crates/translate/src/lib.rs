//! Cached, cancellation-aware translation routing for a caption session
//! (spec §4.8, "TranslationRouter").
//!
//! Partial text is translated against a short-TTL cache and can have its
//! in-flight request cancelled by a superseding partial; final text is
//! translated against a longer-TTL cache and is never cancelled.

mod cache;
mod cancellation;
mod prompt;
mod router;
mod worker;

pub use cache::{final_cache_key, is_stale_for_extension, partial_cache_key};
pub use cancellation::{is_extension, should_cancel};
pub use prompt::{format_prompt, FormattedPrompt, TruncationReason};
pub use router::{TranslationRouter, TranslationRouterConfig};
pub use worker::TranslationWorker;

#[derive(Debug, thiserror::Error)]
pub enum TranslateError {
    #[error("translation request timed out")]
    Timeout,
    #[error("translation request was cancelled")]
    Cancelled,
    #[error("translation worker failed: {0}")]
    RemoteFailure(String),
    #[error("translation worker truncated its response: {0}")]
    TruncatedByProvider(String),
    #[error("translation worker returned an empty response")]
    EmptyResponse,
}

pub type Result<T> = std::result::Result<T, TranslateError>;
