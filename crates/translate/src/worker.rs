//! The translation/correction worker contract (spec §6).
//!
//! A worker is anything that can turn source-language text into a target-
//! language string; a hosted translation API, a local model, or (in tests)
//! a scripted fake. Neither `TranslationRouter` cares which.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use captionrelay_events::LanguageTag;

use crate::Result;

/// One translation backend. Implementors must respect `cancel`: once it is
/// cancelled, abandon the request quickly rather than run it to completion.
#[async_trait]
pub trait TranslationWorker: Send + Sync {
    async fn translate(
        &self,
        text: &str,
        source: &LanguageTag,
        target: &LanguageTag,
        cancel: CancellationToken,
    ) -> Result<String>;
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::Duration;

    /// Echoes `text` suffixed with the target language, after an optional
    /// artificial delay, so cancellation races are reproducible in tests.
    pub struct EchoWorker {
        pub delay: Duration,
        pub calls: AtomicUsize,
    }

    impl EchoWorker {
        pub fn new(delay: Duration) -> Self {
            Self {
                delay,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl TranslationWorker for EchoWorker {
        async fn translate(
            &self,
            text: &str,
            _source: &LanguageTag,
            target: &LanguageTag,
            cancel: CancellationToken,
        ) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::select! {
                _ = tokio::time::sleep(self.delay) => {
                    Ok(format!("{text} [{}]", target.as_str()))
                }
                _ = cancel.cancelled() => Err(crate::TranslateError::Cancelled),
            }
        }
    }

    pub struct FailingWorker;

    #[async_trait]
    impl TranslationWorker for FailingWorker {
        async fn translate(
            &self,
            _text: &str,
            _source: &LanguageTag,
            _target: &LanguageTag,
            _cancel: CancellationToken,
        ) -> Result<String> {
            Err(crate::TranslateError::RemoteFailure("simulated remote error".into()))
        }
    }
}
