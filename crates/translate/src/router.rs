//! `TranslationRouter`: cached, cancellation-aware fan-out to the partial
//! and final translation workers (spec §4.8).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use captionrelay_events::LanguageTag;

use crate::cache::{self, new_cache};
use crate::cancellation::should_cancel;
use crate::worker::TranslationWorker;
use crate::{Result, TranslateError};

#[derive(Debug, Clone)]
pub struct TranslationRouterConfig {
    pub partial_cache_capacity: u64,
    pub partial_cache_ttl: Duration,
    pub final_cache_capacity: u64,
    pub final_cache_ttl: Duration,
    /// Translation request timeout (spec §5).
    pub request_timeout: Duration,
}

impl Default for TranslationRouterConfig {
    fn default() -> Self {
        Self {
            partial_cache_capacity: cache::PARTIAL_CACHE_CAPACITY,
            partial_cache_ttl: cache::PARTIAL_CACHE_TTL,
            final_cache_capacity: cache::FINAL_CACHE_CAPACITY,
            final_cache_ttl: cache::FINAL_CACHE_TTL,
            request_timeout: Duration::from_secs(20),
        }
    }
}

#[derive(Clone)]
struct CachedTranslation {
    source_len: usize,
    translated: String,
}

struct InFlight {
    last_text: String,
    token: CancellationToken,
}

/// Routes partial and final text to their respective workers, with per-
/// target caching and (for partials only) cancellation of superseded
/// in-flight requests.
pub struct TranslationRouter {
    partial_worker: Arc<dyn TranslationWorker>,
    final_worker: Arc<dyn TranslationWorker>,
    partial_cache: moka::future::Cache<String, CachedTranslation>,
    final_cache: moka::future::Cache<String, CachedTranslation>,
    inflight: Mutex<HashMap<String, InFlight>>,
    request_timeout: Duration,
}

impl TranslationRouter {
    pub fn new(
        partial_worker: Arc<dyn TranslationWorker>,
        final_worker: Arc<dyn TranslationWorker>,
        config: TranslationRouterConfig,
    ) -> Self {
        Self {
            partial_worker,
            final_worker,
            partial_cache: new_cache(config.partial_cache_capacity, config.partial_cache_ttl),
            final_cache: new_cache(config.final_cache_capacity, config.final_cache_ttl),
            inflight: Mutex::new(HashMap::new()),
            request_timeout: config.request_timeout,
        }
    }

    /// Translate `text` to every target in `targets`, fanning out in
    /// parallel with each target's failure isolated from the others.
    pub async fn translate_partial_to_many(
        &self,
        text: &str,
        source: &LanguageTag,
        targets: &[LanguageTag],
    ) -> HashMap<String, Result<String>> {
        let futures = targets
            .iter()
            .map(|target| async move { (target.as_str().to_string(), self.translate_partial_one(text, source, target).await) });
        join_all(futures).await.into_iter().collect()
    }

    pub async fn translate_partial_one(&self, text: &str, source: &LanguageTag, target: &LanguageTag) -> Result<String> {
        let key = cache::partial_cache_key(source.as_str(), target.as_str(), text);
        if let Some(cached) = self.partial_cache.get(&key).await {
            if !cache::is_stale_for_extension(cached.source_len, text.chars().count()) {
                return Ok(cached.translated);
            }
        }

        let token = self.arm_partial_request(target, text);
        let translated = self.run_with_timeout(self.partial_worker.translate(text, source, target, token)).await?;

        self.partial_cache
            .insert(
                key,
                CachedTranslation {
                    source_len: text.chars().count(),
                    translated: translated.clone(),
                },
            )
            .await;
        Ok(translated)
    }

    /// Never cancelled, best-quality, not cached across different source
    /// texts for the same target beyond the TTL (spec §4.8).
    pub async fn translate_final_to_many(
        &self,
        text: &str,
        source: &LanguageTag,
        targets: &[LanguageTag],
    ) -> HashMap<String, Result<String>> {
        let futures = targets
            .iter()
            .map(|target| async move { (target.as_str().to_string(), self.translate_final_one(text, source, target).await) });
        join_all(futures).await.into_iter().collect()
    }

    pub async fn translate_final_one(&self, text: &str, source: &LanguageTag, target: &LanguageTag) -> Result<String> {
        let key = cache::final_cache_key(source.as_str(), target.as_str(), text);
        if let Some(cached) = self.final_cache.get(&key).await {
            return Ok(cached.translated);
        }

        let token = CancellationToken::new(); // final requests are never cancelled
        let translated = self
            .run_with_timeout(self.final_worker.translate(text, source, target, token))
            .await?;

        self.final_cache
            .insert(
                key,
                CachedTranslation {
                    source_len: text.chars().count(),
                    translated: translated.clone(),
                },
            )
            .await;
        Ok(translated)
    }

    /// Cancel every in-flight partial request (session shutdown, spec §5).
    pub fn cancel_all_partials(&self) {
        for entry in self.inflight.lock().values() {
            entry.token.cancel();
        }
    }

    fn arm_partial_request(&self, target: &LanguageTag, text: &str) -> CancellationToken {
        let mut inflight = self.inflight.lock();
        let key = target.as_str().to_string();
        if let Some(existing) = inflight.get(&key) {
            if should_cancel(&existing.last_text, text) {
                existing.token.cancel();
            }
        }
        let token = CancellationToken::new();
        inflight.insert(
            key,
            InFlight {
                last_text: text.to_string(),
                token: token.clone(),
            },
        );
        token
    }

    async fn run_with_timeout<F>(&self, fut: F) -> Result<String>
    where
        F: std::future::Future<Output = Result<String>>,
    {
        tokio::time::timeout(self.request_timeout, fut)
            .await
            .map_err(|_| TranslateError::Timeout)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::fake::{EchoWorker, FailingWorker};
    use std::sync::atomic::Ordering;
    use std::time::Duration as StdDuration;

    fn tag(s: &str) -> LanguageTag {
        LanguageTag::new(s)
    }

    #[tokio::test]
    async fn translate_partial_to_many_fans_out_and_isolates_failures() {
        let partial = Arc::new(EchoWorker::new(StdDuration::from_millis(1)));
        let final_worker = Arc::new(EchoWorker::new(StdDuration::from_millis(1)));
        let router = TranslationRouter::new(partial, final_worker, TranslationRouterConfig::default());

        let results = router
            .translate_partial_to_many("Hello", &tag("en"), &[tag("es"), tag("fr")])
            .await;

        assert_eq!(results.get("es").unwrap().as_ref().unwrap(), "Hello [es]");
        assert_eq!(results.get("fr").unwrap().as_ref().unwrap(), "Hello [fr]");
    }

    #[tokio::test]
    async fn failing_one_target_does_not_affect_another() {
        let partial = Arc::new(FailingWorker);
        let final_worker = Arc::new(FailingWorker);
        let router = TranslationRouter::new(partial, final_worker, TranslationRouterConfig::default());

        let results = router.translate_partial_to_many("Hi", &tag("en"), &[tag("es")]).await;
        assert!(results.get("es").unwrap().is_err());
    }

    #[tokio::test]
    async fn a_non_extending_partial_cancels_the_in_flight_request() {
        let partial = Arc::new(EchoWorker::new(StdDuration::from_millis(200)));
        let final_worker = Arc::new(EchoWorker::new(StdDuration::from_millis(1)));
        let router = Arc::new(TranslationRouter::new(partial.clone(), final_worker, TranslationRouterConfig::default()));

        let r1 = router.clone();
        let first = tokio::spawn(async move { r1.translate_partial_one("Hello there, how are you doing today", &tag("en"), &tag("es")).await });
        tokio::time::sleep(StdDuration::from_millis(20)).await;

        let second = router.translate_partial_one("Totally unrelated reply", &tag("en"), &tag("es")).await;
        assert!(second.is_ok());

        let first_result = first.await.unwrap();
        assert!(first_result.is_err());
        assert_eq!(partial.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn second_call_hits_the_cache_without_invoking_the_worker_again() {
        let partial = Arc::new(EchoWorker::new(StdDuration::from_millis(1)));
        let final_worker = Arc::new(EchoWorker::new(StdDuration::from_millis(1)));
        let router = TranslationRouter::new(partial.clone(), final_worker, TranslationRouterConfig::default());

        router.translate_partial_one("Hello", &tag("en"), &tag("es")).await.unwrap();
        router.translate_partial_one("Hello", &tag("en"), &tag("es")).await.unwrap();

        assert_eq!(partial.calls.load(Ordering::SeqCst), 1);
    }
}
