//! `ListenerBroadcaster`: per-session fan-out with a global monotonic
//! `eventSeqId`, ingest-side out-of-order suppression, and per-listener
//! bounded queues (spec §4.9).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Notify, RwLock};

use captionrelay_events::{CaptionEvent, CaptionEventKind, LanguageTag};

use crate::ingest::IngestGate;
use crate::queue::{ListenerQueue, PushOutcome, QueueConfig};
use crate::sink::ListenerSink;
use crate::Result;

pub type ListenerId = String;

#[derive(Debug, Clone)]
pub struct BroadcastConfig {
    pub queue: QueueConfig,
    /// Bounded retry budget for delivering a final (spec §4.9).
    pub final_retry_attempts: u32,
    pub final_retry_backoff_ms: u64,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            queue: QueueConfig::default(),
            final_retry_attempts: 3,
            final_retry_backoff_ms: 100,
        }
    }
}

/// The payload the session loop hands the broadcaster once a segment's
/// translations have been resolved; the broadcaster fans it out per listener.
#[derive(Debug, Clone)]
pub struct Publication {
    pub source_seq_id: Option<u64>,
    pub is_partial: bool,
    pub force_final: bool,
    pub original_text: String,
    pub corrected_text: Option<String>,
    pub source_lang: LanguageTag,
    /// Target language tag (as its wire string) -> translated text.
    pub translations: HashMap<String, String>,
    pub timestamp_ms: i64,
}

struct ListenerEntry {
    target_lang: LanguageTag,
    queue: Mutex<ListenerQueue>,
    notify: Notify,
    last_delivered_seq_id: AtomicU64,
}

pub struct ListenerBroadcaster {
    config: BroadcastConfig,
    next_event_seq_id: AtomicU64,
    ingest: Mutex<IngestGate>,
    listeners: RwLock<HashMap<ListenerId, Arc<ListenerEntry>>>,
}

impl ListenerBroadcaster {
    pub fn new(config: BroadcastConfig) -> Self {
        Self {
            config,
            next_event_seq_id: AtomicU64::new(0),
            ingest: Mutex::new(IngestGate::new()),
            listeners: RwLock::new(HashMap::new()),
        }
    }

    /// Add a listener and spawn the task that drains its queue against
    /// `sink`. Returns the same `listener_id` for convenience.
    pub async fn join(
        &self,
        listener_id: ListenerId,
        target_lang: LanguageTag,
        sink: Arc<dyn ListenerSink>,
    ) -> ListenerId {
        let entry = Arc::new(ListenerEntry {
            target_lang,
            queue: Mutex::new(ListenerQueue::new(self.config.queue.clone())),
            notify: Notify::new(),
            last_delivered_seq_id: AtomicU64::new(0),
        });
        self.listeners.write().await.insert(listener_id.clone(), entry.clone());

        let retry_attempts = self.config.final_retry_attempts;
        let retry_backoff_ms = self.config.final_retry_backoff_ms;
        let drain_id = listener_id.clone();
        tokio::spawn(async move {
            loop {
                entry.notify.notified().await;
                loop {
                    let next = entry.queue.lock().pop();
                    let Some(event) = next else { break };
                    let is_final = !event.is_partial;
                    let seq = event.event_seq_id;
                    if let Err(err) =
                        deliver_with_retry(sink.as_ref(), event, is_final, retry_attempts, retry_backoff_ms).await
                    {
                        tracing::warn!(listener = %drain_id, %err, "listener delivery failed after retry budget");
                    } else {
                        entry.last_delivered_seq_id.store(seq, Ordering::Relaxed);
                    }
                }
            }
        });

        listener_id
    }

    pub async fn leave(&self, listener_id: &str) {
        self.listeners.write().await.remove(listener_id);
    }

    pub async fn listener_count(&self) -> usize {
        self.listeners.read().await.len()
    }

    /// Publish one event, fanned out to every listener.
    pub async fn publish(&self, publication: Publication) -> PublishOutcome {
        if let Some(source_seq_id) = publication.source_seq_id {
            let mut gate = self.ingest.lock();
            if publication.is_partial {
                // eventSeqId is assigned after the admission check so a
                // suppressed partial never consumes one (P2: strictly
                // increasing, with no gaps attributable to drops).
                let tentative = self.next_event_seq_id.load(Ordering::SeqCst);
                if !gate.admit_partial(source_seq_id, tentative) {
                    return PublishOutcome { event_seq_id: None, backpressure: false };
                }
            } else {
                gate.mark_final(source_seq_id);
            }
        }

        let event_seq_id = self.next_event_seq_id.fetch_add(1, Ordering::SeqCst);
        let mut backpressure = false;
        let listeners = self.listeners.read().await;
        for entry in listeners.values() {
            let event = build_event(&publication, event_seq_id, &entry.target_lang);
            let outcome = entry.queue.lock().push(event);
            match outcome {
                PushOutcome::EvictedOldestPartial | PushOutcome::DroppedIncomingPartial => {
                    tracing::debug!(event_seq_id, ?outcome, "listener queue backpressure");
                }
                PushOutcome::Backpressure => {
                    tracing::warn!(event_seq_id, ?outcome, "listener queue full of finals, admitted past depth");
                    backpressure = true;
                }
                PushOutcome::Enqueued => {}
            }
            entry.notify.notify_one();
        }
        PublishOutcome { event_seq_id: Some(event_seq_id), backpressure }
    }
}

/// Result of `ListenerBroadcaster::publish`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishOutcome {
    /// The assigned `eventSeqId`, or `None` if suppressed at ingest (a stale
    /// partial, per spec §4.9).
    pub event_seq_id: Option<u64>,
    /// At least one listener's queue was entirely backed up with finals and
    /// had to admit this one past its configured depth.
    pub backpressure: bool,
}

fn build_event(publication: &Publication, event_seq_id: u64, target_lang: &LanguageTag) -> CaptionEvent {
    let translated_text = publication.translations.get(target_lang.as_str()).cloned();
    let transcription_mode = target_lang.as_str() == publication.source_lang.as_str();
    let has_translation = !transcription_mode && translated_text.is_some();

    CaptionEvent {
        kind: CaptionEventKind::Translation,
        event_seq_id,
        source_seq_id: publication.source_seq_id,
        is_partial: publication.is_partial,
        force_final: publication.force_final,
        original_text: publication.original_text.clone(),
        corrected_text: publication.corrected_text.clone(),
        translated_text: if transcription_mode { None } else { translated_text },
        source_lang: publication.source_lang.as_str().to_string(),
        target_lang: target_lang.as_str().to_string(),
        has_translation,
        has_correction: publication.corrected_text.is_some(),
        timestamp: publication.timestamp_ms,
    }
}

async fn deliver_with_retry(
    sink: &dyn ListenerSink,
    event: CaptionEvent,
    is_final: bool,
    attempts: u32,
    backoff_ms: u64,
) -> Result<()> {
    let budget = if is_final { attempts.max(1) } else { 1 };
    let mut last_err = None;
    for attempt in 0..budget {
        match sink.deliver(event.clone()).await {
            Ok(()) => return Ok(()),
            Err(err) => {
                last_err = Some(err);
                if attempt + 1 < budget {
                    tokio::time::sleep(std::time::Duration::from_millis(backoff_ms)).await;
                }
            }
        }
    }
    Err(last_err.expect("loop runs at least once"))
}
