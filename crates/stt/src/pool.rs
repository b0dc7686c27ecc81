//! Round-robin dispatch across a fixed number of STT sessions, with
//! reconnect-with-backoff and bounded audio buffering while a session is
//! down (spec §4.7).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};

use crate::engine::{SttEvent, SttProvider, SttSession};

#[derive(Debug, Clone)]
pub struct SttPoolConfig {
    /// Number of parallel STT sessions (spec calls this P).
    pub session_count: usize,
    /// Cap on audio buffered per session while it is reconnecting.
    pub max_buffered_bytes: usize,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for SttPoolConfig {
    fn default() -> Self {
        Self {
            session_count: 2,
            max_buffered_bytes: 64 * 1024,
            initial_backoff_ms: 250,
            max_backoff_ms: 5_000,
        }
    }
}

enum SlotState {
    Connected(Box<dyn SttSession>),
    Disconnected {
        buffered: VecDeque<Arc<[u8]>>,
        buffered_bytes: usize,
    },
}

impl SlotState {
    fn empty_disconnected() -> Self {
        SlotState::Disconnected {
            buffered: VecDeque::new(),
            buffered_bytes: 0,
        }
    }
}

struct Slot {
    state: Mutex<SlotState>,
    backoff_ms: AtomicU64,
    reconnecting: AtomicBool,
}

/// Append `chunk` to a disconnected slot's buffer, dropping the oldest
/// entries first if it would exceed `max_bytes`. Kept as a free function so
/// the overflow policy is testable without standing up a whole pool.
fn push_buffered(
    buffered: &mut VecDeque<Arc<[u8]>>,
    buffered_bytes: &mut usize,
    chunk: Arc<[u8]>,
    max_bytes: usize,
) {
    *buffered_bytes += chunk.len();
    buffered.push_back(chunk);
    while *buffered_bytes > max_bytes {
        match buffered.pop_front() {
            Some(dropped) => *buffered_bytes -= dropped.len(),
            None => break,
        }
    }
}

/// Dispatches inbound audio round-robin across `session_count` STT
/// sessions, reconnecting any session that drops with exponential backoff
/// and buffering audio meant for a disconnected session up to a byte cap.
pub struct SttSessionPool {
    provider: Arc<dyn SttProvider>,
    events_tx: mpsc::Sender<SttEvent>,
    slots: Vec<Arc<Slot>>,
    next: AtomicUsize,
    config: SttPoolConfig,
}

impl SttSessionPool {
    pub fn new(
        provider: Arc<dyn SttProvider>,
        config: SttPoolConfig,
        events_tx: mpsc::Sender<SttEvent>,
    ) -> Self {
        let slots: Vec<Arc<Slot>> = (0..config.session_count.max(1))
            .map(|_| {
                Arc::new(Slot {
                    state: Mutex::new(SlotState::empty_disconnected()),
                    backoff_ms: AtomicU64::new(config.initial_backoff_ms),
                    reconnecting: AtomicBool::new(false),
                })
            })
            .collect();

        let pool = Self {
            provider,
            events_tx,
            slots,
            next: AtomicUsize::new(0),
            config,
        };

        for slot in &pool.slots {
            Self::spawn_reconnect(
                slot.clone(),
                pool.provider.clone(),
                pool.events_tx.clone(),
                pool.config.clone(),
            );
        }

        pool
    }

    /// Route a chunk of audio to the next session in round-robin order.
    /// If that session is down, the chunk is buffered rather than lost.
    pub async fn send_audio(&self, bytes: impl Into<Arc<[u8]>>) {
        let bytes = bytes.into();
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.slots.len();
        let slot = self.slots[idx].clone();

        let failed = {
            let mut state = slot.state.lock().await;
            match &*state {
                SlotState::Connected(session) => match session.send_audio(&bytes).await {
                    Ok(()) => false,
                    Err(err) => {
                        tracing::warn!(%err, slot = idx, "stt session send failed");
                        *state = SlotState::empty_disconnected();
                        true
                    }
                },
                SlotState::Disconnected { .. } => true,
            }
        };

        if failed {
            self.buffer_for_slot(&slot, bytes).await;
            Self::spawn_reconnect(
                slot,
                self.provider.clone(),
                self.events_tx.clone(),
                self.config.clone(),
            );
        }
    }

    async fn buffer_for_slot(&self, slot: &Arc<Slot>, bytes: Arc<[u8]>) {
        let mut state = slot.state.lock().await;
        if let SlotState::Disconnected {
            buffered,
            buffered_bytes,
        } = &mut *state
        {
            push_buffered(buffered, buffered_bytes, bytes, self.config.max_buffered_bytes);
        }
    }

    /// Ask every currently connected session to flush its pending hypothesis
    /// as a final. Used when the forced-commit timer in the core pipeline
    /// fires and the provider has not endpointed on its own.
    pub async fn force_commit_all(&self) {
        for slot in &self.slots {
            let state = slot.state.lock().await;
            if let SlotState::Connected(session) = &*state {
                if let Err(err) = session.force_commit().await {
                    tracing::warn!(%err, "stt force_commit failed");
                }
            }
        }
    }

    /// Close every connected session. Idempotent; safe to call during
    /// session shutdown even if some slots are still reconnecting.
    pub async fn close_all(&self) {
        for slot in &self.slots {
            let mut state = slot.state.lock().await;
            if let SlotState::Connected(session) = &*state {
                if let Err(err) = session.close().await {
                    tracing::warn!(%err, "stt session close failed");
                }
            }
            *state = SlotState::empty_disconnected();
        }
    }

    fn spawn_reconnect(
        slot: Arc<Slot>,
        provider: Arc<dyn SttProvider>,
        events_tx: mpsc::Sender<SttEvent>,
        config: SttPoolConfig,
    ) {
        if slot.reconnecting.swap(true, Ordering::SeqCst) {
            return;
        }

        tokio::spawn(async move {
            loop {
                match provider.connect(events_tx.clone()).await {
                    Ok(session) => {
                        let buffered = {
                            let mut state = slot.state.lock().await;
                            let previous =
                                std::mem::replace(&mut *state, SlotState::Connected(session));
                            match previous {
                                SlotState::Disconnected { buffered, .. } => buffered,
                                SlotState::Connected(_) => VecDeque::new(),
                            }
                        };

                        for chunk in buffered {
                            let state = slot.state.lock().await;
                            if let SlotState::Connected(session) = &*state {
                                if let Err(err) = session.send_audio(&chunk).await {
                                    tracing::warn!(%err, "failed to flush buffered audio");
                                }
                            }
                        }

                        slot.backoff_ms.store(config.initial_backoff_ms, Ordering::SeqCst);
                        slot.reconnecting.store(false, Ordering::SeqCst);
                        return;
                    }
                    Err(err) => {
                        let backoff = slot.backoff_ms.load(Ordering::SeqCst);
                        tracing::warn!(%err, backoff_ms = backoff, "stt connect failed, retrying");
                        tokio::time::sleep(Duration::from_millis(backoff)).await;
                        let next = (backoff * 2).min(config.max_backoff_ms);
                        slot.backoff_ms.store(next, Ordering::SeqCst);
                    }
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::fake::{AlwaysUpProvider, FlakyOnceProvider};
    use std::sync::Arc;

    #[test]
    fn push_buffered_drops_oldest_when_over_budget() {
        let mut buffered = VecDeque::new();
        let mut bytes = 0usize;

        push_buffered(&mut buffered, &mut bytes, vec![0u8; 10].into(), 25);
        push_buffered(&mut buffered, &mut bytes, vec![0u8; 10].into(), 25);
        push_buffered(&mut buffered, &mut bytes, vec![0u8; 10].into(), 25);

        // Third chunk pushes total to 30, over the 25-byte budget, so the
        // first chunk must have been dropped.
        assert_eq!(buffered.len(), 2);
        assert_eq!(bytes, 20);
    }

    #[tokio::test]
    async fn round_robin_dispatch_reaches_all_sessions() {
        let provider = Arc::new(AlwaysUpProvider);
        let (tx, mut rx) = mpsc::channel(32);
        let pool = SttSessionPool::new(
            provider,
            SttPoolConfig {
                session_count: 2,
                ..Default::default()
            },
            tx,
        );

        // Give the reconnect tasks a moment to establish both sessions.
        tokio::time::sleep(Duration::from_millis(20)).await;

        for _ in 0..4 {
            pool.send_audio(vec![0u8; 8]).await;
        }

        let mut received = 0;
        while let Ok(event) = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await {
            if event.is_none() {
                break;
            }
            received += 1;
            if received == 4 {
                break;
            }
        }
        assert_eq!(received, 4);
    }

    #[tokio::test]
    async fn buffered_audio_flushes_after_reconnect() {
        let provider = Arc::new(FlakyOnceProvider::new());
        let (tx, mut rx) = mpsc::channel(32);
        let pool = SttSessionPool::new(
            provider,
            SttPoolConfig {
                session_count: 1,
                initial_backoff_ms: 1,
                max_backoff_ms: 5,
                ..Default::default()
            },
            tx,
        );

        pool.send_audio(vec![0u8; 16]).await;

        let event = tokio::time::timeout(Duration::from_millis(200), rx.recv())
            .await
            .expect("reconnect should flush buffered audio in time")
            .expect("channel should still be open");
        matches!(event, SttEvent::Partial(_));
    }
}
