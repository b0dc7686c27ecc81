//! Bounded, low-latency channel primitives shared by the audio-ingestion and
//! listener-fan-out sides of a caption session.
//!
//! Audio chunks are opaque bytes (spec §6: sequencing is the core's job, not
//! the transport's); this crate only needs to move them from the inbound
//! connection to the STT session pool with bounded memory and without
//! blocking the caller indefinitely.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Expected wire sample rate for inbound audio (spec §6: 24kHz mono PCM16).
pub const DEFAULT_SAMPLE_RATE_HZ: u32 = 24_000;

/// Default bus buffer capacity, expressed in milliseconds of audio.
pub const DEFAULT_BUFFER_CAPACITY_MS: u32 = 2_000;

/// A chunk of inbound audio, tagged with a bus-local sequence number used
/// only for gap/drop telemetry. This is distinct from `sourceSeqId`, which
/// belongs to the segment the core assembles from many such chunks.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Monotonic sequence number assigned by the sender, for gap detection.
    pub seq: u64,
    /// Wall-clock timestamp in milliseconds when the chunk was received.
    pub ts_ms: i64,
    /// Opaque PCM bytes, shared ownership for zero-copy fan-out.
    pub bytes: Arc<[u8]>,
}

impl AudioChunk {
    pub fn new(seq: u64, ts_ms: i64, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            seq,
            ts_ms,
            bytes: bytes.into(),
        }
    }
}

/// Configuration for one audio bus instance.
#[derive(Debug, Clone)]
pub struct AudioBusConfig {
    /// Target buffer capacity in milliseconds of audio.
    pub capacity_ms: u32,
    /// Expected chunk duration in milliseconds, used only to size the
    /// underlying channel.
    pub chunk_duration_ms: u32,
}

impl Default for AudioBusConfig {
    fn default() -> Self {
        Self {
            capacity_ms: DEFAULT_BUFFER_CAPACITY_MS,
            chunk_duration_ms: 200,
        }
    }
}

impl AudioBusConfig {
    fn channel_capacity(&self) -> usize {
        if self.chunk_duration_ms == 0 {
            return 16;
        }
        ((self.capacity_ms / self.chunk_duration_ms) as usize).max(4)
    }
}

/// Sender half of an audio bus. New chunks are dropped (not queued) once the
/// bus is full; a caller is expected to be live audio, not a replay log, so
/// backpressure should fall on the newest data rather than stall upstream.
#[derive(Clone)]
pub struct AudioBusSender {
    tx: mpsc::Sender<AudioChunk>,
    seq_counter: Arc<AtomicU64>,
    dropped_chunks: Arc<AtomicU64>,
}

impl AudioBusSender {
    /// Enqueue a chunk without blocking. Returns `false` if it was dropped
    /// because the bus is full or closed.
    pub fn send(&self, ts_ms: i64, bytes: impl Into<Arc<[u8]>>) -> bool {
        let seq = self.seq_counter.fetch_add(1, Ordering::Relaxed);
        let chunk = AudioChunk::new(seq, ts_ms, bytes);

        match self.tx.try_send(chunk) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                let dropped = self.dropped_chunks.fetch_add(1, Ordering::Relaxed) + 1;
                if dropped % 10 == 1 {
                    tracing::warn!(dropped, seq, "audio bus full, dropping chunk");
                }
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!(seq, "audio bus closed");
                false
            }
        }
    }

    /// Enqueue a chunk, waiting for space if the bus is momentarily full.
    pub async fn send_async(&self, ts_ms: i64, bytes: impl Into<Arc<[u8]>>) -> bool {
        let seq = self.seq_counter.fetch_add(1, Ordering::Relaxed);
        let chunk = AudioChunk::new(seq, ts_ms, bytes);

        match self.tx.send(chunk).await {
            Ok(()) => true,
            Err(_) => {
                tracing::debug!(seq, "audio bus closed");
                false
            }
        }
    }

    pub fn dropped_chunks(&self) -> u64 {
        self.dropped_chunks.load(Ordering::Relaxed)
    }

    pub fn reset_dropped_chunks(&self) {
        self.dropped_chunks.store(0, Ordering::Relaxed);
    }

    pub fn current_seq(&self) -> u64 {
        self.seq_counter.load(Ordering::Relaxed)
    }
}

/// Receiver half of an audio bus.
pub struct AudioBusReceiver {
    rx: mpsc::Receiver<AudioChunk>,
    last_seq: u64,
    gaps_detected: u64,
}

impl AudioBusReceiver {
    pub async fn recv(&mut self) -> Option<AudioChunk> {
        let chunk = self.rx.recv().await?;
        self.track_gap(&chunk);
        Some(chunk)
    }

    pub fn try_recv(&mut self) -> Option<AudioChunk> {
        match self.rx.try_recv() {
            Ok(chunk) => {
                self.track_gap(&chunk);
                Some(chunk)
            }
            Err(_) => None,
        }
    }

    fn track_gap(&mut self, chunk: &AudioChunk) {
        if self.last_seq > 0 && chunk.seq > self.last_seq + 1 {
            let gap = chunk.seq - self.last_seq - 1;
            self.gaps_detected += gap;
            tracing::debug!(gap, last_seq = self.last_seq, next_seq = chunk.seq, "audio bus gap detected");
        }
        self.last_seq = chunk.seq;
    }

    pub fn gaps_detected(&self) -> u64 {
        self.gaps_detected
    }

    /// Drain everything currently queued, keeping only the most recent
    /// chunk. Used by a consumer that has fallen behind and would rather
    /// catch up than process stale audio.
    pub fn drain_to_latest(&mut self) -> Option<AudioChunk> {
        let mut latest = None;
        let mut drained = 0;
        while let Some(chunk) = self.try_recv() {
            drained += 1;
            latest = Some(chunk);
        }
        if drained > 1 {
            tracing::debug!(drained = drained - 1, "drained stale audio chunks");
        }
        latest
    }
}

/// A bounded channel carrying audio chunks from an inbound connection to the
/// session's STT session pool.
pub struct AudioBus {
    sender: AudioBusSender,
    receiver: Option<AudioBusReceiver>,
}

impl AudioBus {
    pub fn new() -> Self {
        Self::with_config(AudioBusConfig::default())
    }

    pub fn with_config(config: AudioBusConfig) -> Self {
        let capacity = config.channel_capacity();
        let (tx, rx) = mpsc::channel(capacity);

        tracing::debug!(
            capacity_ms = config.capacity_ms,
            capacity_chunks = capacity,
            "created audio bus"
        );

        Self {
            sender: AudioBusSender {
                tx,
                seq_counter: Arc::new(AtomicU64::new(0)),
                dropped_chunks: Arc::new(AtomicU64::new(0)),
            },
            receiver: Some(AudioBusReceiver {
                rx,
                last_seq: 0,
                gaps_detected: 0,
            }),
        }
    }

    pub fn sender(&self) -> AudioBusSender {
        self.sender.clone()
    }

    /// Take the receiver. Can only be called once per bus.
    pub fn take_receiver(&mut self) -> Option<AudioBusReceiver> {
        self.receiver.take()
    }
}

impl Default for AudioBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Lock-free, atomic-field metrics for one session's audio path, shared via
/// `Arc<AudioMetrics>` and updated from the hot path without locks.
#[derive(Debug, Default)]
pub struct AudioMetrics {
    audio_lag_ms: AtomicI64,
    dropped_chunks: AtomicU64,
    gaps_detected: AtomicU64,
    chunks_processed: AtomicU64,
    audio_processed_ms: AtomicU64,
}

impl AudioMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn audio_lag_ms(&self) -> i64 {
        self.audio_lag_ms.load(Ordering::Relaxed)
    }

    pub fn dropped_chunks(&self) -> u64 {
        self.dropped_chunks.load(Ordering::Relaxed)
    }

    pub fn gaps_detected(&self) -> u64 {
        self.gaps_detected.load(Ordering::Relaxed)
    }

    pub fn chunks_processed(&self) -> u64 {
        self.chunks_processed.load(Ordering::Relaxed)
    }

    pub fn audio_processed_ms(&self) -> u64 {
        self.audio_processed_ms.load(Ordering::Relaxed)
    }

    pub fn set_dropped_chunks(&self, value: u64) {
        self.dropped_chunks.store(value, Ordering::Relaxed);
    }

    pub fn set_gaps_detected(&self, value: u64) {
        self.gaps_detected.store(value, Ordering::Relaxed);
    }

    /// Update lag from a chunk's capture timestamp and the current wall clock.
    pub fn update_lag(&self, chunk_ts_ms: i64, now_ms: i64) {
        self.audio_lag_ms.store(now_ms - chunk_ts_ms, Ordering::Relaxed);
    }

    pub fn increment_chunks_processed(&self) {
        self.chunks_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_audio_processed_ms(&self, ms: u64) {
        self.audio_processed_ms.fetch_add(ms, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> AudioMetricsSnapshot {
        AudioMetricsSnapshot {
            audio_lag_ms: self.audio_lag_ms(),
            dropped_chunks: self.dropped_chunks(),
            gaps_detected: self.gaps_detected(),
            chunks_processed: self.chunks_processed(),
            audio_processed_ms: self.audio_processed_ms(),
        }
    }
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct AudioMetricsSnapshot {
    pub audio_lag_ms: i64,
    pub dropped_chunks: u64,
    pub gaps_detected: u64,
    pub chunks_processed: u64,
    pub audio_processed_ms: u64,
}
