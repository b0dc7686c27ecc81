//! `Pipeline`: the per-session caption stabilization driver (spec §4.6).
//!
//! Pure and synchronous; it owns no timer and makes no I/O call. The async
//! driver in `captionrelay-session` calls `on_partial`/`on_final`/
//! `on_recovery` as events arrive, and polls `poll_timers` against
//! `next_deadline()`. This split is what makes the state machine itself
//! exhaustively unit-testable against the scenarios named in the design.

use std::time::{Duration, Instant};

use crate::constants::{
    CAPTURE_WINDOW_MS, DEDUP_TIME_WINDOW_MS, FINALIZATION_MAX_WAIT_MS, MIN_PARTIAL_IDLE_MS,
    NEW_SEGMENT_PARTIAL_WAIT_BASE_MS, PARTIAL_EXTEND_MAX_AGE_MS, SEGMENT_BREAK_MS,
};
use crate::deduplicator::{dedup, DeduplicatorConfig};
use crate::error::InvariantViolation;
use crate::finalization::{FinalizationConfig, FinalizationEngine};
use crate::forced_commit::{ForcedCommitConfig, ForcedCommitEngine};
use crate::partial_tracker::PartialTracker;
use crate::segment::{CommittedSegment, Segment, SegmentState};
use crate::sentence_segmenter::SentenceSegmenter;
use crate::text::{extends, normalize_ws_lower};

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub segment_break_ms: u64,
    pub min_partial_idle_ms: u64,
    pub new_segment_partial_min_len: usize,
    pub new_segment_partial_wait_base_ms: u64,
    pub partial_extend_max_age: Duration,
    pub finalization: FinalizationConfig,
    pub forced_commit: ForcedCommitConfig,
    pub dedup: DeduplicatorConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            segment_break_ms: SEGMENT_BREAK_MS,
            min_partial_idle_ms: MIN_PARTIAL_IDLE_MS,
            new_segment_partial_min_len: crate::constants::NEW_SEGMENT_PARTIAL_MIN_LEN,
            new_segment_partial_wait_base_ms: NEW_SEGMENT_PARTIAL_WAIT_BASE_MS,
            partial_extend_max_age: Duration::from_millis(PARTIAL_EXTEND_MAX_AGE_MS),
            finalization: FinalizationConfig::default(),
            forced_commit: ForcedCommitConfig::default(),
            dedup: DeduplicatorConfig::default(),
        }
    }
}

#[derive(Debug)]
pub struct Pipeline {
    config: PipelineConfig,
    segment: Option<Segment>,
    /// `calculateWaitTime` result captured when the current candidate's
    /// finalization timer was (re)armed; `FinalizationEngine::deadline`
    /// needs it on every poll.
    candidate_wait_ms: Option<u64>,
    partial_tracker: PartialTracker,
    sentence_segmenter: SentenceSegmenter,
    finalization: FinalizationEngine,
    forced_commit: ForcedCommitEngine,
    next_source_seq_id: u64,
    last_committed_original: String,
    last_committed_at: Option<Instant>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            segment: None,
            candidate_wait_ms: None,
            partial_tracker: PartialTracker::new(),
            sentence_segmenter: SentenceSegmenter::new(),
            finalization: FinalizationEngine::new(),
            forced_commit: ForcedCommitEngine::new(),
            next_source_seq_id: 0,
            last_committed_original: String::new(),
            last_committed_at: None,
        }
    }

    pub fn state(&self) -> Option<SegmentState> {
        self.segment.as_ref().map(|s| s.state)
    }

    pub fn forced_commit_config(&self) -> &ForcedCommitConfig {
        &self.config.forced_commit
    }

    /// The current segment's best-known text, for live display before it
    /// has a `sourceSeqId` of its own. `None` once nothing is open.
    pub fn live_text(&self) -> Option<&str> {
        self.segment.as_ref().map(|s| s.original_text.as_str())
    }

    /// The next instant `poll_timers` should be called at, if any timer is
    /// armed.
    pub fn next_deadline(&self) -> Option<Instant> {
        match self.segment.as_ref()?.state {
            SegmentState::FinalCandidate => self.finalization.deadline(self.candidate_wait_ms?),
            SegmentState::ForcedBuffered | SegmentState::Recovering => self
                .forced_commit
                .buffer()
                .map(|b| b.timestamp + Duration::from_millis(self.config.forced_commit.capture_window_ms)),
            SegmentState::Open => {
                self.segment.as_ref().map(|s| s.created_at + Duration::from_millis(self.config.min_partial_idle_ms))
            }
            _ => None,
        }
    }

    pub fn on_partial(&mut self, text: &str, now: Instant) -> Vec<CommittedSegment> {
        let mut out = Vec::new();
        if text.trim().is_empty() {
            return out;
        }

        if self.segment.is_none() {
            if normalize_ws_lower(text) == normalize_ws_lower(&self.last_committed_original) {
                return out; // byte-identical to last committed final: dropped
            }
            self.segment = Some(Segment::open(now));
        }

        let state = self.segment.as_ref().unwrap().state;
        match state {
            SegmentState::Open => self.handle_open_partial(text, now, &mut out),
            SegmentState::FinalCandidate => self.handle_candidate_partial(text, now, &mut out),
            SegmentState::ForcedBuffered | SegmentState::Recovering => {
                self.handle_forced_partial(text, now, &mut out)
            }
            SegmentState::Committed | SegmentState::Dropped => {}
        }
        out
    }

    fn handle_open_partial(&mut self, text: &str, now: Instant, out: &mut Vec<CommittedSegment>) {
        self.partial_tracker.update(text, now);
        let split = self.sentence_segmenter.process_partial(text);
        for sentence in split.flushed_sentences {
            let seq = self.alloc_seq_id();
            self.last_committed_original = sentence.clone();
            self.last_committed_at = Some(now);
            out.push(CommittedSegment {
                source_seq_id: seq,
                original_text: sentence,
                forced: false,
            });
        }
        if let Some(seg) = &mut self.segment {
            seg.original_text = split.live_text.clone();
        }

        // New-segment partial rule: a long-enough residual with no candidate
        // pending yet is promoted to FINAL_CANDIDATE so it is guaranteed to
        // eventually finalize, even if the STT provider never emits a final.
        if split.live_text.chars().count() > self.config.new_segment_partial_min_len {
            self.promote_to_candidate(&split.live_text, now, self.config.new_segment_partial_wait_base_ms, false);
        }
    }

    fn handle_candidate_partial(&mut self, text: &str, now: Instant, out: &mut Vec<CommittedSegment>) {
        let candidate_text = self.segment.as_ref().unwrap().original_text.clone();
        let candidate_at = self.segment.as_ref().unwrap().candidate_at.unwrap();

        if extends(text, &candidate_text) {
            self.partial_tracker.update(text, now);
            self.finalization.update_text(text, now);
            if let Some(seg) = &mut self.segment {
                seg.original_text = text.to_string();
            }
        } else if extends(&candidate_text, text) {
            // text is a truncated prefix of what we already have; redundant.
        } else if now.saturating_duration_since(candidate_at).as_millis() as u64 > self.config.segment_break_ms {
            let committed = self.commit_step(&candidate_text, false, now);
            out.push(committed);
            self.close_segment();
            self.segment = Some(Segment::open(now));
            self.handle_open_partial(text, now, out);
        }
        // else: non-extending partial arriving too soon after candidateAt; ignored for now.
    }

    fn handle_forced_partial(&mut self, text: &str, now: Instant, out: &mut Vec<CommittedSegment>) {
        if let Some((extended_text, _suffix)) = self.forced_commit.check_partial_extends(text) {
            self.forced_commit.update_text(&extended_text);
            if let Some(seg) = &mut self.segment {
                seg.original_text = extended_text;
            }
            return;
        }
        let buffer_text = self.forced_commit.buffer().map(|b| b.text.clone()).unwrap_or_default();
        if extends(&buffer_text, text) {
            return; // redundant prefix of the buffer; ignore
        }
        let committed = self.commit_step(&buffer_text, true, now);
        out.push(committed);
        self.forced_commit.clear_buffer();
        self.close_segment();
        self.segment = Some(Segment::open(now));
        self.handle_open_partial(text, now, out);
    }

    pub fn on_final(&mut self, text: &str, forced: bool, now: Instant) -> Vec<CommittedSegment> {
        let mut out = Vec::new();
        if text.trim().is_empty() {
            return out;
        }

        match self.segment.as_ref().map(|s| s.state) {
            None => self.open_candidate_from_final(text, forced, now),
            Some(SegmentState::Open) => {
                // A final arrived before the residual live text ever grew
                // long enough to self-promote; replace the OPEN segment
                // outright with the ordinary final-candidate path.
                self.open_candidate_from_final(text, forced, now);
            }
            Some(SegmentState::FinalCandidate) => {
                let candidate_text = self.segment.as_ref().unwrap().original_text.clone();
                if extends(text, &candidate_text) {
                    self.partial_tracker.update(text, now);
                    self.finalization.update_text(text, now);
                    if let Some(seg) = &mut self.segment {
                        seg.original_text = text.to_string();
                    }
                } else if extends(&candidate_text, text) {
                    // redundant truncated final; ignore, existing candidate wins.
                } else {
                    let committed = self.commit_step(&candidate_text, false, now);
                    out.push(committed);
                    self.close_segment();
                    self.open_candidate_from_final(text, forced, now);
                }
            }
            Some(SegmentState::ForcedBuffered) | Some(SegmentState::Recovering) => {
                let buffer_text = self.forced_commit.buffer().map(|b| b.text.clone()).unwrap_or_default();
                if extends(text, &buffer_text) {
                    self.forced_commit.update_text(text);
                    if let Some(seg) = &mut self.segment {
                        seg.original_text = text.to_string();
                    }
                } else if extends(&buffer_text, text) {
                    // redundant; ignore
                } else {
                    let committed = self.commit_step(&buffer_text, true, now);
                    out.push(committed);
                    self.forced_commit.clear_buffer();
                    self.close_segment();
                    self.open_candidate_from_final(text, forced, now);
                }
            }
            Some(SegmentState::Committed) | Some(SegmentState::Dropped) => {
                self.open_candidate_from_final(text, forced, now);
            }
        }
        out
    }

    fn open_candidate_from_final(&mut self, text: &str, forced: bool, now: Instant) {
        self.segment = Some(Segment::open(now));
        let substituted = self.substitute_with_tracker(text, now);
        self.promote_to_candidate(&substituted, now, crate::constants::FINALIZATION_BASE_WAIT_MS, forced);
    }

    fn substitute_with_tracker(&self, text: &str, now: Instant) -> String {
        if let Some(t) = self
            .partial_tracker
            .check_longest_extends(text, self.config.partial_extend_max_age, now)
        {
            return t;
        }
        if let Some(t) = self
            .partial_tracker
            .check_latest_extends(text, self.config.partial_extend_max_age, now)
        {
            return t;
        }
        text.to_string()
    }

    fn promote_to_candidate(&mut self, text: &str, now: Instant, base_wait_ms: u64, forced: bool) {
        if let Some(seg) = &mut self.segment {
            seg.original_text = text.to_string();
            seg.partial_snapshot = Some(text.to_string());
            seg.candidate_at = Some(now);
            seg.forced = forced;
            seg.state = if forced {
                SegmentState::ForcedBuffered
            } else {
                SegmentState::FinalCandidate
            };
        }
        if forced {
            self.forced_commit.create_buffer(
                text,
                now,
                &self.last_committed_original,
                self.last_committed_at,
            );
        } else {
            let wait_ms =
                FinalizationEngine::calculate_wait_time(text, base_wait_ms, &self.config.finalization);
            let wait_ms = if FinalizationEngine::is_false_final(text, &self.config.finalization) {
                self.config.finalization.false_final_base_ms
            } else {
                wait_ms
            };
            self.candidate_wait_ms = Some(wait_ms);
            self.finalization.create(text, now, FINALIZATION_MAX_WAIT_MS);
        }
    }

    /// Enter RECOVERING for the current forced buffer. Returns the epoch the
    /// caller's recovery response must carry (or match/exceed) to count.
    pub fn begin_recovery(&mut self, now: Instant) -> Option<u32> {
        let _ = now;
        if !matches!(
            self.segment.as_ref()?.state,
            SegmentState::ForcedBuffered | SegmentState::Recovering
        ) {
            return None;
        }
        let epoch = self.forced_commit.set_recovery_in_progress(true);
        if let Some(seg) = &mut self.segment {
            seg.state = SegmentState::Recovering;
            seg.recovery_epoch = epoch;
        }
        Some(epoch)
    }

    /// A recovery attempt completed (possibly with no usable text). Stale
    /// epochs are discarded silently (Invariant 4 / P5).
    pub fn on_recovery(&mut self, epoch: u32, recovered: Option<String>, now: Instant) -> Vec<CommittedSegment> {
        let mut out = Vec::new();
        if !matches!(
            self.segment.as_ref().map(|s| s.state),
            Some(SegmentState::ForcedBuffered) | Some(SegmentState::Recovering)
        ) {
            return out;
        }
        if epoch < self.forced_commit.current_epoch() {
            return out; // stale, discarded without side effects
        }

        let recovered = recovered.filter(|r| !r.trim().is_empty());
        let Some(recovered_text) = recovered else {
            self.forced_commit.set_recovery_in_progress(false);
            if let Some(seg) = &mut self.segment {
                seg.state = SegmentState::ForcedBuffered;
            }
            return out;
        };

        let buffer_text = self.forced_commit.buffer().map(|b| b.text.clone()).unwrap_or_default();
        if self.forced_commit.is_new_segment(&recovered_text) {
            let committed = self.commit_step(&buffer_text, true, now);
            out.push(committed);
            self.forced_commit.clear_buffer();
            self.close_segment();
            self.segment = None;
            out.extend(self.on_final(&recovered_text, false, now));
        } else {
            let (tail, _) = dedup(&recovered_text, &buffer_text, 0, &self.config.dedup);
            let merged = if tail.trim().is_empty() {
                buffer_text
            } else {
                format!("{} {}", buffer_text, tail)
            };
            let committed = self.commit_step(&merged, true, now);
            out.push(committed);
            self.forced_commit.clear_buffer();
            self.close_segment();
            self.segment = None;
        }
        out
    }

    pub fn poll_timers(&mut self, now: Instant) -> Vec<CommittedSegment> {
        let mut out = Vec::new();
        let Some(state) = self.segment.as_ref().map(|s| s.state) else {
            return out;
        };
        match state {
            SegmentState::Open => {
                let created_at = self.segment.as_ref().unwrap().created_at;
                if now.saturating_duration_since(created_at).as_millis() as u64 > self.config.min_partial_idle_ms {
                    self.close_segment();
                    self.segment = None;
                }
            }
            SegmentState::FinalCandidate => {
                if let Some(wait_ms) = self.candidate_wait_ms {
                    if let Some(deadline) = self.finalization.deadline(wait_ms) {
                        if now >= deadline {
                            let text = self.segment.as_ref().unwrap().original_text.clone();
                            out.push(self.commit_step(&text, false, now));
                            self.close_segment();
                            self.segment = None;
                        }
                    }
                }
            }
            SegmentState::ForcedBuffered | SegmentState::Recovering => {
                if let Some(buffer) = self.forced_commit.buffer() {
                    let deadline =
                        buffer.timestamp + Duration::from_millis(self.config.forced_commit.capture_window_ms);
                    if now >= deadline {
                        let text = buffer.text.clone();
                        out.push(self.commit_step(&text, true, now));
                        self.forced_commit.clear_buffer();
                        self.close_segment();
                        self.segment = None;
                    }
                }
            }
            SegmentState::Committed | SegmentState::Dropped => {}
        }
        out
    }

    /// Flush whatever is pending at session end: commit a forced buffer or
    /// candidate as-is, or drop a bare OPEN segment.
    pub fn end_session(&mut self, now: Instant) -> Vec<CommittedSegment> {
        let mut out = Vec::new();
        match self.segment.as_ref().map(|s| s.state) {
            Some(SegmentState::FinalCandidate) => {
                let text = self.segment.as_ref().unwrap().original_text.clone();
                out.push(self.commit_step(&text, false, now));
            }
            Some(SegmentState::ForcedBuffered) | Some(SegmentState::Recovering) => {
                if let Some(buffer) = self.forced_commit.buffer() {
                    let text = buffer.text.clone();
                    out.push(self.commit_step(&text, true, now));
                    self.forced_commit.clear_buffer();
                }
            }
            _ => {}
        }
        self.close_segment();
        self.segment = None;
        self.sentence_segmenter.hard_reset();
        out
    }

    fn commit_step(&mut self, candidate_text: &str, forced: bool, now: Instant) -> CommittedSegment {
        let text = self.substitute_with_tracker(candidate_text, now);

        let prev_age_ms = self
            .last_committed_at
            .map(|at| now.saturating_duration_since(at).as_millis() as u64)
            .unwrap_or(u64::MAX);
        let (deduped, _skipped) = dedup(&text, &self.last_committed_original, prev_age_ms, &self.config.dedup);

        let seq = self.alloc_seq_id();
        self.last_committed_original = deduped.clone();
        self.last_committed_at = Some(now);
        self.partial_tracker.reset();
        self.sentence_segmenter.soft_reset();
        self.candidate_wait_ms = None;
        if let Some(seg) = &mut self.segment {
            seg.source_seq_id = Some(seq);
            seg.original_text = deduped.clone();
            seg.committed_at = Some(now);
            seg.state = SegmentState::Committed;
        }

        CommittedSegment {
            source_seq_id: seq,
            original_text: deduped,
            forced,
        }
    }

    fn alloc_seq_id(&mut self) -> u64 {
        let id = self.next_source_seq_id;
        self.next_source_seq_id += 1;
        id
    }

    fn close_segment(&mut self) {
        if let Some(seg) = &mut self.segment {
            seg.state = if seg.source_seq_id.is_some() || seg.committed_at.is_some() {
                SegmentState::Committed
            } else {
                SegmentState::Dropped
            };
        }
        self.candidate_wait_ms = None;
    }

    /// Returns an invariant violation if a second commit is attempted for a
    /// `sourceSeqId` already allocated; defensive check for the driver; the
    /// internal state machine never triggers this by construction.
    pub fn check_no_double_commit(&self, seq: u64, already_committed: &[u64]) -> Result<(), InvariantViolation> {
        if already_committed.contains(&seq) {
            Err(InvariantViolation::DoubleCommit(seq))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pipeline() -> Pipeline {
        Pipeline::new(PipelineConfig::default())
    }

    fn commit_candidate(p: &mut Pipeline, now: Instant) -> Vec<CommittedSegment> {
        let wait = p.candidate_wait_ms.unwrap_or(0);
        p.poll_timers(now + Duration::from_millis(wait + 1))
    }

    #[test]
    fn scenario_basic_extension() {
        let mut p = pipeline();
        let t0 = Instant::now();
        p.on_partial("Bend.", t0);
        p.on_partial(
            "Bend. Oh boy, I've been to the grocery store, so we're friendlier than them.",
            t0 + Duration::from_millis(100),
        );
        let mut committed = p.on_final("Bend.", false, t0 + Duration::from_millis(200));
        committed.extend(commit_candidate(&mut p, t0 + Duration::from_millis(1300)));

        assert_eq!(committed.len(), 1);
        assert_eq!(
            committed[0].original_text,
            "Bend. Oh boy, I've been to the grocery store, so we're friendlier than them."
        );
    }

    #[test]
    fn scenario_false_final() {
        let mut p = pipeline();
        let t0 = Instant::now();
        let mut committed = p.on_final("You just can't.", false, t0);
        committed.extend(p.on_partial("You just can't beat people", t0 + Duration::from_millis(200)));
        committed.extend(p.on_partial(
            "You just can't beat people up with doctrine",
            t0 + Duration::from_millis(400),
        ));
        committed.extend(commit_candidate(&mut p, t0 + Duration::from_millis(3500)));

        assert_eq!(committed.len(), 1);
        assert_eq!(committed[0].original_text, "You just can't beat people up with doctrine");
    }

    #[test]
    fn scenario_new_segment_after_commit() {
        let mut p = pipeline();
        let t0 = Instant::now();
        let mut committed = p.on_final("Bend.", false, t0);
        committed.extend(commit_candidate(&mut p, t0 + Duration::from_millis(1100)));

        let t1 = t0 + Duration::from_millis(2000);
        committed.extend(p.on_partial("I've been", t1));
        committed.extend(p.on_partial("I've been to the", t1 + Duration::from_millis(200)));
        committed.extend(p.on_final("I've been to the grocery store.", false, t1 + Duration::from_millis(400)));
        committed.extend(commit_candidate(&mut p, t1 + Duration::from_millis(1500)));

        assert_eq!(committed.len(), 2);
        assert_eq!(committed[0].original_text, "Bend.");
        assert_eq!(committed[1].original_text, "I've been to the grocery store.");
    }

    #[test]
    fn scenario_forced_final_with_recovery() {
        let mut p = pipeline();
        let t0 = Instant::now();
        let forced_text = "love this quote: biblical hospitality is the polar opposite of \
            the cultural trends to separate and isolate, and rejects the notion that life is \
            best spent to fulfill our own.";
        let committed = p.on_final(forced_text, true, t0);
        assert!(committed.is_empty());
        assert_eq!(p.state(), Some(SegmentState::ForcedBuffered));

        let epoch = p.begin_recovery(t0 + Duration::from_millis(100)).unwrap();
        let mut committed = p.on_recovery(
            epoch,
            Some("Own self-centered desires cordoned off from others.".to_string()),
            t0 + Duration::from_millis(900),
        );
        committed.extend(commit_candidate(&mut p, t0 + Duration::from_millis(2200)));

        assert_eq!(committed.len(), 2);
        assert_eq!(committed[0].original_text, forced_text);
        assert_eq!(committed[1].original_text, "self-centered desires cordoned off from others.");
    }

    #[test]
    fn scenario_partials_during_finalization_wait() {
        let mut p = pipeline();
        let t0 = Instant::now();
        let mut committed = p.on_final("You just can't.", false, t0);
        committed.extend(p.on_partial(
            "You just can't beat people up with doctrine",
            t0 + Duration::from_millis(500),
        ));
        committed.extend(commit_candidate(&mut p, t0 + Duration::from_millis(3500)));

        assert_eq!(committed.len(), 1);
        assert_eq!(committed[0].original_text, "You just can't beat people up with doctrine");
    }

    #[test]
    fn forced_buffer_commits_as_is_when_capture_window_expires() {
        let mut p = pipeline();
        let t0 = Instant::now();
        p.on_final("partial capture", true, t0);
        let committed = p.poll_timers(t0 + Duration::from_millis(CAPTURE_WINDOW_MS + 1));
        assert_eq!(committed.len(), 1);
        assert_eq!(committed[0].original_text, "partial capture");
        assert!(committed[0].forced);
    }

    #[test]
    fn open_segment_idle_with_no_followup_is_dropped_not_committed() {
        let mut p = pipeline();
        let t0 = Instant::now();
        p.on_partial("hi", t0);
        let committed = p.poll_timers(t0 + Duration::from_millis(MIN_PARTIAL_IDLE_MS + 1));
        assert!(committed.is_empty());
        assert_eq!(p.state(), None);
    }

    #[test]
    fn byte_identical_partial_to_last_committed_final_is_dropped() {
        let mut p = pipeline();
        let t0 = Instant::now();
        p.on_final("Bend.", false, t0);
        commit_candidate(&mut p, t0 + Duration::from_millis(1100));

        let committed = p.on_partial("bend.", t0 + Duration::from_millis(1200));
        assert!(committed.is_empty());
        assert_eq!(p.state(), None);
    }

    #[test]
    fn stale_recovery_epoch_is_discarded_without_side_effects() {
        let mut p = pipeline();
        let t0 = Instant::now();
        p.on_final("buffered text", true, t0);
        p.begin_recovery(t0 + Duration::from_millis(50));
        // A second recovery attempt supersedes the first.
        p.begin_recovery(t0 + Duration::from_millis(60));

        let committed = p.on_recovery(1, Some("stale reply".to_string()), t0 + Duration::from_millis(500));
        assert!(committed.is_empty());
        assert_eq!(p.state(), Some(SegmentState::Recovering));
    }
}
