//! # Sequence Tracker
//!
//! Classifies each incoming DATA sequence as in-order / out-of-order /
//! duplicate / gap, schedules NAKs for gaps, and bounds its own memory.
//! Receive-side only; the sender's view of outstanding sequences lives in
//! [`crate::retransmit`].

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};

use quanta::Instant;

use crate::seq;

/// Outcome of classifying one incoming sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    InOrder,
    OutOfOrder,
    Duplicate,
    /// Ahead of `expected_seq` by more than one; carries the list of newly
    /// discovered missing sequences a NAK timer was (re)armed for.
    Gap { missing: Vec<u32> },
    /// The discontinuity was too large to track; state was reset and reseeded
    /// at `s`.
    Resync,
}

/// A scheduled NAK timer, ordered by deadline for the min-heap.
#[derive(Debug, Clone, Eq, PartialEq)]
struct PendingNak {
    deadline: Instant,
    seq: u32,
    // bumped whenever the timer for `seq` is rescheduled/cancelled so stale
    // heap entries can be recognized and dropped on pop.
    epoch: u64,
}

impl Ord for PendingNak {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.deadline.cmp(&other.deadline)
    }
}
impl PartialOrd for PendingNak {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Tuning knobs for [`SequenceTracker`].
#[derive(Debug, Clone, Copy)]
pub struct TrackerConfig {
    pub nak_timeout: std::time::Duration,
    pub max_out_of_order: u32,
    pub behind_resync_threshold: u32,
    pub max_gap_tracking: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        TrackerConfig {
            nak_timeout: std::time::Duration::from_millis(100),
            max_out_of_order: 256,
            behind_resync_threshold: 1 << 20,
            max_gap_tracking: 1 << 20,
        }
    }
}

/// Receive-side sequence tracker (spec §3 `TrackerState`, §4.2).
pub struct SequenceTracker {
    config: TrackerConfig,
    expected_seq: Option<u32>,
    received: HashSet<u32>,
    pending_naks: std::collections::HashMap<u32, u64>,
    nak_heap: BinaryHeap<Reverse<PendingNak>>,
    epoch_counter: u64,
}

impl SequenceTracker {
    pub fn new(config: TrackerConfig) -> Self {
        SequenceTracker {
            config,
            expected_seq: None,
            received: HashSet::new(),
            pending_naks: std::collections::HashMap::new(),
            nak_heap: BinaryHeap::new(),
            epoch_counter: 0,
        }
    }

    /// Next contiguous sequence expected, or `None` before the first packet.
    pub fn expected_seq(&self) -> Option<u32> {
        self.expected_seq
    }

    fn reseed(&mut self, s: u32) {
        self.expected_seq = Some(s.wrapping_add(1));
        self.received.clear();
        self.received.insert(s);
        self.cancel_all_naks();
    }

    fn cancel_all_naks(&mut self) {
        for (_, epoch) in self.pending_naks.iter_mut() {
            *epoch = u64::MAX; // any heap entry with a lower epoch is stale
        }
        self.pending_naks.clear();
    }

    fn cancel_nak(&mut self, s: u32) {
        self.pending_naks.remove(&s);
    }

    fn schedule_nak(&mut self, s: u32, now: Instant) {
        if self.pending_naks.contains_key(&s) {
            return; // deduplicated
        }
        self.epoch_counter += 1;
        let epoch = self.epoch_counter;
        self.pending_naks.insert(s, epoch);
        self.nak_heap.push(Reverse(PendingNak {
            deadline: now + self.config.nak_timeout,
            seq: s,
            epoch,
        }));
    }

    /// Classify an incoming DATA sequence. `now` drives NAK-timer scheduling.
    pub fn classify(&mut self, s: u32, now: Instant) -> Classification {
        let Some(expected) = self.expected_seq else {
            self.reseed(s);
            return Classification::InOrder;
        };

        if self.received.contains(&s) {
            return Classification::Duplicate;
        }

        if !seq::at_or_ahead(s, expected) {
            // behind expected_seq
            let behind_by = seq::circular_distance(expected, s);
            if behind_by > self.config.behind_resync_threshold as i64 {
                self.reseed(s);
                return Classification::Resync;
            }
            self.received.insert(s);
            self.cancel_nak(s);
            return Classification::OutOfOrder;
        }

        if s == expected {
            self.received.insert(s);
            self.cancel_nak(s);
            let mut next = expected.wrapping_add(1);
            while self.received.contains(&next) {
                self.cancel_nak(next);
                next = next.wrapping_add(1);
            }
            self.expected_seq = Some(next);
            self.evict_stale(next);
            return Classification::InOrder;
        }

        // ahead of expected_seq: gap.
        let gap = seq::circular_distance(s, expected);
        if gap > self.config.max_gap_tracking as i64 {
            self.reseed(s);
            return Classification::Resync;
        }

        self.received.insert(s);
        let mut missing = Vec::new();
        let mut cur = expected;
        while cur != s {
            if !self.received.contains(&cur) {
                missing.push(cur);
                self.schedule_nak(cur, now);
            }
            cur = cur.wrapping_add(1);
        }
        Classification::Gap { missing }
    }

    fn evict_stale(&mut self, expected: u32) {
        self.received
            .retain(|&s| seq::circular_distance(expected, s) <= self.config.max_out_of_order as i64);
    }

    /// Pop all NAK timers whose deadline has passed. For each, if the
    /// sequence is still missing, it is returned in the loss list; in all
    /// cases the timer is removed from the pending map.
    pub fn poll_expired_naks(&mut self, now: Instant) -> Vec<u32> {
        let mut fired = Vec::new();
        while let Some(Reverse(top)) = self.nak_heap.peek() {
            if top.deadline > now {
                break;
            }
            let entry = self.nak_heap.pop().unwrap().0;
            match self.pending_naks.get(&entry.seq) {
                Some(&epoch) if epoch == entry.epoch => {
                    self.pending_naks.remove(&entry.seq);
                    if !self.received.contains(&entry.seq) {
                        fired.push(entry.seq);
                    }
                }
                _ => {} // stale heap entry: superseded or cancelled
            }
        }
        fired
    }

    /// Reset to the state of a freshly constructed tracker.
    pub fn reset(&mut self) {
        self.expected_seq = None;
        self.received.clear();
        self.pending_naks.clear();
        self.nak_heap.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn tracker() -> SequenceTracker {
        SequenceTracker::new(TrackerConfig::default())
    }

    fn now() -> Instant {
        Instant::now()
    }

    // ─── Basic classification ────────────────────────────────────────────

    #[test]
    fn first_packet_is_in_order() {
        let mut t = tracker();
        assert_eq!(t.classify(0, now()), Classification::InOrder);
        assert_eq!(t.expected_seq(), Some(1));
    }

    #[test]
    fn sequential_packets_are_in_order() {
        let mut t = tracker();
        for s in 0..10 {
            assert_eq!(t.classify(s, now()), Classification::InOrder);
        }
        assert_eq!(t.expected_seq(), Some(10));
    }

    #[test]
    fn duplicate_detected() {
        let mut t = tracker();
        t.classify(0, now());
        assert_eq!(t.classify(0, now()), Classification::Duplicate);
    }

    #[test]
    fn gap_reports_missing_and_schedules_nak() {
        let mut t = tracker();
        t.classify(0, now());
        let c = t.classify(3, now());
        match c {
            Classification::Gap { missing } => assert_eq!(missing, vec![1, 2]),
            other => panic!("expected gap, got {other:?}"),
        }
    }

    #[test]
    fn late_arrival_fills_gap_and_advances() {
        let mut t = tracker();
        t.classify(0, now());
        t.classify(3, now()); // gap: missing 1, 2
        // The Gap branch doesn't advance expected_seq, so the first missing
        // sequence to arrive still matches it exactly and is classified
        // in-order, per spec §4.2 step 4.
        assert_eq!(t.classify(1, now()), Classification::InOrder);
        let c = t.classify(2, now());
        assert_eq!(c, Classification::InOrder);
        assert_eq!(t.expected_seq(), Some(4));
    }

    // ─── NAK timer semantics ─────────────────────────────────────────────

    #[test]
    fn no_spurious_nak_if_seq_arrives_before_timer_fires() {
        let mut t = tracker();
        let t0 = now();
        t.classify(0, t0);
        t.classify(2, t0); // gap: missing 1
        t.classify(1, t0); // fills it before the timer would fire
        let fired = t.poll_expired_naks(t0 + Duration::from_millis(200));
        assert!(fired.is_empty(), "no NAK should fire for an arrived seq");
    }

    #[test]
    fn nak_fires_for_seq_still_missing() {
        let mut t = tracker();
        let t0 = now();
        t.classify(0, t0);
        t.classify(2, t0); // gap: missing 1
        let fired = t.poll_expired_naks(t0 + Duration::from_millis(200));
        assert_eq!(fired, vec![1]);
    }

    #[test]
    fn nak_deduplicated_across_repeated_gap_reports() {
        let mut t = tracker();
        let t0 = now();
        t.classify(0, t0);
        t.classify(3, t0); // missing 1, 2
        t.classify(4, t0); // still missing 1, 2 — no duplicate scheduling
        let fired = t.poll_expired_naks(t0 + Duration::from_millis(200));
        let mut sorted = fired.clone();
        sorted.sort();
        assert_eq!(sorted, vec![1, 2]);
    }

    // ─── Resync ──────────────────────────────────────────────────────────

    #[test]
    fn large_discontinuity_behind_triggers_resync() {
        let mut t = tracker();
        t.classify(1_000_000, now());
        let c = t.classify(5, now());
        assert_eq!(c, Classification::Resync);
        assert_eq!(t.expected_seq(), Some(6));
    }

    #[test]
    fn large_discontinuity_ahead_triggers_resync() {
        let mut t = tracker();
        t.classify(0, now());
        let c = t.classify(5_000_000, now());
        assert_eq!(c, Classification::Resync);
        assert_eq!(t.expected_seq(), Some(5_000_001));
    }

    // ─── Scenario 7: wraparound (spec §8) ────────────────────────────────

    #[test]
    fn scenario_7_wraparound() {
        let mut t = tracker();
        t.classify(0xFFFF_FFFE, now());
        assert_eq!(t.classify(0xFFFF_FFFF, now()), Classification::InOrder);
        assert_eq!(t.classify(0x0000_0000, now()), Classification::InOrder);
        assert_eq!(t.classify(0x0000_0001, now()), Classification::InOrder);
        assert_eq!(t.expected_seq(), Some(2));
    }

    // ─── Reset ───────────────────────────────────────────────────────────

    #[test]
    fn reset_returns_to_fresh_state() {
        let mut t = tracker();
        t.classify(0, now());
        t.classify(5, now());
        t.reset();
        assert_eq!(t.expected_seq(), None);
        assert_eq!(t.classify(0, now()), Classification::InOrder);
    }

    // ─── Memory bound ────────────────────────────────────────────────────

    #[test]
    fn received_set_bounded_by_max_out_of_order() {
        let mut cfg = TrackerConfig::default();
        cfg.max_out_of_order = 4;
        let mut t = SequenceTracker::new(cfg);
        for s in 0..100 {
            t.classify(s, now());
        }
        assert!(t.received.len() as u32 <= cfg.max_out_of_order + 1);
    }
}
