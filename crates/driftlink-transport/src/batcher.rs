//! # Smart Batcher
//!
//! Aggregates per-delta updates into MTU-safe batches, balancing compression
//! gain against latency (spec §4.5, §3 `BatcherState`).

use quanta::Instant;

use crate::delta::DeltaEnvelope;
use crate::stats::Ewma;

const INITIAL_AVG_BYTES_PER_DELTA: f64 = 200.0;
const EMA_ALPHA: f64 = 0.2;
const MTU_MARGIN: f64 = 0.85;

/// Outcome of enqueuing a delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// Delta buffered; caller should keep waiting for the timer.
    Buffered,
    /// `pending.len()` reached `max_deltas_per_batch`; flush immediately.
    EarlySend,
}

/// MTU-aware batch accumulator (spec §4.5).
pub struct SmartBatcher {
    mtu: usize,
    avg_bytes_per_delta: Ewma,
    pending: Vec<DeltaEnvelope>,
    timer_deadline: Option<Instant>,
    overshoot_count: u64,
}

impl SmartBatcher {
    pub fn new(mtu: usize) -> Self {
        SmartBatcher {
            mtu,
            avg_bytes_per_delta: Ewma::with_initial(EMA_ALPHA, INITIAL_AVG_BYTES_PER_DELTA),
            pending: Vec::new(),
            timer_deadline: None,
            overshoot_count: 0,
        }
    }

    /// `max_deltas_per_batch = clamp(⌊MTU·0.85 / avg_bytes_per_delta⌋, 1, 50)`.
    pub fn max_deltas_per_batch(&self) -> usize {
        let avg = self.avg_bytes_per_delta.value().max(1.0);
        let raw = ((self.mtu as f64 * MTU_MARGIN) / avg).floor() as i64;
        raw.clamp(1, 50) as usize
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn overshoot_count(&self) -> u64 {
        self.overshoot_count
    }

    /// Enqueue a delta. Arms the flush timer if this is the first item
    /// since the last flush. Returns whether the caller should early-send.
    pub fn enqueue(&mut self, delta: DeltaEnvelope, now: Instant, delta_timer_ms: u64) -> EnqueueOutcome {
        if self.pending.is_empty() {
            self.timer_deadline = Some(now + std::time::Duration::from_millis(delta_timer_ms));
        }
        self.pending.push(delta);
        if self.pending.len() >= self.max_deltas_per_batch() {
            EnqueueOutcome::EarlySend
        } else {
            EnqueueOutcome::Buffered
        }
    }

    /// Whether the flush timer has fired and there is something to flush.
    pub fn timer_fired(&self, now: Instant) -> bool {
        matches!(self.timer_deadline, Some(deadline) if now >= deadline) && !self.pending.is_empty()
    }

    /// Whether the timer fired with nothing pending — a no-op tick (spec:
    /// "if pending is empty when the timer fires, no packet is emitted; the
    /// timer rearms on next enqueue").
    pub fn timer_fired_empty(&self, now: Instant) -> bool {
        matches!(self.timer_deadline, Some(deadline) if now >= deadline) && self.pending.is_empty()
    }

    /// Drain the pending list and reset the timer, without yet knowing the
    /// built packet's size. Callers that need to serialize the drained
    /// deltas before the final wire size is known should call this, then
    /// [`record_flush`](Self::record_flush) once that size is available.
    pub fn take_pending(&mut self) -> Vec<DeltaEnvelope> {
        self.timer_deadline = None;
        std::mem::take(&mut self.pending)
    }

    /// Fold a just-built packet's size back into the EMA and overshoot
    /// counter. `count` is the number of deltas it carried (from the
    /// `Vec` returned by [`take_pending`](Self::take_pending));
    /// `built_packet_len` is the size actually put on the wire.
    pub fn record_flush(&mut self, count: usize, built_packet_len: usize) {
        if count > 0 {
            let bytes_per_delta = built_packet_len as f64 / count as f64;
            self.avg_bytes_per_delta.update(bytes_per_delta);
        }
        if built_packet_len > self.mtu {
            self.overshoot_count += 1;
        }
    }

    /// Drain the pending list, fold the built packet's size back into the
    /// EMA, and reset the timer. `built_packet_len` is the size of the
    /// packet actually put on the wire (post compression/encryption) so the
    /// overshoot counter reflects real MTU pressure. Prefer
    /// [`take_pending`](Self::take_pending) + [`record_flush`](Self::record_flush)
    /// when the size isn't known until after the drained deltas are built.
    pub fn flush(&mut self, built_packet_len: usize) -> Vec<DeltaEnvelope> {
        let count = self.pending.len();
        let drained = self.take_pending();
        self.record_flush(count, built_packet_len);
        drained
    }

    pub fn reset(&mut self) {
        self.pending.clear();
        self.timer_deadline = None;
        self.avg_bytes_per_delta = Ewma::with_initial(EMA_ALPHA, INITIAL_AVG_BYTES_PER_DELTA);
        self.overshoot_count = 0;
    }
}
