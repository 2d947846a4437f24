//! Per-role counters and the shared EWMA helper used by the batcher and the
//! congestion controller.

use serde::Serialize;

// ─── Sender Stats ───────────────────────────────────────────────────────────

/// Aggregate TX-side counters (spec §7 error taxonomy, sender side).
#[derive(Debug, Clone, Default, Serialize)]
pub struct SenderStats {
    pub packets_sent: u64,
    pub bytes_sent: u64,
    pub packets_acked: u64,
    pub retransmissions: u64,
    pub packets_expired: u64,
    pub queue_overflows: u64,
    pub send_failures: u64,
    pub serialize_failures: u64,
}

impl SenderStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn loss_rate(&self) -> f64 {
        if self.packets_sent == 0 {
            0.0
        } else {
            let unacked = self.packets_sent.saturating_sub(self.packets_acked);
            unacked as f64 / self.packets_sent as f64
        }
    }

    pub fn retransmit_ratio(&self) -> f64 {
        if self.packets_sent == 0 {
            0.0
        } else {
            self.retransmissions as f64 / self.packets_sent as f64
        }
    }
}

// ─── Receiver Stats ─────────────────────────────────────────────────────────

/// Aggregate RX-side counters (spec §7 error taxonomy, receiver side).
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReceiverStats {
    pub packets_received: u64,
    pub bytes_received: u64,
    pub packets_delivered: u64,
    pub duplicates: u64,
    pub parse_errors: u64,
    pub auth_failures: u64,
    pub decompress_failures: u64,
    pub resyncs: u64,
    pub naks_sent: u64,
}

impl ReceiverStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn goodput_ratio(&self) -> f64 {
        if self.packets_received == 0 {
            0.0
        } else {
            self.packets_delivered as f64 / self.packets_received as f64
        }
    }
}

// ─── EWMA ───────────────────────────────────────────────────────────────────

/// Exponentially weighted moving average, shared by the batcher's
/// `avg_bytes_per_delta` and the congestion controller's RTT/loss samples.
#[derive(Debug, Clone)]
pub struct Ewma {
    alpha: f64,
    value: f64,
    initialized: bool,
}

impl Ewma {
    pub fn new(alpha: f64) -> Self {
        assert!((0.0..=1.0).contains(&alpha), "alpha must be in [0, 1]");
        Ewma {
            alpha,
            value: 0.0,
            initialized: false,
        }
    }

    /// Construct with an initial value already set, e.g. the batcher's
    /// `avg_bytes_per_delta` starting at 200 before any delta has flushed.
    pub fn with_initial(alpha: f64, initial: f64) -> Self {
        let mut e = Self::new(alpha);
        e.value = initial;
        e.initialized = true;
        e
    }

    /// Update with a new sample and return the smoothed value. Negative
    /// samples are ignored, per spec §4.6 / §3.
    pub fn update(&mut self, sample: f64) -> f64 {
        if sample < 0.0 {
            return self.value;
        }
        if !self.initialized {
            self.value = sample;
            self.initialized = true;
        } else {
            self.value = self.alpha * sample + (1.0 - self.alpha) * self.value;
        }
        self.value
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn reset(&mut self) {
        self.value = 0.0;
        self.initialized = false;
    }
}
