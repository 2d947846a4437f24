//! # Per-Link Health
//!
//! Tracks the observable state of one bonded link — smoothed RTT, loss
//! ratio, and the STANDBY/ACTIVE/DEGRADED/DOWN state machine — independent
//! of which physical link (primary/backup) it belongs to (spec §4.7, §3
//! `LinkHealth`).

use std::collections::HashMap;
use std::time::Duration;

use quanta::Instant;

use driftlink_transport::config::FailoverConfig;

const RTT_EMA_ALPHA: f64 = 0.2;

/// A link's position in the failover state machine.
///
/// ```text
/// STANDBY → (selected active) ACTIVE → (thresholds fail) DEGRADED
///                                              │
///                     (further failure, or heartbeat timeout
///                      with zero responses)    ▼
///                                             DOWN
///                                              │
///                        (any successful heartbeat response)
///                                              ▼
///                                           STANDBY
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkStatus {
    #[default]
    Standby,
    Active,
    Degraded,
    Down,
}

/// Smoothed telemetry and heartbeat bookkeeping for one link.
pub struct LinkHealth {
    status: LinkStatus,
    rtt_alpha: f64,
    rtt_ms: f64,
    rtt_initialized: bool,
    heartbeats_sent: u64,
    heartbeats_acked: u64,
    heartbeats_dropped: u64,
    pending_heartbeats: HashMap<u32, Instant>,
    last_ok_at: Option<Instant>,
}

impl LinkHealth {
    pub fn new() -> Self {
        LinkHealth {
            status: LinkStatus::Standby,
            rtt_alpha: RTT_EMA_ALPHA,
            rtt_ms: 0.0,
            rtt_initialized: false,
            heartbeats_sent: 0,
            heartbeats_acked: 0,
            heartbeats_dropped: 0,
            pending_heartbeats: HashMap::new(),
            last_ok_at: None,
        }
    }

    pub fn status(&self) -> LinkStatus {
        self.status
    }

    pub fn set_active(&mut self) {
        self.status = LinkStatus::Active;
    }

    pub fn set_standby(&mut self) {
        self.status = LinkStatus::Standby;
    }

    /// Smoothed RTT in milliseconds; 0.0 until the first heartbeat echo.
    pub fn rtt_ms(&self) -> f64 {
        self.rtt_ms
    }

    /// `dropped / sent` over the lifetime of the link's heartbeat history.
    pub fn loss_ratio(&self) -> f64 {
        if self.heartbeats_sent == 0 {
            0.0
        } else {
            self.heartbeats_dropped as f64 / self.heartbeats_sent as f64
        }
    }

    pub fn pending_heartbeats(&self) -> usize {
        self.pending_heartbeats.len()
    }

    /// Record that a HEARTBEAT with `seq` was just sent.
    pub fn record_heartbeat_sent(&mut self, seq: u32, now: Instant) {
        self.heartbeats_sent += 1;
        self.pending_heartbeats.insert(seq, now);
    }

    /// Record a matching echo for `seq`. Folds the measured RTT into the
    /// EMA and, per the state machine, brings a DOWN link back to STANDBY
    /// on any successful response. Returns `false` without side effects if
    /// `seq` doesn't match anything we sent — the caller's cue that the
    /// inbound HEARTBEAT is a fresh one from the peer, not an echo of ours,
    /// and needs echoing back rather than folding into our own RTT.
    pub fn record_heartbeat_ack(&mut self, seq: u32, now: Instant) -> bool {
        let Some(sent_at) = self.pending_heartbeats.remove(&seq) else {
            return false;
        };
        let sample = now.duration_since(sent_at).as_secs_f64() * 1000.0;
        if !self.rtt_initialized {
            self.rtt_ms = sample;
            self.rtt_initialized = true;
        } else {
            self.rtt_ms = self.rtt_alpha * sample + (1.0 - self.rtt_alpha) * self.rtt_ms;
        }
        self.heartbeats_acked += 1;
        self.last_ok_at = Some(now);
        if self.status == LinkStatus::Down {
            self.status = LinkStatus::Standby;
        }
        true
    }

    /// Drop pending heartbeats older than `timeout`, counting each as a
    /// loss. Returns the number dropped this call.
    pub fn expire_pending(&mut self, timeout: Duration, now: Instant) -> usize {
        let before = self.pending_heartbeats.len();
        self.pending_heartbeats
            .retain(|_, &mut sent_at| now.duration_since(sent_at) < timeout);
        let dropped = before - self.pending_heartbeats.len();
        self.heartbeats_dropped += dropped as u64;
        dropped
    }

    /// True when no heartbeat has been acknowledged within `timeout` of
    /// `now` (or none ever has, with at least one sent) — the "heartbeat
    /// timeout with zero responses" condition that drives DEGRADED → DOWN
    /// independent of the RTT/loss threshold check.
    pub fn heartbeat_timed_out(&self, timeout: Duration, now: Instant) -> bool {
        if self.heartbeats_sent == 0 {
            return false;
        }
        match self.last_ok_at {
            Some(t) => now.duration_since(t) >= timeout,
            None => true,
        }
    }

    /// Advance the STANDBY/ACTIVE/DEGRADED/DOWN state machine for one
    /// health-check tick. `timed_out` should come from
    /// [`heartbeat_timed_out`](Self::heartbeat_timed_out).
    pub fn evaluate(&mut self, config: &FailoverConfig, timed_out: bool) {
        let failing = self.rtt_ms() > config.rtt_threshold_ms || self.loss_ratio() > config.loss_threshold;
        self.status = match self.status {
            LinkStatus::Active if failing => LinkStatus::Degraded,
            LinkStatus::Degraded if failing || timed_out => LinkStatus::Down,
            LinkStatus::Standby if timed_out => LinkStatus::Down,
            other => other,
        };
    }
}

impl Default for LinkHealth {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn cfg() -> FailoverConfig {
        FailoverConfig {
            rtt_threshold_ms: 500.0,
            loss_threshold: 0.10,
            health_check_interval_ms: 1000,
            failback_delay_ms: 30_000,
            heartbeat_timeout_ms: 5000,
            rtt_hysteresis: 0.8,
            loss_hysteresis: 0.5,
        }
    }

    #[test]
    fn starts_standby_with_zero_rtt() {
        let h = LinkHealth::new();
        assert_eq!(h.status(), LinkStatus::Standby);
        assert_eq!(h.rtt_ms(), 0.0);
        assert_eq!(h.loss_ratio(), 0.0);
    }

    #[test]
    fn ack_folds_rtt_and_clears_pending() {
        let mut h = LinkHealth::new();
        let t0 = Instant::now();
        h.record_heartbeat_sent(1, t0);
        h.record_heartbeat_ack(1, t0 + Duration::from_millis(40));
        assert!((h.rtt_ms() - 40.0).abs() < 0.001);
        assert_eq!(h.pending_heartbeats(), 0);
    }

    #[test]
    fn dropped_heartbeat_counts_toward_loss_ratio() {
        let mut h = LinkHealth::new();
        let t0 = Instant::now();
        for seq in 0..10u32 {
            h.record_heartbeat_sent(seq, t0);
        }
        let dropped = h.expire_pending(Duration::from_millis(100), t0 + Duration::from_secs(1));
        assert_eq!(dropped, 10);
        assert_eq!(h.loss_ratio(), 1.0);
    }

    #[test]
    fn active_degrades_on_rtt_threshold_breach() {
        let mut h = LinkHealth::new();
        h.set_active();
        let t0 = Instant::now();
        h.record_heartbeat_sent(1, t0);
        h.record_heartbeat_ack(1, t0 + Duration::from_millis(800));
        h.evaluate(&cfg(), false);
        assert_eq!(h.status(), LinkStatus::Degraded);
    }

    #[test]
    fn degraded_goes_down_on_further_failure() {
        let mut h = LinkHealth::new();
        h.set_active();
        let t0 = Instant::now();
        h.record_heartbeat_sent(1, t0);
        h.record_heartbeat_ack(1, t0 + Duration::from_millis(800));
        h.evaluate(&cfg(), false);
        assert_eq!(h.status(), LinkStatus::Degraded);
        h.evaluate(&cfg(), false);
        assert_eq!(h.status(), LinkStatus::Down);
    }

    #[test]
    fn degraded_goes_down_on_heartbeat_timeout_with_zero_responses() {
        let mut h = LinkHealth::new();
        h.set_active();
        let t0 = Instant::now();
        h.record_heartbeat_sent(1, t0);
        h.record_heartbeat_ack(1, t0 + Duration::from_millis(800));
        h.evaluate(&cfg(), false);
        assert_eq!(h.status(), LinkStatus::Degraded);
        h.evaluate(&cfg(), true);
        assert_eq!(h.status(), LinkStatus::Down);
    }

    #[test]
    fn down_returns_to_standby_on_successful_echo() {
        let mut h = LinkHealth::new();
        h.set_active();
        let t0 = Instant::now();
        h.record_heartbeat_sent(1, t0);
        h.record_heartbeat_ack(1, t0 + Duration::from_millis(800));
        h.evaluate(&cfg(), false);
        h.evaluate(&cfg(), true);
        assert_eq!(h.status(), LinkStatus::Down);

        h.record_heartbeat_sent(2, t0);
        h.record_heartbeat_ack(2, t0 + Duration::from_millis(10));
        assert_eq!(h.status(), LinkStatus::Standby);
    }

    #[test]
    fn healthy_active_link_stays_active() {
        let mut h = LinkHealth::new();
        h.set_active();
        let t0 = Instant::now();
        h.record_heartbeat_sent(1, t0);
        h.record_heartbeat_ack(1, t0 + Duration::from_millis(20));
        h.evaluate(&cfg(), false);
        assert_eq!(h.status(), LinkStatus::Active);
    }
}
