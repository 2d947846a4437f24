//! # AIMD Congestion Controller
//!
//! Adapts the batcher's `delta_timer_ms` in response to observed RTT and
//! loss, without oscillation (spec §4.6, §3 `CongestionState`).

use quanta::Instant;

use crate::stats::Ewma;

/// Tuning knobs, all independently configurable (spec §6 `congestionControl`).
#[derive(Debug, Clone, Copy)]
pub struct CongestionConfig {
    pub target_rtt_ms: f64,
    pub nominal_delta_timer_ms: u64,
    pub min_delta_timer_ms: u64,
    pub max_delta_timer_ms: u64,
    pub smoothing_factor: f64,
    pub adjust_interval: std::time::Duration,
    pub max_adjustment: f64,
    pub loss_high: f64,
    pub loss_low: f64,
    pub rtt_high_mult: f64,
    pub decrease_factor: f64,
    pub increase_factor: f64,
}

impl Default for CongestionConfig {
    fn default() -> Self {
        CongestionConfig {
            target_rtt_ms: 200.0,
            nominal_delta_timer_ms: 1000,
            min_delta_timer_ms: 200,
            max_delta_timer_ms: 5000,
            smoothing_factor: 0.2,
            adjust_interval: std::time::Duration::from_secs(5),
            max_adjustment: 0.20,
            loss_high: 0.05,
            loss_low: 0.01,
            rtt_high_mult: 1.5,
            decrease_factor: 1.5,
            increase_factor: 0.95,
        }
    }
}

/// AIMD controller over the batcher's flush cadence (spec §4.6).
pub struct CongestionController {
    config: CongestionConfig,
    current_timer_ms: f64,
    nominal_timer_ms: f64,
    avg_rtt: Ewma,
    avg_loss: Ewma,
    last_adjust_at: Option<Instant>,
    manual_mode: bool,
}

impl CongestionController {
    pub fn new(config: CongestionConfig) -> Self {
        let nominal = config.nominal_delta_timer_ms as f64;
        CongestionController {
            current_timer_ms: nominal,
            nominal_timer_ms: nominal,
            avg_rtt: Ewma::new(config.smoothing_factor),
            avg_loss: Ewma::new(config.smoothing_factor),
            last_adjust_at: None,
            manual_mode: false,
            config,
        }
    }

    pub fn current_timer_ms(&self) -> u64 {
        self.current_timer_ms.round() as u64
    }

    /// Feed an RTT sample (ms). Negative samples are ignored by the EMA.
    pub fn on_rtt_sample(&mut self, rtt_ms: f64) {
        self.avg_rtt.update(rtt_ms);
    }

    /// Feed a loss ratio sample (0..1). Negative samples are ignored.
    pub fn on_loss_sample(&mut self, loss: f64) {
        self.avg_loss.update(loss);
    }

    /// Fix the timer at `value_ms` and inhibit automatic changes.
    pub fn set_manual(&mut self, value_ms: u64) {
        self.manual_mode = true;
        self.current_timer_ms = (value_ms as f64).clamp(
            self.config.min_delta_timer_ms as f64,
            self.config.max_delta_timer_ms as f64,
        );
    }

    pub fn enable_auto(&mut self) {
        self.manual_mode = false;
    }

    pub fn is_manual(&self) -> bool {
        self.manual_mode
    }

    /// Evaluate the AIMD decision rule if `adjust_interval` has elapsed
    /// since the last adjustment and the controller isn't in manual mode.
    /// Returns the new timer value if an adjustment was made.
    pub fn tick(&mut self, now: Instant) -> Option<u64> {
        if self.manual_mode {
            return None;
        }
        if let Some(last) = self.last_adjust_at {
            if now.duration_since(last) < self.config.adjust_interval {
                return None;
            }
        }
        self.last_adjust_at = Some(now);

        if !self.avg_rtt.is_initialized() || !self.avg_loss.is_initialized() {
            return None;
        }

        let rtt = self.avg_rtt.value();
        let loss = self.avg_loss.value();
        let target = self.config.target_rtt_ms;

        let multiplier = if loss > self.config.loss_high || rtt > target * self.config.rtt_high_mult {
            // Severe congestion: slow down.
            self.config.decrease_factor
        } else if loss < self.config.loss_low && rtt > 0.0 && rtt < target * 0.8 {
            // Very healthy.
            if self.current_timer_ms > self.nominal_timer_ms {
                self.config.increase_factor
            } else if self.current_timer_ms < self.nominal_timer_ms {
                1.05
            } else if self.nominal_timer_ms == self.config.min_delta_timer_ms as f64 {
                // Legacy compatibility: older configs relied on always
                // driving toward the minimum under healthy conditions when
                // nominal equals the floor. New code should not depend on
                // this branch (spec §9).
                self.config.increase_factor
            } else {
                1.0
            }
        } else {
            // Moderate: weak restoring force toward nominal.
            if self.current_timer_ms > self.nominal_timer_ms {
                0.98
            } else if self.current_timer_ms < self.nominal_timer_ms {
                1.02
            } else {
                1.0
            }
        };

        if (multiplier - 1.0).abs() < f64::EPSILON {
            return None;
        }

        let proposed = self.current_timer_ms * multiplier;
        let max_step = self.config.max_adjustment * self.current_timer_ms;
        let bounded_step = (proposed - self.current_timer_ms).clamp(-max_step, max_step);
        let new_timer = (self.current_timer_ms + bounded_step).clamp(
            self.config.min_delta_timer_ms as f64,
            self.config.max_delta_timer_ms as f64,
        );

        if (new_timer - self.current_timer_ms).abs() < f64::EPSILON {
            return None;
        }
        self.current_timer_ms = new_timer;
        Some(self.current_timer_ms())
    }

    pub fn reset(&mut self) {
        self.current_timer_ms = self.nominal_timer_ms;
        self.avg_rtt.reset();
        self.avg_loss.reset();
        self.last_adjust_at = None;
        self.manual_mode = false;
    }
}
