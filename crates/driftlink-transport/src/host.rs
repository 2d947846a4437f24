//! # Host Contract
//!
//! The narrow trait a hosting application implements to plug the runtime
//! into its own delta bus, rather than the runtime owning I/O directly
//! (spec §9 "host contract as a narrow trait").

use crate::delta::DeltaEnvelope;

/// What the runtime needs from its host: a place to emit deltas arriving
/// off the wire, a place to pull deltas queued for transmission, and a
/// logging sink. Implementations own the actual delta bus (SignalK stream,
/// message queue, whatever); the runtime never touches it directly.
pub trait Host: Send {
    /// A delta decoded off the wire, ready for local consumption.
    fn emit_delta_to_host(&mut self, delta: DeltaEnvelope);

    /// Pull up to `max` deltas queued for transmission since the last call.
    /// Returns fewer than `max` (including zero) when nothing is pending.
    fn poll_outbound_deltas(&mut self, max: usize) -> Vec<DeltaEnvelope>;

    /// A delta that originated locally and was only looped back to itself
    /// (same `source` as this host's own identity) should not be re-emitted.
    /// Implementations that don't tag sources can return `false` always.
    fn is_self_origin(&self, delta: &DeltaEnvelope) -> bool {
        let _ = delta;
        false
    }

    fn log_debug(&mut self, message: &str) {
        tracing::debug!(target: "driftlink::host", "{message}");
    }

    fn log_error(&mut self, message: &str) {
        tracing::error!(target: "driftlink::host", "{message}");
    }
}
