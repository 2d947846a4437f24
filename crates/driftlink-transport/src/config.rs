//! Immutable, validated-at-construction configuration (spec §6, §9). Built
//! from TOML via `serde`; unknown fields are rejected rather than silently
//! ignored, and construction fails fast with a fatal
//! [`DriftlinkError::Config`] rather than letting a bad value propagate.

use serde::Deserialize;

use crate::error::DriftlinkError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Server,
    Client,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReliabilityConfig {
    #[serde(default = "defaults::ack_interval_ms")]
    pub ack_interval_ms: u64,
    #[serde(default = "defaults::ack_resend_interval_ms")]
    pub ack_resend_interval_ms: u64,
    #[serde(default = "defaults::nak_timeout_ms")]
    pub nak_timeout_ms: u64,
    #[serde(default = "defaults::max_retransmits")]
    pub max_retransmits: u32,
    #[serde(default = "defaults::retransmit_queue_size")]
    pub retransmit_queue_size: usize,
    #[serde(default = "defaults::retransmit_max_age_ms")]
    pub retransmit_max_age_ms: u64,
    #[serde(default = "defaults::retransmit_min_age_ms")]
    pub retransmit_min_age_ms: u64,
    #[serde(default = "defaults::retransmit_rtt_multiplier")]
    pub retransmit_rtt_multiplier: f64,
    #[serde(default = "defaults::ack_idle_drain_age_ms")]
    pub ack_idle_drain_age_ms: u64,
    #[serde(default)]
    pub force_drain_after_ack_idle: bool,
    #[serde(default = "defaults::force_drain_after_ms")]
    pub force_drain_after_ms: u64,
    #[serde(default = "defaults::true_")]
    pub recovery_burst_enabled: bool,
    #[serde(default = "defaults::recovery_burst_size")]
    pub recovery_burst_size: usize,
    #[serde(default = "defaults::recovery_burst_interval_ms")]
    pub recovery_burst_interval_ms: u64,
    #[serde(default = "defaults::recovery_ack_gap_ms")]
    pub recovery_ack_gap_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CongestionControlConfig {
    #[serde(default = "defaults::true_")]
    pub enabled: bool,
    #[serde(default = "defaults::target_rtt_ms")]
    pub target_rtt_ms: f64,
    #[serde(default = "defaults::nominal_delta_timer_ms")]
    pub nominal_delta_timer_ms: u64,
    #[serde(default = "defaults::min_delta_timer_ms")]
    pub min_delta_timer_ms: u64,
    #[serde(default = "defaults::max_delta_timer_ms")]
    pub max_delta_timer_ms: u64,
    #[serde(default = "defaults::smoothing_factor")]
    pub smoothing_factor: f64,
    #[serde(default = "defaults::adjust_interval_ms")]
    pub adjust_interval_ms: u64,
    #[serde(default = "defaults::max_adjustment")]
    pub max_adjustment: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinkEndpoint {
    pub address: String,
    pub port: u16,
    #[serde(default)]
    pub interface: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FailoverConfig {
    #[serde(default = "defaults::rtt_threshold_ms")]
    pub rtt_threshold_ms: f64,
    #[serde(default = "defaults::loss_threshold")]
    pub loss_threshold: f64,
    #[serde(default = "defaults::health_check_interval_ms")]
    pub health_check_interval_ms: u64,
    #[serde(default = "defaults::failback_delay_ms")]
    pub failback_delay_ms: u64,
    #[serde(default = "defaults::heartbeat_timeout_ms")]
    pub heartbeat_timeout_ms: u64,
    #[serde(default = "defaults::rtt_hysteresis")]
    pub rtt_hysteresis: f64,
    #[serde(default = "defaults::loss_hysteresis")]
    pub loss_hysteresis: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BondingConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "defaults::main_backup")]
    pub mode: String,
    pub primary: LinkEndpoint,
    pub backup: LinkEndpoint,
    #[serde(default)]
    pub failover: FailoverConfig,
}

impl Default for FailoverConfig {
    fn default() -> Self {
        FailoverConfig {
            rtt_threshold_ms: defaults::rtt_threshold_ms(),
            loss_threshold: defaults::loss_threshold(),
            health_check_interval_ms: defaults::health_check_interval_ms(),
            failback_delay_ms: defaults::failback_delay_ms(),
            heartbeat_timeout_ms: defaults::heartbeat_timeout_ms(),
            rtt_hysteresis: defaults::rtt_hysteresis(),
            loss_hysteresis: defaults::loss_hysteresis(),
        }
    }
}

/// Top-level configuration (spec §6). Validated once in [`DriftlinkConfig::validate`];
/// nothing downstream re-checks these invariants.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DriftlinkConfig {
    #[serde(rename = "serverType")]
    pub server_type: Role,
    #[serde(rename = "secretKey")]
    pub secret_key: String,
    #[serde(rename = "udpPort")]
    pub udp_port: u16,
    #[serde(rename = "protocolVersion")]
    pub protocol_version: u8,
    #[serde(rename = "udpAddress", default)]
    pub udp_address: Option<String>,
    #[serde(rename = "testAddress", default)]
    pub test_address: Option<String>,
    #[serde(rename = "testPort", default)]
    pub test_port: Option<u16>,
    #[serde(default)]
    pub reliability: ReliabilityConfig,
    #[serde(rename = "congestionControl", default)]
    pub congestion_control: CongestionControlConfig,
    #[serde(default)]
    pub bonding: Option<BondingConfig>,
}

impl CongestionControlConfig {
    /// Translate the TOML-facing knobs into the controller's runtime config.
    /// The AIMD decision thresholds (loss bands, RTT multiplier, step
    /// factors) aren't exposed to operators; they're fixed the way the
    /// batcher's EMA constants are.
    pub fn to_controller_config(&self) -> crate::congestion::CongestionConfig {
        let defaults = crate::congestion::CongestionConfig::default();
        crate::congestion::CongestionConfig {
            target_rtt_ms: self.target_rtt_ms,
            nominal_delta_timer_ms: self.nominal_delta_timer_ms,
            min_delta_timer_ms: self.min_delta_timer_ms,
            max_delta_timer_ms: self.max_delta_timer_ms,
            smoothing_factor: self.smoothing_factor,
            adjust_interval: std::time::Duration::from_millis(self.adjust_interval_ms),
            max_adjustment: self.max_adjustment,
            ..defaults
        }
    }
}

impl DriftlinkConfig {
    /// Parse and validate from a TOML document in one step — construction
    /// either yields a fully valid config or a fatal [`DriftlinkError::Config`].
    pub fn from_toml(text: &str) -> Result<Self, DriftlinkError> {
        let config: DriftlinkConfig =
            toml::from_str(text).map_err(|e| DriftlinkError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), DriftlinkError> {
        if !(1024..=65535).contains(&self.udp_port) {
            return Err(DriftlinkError::Config(format!(
                "udpPort {} out of range 1024..65535",
                self.udp_port
            )));
        }
        if self.protocol_version != 1 && self.protocol_version != 2 {
            return Err(DriftlinkError::Config(format!(
                "protocolVersion {} must be 1 or 2",
                self.protocol_version
            )));
        }
        validate_secret_key(&self.secret_key)?;
        Ok(())
    }

    /// The 32-byte key material, decoded from the config's string form.
    pub fn secret_key_bytes(&self) -> [u8; 32] {
        let mut out = [0u8; 32];
        let bytes = self.secret_key.as_bytes();
        let n = bytes.len().min(32);
        out[..n].copy_from_slice(&bytes[..n]);
        out
    }
}

/// `secretKey` must be exactly 32 bytes and show at least 8 distinct
/// characters — a crude but real diversity floor against all-zero or
/// single-character keys (spec §6).
fn validate_secret_key(key: &str) -> Result<(), DriftlinkError> {
    if key.len() != 32 {
        return Err(DriftlinkError::Config(format!(
            "secretKey must be 32 bytes, got {}",
            key.len()
        )));
    }
    let distinct: std::collections::HashSet<char> = key.chars().collect();
    if distinct.len() < 8 {
        return Err(DriftlinkError::Config(
            "secretKey must contain at least 8 distinct characters".into(),
        ));
    }
    Ok(())
}

impl Default for ReliabilityConfig {
    fn default() -> Self {
        ReliabilityConfig {
            ack_interval_ms: defaults::ack_interval_ms(),
            ack_resend_interval_ms: defaults::ack_resend_interval_ms(),
            nak_timeout_ms: defaults::nak_timeout_ms(),
            max_retransmits: defaults::max_retransmits(),
            retransmit_queue_size: defaults::retransmit_queue_size(),
            retransmit_max_age_ms: defaults::retransmit_max_age_ms(),
            retransmit_min_age_ms: defaults::retransmit_min_age_ms(),
            retransmit_rtt_multiplier: defaults::retransmit_rtt_multiplier(),
            ack_idle_drain_age_ms: defaults::ack_idle_drain_age_ms(),
            force_drain_after_ack_idle: false,
            force_drain_after_ms: defaults::force_drain_after_ms(),
            recovery_burst_enabled: true,
            recovery_burst_size: defaults::recovery_burst_size(),
            recovery_burst_interval_ms: defaults::recovery_burst_interval_ms(),
            recovery_ack_gap_ms: defaults::recovery_ack_gap_ms(),
        }
    }
}

impl Default for CongestionControlConfig {
    fn default() -> Self {
        CongestionControlConfig {
            enabled: true,
            target_rtt_ms: defaults::target_rtt_ms(),
            nominal_delta_timer_ms: defaults::nominal_delta_timer_ms(),
            min_delta_timer_ms: defaults::min_delta_timer_ms(),
            max_delta_timer_ms: defaults::max_delta_timer_ms(),
            smoothing_factor: defaults::smoothing_factor(),
            adjust_interval_ms: defaults::adjust_interval_ms(),
            max_adjustment: defaults::max_adjustment(),
        }
    }
}

mod defaults {
    pub fn ack_interval_ms() -> u64 {
        100
    }
    pub fn ack_resend_interval_ms() -> u64 {
        1000
    }
    pub fn nak_timeout_ms() -> u64 {
        100
    }
    pub fn max_retransmits() -> u32 {
        5
    }
    pub fn retransmit_queue_size() -> usize {
        1024
    }
    pub fn retransmit_max_age_ms() -> u64 {
        10_000
    }
    pub fn retransmit_min_age_ms() -> u64 {
        500
    }
    pub fn retransmit_rtt_multiplier() -> f64 {
        4.0
    }
    pub fn ack_idle_drain_age_ms() -> u64 {
        5_000
    }
    pub fn force_drain_after_ms() -> u64 {
        30_000
    }
    pub fn recovery_burst_size() -> usize {
        8
    }
    pub fn recovery_burst_interval_ms() -> u64 {
        1_000
    }
    pub fn recovery_ack_gap_ms() -> u64 {
        2_000
    }
    pub fn target_rtt_ms() -> f64 {
        200.0
    }
    pub fn nominal_delta_timer_ms() -> u64 {
        1000
    }
    pub fn min_delta_timer_ms() -> u64 {
        200
    }
    pub fn max_delta_timer_ms() -> u64 {
        5000
    }
    pub fn smoothing_factor() -> f64 {
        0.2
    }
    pub fn adjust_interval_ms() -> u64 {
        5000
    }
    pub fn max_adjustment() -> f64 {
        0.20
    }
    pub fn rtt_threshold_ms() -> f64 {
        500.0
    }
    pub fn loss_threshold() -> f64 {
        0.10
    }
    pub fn health_check_interval_ms() -> u64 {
        1000
    }
    pub fn failback_delay_ms() -> u64 {
        30_000
    }
    pub fn heartbeat_timeout_ms() -> u64 {
        5000
    }
    pub fn rtt_hysteresis() -> f64 {
        0.8
    }
    pub fn loss_hysteresis() -> f64 {
        0.5
    }
    pub fn main_backup() -> String {
        "main-backup".to_string()
    }
    pub fn true_() -> bool {
        true
    }
}
