//! # Bonding Manager
//!
//! Owns the two physical [`UdpLink`]s and their [`LinkHealth`], drives
//! heartbeats, and decides failover/failback per the active/standby
//! hysteresis rules (spec §4.7).

use std::io;

use quanta::Instant;

use driftlink_transport::config::FailoverConfig;

use crate::health::{LinkHealth, LinkStatus};
use crate::link::UdpLink;

/// Which physical path is meant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkId {
    Primary,
    Backup,
}

impl LinkId {
    fn other(self) -> LinkId {
        match self {
            LinkId::Primary => LinkId::Backup,
            LinkId::Backup => LinkId::Primary,
        }
    }
}

/// A state transition the manager just made, for the runtime to log and
/// surface to the host as a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BondingEvent {
    Failover { to: LinkId },
    Failback,
}

/// Active/standby bonding over exactly two links (spec §4.7).
pub struct BondingManager {
    primary: UdpLink,
    backup: UdpLink,
    primary_health: LinkHealth,
    backup_health: LinkHealth,
    config: FailoverConfig,
    active: LinkId,
    next_heartbeat_seq: u32,
    last_failover_at: Option<Instant>,
}

impl BondingManager {
    pub fn new(primary: UdpLink, backup: UdpLink, config: FailoverConfig) -> Self {
        let mut primary_health = LinkHealth::new();
        primary_health.set_active();
        BondingManager {
            primary,
            backup,
            primary_health,
            backup_health: LinkHealth::new(),
            config,
            active: LinkId::Primary,
            next_heartbeat_seq: 0,
            last_failover_at: None,
        }
    }

    pub fn active(&self) -> LinkId {
        self.active
    }

    pub fn active_link(&self) -> &UdpLink {
        match self.active {
            LinkId::Primary => &self.primary,
            LinkId::Backup => &self.backup,
        }
    }

    pub fn link(&self, id: LinkId) -> &UdpLink {
        match id {
            LinkId::Primary => &self.primary,
            LinkId::Backup => &self.backup,
        }
    }

    pub fn health(&self, id: LinkId) -> &LinkHealth {
        match id {
            LinkId::Primary => &self.primary_health,
            LinkId::Backup => &self.backup_health,
        }
    }

    fn health_mut(&mut self, id: LinkId) -> &mut LinkHealth {
        match id {
            LinkId::Primary => &mut self.primary_health,
            LinkId::Backup => &mut self.backup_health,
        }
    }

    /// Send a HEARTBEAT on `id`, returning its assigned sequence.
    fn send_heartbeat(&mut self, id: LinkId, now: Instant) -> io::Result<u32> {
        let seq = self.next_heartbeat_seq;
        self.next_heartbeat_seq = self.next_heartbeat_seq.wrapping_add(1);
        let frame = driftlink_transport::wire::build_heartbeat(seq);
        self.link(id).send(&frame)?;
        self.health_mut(id).record_heartbeat_sent(seq, now);
        Ok(seq)
    }

    /// Feed an inbound HEARTBEAT packet on `id`. If `seq` matches one of
    /// ours, folds the RTT sample in; otherwise it's a fresh heartbeat from
    /// the peer and the caller must echo it back (the reliability RX layer
    /// already does this for the data link; bonding heartbeats are handled
    /// here directly since they never carry payload deltas).
    pub fn on_heartbeat(&mut self, id: LinkId, seq: u32, now: Instant) -> HeartbeatOutcome {
        if self.health_mut(id).record_heartbeat_ack(seq, now) {
            HeartbeatOutcome::RttSampled
        } else {
            HeartbeatOutcome::NeedsEcho
        }
    }

    /// Echo a heartbeat we received back to the sender on the same link.
    pub fn echo_heartbeat(&self, id: LinkId, seq: u32) -> io::Result<()> {
        let frame = driftlink_transport::wire::build_heartbeat(seq);
        self.link(id).send(&frame)?;
        Ok(())
    }

    /// Run one health-check iteration: send heartbeats on both links, expire
    /// stale pending heartbeats, evaluate each link's state machine, and
    /// apply any failover/failback decision. Returns the events produced,
    /// in order.
    pub fn health_check_tick(&mut self, now: Instant) -> Vec<BondingEvent> {
        let _ = self.send_heartbeat(LinkId::Primary, now);
        let _ = self.send_heartbeat(LinkId::Backup, now);

        let timeout = std::time::Duration::from_millis(self.config.heartbeat_timeout_ms);
        self.primary_health.expire_pending(timeout, now);
        self.backup_health.expire_pending(timeout, now);

        let primary_timed_out = self.primary_health.heartbeat_timed_out(timeout, now);
        let backup_timed_out = self.backup_health.heartbeat_timed_out(timeout, now);
        self.primary_health.evaluate(&self.config, primary_timed_out);
        self.backup_health.evaluate(&self.config, backup_timed_out);

        let mut events = Vec::new();
        if let Some(ev) = self.evaluate_failover(now) {
            events.push(ev);
        } else if let Some(ev) = self.evaluate_failback(now) {
            events.push(ev);
        }
        events
    }

    fn is_failing(&self, id: LinkId) -> bool {
        let h = self.health(id);
        matches!(h.status(), LinkStatus::Down)
            || h.rtt_ms() > self.config.rtt_threshold_ms
            || h.loss_ratio() > self.config.loss_threshold
    }

    /// Active link failing (down, or over threshold) and the other link is
    /// not itself down: switch to it.
    fn evaluate_failover(&mut self, now: Instant) -> Option<BondingEvent> {
        let standby = self.active.other();
        if self.is_failing(self.active) && self.health(standby).status() != LinkStatus::Down {
            self.switch_active(standby, now);
            return Some(BondingEvent::Failover { to: standby });
        }
        None
    }

    /// Only considered when running on the backup: once `failback_delay_ms`
    /// has elapsed since the last failover, switch back to primary if it's
    /// comfortably healthy (hysteresis margin below the failover thresholds)
    /// and not itself down.
    fn evaluate_failback(&mut self, now: Instant) -> Option<BondingEvent> {
        if self.active != LinkId::Backup {
            return None;
        }
        let Some(failed_at) = self.last_failover_at else {
            return None;
        };
        let elapsed = now.duration_since(failed_at).as_millis() as u64;
        if elapsed < self.config.failback_delay_ms {
            return None;
        }

        let primary = self.health(LinkId::Primary);
        let rtt_ok = primary.rtt_ms() < self.config.rtt_threshold_ms * self.config.rtt_hysteresis;
        let loss_ok = primary.loss_ratio() < self.config.loss_threshold * self.config.loss_hysteresis;
        let not_down = primary.status() != LinkStatus::Down;

        if rtt_ok && loss_ok && not_down {
            self.switch_active(LinkId::Primary, now);
            Some(BondingEvent::Failback)
        } else {
            None
        }
    }

    fn switch_active(&mut self, to: LinkId, now: Instant) {
        self.health_mut(self.active).set_standby();
        self.health_mut(to).set_active();
        self.active = to;
        self.last_failover_at = Some(now);
    }
}

/// What an inbound bonding HEARTBEAT turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatOutcome {
    /// Matched one of ours; RTT folded into the link's health.
    RttSampled,
    /// A fresh heartbeat from the peer; must be echoed back.
    NeedsEcho,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::UdpSocket;
    use std::time::Duration;

    fn links() -> (UdpLink, UdpLink) {
        let sock_a = UdpSocket::bind("127.0.0.1:0").unwrap();
        let sock_b = UdpSocket::bind("127.0.0.1:0").unwrap();
        let addr_a = sock_a.local_addr().unwrap();
        let addr_b = sock_b.local_addr().unwrap();
        drop(sock_a);
        drop(sock_b);
        (
            UdpLink::connect(addr_a, addr_b, "primary").unwrap(),
            UdpLink::connect(addr_b, addr_a, "backup").unwrap(),
        )
    }

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
    fn starts_with_primary_active() {
        let (p, b) = links();
        let mgr = BondingManager::new(p, b, cfg());
        assert_eq!(mgr.active(), LinkId::Primary);
        assert_eq!(mgr.health(LinkId::Primary).status(), LinkStatus::Active);
        assert_eq!(mgr.health(LinkId::Backup).status(), LinkStatus::Standby);
    }

    #[test]
    fn failover_to_backup_when_primary_down() {
        let (p, b) = links();
        let mut mgr = BondingManager::new(p, b, cfg());
        let t0 = Instant::now();

        // Drive the primary straight to Down by feeding repeated timeouts.
        mgr.primary_health.evaluate(&mgr.config.clone(), true);
        mgr.primary_health.evaluate(&mgr.config.clone(), true);
        assert_eq!(mgr.health(LinkId::Primary).status(), LinkStatus::Down);

        let events = mgr.evaluate_failover(t0);
        assert_eq!(events, Some(BondingEvent::Failover { to: LinkId::Backup }));
        assert_eq!(mgr.active(), LinkId::Backup);
    }

    #[test]
    fn no_failover_when_standby_also_down() {
        let (p, b) = links();
        let mut mgr = BondingManager::new(p, b, cfg());
        let t0 = Instant::now();

        mgr.primary_health.evaluate(&mgr.config.clone(), true);
        mgr.primary_health.evaluate(&mgr.config.clone(), true);
        mgr.backup_health.evaluate(&mgr.config.clone(), true);
        mgr.backup_health.evaluate(&mgr.config.clone(), true);
        assert_eq!(mgr.health(LinkId::Backup).status(), LinkStatus::Down);

        let events = mgr.evaluate_failover(t0);
        assert_eq!(events, None);
        assert_eq!(mgr.active(), LinkId::Primary);
    }

    #[test]
    fn failback_blocked_before_delay_elapsed() {
        let (p, b) = links();
        let mut mgr = BondingManager::new(p, b, cfg());
        let t0 = Instant::now();
        mgr.switch_active(LinkId::Backup, t0);

        let events = mgr.evaluate_failback(t0 + Duration::from_secs(5));
        assert_eq!(events, None);
        assert_eq!(mgr.active(), LinkId::Backup);
    }

    #[test]
    fn failback_after_delay_when_primary_healthy() {
        let (p, b) = links();
        let mut mgr = BondingManager::new(p, b, cfg());
        let t0 = Instant::now();
        mgr.switch_active(LinkId::Backup, t0);

        // Give the primary a healthy RTT sample well inside the hysteresis band.
        mgr.primary_health.record_heartbeat_sent(99, t0);
        mgr.primary_health
            .record_heartbeat_ack(99, t0 + Duration::from_millis(20));

        let after_delay = t0 + Duration::from_millis(cfg().failback_delay_ms) + Duration::from_secs(1);
        let events = mgr.evaluate_failback(after_delay);
        assert_eq!(events, Some(BondingEvent::Failback));
        assert_eq!(mgr.active(), LinkId::Primary);
    }

    #[test]
    fn failback_blocked_when_primary_rtt_inside_threshold_but_outside_hysteresis() {
        let (p, b) = links();
        let mut mgr = BondingManager::new(p, b, cfg());
        let t0 = Instant::now();
        mgr.switch_active(LinkId::Backup, t0);

        // 450ms is below the 500ms failover threshold but above
        // 500 * 0.8 = 400ms hysteresis margin required to fail back.
        mgr.primary_health.record_heartbeat_sent(1, t0);
        mgr.primary_health
            .record_heartbeat_ack(1, t0 + Duration::from_millis(450));

        let after_delay = t0 + Duration::from_millis(cfg().failback_delay_ms) + Duration::from_secs(1);
        let events = mgr.evaluate_failback(after_delay);
        assert_eq!(events, None);
        assert_eq!(mgr.active(), LinkId::Backup);
    }

    #[test]
    fn heartbeat_echo_needed_for_fresh_peer_heartbeat() {
        let (p, b) = links();
        let mut mgr = BondingManager::new(p, b, cfg());
        let outcome = mgr.on_heartbeat(LinkId::Primary, 777, Instant::now());
        assert_eq!(outcome, HeartbeatOutcome::NeedsEcho);
    }

    #[test]
    fn heartbeat_ack_samples_rtt_for_our_own_seq() {
        let (p, b) = links();
        let mut mgr = BondingManager::new(p, b, cfg());
        let t0 = Instant::now();
        let seq = mgr.send_heartbeat(LinkId::Primary, t0).unwrap();
        let outcome = mgr.on_heartbeat(LinkId::Primary, seq, t0 + Duration::from_millis(30));
        assert_eq!(outcome, HeartbeatOutcome::RttSampled);
        assert!(mgr.health(LinkId::Primary).rtt_ms() > 0.0);
    }
}
