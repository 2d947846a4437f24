//! # Role Runtime
//!
//! The single-threaded cooperative event loop that drives one role (client
//! or server): pulls deltas from the host, hands them to the reliability
//! TX, polls both bonded links for inbound datagrams, dispatches by packet
//! type, and runs the bonding manager's health checks and the congestion
//! controller on their own cadences — all from one `tick()`, no worker
//! threads of its own (spec §5).

use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use std::{io, thread};

use quanta::Instant;

use driftlink_transport::config::{BondingConfig, DriftlinkConfig, LinkEndpoint};
use driftlink_transport::congestion::CongestionController;
use driftlink_transport::crypto::SecretKey;
use driftlink_transport::error::DriftlinkError;
use driftlink_transport::host::Host;
use driftlink_transport::reliability::{ReliabilityRx, ReliabilityTx, RxConfig, RxEvent, TxConfig};
use driftlink_transport::tracker::TrackerConfig;
use driftlink_transport::wire::{self, PacketType};

use crate::link::UdpLink;
use crate::manager::{BondingEvent, BondingManager, HeartbeatOutcome, LinkId};

/// Path MTU used when sizing batches. Marine VSAT/cellular links rarely
/// exceed standard Ethernet MTU end to end; conservative default.
const DEFAULT_MTU: usize = 1400;
const MAX_DATAGRAMS_PER_LINK_PER_TICK: usize = 256;
const HOST_POLL_BATCH: usize = 64;
const LOOP_SLEEP: Duration = Duration::from_millis(10);

/// Drives [`BondingManager`], [`ReliabilityTx`]/[`ReliabilityRx`], and
/// [`CongestionController`] for one client or server instance.
pub struct RoleRuntime {
    bonding: BondingManager,
    tx: ReliabilityTx,
    rx: ReliabilityRx,
    congestion: CongestionController,
    host: Box<dyn Host>,
    health_check_interval: Duration,
    last_health_check_at: Option<Instant>,
}

impl RoleRuntime {
    /// Build the runtime from a validated [`DriftlinkConfig`]. Requires a
    /// `[bonding]` section — this crate only runs the bonded active/standby
    /// path; a single-link deployment is `driftlink-transport` driven
    /// directly without a `RoleRuntime`.
    pub fn new(config: &DriftlinkConfig, host: Box<dyn Host>) -> Result<Self, DriftlinkError> {
        let bonding_cfg = config
            .bonding
            .as_ref()
            .ok_or_else(|| DriftlinkError::Config("driftlink-bonding requires a [bonding] section".into()))?;

        let (primary, backup) = build_links(bonding_cfg)
            .map_err(|e| DriftlinkError::Config(format!("failed to bind bonded links: {e}")))?;

        let health_check_interval = Duration::from_millis(bonding_cfg.failover.health_check_interval_ms);
        let bonding = BondingManager::new(primary, backup, bonding_cfg.failover.clone());

        let key = SecretKey::from_bytes(config.secret_key_bytes());

        let tx_config = TxConfig {
            mtu: DEFAULT_MTU,
            compress: true,
            encrypt: true,
            retransmit_queue_size: config.reliability.retransmit_queue_size,
            max_retransmits: config.reliability.max_retransmits,
            retransmit_max_age: Duration::from_millis(config.reliability.retransmit_max_age_ms),
        };
        let tx = ReliabilityTx::new(tx_config, key.clone());

        let tracker_config = TrackerConfig {
            nak_timeout: Duration::from_millis(config.reliability.nak_timeout_ms),
            ..TrackerConfig::default()
        };
        let rx = ReliabilityRx::new(
            RxConfig {
                decrypt: true,
                tracker: tracker_config,
            },
            key,
        );

        let congestion = CongestionController::new(config.congestion_control.to_controller_config());

        Ok(RoleRuntime {
            bonding,
            tx,
            rx,
            congestion,
            host,
            health_check_interval,
            last_health_check_at: None,
        })
    }

    pub fn active_link(&self) -> LinkId {
        self.bonding.active()
    }

    /// Run one full iteration: drain host-side outbound deltas, flush a
    /// timed-out batch, service both links' inbound datagrams, and run the
    /// bonding/congestion cadences if due.
    pub fn tick(&mut self, now: Instant) {
        self.drain_host_outbound(now);

        if let Some(frame) = self.tx.poll_timer(now) {
            self.send_on_active(&frame.bytes);
        }
        self.tx.expire_old(now);

        self.poll_inbound(LinkId::Primary, now);
        self.poll_inbound(LinkId::Backup, now);

        if let Some(RxEvent::SendNak { missing }) = self.rx.poll_nak_timers(now) {
            self.send_on_active(&wire::build_nak(&missing));
        }

        self.maybe_health_check(now);
        self.maybe_congestion_tick(now);
    }

    /// Blocking loop for the binaries; runs `tick()` until `running` is
    /// cleared (typically by a ctrlc handler).
    pub fn run(&mut self, running: Arc<AtomicBool>) {
        while running.load(Ordering::Relaxed) {
            self.tick(Instant::now());
            thread::sleep(LOOP_SLEEP);
        }
    }

    fn drain_host_outbound(&mut self, now: Instant) {
        let deltas = self.host.poll_outbound_deltas(HOST_POLL_BATCH);
        if deltas.is_empty() {
            return;
        }
        let timer_ms = self.congestion.current_timer_ms();
        for delta in deltas {
            if let Some(frame) = self.tx.submit(delta, now, timer_ms) {
                self.send_on_active(&frame.bytes);
            }
        }
    }

    fn poll_inbound(&mut self, id: LinkId, now: Instant) {
        let mut buf = [0u8; 2048];
        for _ in 0..MAX_DATAGRAMS_PER_LINK_PER_TICK {
            match self.bonding.link(id).try_recv(&mut buf) {
                Ok(Some(n)) => self.handle_inbound(id, &buf[..n], now),
                Ok(None) => break,
                Err(e) => {
                    self.host
                        .log_error(&format!("recv failed on {}: {e}", self.bonding.link(id).label()));
                    break;
                }
            }
        }
    }

    fn handle_inbound(&mut self, id: LinkId, raw: &[u8], now: Instant) {
        let (header, payload) = match wire::parse(raw) {
            Ok(v) => v,
            Err(_) => return,
        };

        match header.packet_type {
            // Bonding heartbeats are handled here, never through
            // ReliabilityRx::on_datagram, which echoes any inbound HEARTBEAT
            // unconditionally — fine for a single data channel, but each
            // bonded link runs its own HEARTBEAT sequence for RTT sampling,
            // and blind echoing would ping-pong a sampled reply forever.
            PacketType::Heartbeat => self.handle_heartbeat(id, header.sequence, now),
            PacketType::Ack => {
                if let Some(cum) = wire::parse_ack_payload(payload) {
                    self.tx.on_ack(cum);
                }
            }
            PacketType::Nak => {
                if let Some(missing) = wire::parse_nak_payload(payload) {
                    let frames = self.tx.on_nak(&missing, now);
                    for frame in frames {
                        self.send_on_active(&frame.bytes);
                    }
                }
            }
            PacketType::Data | PacketType::Hello => {
                let events = self.rx.on_datagram(raw, now);
                self.handle_rx_events(events);
            }
        }
    }

    fn handle_heartbeat(&mut self, id: LinkId, seq: u32, now: Instant) {
        match self.bonding.on_heartbeat(id, seq, now) {
            HeartbeatOutcome::NeedsEcho => {
                if let Err(e) = self.bonding.echo_heartbeat(id, seq) {
                    self.host
                        .log_error(&format!("heartbeat echo failed on {}: {e}", self.bonding.link(id).label()));
                }
            }
            HeartbeatOutcome::RttSampled => {
                if self.bonding.active() == id {
                    let rtt = self.bonding.health(id).rtt_ms();
                    self.congestion.on_rtt_sample(rtt);
                }
            }
        }
    }

    fn handle_rx_events(&mut self, events: Vec<RxEvent>) {
        for ev in events {
            match ev {
                RxEvent::Deliver(delta) => {
                    if !self.host.is_self_origin(&delta) {
                        self.host.emit_delta_to_host(delta);
                    }
                }
                RxEvent::SendAck { cumulative_seq } => {
                    self.send_on_active(&wire::build_ack(cumulative_seq));
                }
                RxEvent::SendNak { missing } => {
                    self.send_on_active(&wire::build_nak(&missing));
                }
                // Only reachable in principle; PacketType::Heartbeat never
                // reaches ReliabilityRx::on_datagram (see handle_inbound).
                RxEvent::SendHeartbeatEcho { seq } => {
                    self.send_on_active(&wire::build_heartbeat(seq));
                }
                RxEvent::Dropped => {}
            }
        }
    }

    fn maybe_health_check(&mut self, now: Instant) {
        let due = match self.last_health_check_at {
            Some(t) => now.duration_since(t) >= self.health_check_interval,
            None => true,
        };
        if !due {
            return;
        }
        self.last_health_check_at = Some(now);

        let before = self.bonding.active();
        for ev in self.bonding.health_check_tick(now) {
            match ev {
                BondingEvent::Failover { to } => {
                    self.host.log_error(&format!("bonding failover: {before:?} -> {to:?}"));
                }
                BondingEvent::Failback => {
                    self.host.log_debug("bonding failback to primary");
                }
            }
        }

        let active = self.bonding.active();
        let loss = self.bonding.health(active).loss_ratio();
        self.congestion.on_loss_sample(loss);
    }

    fn maybe_congestion_tick(&mut self, now: Instant) {
        if let Some(new_timer) = self.congestion.tick(now) {
            self.host.log_debug(&format!("congestion timer adjusted to {new_timer}ms"));
        }
    }

    fn send_on_active(&mut self, bytes: &[u8]) {
        let label = self.bonding.active_link().label();
        if let Err(e) = self.bonding.active_link().send(bytes) {
            self.host.log_error(&format!("send failed on {label}: {e}"));
        }
    }
}

fn build_links(bonding_cfg: &BondingConfig) -> io::Result<(UdpLink, UdpLink)> {
    let primary = connect_endpoint(&bonding_cfg.primary, "primary")?;
    let backup = connect_endpoint(&bonding_cfg.backup, "backup")?;
    Ok((primary, backup))
}

fn connect_endpoint(endpoint: &LinkEndpoint, label: &'static str) -> io::Result<UdpLink> {
    // Binding to a specific NIC (e.g. to pin a link to a cellular modem vs.
    // a satellite terminal) is not implemented; `interface` is accepted as
    // a configuration hint for operators but both links share the default
    // route.
    let remote: SocketAddr = (endpoint.address.as_str(), endpoint.port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("could not resolve {}", endpoint.address)))?;
    let local_bind: SocketAddr = if remote.is_ipv6() {
        "[::]:0".parse().unwrap()
    } else {
        "0.0.0.0:0".parse().unwrap()
    };
    UdpLink::connect(local_bind, remote, label)
}

#[cfg(test)]
mod tests {
    use super::*;
    use driftlink_transport::congestion::CongestionConfig;
    use driftlink_transport::delta::DeltaEnvelope;
    use std::collections::VecDeque;
    use std::net::UdpSocket;

    #[derive(Default)]
    struct TestHost {
        outbound: VecDeque<DeltaEnvelope>,
        inbound: Vec<DeltaEnvelope>,
    }

    impl Host for TestHost {
        fn emit_delta_to_host(&mut self, delta: DeltaEnvelope) {
            self.inbound.push(delta);
        }

        fn poll_outbound_deltas(&mut self, max: usize) -> Vec<DeltaEnvelope> {
            let n = max.min(self.outbound.len());
            self.outbound.drain(..n).collect()
        }
    }

    fn test_config(primary_port: u16, backup_port: u16) -> DriftlinkConfig {
        let toml = format!(
            r#"
serverType = "client"
secretKey = "abcdefgh01234567890123456789012"
udpPort = 4000
protocolVersion = 2

[bonding]
enabled = true

[bonding.primary]
address = "127.0.0.1"
port = {primary_port}

[bonding.backup]
address = "127.0.0.1"
port = {backup_port}
"#
        );
        DriftlinkConfig::from_toml(&toml).unwrap()
    }

    fn free_port() -> u16 {
        let sock = UdpSocket::bind("127.0.0.1:0").unwrap();
        sock.local_addr().unwrap().port()
    }

    #[test]
    fn runtime_requires_bonding_section() {
        let toml = r#"
serverType = "client"
secretKey = "abcdefgh01234567890123456789012"
udpPort = 4000
protocolVersion = 2
"#;
        let config = DriftlinkConfig::from_toml(toml).unwrap();
        let host = Box::new(TestHost::default());
        assert!(RoleRuntime::new(&config, host).is_err());
    }

    #[test]
    fn tick_flushes_a_submitted_delta_out_the_active_link() {
        let server_primary = free_port();
        let server_backup = free_port();
        let client_config = test_config(server_primary, server_backup);

        let peer_primary = UdpSocket::bind(("127.0.0.1", server_primary)).unwrap();
        peer_primary.set_nonblocking(true).unwrap();

        let mut host = TestHost::default();
        host.outbound.push_back(DeltaEnvelope {
            context: "vessels.self".into(),
            updates: vec![],
        });
        let mut runtime = RoleRuntime::new(&client_config, Box::new(host)).unwrap();

        // Force an immediate flush regardless of batch timer state.
        runtime.congestion = CongestionController::new(CongestionConfig {
            nominal_delta_timer_ms: 0,
            min_delta_timer_ms: 0,
            ..Default::default()
        });

        runtime.tick(Instant::now());
        std::thread::sleep(Duration::from_millis(20));
        runtime.tick(Instant::now());

        let mut buf = [0u8; 2048];
        let mut received = false;
        for _ in 0..50 {
            if peer_primary.recv(&mut buf).is_ok() {
                received = true;
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(received, "expected a DATA frame on the primary link");
    }
}
