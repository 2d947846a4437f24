use std::net::UdpSocket;

use criterion::{criterion_group, criterion_main, Criterion};
use driftlink_bonding::link::UdpLink;
use driftlink_bonding::manager::BondingManager;
use driftlink_transport::config::FailoverConfig;
use quanta::Instant;

fn bonded_links() -> (UdpLink, UdpLink) {
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

fn health_check_tick(c: &mut Criterion) {
    let (p, b) = bonded_links();
    let mut mgr = BondingManager::new(p, b, FailoverConfig::default());
    let now = Instant::now();
    c.bench_function("bonding_manager_health_check_tick", |bencher| {
        bencher.iter(|| mgr.health_check_tick(now));
    });
}

criterion_group!(benches, health_check_tick);
criterion_main!(benches);
