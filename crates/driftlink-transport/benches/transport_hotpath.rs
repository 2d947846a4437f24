//! Hot-path benchmarks for the reliability loop, smart batcher, and
//! congestion controller: the per-tick work a runtime actually does, as
//! opposed to the one-shot codec benchmarks in `packet_latency`.

use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use quanta::Instant;

use driftlink_transport::batcher::SmartBatcher;
use driftlink_transport::congestion::{CongestionConfig, CongestionController};
use driftlink_transport::crypto::SecretKey;
use driftlink_transport::delta::{DeltaEnvelope, PathValue, Update};
use driftlink_transport::reliability::{ReliabilityRx, ReliabilityTx, RxConfig, TxConfig};
use driftlink_transport::tracker::TrackerConfig;

fn key() -> SecretKey {
    SecretKey::from_bytes([5u8; 32])
}

fn tx_config() -> TxConfig {
    TxConfig {
        mtu: 1400,
        compress: true,
        encrypt: true,
        retransmit_queue_size: 1024,
        max_retransmits: 5,
        retransmit_max_age: Duration::from_secs(10),
    }
}

fn rx_config() -> RxConfig {
    RxConfig {
        decrypt: true,
        tracker: TrackerConfig::default(),
    }
}

fn sample_delta() -> DeltaEnvelope {
    DeltaEnvelope {
        context: "vessels.self".into(),
        updates: vec![Update {
            timestamp: "2026-07-28T00:00:00Z".into(),
            source: Some("nmea0183".into()),
            values: vec![PathValue {
                path: "navigation.speedOverGround".into(),
                value: serde_json::json!(4.2),
            }],
        }],
    }
}

fn bench_submit_until_early_send(c: &mut Criterion) {
    c.bench_function("tx_submit_batch_of_5", |b| {
        b.iter(|| {
            let mut tx = ReliabilityTx::new(tx_config(), key());
            let now = Instant::now();
            for _ in 0..5 {
                black_box(tx.submit(sample_delta(), now, 1000));
            }
        });
    });
}

fn bench_submit_then_receive_roundtrip(c: &mut Criterion) {
    let mut group = c.benchmark_group("submit_then_receive");
    group.throughput(Throughput::Elements(5));
    group.bench_function("batch_of_5", |b| {
        b.iter(|| {
            let mut tx = ReliabilityTx::new(tx_config(), key());
            let mut rx = ReliabilityRx::new(rx_config(), key());
            let now = Instant::now();
            let mut frame = None;
            for _ in 0..5 {
                if let Some(f) = tx.submit(sample_delta(), now, 1000) {
                    frame = Some(f);
                }
            }
            let frame = frame.unwrap();
            black_box(rx.on_datagram(&frame.bytes, now));
        });
    });
    group.finish();
}

fn bench_on_nak_retransmit(c: &mut Criterion) {
    c.bench_function("tx_on_nak_single_seq", |b| {
        b.iter(|| {
            let mut tx = ReliabilityTx::new(tx_config(), key());
            let now = Instant::now();
            for _ in 0..5 {
                tx.submit(sample_delta(), now, 1000);
            }
            black_box(tx.on_nak(&[0], now));
        });
    });
}

fn bench_batcher_enqueue(c: &mut Criterion) {
    c.bench_function("batcher_enqueue_single", |b| {
        b.iter(|| {
            let mut batcher = SmartBatcher::new(1400);
            let now = Instant::now();
            black_box(batcher.enqueue(sample_delta(), now, 1000));
        });
    });
}

fn bench_congestion_tick(c: &mut Criterion) {
    c.bench_function("congestion_tick_after_samples", |b| {
        b.iter(|| {
            let mut controller = CongestionController::new(CongestionConfig::default());
            let now = Instant::now();
            controller.on_rtt_sample(250.0);
            controller.on_loss_sample(0.02);
            black_box(controller.tick(now));
        });
    });
}

criterion_group!(
    benches,
    bench_submit_until_early_send,
    bench_submit_then_receive_roundtrip,
    bench_on_nak_retransmit,
    bench_batcher_enqueue,
    bench_congestion_tick,
);
criterion_main!(benches);
