use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use folio_collab::protocol::{CanvasEnvelope, RelayFrame};
use folio_collab::TopicBus;
use folio_core::{CanvasSnapshot, PubSub, SessionId};
use serde_json::json;
use std::hint::black_box;
use std::sync::Arc;

fn snapshot(shapes: usize) -> CanvasSnapshot {
    let shapes: Vec<_> = (0..shapes)
        .map(|i| json!({ "id": format!("shape-{i}"), "x": i, "y": i * 2, "type": "rect" }))
        .collect();
    CanvasSnapshot::new(json!({ "shapes": shapes }))
}

/// Benchmark: wrap a whiteboard for broadcast
fn bench_envelope_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("envelope_encode");
    let session = SessionId::random();
    for shapes in [10usize, 100, 1000] {
        let snap = snapshot(shapes);
        group.bench_with_input(BenchmarkId::from_parameter(shapes), &snap, |b, snap| {
            b.iter(|| {
                let envelope = CanvasEnvelope::new(black_box(snap), session).unwrap();
                black_box(envelope.encode().unwrap())
            })
        });
    }
    group.finish();
}

/// Benchmark: relay frame decode on the server hot path
fn bench_frame_decode(c: &mut Criterion) {
    let bytes = RelayFrame::publish("canvas:bench", vec![0u8; 512]).encode().unwrap();
    c.bench_function("relay_frame_decode_512B", |b| {
        b.iter(|| black_box(RelayFrame::decode(black_box(&bytes)).unwrap()))
    });
}

/// Benchmark: 1 publication fanned out to N subscribers
fn bench_topic_fanout(c: &mut Criterion) {
    let mut group = c.benchmark_group("topic_fanout");
    for subscribers in [1usize, 10, 100] {
        let bus = TopicBus::new(1024);
        let mut subs: Vec<_> = (0..subscribers).map(|_| bus.subscribe("canvas:bench")).collect();
        let payload = Arc::new(vec![0u8; 256]);

        group.bench_function(BenchmarkId::from_parameter(subscribers), |b| {
            b.iter(|| {
                black_box(bus.publish_raw("canvas:bench", payload.clone()));
            })
        });
        // Keep receivers alive until the group is done with this size.
        subs.clear();
    }
    group.finish();
}

criterion_group!(benches, bench_envelope_encode, bench_frame_decode, bench_topic_fanout);
criterion_main!(benches);
