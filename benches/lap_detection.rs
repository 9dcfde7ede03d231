//! Benchmarks for lap boundary detection
//!
//! The detector runs on every decoded frame, so one `update` must stay far
//! below the 16 ms frame budget. Measures:
//! - Steady-state updates mid-lap
//! - A full multi-lap drive at 60 Hz
//! - The pure signal fusion step

use criterion::{BatchSize, Criterion, Throughput, criterion_group, criterion_main};
use slipstream::TelemetryFrame;
use slipstream::lap::{DetectorSnapshot, LapDetector, fuse};
use slipstream::test_utils::FrameBuilder;
use std::f32::consts::TAU;
use std::hint::black_box;

const TRACK_LENGTH_M: f32 = 2_000.0;
const FRAMES_PER_LAP: u64 = 3_600;

/// Frames for `laps` laps around a circular track, one per 1/60 s.
fn drive(laps: u64) -> Vec<TelemetryFrame> {
    let radius = TRACK_LENGTH_M / TAU;
    (0..laps * FRAMES_PER_LAP)
        .map(|i| {
            let phase = (i % FRAMES_PER_LAP) as f32 / FRAMES_PER_LAP as f32;
            let angle = phase * TAU;
            FrameBuilder::new(i * 1_000 / 60)
                .packet_id(i as i32)
                .position(radius * angle.cos(), 0.0, radius * angle.sin())
                .speed_kmh(120.0)
                .lap((i / FRAMES_PER_LAP) as i16 + 1)
                .build()
        })
        .collect()
}

fn bench_single_update(c: &mut Criterion) {
    let frames = drive(2);
    let mut warm = LapDetector::new(TRACK_LENGTH_M);
    for frame in &frames[..FRAMES_PER_LAP as usize + 100] {
        warm.update(frame);
    }
    let next = frames[FRAMES_PER_LAP as usize + 100].clone();

    c.bench_function("update_mid_lap", |b| {
        b.iter_batched(
            || warm.clone(),
            |mut detector| black_box(detector.update(black_box(&next))),
            BatchSize::SmallInput,
        )
    });
}

fn bench_full_drive(c: &mut Criterion) {
    let frames = drive(5);

    let mut group = c.benchmark_group("drive");
    group.throughput(Throughput::Elements(frames.len() as u64));
    group.bench_function("five_laps", |b| {
        b.iter(|| {
            let mut detector = LapDetector::new(TRACK_LENGTH_M);
            let laps = frames.iter().filter_map(|frame| detector.update(frame)).count();
            black_box(laps)
        })
    });
    group.finish();
}

fn bench_fusion(c: &mut Criterion) {
    let snapshot = DetectorSnapshot {
        lap_in_progress: true,
        counter_increased: false,
        distance_to_start_m: Some(812.0),
        lap_distance_m: 1_204.0,
        track_length_m: TRACK_LENGTH_M,
    };

    c.bench_function("fuse_signals", |b| b.iter(|| black_box(fuse(black_box(&snapshot)))));
}

criterion_group!(benches, bench_single_update, bench_full_drive, bench_fusion);
criterion_main!(benches);
