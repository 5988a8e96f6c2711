//! Benchmarks for ICT detection and confluence evaluation.

use chrono::{Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ict_confluence::prelude::*;

/// Generate realistic hourly bars
fn generate_bars(n: usize) -> Vec<Bar> {
  let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
  let mut bars = Vec::with_capacity(n);
  let mut price = 1000.0;

  for i in 0..n {
    let change = ((i * 7 + 13) % 100) as f64 / 50.0 - 1.0; // Deterministic "random"
    let volatility = 2.0 + ((i * 3) % 10) as f64 / 5.0;
    let volume = 1000.0 + ((i * 11) % 40) as f64 * 25.0;

    let o = price;
    let c = price + change;
    let h = o.max(c) + volatility * 0.5;
    let l = o.min(c) - volatility * 0.5;

    bars.push(Bar::new(start + Duration::hours(i as i64), o, h, l, c, volume).unwrap());
    price = c;
  }

  bars
}

fn generate_frame(n: usize) -> Frame {
  Frame::new(generate_bars(n)).unwrap()
}

fn bench_single_detector(c: &mut Criterion) {
  let bars = generate_bars(1000);
  let detector = OrderBlockDetector::with_defaults();

  c.bench_function("order_blocks_1000_bars", |b| {
    b.iter(|| {
      let _ = black_box(detector.scan(black_box(&bars)));
    })
  });
}

fn bench_all_detectors(c: &mut Criterion) {
  let bars = generate_bars(1000);
  let detectors = BuiltinDetector::all_defaults();

  c.bench_function("all_detectors_1000_bars", |b| {
    b.iter(|| {
      let _ = black_box(Detections::collect(black_box(&detectors), black_box(&bars)));
    })
  });
}

fn bench_evaluate(c: &mut Criterion) {
  let engine = EngineBuilder::new().with_all_defaults().build().unwrap();

  let mut group = c.benchmark_group("evaluate");

  for size in [100, 500, 1000, 5000].iter() {
    let frame = generate_frame(*size);

    group.bench_with_input(BenchmarkId::new("frame", size), size, |b, _| {
      b.iter(|| {
        let _ = black_box(engine.evaluate(black_box(&frame), None));
      })
    });
  }

  group.finish();
}

fn bench_evaluate_with_htf(c: &mut Criterion) {
  let engine = EngineBuilder::new().with_all_defaults().build().unwrap();
  let frame = generate_frame(1000);
  let htf = frame.resample(Duration::hours(4)).unwrap();

  c.bench_function("evaluate_with_htf_1000_bars", |b| {
    b.iter(|| {
      let _ = black_box(engine.evaluate(black_box(&frame), Some(black_box(&htf))));
    })
  });
}

fn bench_parallel_evaluate(c: &mut Criterion) {
  let frame1 = generate_frame(1000);
  let frame2 = generate_frame(1000);
  let frame3 = generate_frame(1000);
  let frame4 = generate_frame(1000);

  let engine = EngineBuilder::new().with_all_defaults().build().unwrap();

  let instruments: Vec<(&str, &Frame)> =
    vec![("SYM1", &frame1), ("SYM2", &frame2), ("SYM3", &frame3), ("SYM4", &frame4)];

  c.bench_function("parallel_evaluate_4_instruments", |b| {
    b.iter(|| {
      let _ = black_box(evaluate_parallel(black_box(&engine), black_box(instruments.clone())));
    })
  });
}

fn bench_backtest_sweep(c: &mut Criterion) {
  let frame = generate_frame(500);
  let engine = EngineBuilder::new().with_all_defaults().build().unwrap();
  let step = Period::new(10).unwrap();
  let forward = Period::new(5).unwrap();

  c.bench_function("sweep_every_10th_bar_500_bars", |b| {
    b.iter(|| {
      let _ = black_box(engine.sweep_every(black_box(&frame), step, forward));
    })
  });
}

criterion_group!(
  benches,
  bench_single_detector,
  bench_all_detectors,
  bench_evaluate,
  bench_evaluate_with_htf,
  bench_parallel_evaluate,
  bench_backtest_sweep,
);

criterion_main!(benches);
