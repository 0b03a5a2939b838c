//! Benchmarks for indicator implementations.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use pricewatch_indicators::{Ema, Indicator, Rsi, Sma};

fn generate_test_data(size: usize) -> Vec<f64> {
    (0..size)
        .map(|i| 100.0 + (i as f64 * 0.1).sin() * 10.0)
        .collect()
}

fn benchmark_latest(c: &mut Criterion) {
    let mut group = c.benchmark_group("latest");
    let data = generate_test_data(110);

    group.bench_with_input(BenchmarkId::new("sma", 25), &data, |b, data| {
        let sma = Sma::new(25);
        b.iter(|| sma.latest(black_box(data)))
    });
    group.bench_with_input(BenchmarkId::new("ema", 25), &data, |b, data| {
        let ema = Ema::new(25);
        b.iter(|| ema.latest(black_box(data)))
    });
    group.bench_with_input(BenchmarkId::new("rsi", 14), &data, |b, data| {
        let rsi = Rsi::new(14);
        b.iter(|| rsi.latest(black_box(data)))
    });

    group.finish();
}

fn benchmark_calculate(c: &mut Criterion) {
    let mut group = c.benchmark_group("calculate");

    for size in [1000, 10000].iter() {
        let data = generate_test_data(*size);

        group.bench_with_input(BenchmarkId::new("sma", size), &data, |b, data| {
            let sma = Sma::new(20);
            b.iter(|| sma.calculate(black_box(data)))
        });
        group.bench_with_input(BenchmarkId::new("ema", size), &data, |b, data| {
            let ema = Ema::new(20);
            b.iter(|| ema.calculate(black_box(data)))
        });
        group.bench_with_input(BenchmarkId::new("rsi", size), &data, |b, data| {
            let rsi = Rsi::new(14);
            b.iter(|| rsi.calculate(black_box(data)))
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_latest, benchmark_calculate);
criterion_main!(benches);
