//! Benchmarks for batch classification.

use chrono::{NaiveDate, NaiveTime};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use orderflow::batch::{BatchClassifier, BatchTable, FixedClock};
use std::sync::Arc;

fn classifier_benchmark(c: &mut Criterion) {
    let now = NaiveDate::from_ymd_opt(2024, 3, 1)
        .and_then(|d| d.and_hms_opt(8, 30, 0))
        .unwrap_or_default();
    let classifier = BatchClassifier::with_clock(Arc::new(FixedClock::new(now)));
    let minutes: Vec<NaiveTime> = (0..24 * 60)
        .filter_map(|m| NaiveTime::from_hms_opt(m / 60, m % 60, 0))
        .collect();

    c.bench_function("classify_full_day", |b| {
        b.iter(|| {
            for time in &minutes {
                black_box(classifier.classify(*time));
            }
        });
    });

    c.bench_function("validate_mismatch", |b| {
        b.iter(|| black_box(classifier.validate(black_box("4차"))));
    });

    c.bench_function("standard_table", |b| b.iter(|| black_box(BatchTable::standard())));
}

criterion_group!(benches, classifier_benchmark);
criterion_main!(benches);
