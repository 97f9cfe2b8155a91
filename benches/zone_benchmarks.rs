use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::{json, Value};

use hrzones::batch::{ActivityRef, BatchConfig, ZoneProcessor};
use hrzones::models::{Activity, ActivityId};
use hrzones::series::{RawActivityDetail, SampleSeries, ELAPSED_TIME_KEY, HEART_RATE_KEY};
use hrzones::store::{MemoryActivityStore, MemoryDetailStore};
use hrzones::zones::{UnclassifiedMode, ZoneAccumulator, RUNNING_ZONES};

/// One sample per second with a slowly varying heart rate and occasional gaps
fn synthetic_detail(samples: usize) -> RawActivityDetail {
    let rows = (0..samples)
        .map(|i| {
            let hr = if i % 97 == 0 {
                Value::Null
            } else {
                json!(110.0 + ((i as f64) / 40.0).sin() * 60.0)
            };
            vec![json!(i as f64), hr]
        })
        .collect();
    RawActivityDetail::from_columns(&[(ELAPSED_TIME_KEY, 0), (HEART_RATE_KEY, 1)], rows)
}

fn bench_accumulate(c: &mut Criterion) {
    let mut group = c.benchmark_group("Zone Accumulation");

    // Roughly 10 minutes to 4 hours at 1 Hz
    for &size in &[600, 3600, 14400] {
        let detail = synthetic_detail(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("accumulate", size), &detail, |b, detail| {
            let accumulator = ZoneAccumulator::new(&RUNNING_ZONES, UnclassifiedMode::Count);
            b.iter(|| {
                let series = SampleSeries::from_detail(1, black_box(detail)).unwrap();
                accumulator.accumulate(&series).unwrap()
            });
        });
    }

    group.finish();
}

fn bench_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("Batch Processing");
    group.sample_size(10);

    for &count in &[10usize, 100] {
        let details = MemoryDetailStore::new();
        let activities: Vec<Activity> = (0..count as ActivityId)
            .map(|id| {
                details.insert(id, synthetic_detail(3600));
                Activity::new(id, "2025-01-01 07:00:00", if id % 2 == 0 { "running" } else { "cycling" })
            })
            .collect();
        let metadata = MemoryActivityStore::with_activities(activities.clone());
        let refs: Vec<ActivityRef> = activities.iter().map(ActivityRef::from).collect();

        let processor = ZoneProcessor::with_config(
            details,
            metadata,
            BatchConfig {
                show_progress: false,
                ..BatchConfig::default()
            },
        );

        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("process", count), &refs, |b, refs| {
            b.iter(|| processor.process(black_box(refs)));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_accumulate, bench_batch);
criterion_main!(benches);
