use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use std::time::Duration;

use foodlog::idempotency::{
    canonical_body, Decision, Fingerprint, IdempotencyStore, InMemoryIdempotencyStore,
    ResponseSnapshot,
};
use foodlog::observability::mask_sensitive;
use foodlog::scheduler::resolve_interval_minutes;

fn food_log_body(entries: usize) -> Vec<u8> {
    let items: Vec<String> = (0..entries)
        .map(|i| format!(r#"{{"foodName":"Item {}","calories":{},"tags":["a","b"]}}"#, i, i * 10))
        .collect();
    format!(r#"{{"meal":"lunch","items":[{}]}}"#, items.join(",")).into_bytes()
}

fn benchmark_fingerprint(c: &mut Criterion) {
    let mut group = c.benchmark_group("fingerprint");
    group.measurement_time(Duration::from_secs(5));

    for size in [1, 10, 100].iter() {
        let body = food_log_body(*size);
        group.bench_with_input(BenchmarkId::new("compute_json", size), &body, |b, body| {
            b.iter(|| black_box(Fingerprint::compute("POST", "/logs", black_box(body))));
        });
        group.bench_with_input(BenchmarkId::new("canonical_body", size), &body, |b, body| {
            b.iter(|| black_box(canonical_body(black_box(body)).len()));
        });
    }

    group.bench_function("compute_non_json", |b| {
        let body = vec![0xABu8; 4096];
        b.iter(|| black_box(Fingerprint::compute("POST", "/logs", black_box(&body))));
    });

    group.finish();
}

fn benchmark_in_memory_store(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("in_memory_store");
    let fingerprint = Fingerprint::compute("POST", "/logs", br#"{"foodName":"Apple"}"#);
    let snapshot = ResponseSnapshot {
        status: 201,
        content_type: Some("application/json".to_string()),
        body: br#"{"success":true}"#.to_vec(),
    };

    group.bench_function("begin_complete", |b| {
        let store = Arc::new(InMemoryIdempotencyStore::default());
        let mut counter = 0u64;
        b.to_async(&runtime).iter(|| {
            counter += 1;
            let key = format!("bench-{}", counter);
            let store = Arc::clone(&store);
            let fingerprint = fingerprint.clone();
            let snapshot = snapshot.clone();
            async move {
                if let Ok(Decision::Proceed(lease)) = store.begin(&key, &fingerprint).await {
                    let _ = store.complete(&lease, &snapshot).await;
                }
            }
        });
    });

    group.bench_function("replay", |b| {
        let store = Arc::new(InMemoryIdempotencyStore::default());
        runtime.block_on(async {
            if let Ok(Decision::Proceed(lease)) = store.begin("hot", &fingerprint).await {
                let _ = store.complete(&lease, &snapshot).await;
            }
        });

        b.to_async(&runtime).iter(|| {
            let store = Arc::clone(&store);
            let fingerprint = fingerprint.clone();
            async move { black_box(store.begin("hot", &fingerprint).await) }
        });
    });

    group.finish();
}

fn benchmark_helpers(c: &mut Criterion) {
    let mut group = c.benchmark_group("helpers");

    group.bench_function("resolve_interval", |b| {
        b.iter(|| {
            black_box(resolve_interval_minutes(black_box(Some("15")), 60));
            black_box(resolve_interval_minutes(black_box(Some("soon")), 60));
        });
    });

    group.bench_function("mask_key", |b| {
        b.iter(|| black_box(mask_sensitive(black_box("7f3c9a2e-client-token"), 4)));
    });

    group.finish();
}

criterion_group!(
    benches,
    benchmark_fingerprint,
    benchmark_in_memory_store,
    benchmark_helpers,
);

criterion_main!(benches);
