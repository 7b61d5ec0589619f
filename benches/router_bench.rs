//! Router scoring and descriptor-set benchmarks, grounded on the
//! teacher's `benches/message_routing.rs` shape (criterion groups over
//! varying descriptor counts and concurrency levels).

use std::sync::Arc;
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use packetflow::config::RouterConfig;
use packetflow::domain::{Atom, ReactorDescriptor, Specialization, Value};
use packetflow::router::Router;

fn populated_router(descriptor_count: usize) -> Router {
    let router = Router::new(RouterConfig::default());
    for i in 0..descriptor_count {
        let specializations = match i % 4 {
            0 => vec![Specialization::CpuBound],
            1 => vec![Specialization::IoBound],
            2 => vec![Specialization::MemoryBound],
            _ => vec![Specialization::General],
        };
        router.add(ReactorDescriptor::new(format!("reactor-{i}"), format!("localhost:{}", 9000 + i), specializations, 100));
    }
    router
}

fn bench_route_single_atom(c: &mut Criterion) {
    let mut group = c.benchmark_group("route_single_atom");
    group.measurement_time(Duration::from_secs(5));

    for descriptor_count in [1, 10, 100, 1000] {
        group.bench_with_input(BenchmarkId::new("descriptors", descriptor_count), &descriptor_count, |b, &count| {
            let router = populated_router(count);
            let atom = Atom::new("bench-atom", "cf", "ping", Value::empty_map());
            b.iter(|| {
                black_box(router.route(&atom));
            });
        });
    }

    group.finish();
}

fn bench_concurrent_routing(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("concurrent_routing");
    group.measurement_time(Duration::from_secs(5));

    for concurrency in [1, 4, 16, 64] {
        group.bench_with_input(BenchmarkId::new("tasks", concurrency), &concurrency, |b, &concurrency| {
            let router = Arc::new(populated_router(50));
            b.to_async(&rt).iter(|| {
                let router = Arc::clone(&router);
                async move {
                    let mut handles = Vec::with_capacity(concurrency);
                    for i in 0..concurrency {
                        let router = Arc::clone(&router);
                        handles.push(tokio::spawn(async move {
                            let atom = Atom::new(format!("atom-{i}"), "cf", "ping", Value::empty_map());
                            black_box(router.route(&atom))
                        }));
                    }
                    for handle in handles {
                        let _ = handle.await;
                    }
                }
            });
        });
    }

    group.finish();
}

fn bench_update_load(c: &mut Criterion) {
    let mut group = c.benchmark_group("update_load");
    group.measurement_time(Duration::from_secs(5));

    group.bench_function("update_load_single_descriptor", |b| {
        let router = populated_router(100);
        b.iter(|| {
            router.update_load("reactor-0", 0.5);
        });
    });

    group.finish();
}

criterion_group!(benches, bench_route_single_atom, bench_concurrent_routing, bench_update_load);
criterion_main!(benches);
