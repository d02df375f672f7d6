//! Dispatch Throughput Benchmarks
//!
//! Validates dispatch-loop performance under strict, WFQ, and hybrid
//! policies across growing class counts and queue depths.

use admission_core::capacity::{CapacityGuardian, CapacityLimits};
use admission_core::clock;
use admission_core::request::Request;
use admission_core::scheduler::{dispatch, DispatchPolicy, PriorityScheduler, SchedulerConfig};
use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

/// Benchmark a single submit+dispatch round trip for each policy.
fn bench_submit_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("submit_dispatch");

    for policy in [DispatchPolicy::Strict, DispatchPolicy::Wfq, DispatchPolicy::Hybrid] {
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{:?}", policy)),
            &policy,
            |b, &policy| {
                let rt = tokio::runtime::Runtime::new().unwrap();
                b.to_async(&rt).iter(|| async move {
                    let capacity = CapacityGuardian::spawn(CapacityLimits::default());
                    let scheduler = PriorityScheduler::new(
                        SchedulerConfig {
                            policy,
                            ..SchedulerConfig::default()
                        },
                        capacity,
                        clock::system(),
                    );

                    let now = Utc::now();
                    let (request, rx) = Request::new("bench", 3, 10, "acct", "model", chrono::Duration::seconds(5), now);
                    let ack = black_box(scheduler.submit(request).await.unwrap());
                    assert!(ack.accepted);
                    let _result = rx.await.unwrap();
                    scheduler.shutdown();
                });
            },
        );
    }

    group.finish();
}

/// Benchmark queue backlog growth across increasing class counts (strict
/// dispatch never touches lower classes while a higher one is non-empty, so
/// depth scales with `L` directly).
fn bench_queue_depth_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue_depth_scaling");

    for num_levels in [4u8, 10, 32] {
        group.throughput(Throughput::Elements(num_levels as u64));
        group.bench_with_input(BenchmarkId::from_parameter(num_levels), &num_levels, |b, &num_levels| {
            let rt = tokio::runtime::Runtime::new().unwrap();
            b.to_async(&rt).iter(|| async move {
                let capacity = CapacityGuardian::spawn(CapacityLimits::new(0, 0, 1, 0));
                let scheduler = PriorityScheduler::new(
                    SchedulerConfig {
                        num_priority_levels: num_levels as usize,
                        policy: DispatchPolicy::Hybrid,
                        ..SchedulerConfig::default()
                    },
                    capacity,
                    clock::system(),
                );

                let now = Utc::now();
                let mut receivers = Vec::new();
                for class in 0..num_levels {
                    let (request, rx) = Request::new(
                        format!("bench-{class}"),
                        class,
                        10,
                        "acct",
                        "model",
                        chrono::Duration::seconds(5),
                        now,
                    );
                    let _ack = black_box(scheduler.submit(request).await.unwrap());
                    receivers.push(rx);
                }
                scheduler.shutdown();
            });
        });
    }

    group.finish();
}

/// Benchmark the WFQ deficit-counter selection hot path in isolation, with
/// no scheduler/capacity/channel overhead.
fn bench_wfq_select(c: &mut Criterion) {
    let mut group = c.benchmark_group("wfq_select");
    group.throughput(Throughput::Elements(1));

    group.bench_function("select_10_classes", |b| {
        let mut state = dispatch::WfqState::new(dispatch::default_weights(10), 1000);
        let non_empty = vec![true; 10];
        b.iter(|| {
            state.tick(0);
            let selected = black_box(state.select(&non_empty, 0));
            if let Some(class) = selected {
                state.charge(class, dispatch::dispatch_cost(10));
            }
        });
    });

    group.finish();
}

criterion_group!(benches, bench_submit_dispatch, bench_queue_depth_scaling, bench_wfq_select);
criterion_main!(benches);
