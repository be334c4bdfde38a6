use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use rtevent_runtime::{IdleQueue, TimerKind, TimerQueues};

fn bench_schedule(c: &mut Criterion) {
    let mut group = c.benchmark_group("timer_schedule");
    for size in [0usize, 64, 1024] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let queues = TimerQueues::new();
            for i in 0..size {
                queues.schedule((i * 1000) as i64, TimerKind::Monotonic, || {});
            }
            b.iter(|| {
                let token = queues.schedule(i64::MAX, TimerKind::Monotonic, || {});
                queues.cancel(token);
            });
        });
    }
    group.finish();
}

fn bench_service_empty_queue(c: &mut Criterion) {
    let queues = TimerQueues::new();
    c.bench_function("service_empty_queue", |b| {
        b.iter(|| queues.service(0, 0));
    });
}

fn bench_idle_queue_round_trip(c: &mut Criterion) {
    let idle = IdleQueue::new();
    c.bench_function("idle_queue_round_trip", |b| {
        b.iter(|| {
            idle.queue(|| {});
            idle.run_pending();
        });
    });
}

criterion_group!(benches, bench_schedule, bench_service_empty_queue, bench_idle_queue_round_trip);
criterion_main!(benches);
