//! Benchmarks for the scheduler's hot paths.
//!
//! Benchmarks cover:
//! - Task classification
//! - Dead-letter enqueue at capacity (eviction path)
//! - Circuit breaker call overhead, closed and open
//! - Recovery manager breaker lookup

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use std::time::Duration;

use tokio::runtime::Runtime;
use unified_scheduler::core::{
    classify, CircuitBreaker, CircuitBreakerConfig, Complexity, DeadLetterInput, DeadLetterQueue,
    Durability, ErrorRecord, ErrorRecoveryManager, Frequency, Infrastructure, TaskCharacteristics,
    Visibility,
};

// ============================================================================
// Classification
// ============================================================================

fn bench_classify(c: &mut Criterion) {
    let mut all = Vec::new();
    for f in [Frequency::High, Frequency::Low, Frequency::OneShot] {
        for v in [Visibility::Internal, Visibility::UserFacing] {
            for cx in [Complexity::Simple, Complexity::MultiStep] {
                for d in [Durability::Ephemeral, Durability::MustSurviveRestart] {
                    for i in [Infrastructure::Local, Infrastructure::RequiresExternalWorkers] {
                        all.push(TaskCharacteristics::new(f, v, cx, d, i));
                    }
                }
            }
        }
    }

    let mut group = c.benchmark_group("classify");
    group.throughput(Throughput::Elements(all.len() as u64));
    group.bench_function("all_combinations", |b| {
        b.iter(|| {
            for characteristics in &all {
                black_box(classify(black_box(characteristics)));
            }
        });
    });
    group.finish();
}

// ============================================================================
// Dead-Letter Queue
// ============================================================================

fn bench_dead_letter_enqueue(c: &mut Criterion) {
    let mut group = c.benchmark_group("dead_letter_enqueue");

    for capacity in [100usize, 1_000, 10_000] {
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(
            BenchmarkId::from_parameter(capacity),
            &capacity,
            |b, &capacity| {
                let queue = DeadLetterQueue::new(capacity);
                for i in 0..capacity {
                    queue
                        .enqueue(DeadLetterInput::new(
                            format!("op-{}", i % 8),
                            ErrorRecord::new("SchedulerError", "down"),
                        ))
                        .unwrap();
                }
                // Queue is full: every iteration evicts the oldest entry.
                b.iter(|| {
                    queue
                        .enqueue(DeadLetterInput::new(
                            "durable_queue.enqueue",
                            ErrorRecord::new("SchedulerError", "down"),
                        ))
                        .unwrap();
                });
            },
        );
    }
    group.finish();
}

fn bench_dead_letter_statistics(c: &mut Criterion) {
    let queue = DeadLetterQueue::new(10_000);
    for i in 0..10_000 {
        queue
            .enqueue(DeadLetterInput::new(
                format!("op-{}", i % 16),
                ErrorRecord::new(format!("Error{}", i % 4), "down"),
            ))
            .unwrap();
    }

    c.bench_function("dead_letter_statistics_10k", |b| {
        b.iter(|| black_box(queue.get_statistics()));
    });
}

// ============================================================================
// Circuit Breaker
// ============================================================================

fn bench_breaker_call(c: &mut Criterion) {
    let mut group = c.benchmark_group("circuit_breaker_call");

    let closed = CircuitBreaker::new("bench.closed", CircuitBreakerConfig::default());
    group.bench_function("closed_success", |b| {
        b.to_async(Runtime::new().unwrap()).iter(|| async {
            let result = closed.call(|| async { Ok::<_, String>(1u64) }).await;
            black_box(result.is_ok());
        });
    });

    let open = CircuitBreaker::new(
        "bench.open",
        CircuitBreakerConfig {
            failure_threshold: 1,
            recovery_timeout: Duration::from_secs(3_600),
            success_threshold: 1,
        },
    );
    open.force_open();
    group.bench_function("open_rejection", |b| {
        b.to_async(Runtime::new().unwrap()).iter(|| async {
            let result = open.call(|| async { Ok::<_, String>(1u64) }).await;
            black_box(result.is_err());
        });
    });

    group.finish();
}

fn bench_breaker_lookup(c: &mut Criterion) {
    let manager = ErrorRecoveryManager::default();
    for i in 0..64 {
        manager.get_or_create_circuit_breaker(&format!("task.job-{i}"), None, None);
    }

    c.bench_function("recovery_breaker_lookup_64", |b| {
        b.iter(|| black_box(manager.get_or_create_circuit_breaker("task.job-42", None, None)));
    });
}

criterion_group!(
    benches,
    bench_classify,
    bench_dead_letter_enqueue,
    bench_dead_letter_statistics,
    bench_breaker_call,
    bench_breaker_lookup,
);
criterion_main!(benches);
