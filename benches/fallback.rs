// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Benchmarks for memory operations through the fallback manager.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use chatcore::memory::{
    apply_operation, ops, BufferMemory, FallbackConfig, FallbackManager, MemoryArgs, MemoryFault,
};
use chatcore::types::Message;

/// Healthy primary: the cost of guarding and mirroring.
fn bench_healthy_primary(c: &mut Criterion) {
    let mut group = c.benchmark_group("fallback/healthy");

    group.bench_function("add_message", |b| {
        let mut manager = FallbackManager::new(FallbackConfig::default());
        let mut memory = BufferMemory::new();
        let args = MemoryArgs::Message(Message::user("hello there"));
        b.iter(|| {
            manager.execute_with_fallback(ops::ADD_MESSAGE, black_box(args.clone()), |args| {
                apply_operation(&mut memory, ops::ADD_MESSAGE, args)
            })
        });
    });

    group.bench_function("get_context/50", |b| {
        let mut manager = FallbackManager::new(FallbackConfig::default());
        let mut memory = BufferMemory::new();
        for i in 0..50 {
            let _ = apply_operation(
                &mut memory,
                ops::ADD_MESSAGE,
                &MemoryArgs::Message(Message::user(format!("message {}", i))),
            );
        }
        b.iter(|| {
            manager.execute_with_fallback(ops::GET_CONTEXT, MemoryArgs::None, |args| {
                apply_operation(&mut memory, ops::GET_CONTEXT, args)
            })
        });
    });

    group.finish();
}

/// Failing primary: degrade, serve from the buffer, recover.
fn bench_degraded(c: &mut Criterion) {
    let mut group = c.benchmark_group("fallback/degraded");

    group.bench_function("get_context_from_buffer", |b| {
        let mut manager = FallbackManager::new(FallbackConfig {
            max_fallback_attempts: u32::MAX,
            ..FallbackConfig::default()
        });
        let seed: Vec<Message> = (0..50).map(|i| Message::user(format!("message {}", i))).collect();
        manager.seed_buffer(&seed);
        b.iter(|| {
            let result = manager.execute_with_fallback(ops::GET_CONTEXT, MemoryArgs::None, |_| {
                Err(MemoryFault::new("backend down"))
            });
            manager.reset();
            result
        });
    });

    group.finish();
}

criterion_group!(benches, bench_healthy_primary, bench_degraded);
criterion_main!(benches);
