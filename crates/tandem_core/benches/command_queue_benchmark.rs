//! # Handoff Benchmark
//!
//! Measures the per-frame paths:
//! 1. Enqueue + drain of render commands
//! 2. Closure drain with a full persistent map
//! 3. Tracker advance + frame collection
//!
//! Target: all three well under 1ms at 10k items.

#![allow(missing_docs)]

use std::collections::HashMap;
use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use glam::Vec3;
use parking_lot::Mutex;
use tandem_core::tracking::{EntityTracker, FrameEntry, NodeId, NodeKind, Transform, TransformSpace};
use tandem_core::{ClosureRegistry, CommandQueue, FrameConfig, LiveTable, ThreadRole};

struct Nodes(Mutex<HashMap<NodeId, Transform>>);

impl LiveTable<NodeKind> for Nodes {
    fn read(&self, handle: NodeId, _space: TransformSpace) -> Option<Transform> {
        self.0.lock().get(&handle).copied()
    }

    fn write(&self, handle: NodeId, value: &Transform, _space: TransformSpace) {
        self.0.lock().insert(handle, *value);
    }
}

fn bench_enqueue_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("command_queue");
    for count in [100_usize, 1_000, 10_000] {
        let queue = CommandQueue::new(&FrameConfig::default(), Arc::new(ThreadRole::new()));
        group.bench_with_input(BenchmarkId::new("enqueue_then_drain", count), &count, |b, &count| {
            b.iter(|| {
                for _ in 0..count {
                    let _ = queue.enqueue("bench", || Ok(()));
                }
                queue.mark_current_thread_as_render_thread();
                let drained = queue.process_all_commands();
                queue.role().clear();
                black_box(drained)
            });
        });
    }
    group.finish();
}

fn bench_closure_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("closure_registry");
    for count in [100_usize, 1_000, 10_000] {
        let mut registry = ClosureRegistry::new(&FrameConfig {
            max_closure_commands_per_frame: count,
            ..FrameConfig::default()
        });
        for i in 0..count {
            let _ = registry.upsert(format!("c{i}"), |alpha| {
                black_box(alpha);
                Ok(())
            }, false);
        }
        registry.drain_and_execute(0.0);
        group.bench_with_input(BenchmarkId::new("persistent", count), &count, |b, _| {
            b.iter(|| black_box(registry.drain_and_execute(black_box(0.5))));
        });
    }
    group.finish();
}

fn bench_tracker_advance(c: &mut Criterion) {
    let mut group = c.benchmark_group("entity_tracker");
    for count in [1_000_u64, 10_000] {
        let nodes = Nodes(Mutex::new(HashMap::new()));
        let mut tracker = EntityTracker::<NodeKind>::new(4, 0);
        for id in 0..count {
            nodes.0.lock().insert(NodeId(id), Transform::IDENTITY);
            tracker.add_tracked(NodeId(id), TransformSpace::Local, &nodes);
        }
        let mut frame: Vec<FrameEntry<NodeKind>> = Vec::new();
        group.bench_with_input(BenchmarkId::new("update_advance_collect", count), &count, |b, &count| {
            b.iter(|| {
                for id in 0..count {
                    tracker.update(NodeId(id), TransformSpace::Local, &nodes, |t| t.position += Vec3::X);
                }
                tracker.advance(&nodes);
                tracker.collect_frame(&mut frame);
                black_box(frame.len())
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_enqueue_drain, bench_closure_drain, bench_tracker_advance);
criterion_main!(benches);
