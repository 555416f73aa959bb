//! Allocator benchmarks.

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use poolkit_core::{NodeResource, PagePool, TablePool, class_index};
use std::sync::Arc;

fn bench_node_alloc_free_cycle(c: &mut Criterion) {
    let partitions: &[usize] = &[16, 64, 256, 1024];
    let mut group = c.benchmark_group("node_alloc_free_cycle");

    for &partition in partitions {
        group.bench_with_input(
            BenchmarkId::new("pool", partition),
            &partition,
            |b, &size| {
                let pool = Arc::new(PagePool::new(4096));
                let resource = NodeResource::with_partition_size(pool, size);
                // Warm the pool so the cycle measures the fast path.
                let warm = resource.allocate(size).expect("warm-up allocation");
                // SAFETY: warm-up block came from this resource.
                unsafe { resource.deallocate(warm) };

                b.iter(|| {
                    let block = resource.allocate(size).expect("allocation");
                    criterion::black_box(block);
                    // SAFETY: block came from this resource.
                    unsafe { resource.deallocate(block) };
                });
            },
        );
        group.bench_with_input(
            BenchmarkId::new("system", partition),
            &partition,
            |b, &size| {
                b.iter(|| {
                    let v = vec![0u8; size];
                    criterion::black_box(v);
                });
            },
        );
    }
    group.finish();
}

fn bench_alloc_burst(c: &mut Criterion) {
    let mut group = c.benchmark_group("alloc_burst");

    group.bench_function("1000x64B", |b| {
        let pool = Arc::new(PagePool::new(4096));
        let resource = NodeResource::with_partition_size(pool, 64);

        b.iter(|| {
            let blocks: Vec<_> = (0..1000)
                .map(|_| resource.allocate(64).expect("allocation"))
                .collect();
            for block in blocks {
                // SAFETY: every block came from this resource.
                unsafe { resource.deallocate(block) };
            }
        });
    });

    group.finish();
}

fn bench_class_index(c: &mut Criterion) {
    c.bench_function("class_index_sweep", |b| {
        b.iter(|| {
            let mut acc = 0_usize;
            for size in (8..4096).step_by(8) {
                acc = acc.wrapping_add(class_index(criterion::black_box(size)));
            }
            criterion::black_box(acc)
        });
    });
}

fn bench_table_round_trip(c: &mut Criterion) {
    let sizes: &[usize] = &[64, 96, 304, 888, 2544];
    let mut group = c.benchmark_group("table_round_trip");

    for &size in sizes {
        group.bench_with_input(BenchmarkId::new("table", size), &size, |b, &sz| {
            let pool = Arc::new(PagePool::new(16384));
            let table = TablePool::new(pool);
            let warm = table.allocate(sz).expect("warm-up allocation");
            // SAFETY: warm-up block came from this selector with this size.
            unsafe { table.deallocate(warm, sz) };

            b.iter(|| {
                let block = table.allocate(sz).expect("allocation");
                criterion::black_box(block);
                // SAFETY: block came from this selector with this size.
                unsafe { table.deallocate(block, sz) };
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_node_alloc_free_cycle,
    bench_alloc_burst,
    bench_class_index,
    bench_table_round_trip
);
criterion_main!(benches);
