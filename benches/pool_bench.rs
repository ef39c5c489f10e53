use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use slabhash::{ChunkAllocator, ChunkConfig, Chunked, FreeCache, PoolBox, Pooled};
use std::alloc::Layout;
use std::time::Duration;

fn lcg(mut s: u64) -> impl Iterator<Item = u64> {
    std::iter::from_fn(move || {
        s = s.wrapping_mul(6364136223846793005).wrapping_add(1);
        Some(s >> 33)
    })
}

struct Slab([u64; 8]);

impl Pooled for Slab {
    type Strategy = Chunked;
}

struct Cached([u64; 8]);

impl Pooled for Cached {
    type Strategy = FreeCache;
}

fn bench_alloc_dealloc_pairs(c: &mut Criterion) {
    c.bench_function("pool::chunked_alloc_dealloc_10k", |b| {
        drop(PoolBox::new(Slab([0; 8])));
        b.iter(|| {
            for i in 0..10_000u64 {
                black_box(PoolBox::new(Slab([i; 8])));
            }
        })
    });

    c.bench_function("pool::free_cache_alloc_dealloc_10k", |b| {
        drop(PoolBox::new(Cached([0; 8])));
        b.iter(|| {
            for i in 0..10_000u64 {
                black_box(PoolBox::new(Cached([i; 8])));
            }
        })
    });

    c.bench_function("pool::box_alloc_dealloc_10k", |b| {
        b.iter(|| {
            for i in 0..10_000u64 {
                black_box(Box::new([i; 8]));
            }
        })
    });
}

fn bench_fill_and_drain_100k(c: &mut Criterion) {
    c.bench_function("pool::chunked_fill_drain_100k", |b| {
        b.iter(|| {
            let boxes: Vec<_> = (0..100_000u64).map(|i| PoolBox::new(Slab([i; 8]))).collect();
            black_box(boxes)
        })
    });

    c.bench_function("allocator::fill_drain_100k", |b| {
        b.iter_batched(
            || {
                ChunkAllocator::<slabhash::DefaultPages>::new(
                    Layout::new::<[u64; 8]>(),
                    ChunkConfig::default(),
                )
            },
            |mut a| {
                let items: Vec<_> = (0..100_000).map(|_| a.alloc()).collect();
                for p in items {
                    unsafe { a.dealloc(p) };
                }
                black_box(a)
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_random_toggle_100k(c: &mut Criterion) {
    c.bench_function("pool::chunked_random_toggle_100k_over_10k", |b| {
        b.iter_batched(
            || (0..10_000).map(|_| None).collect::<Vec<Option<PoolBox<Slab>>>>(),
            |mut live| {
                let mut rng = lcg(42);
                for _ in 0..100_000 {
                    let i = rng.next().unwrap() as usize % live.len();
                    live[i] = match live[i].take() {
                        Some(_) => None,
                        None => Some(PoolBox::new(Slab([i as u64; 8]))),
                    };
                }
                black_box(live)
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_config() -> Criterion {
    Criterion::default()
        .sample_size(12)
        .measurement_time(Duration::from_secs(5))
        .warm_up_time(Duration::from_secs(1))
}

criterion_group! {
    name = benches_pairs;
    config = bench_config();
    targets = bench_alloc_dealloc_pairs
}
criterion_group! {
    name = benches_bulk;
    config = bench_config();
    targets = bench_fill_and_drain_100k,
              bench_random_toggle_100k
}
criterion_main!(benches_pairs, benches_bulk);
