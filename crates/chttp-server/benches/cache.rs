//! Cache hot-path micro-benchmarks.

use chttp_server::FileCache;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::path::Path;
use std::sync::Arc;

fn bench_cache(c: &mut Criterion) {
    let cache = FileCache::new(10 * 1024 * 1024);
    let data: Arc<[u8]> = vec![0u8; 4096].into();
    for i in 0..50 {
        cache.put(Path::new(&format!("/bench/f{}", i)), Arc::clone(&data));
    }

    c.bench_function("cache_get_hit", |b| {
        b.iter(|| black_box(cache.get(Path::new("/bench/f25"))))
    });

    c.bench_function("cache_get_miss", |b| {
        b.iter(|| black_box(cache.get(Path::new("/bench/absent"))))
    });

    c.bench_function("cache_put_replace", |b| {
        b.iter(|| cache.put(Path::new("/bench/f25"), Arc::clone(&data)))
    });
}

criterion_group!(benches, bench_cache);
criterion_main!(benches);
