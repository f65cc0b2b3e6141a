//! Transaction throughput benchmarks.

use cedar_bench::bench_env;
use cedar_core::{InsertMode, TxnFlags};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::Rng;

/// Generate random data of the specified size.
fn random_data(size: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..size).map(|_| rng.gen()).collect()
}

/// Benchmark single-op transactions over growing record sizes.
fn bench_single_op_txn(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_op_txn");

    for size in [64, 256, 1024, 4096].iter() {
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let (env, db) = bench_env();
            let record = random_data(size);
            let mut i = 0u64;

            b.iter(|| {
                let key = i.to_le_bytes();
                i += 1;
                let txn = env.begin(TxnFlags::new()).unwrap();
                db.insert(Some(&txn), &key, black_box(&record), InsertMode::Overwrite)
                    .unwrap();
                txn.commit().unwrap();
            });
        });
    }
    group.finish();
}

/// Benchmark transactions batching multiple inserts.
fn bench_batched_txn(c: &mut Criterion) {
    let mut group = c.benchmark_group("batched_txn");

    for batch_size in [10, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*batch_size as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(batch_size),
            batch_size,
            |b, &batch_size| {
                let (env, db) = bench_env();
                let entries: Vec<_> = (0..batch_size)
                    .map(|i| (u64::to_le_bytes(i), random_data(256)))
                    .collect();

                b.iter(|| {
                    let txn = env.begin(TxnFlags::new()).unwrap();
                    for (key, record) in &entries {
                        db.insert(Some(&txn), key, black_box(record), InsertMode::Overwrite)
                            .unwrap();
                    }
                    txn.commit().unwrap();
                });
            },
        );
    }
    group.finish();
}

/// Benchmark point lookups against committed data.
fn bench_find(c: &mut Criterion) {
    let mut group = c.benchmark_group("find");
    group.throughput(Throughput::Elements(1));

    group.bench_function("committed", |b| {
        let (env, db) = bench_env();
        for i in 0u64..10_000 {
            let txn = env.begin(TxnFlags::new()).unwrap();
            db.insert(Some(&txn), &i.to_le_bytes(), &random_data(128), InsertMode::Plain)
                .unwrap();
            txn.commit().unwrap();
        }

        let mut rng = rand::thread_rng();
        b.iter(|| {
            let key = rng.gen_range(0u64..10_000).to_le_bytes();
            black_box(db.find(None, &key).unwrap());
        });
    });

    group.finish();
}

criterion_group!(benches, bench_single_op_txn, bench_batched_txn, bench_find);
criterion_main!(benches);
