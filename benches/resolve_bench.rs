use chain_cache::chain::Chain;
use chain_cache::codec;
use chain_cache::operation::Operation;
use chain_cache::resolver;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

/// Build a chain of interleaved operations over a small key set, the shape
/// a bucket takes under hash collisions.
fn build_chain(len: usize) -> Chain {
    let blobs = (0..len)
        .map(|i| {
            let key = format!("key:{}", i % 4).into_bytes();
            match i % 3 {
                0 => codec::encode(&Operation::Put {
                    key,
                    value: format!("value:{}", i).into_bytes(),
                    timestamp: i as u64,
                }),
                1 => codec::encode(&Operation::PutIfAbsent {
                    key,
                    value: format!("value:{}", i).into_bytes(),
                    timestamp: i as u64,
                }),
                _ => codec::encode(&Operation::Remove {
                    key,
                    timestamp: i as u64,
                }),
            }
        })
        .collect();
    Chain::from_blobs(blobs)
}

fn bench_decode(c: &mut Criterion) {
    let blob = codec::encode(&Operation::Put {
        key: b"user:000042".to_vec(),
        value: vec![b'x'; 128],
        timestamp: 1,
    });

    c.bench_function("decode put blob", |b| {
        b.iter(|| {
            let op = codec::decode(black_box(&blob)).unwrap();
            black_box(op.timestamp());
        });
    });
}

fn bench_resolve(c: &mut Criterion) {
    let mut g = c.benchmark_group("resolve");
    for len in [8usize, 64, 512] {
        let chain = build_chain(len);
        g.bench_function(BenchmarkId::new("fold", len), |b| {
            b.iter(|| {
                let value = resolver::resolve(black_box(&chain), black_box(b"key:1")).unwrap();
                black_box(value.map(|v| v.len()));
            });
        });
    }
    g.finish();
}

fn bench_compact(c: &mut Criterion) {
    let mut g = c.benchmark_group("compact");
    for len in [64usize, 512] {
        let chain = build_chain(len);
        g.bench_function(BenchmarkId::new("canonical", len), |b| {
            b.iter(|| {
                let compacted = resolver::compact(black_box(&chain)).unwrap();
                black_box(compacted.len());
            });
        });
    }
    g.finish();
}

criterion_group!(benches, bench_decode, bench_resolve, bench_compact);
criterion_main!(benches);
