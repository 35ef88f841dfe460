//! Upload benchmarks
//!
//! Measures orchestration overhead against the in-memory backend.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;
use tokio::runtime::Runtime;
use upload_bench::backend::{MemoryBackend, ObjectStore};
use upload_bench::upload::{ChunkedUploadOrchestrator, KeySequence, Payload};

const CHUNK_SIZE: usize = 64 * 1024;

fn benchmark_upload_sizes(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("upload_sizes");

    for size in [64 * 1024, 1024 * 1024, 8 * 1024 * 1024].iter() {
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let backend = Arc::new(MemoryBackend::new().with_min_part_size(CHUNK_SIZE));
            let orchestrator = ChunkedUploadOrchestrator::new(backend.clone(), CHUNK_SIZE);
            let keys = KeySequence::new();
            let payload = Payload::from_bytes(vec![1u8; size]);

            b.to_async(&rt).iter(|| async {
                let key = keys.derive("bench");
                let outcome = orchestrator.upload(payload.reader(), &key).await.unwrap();
                backend.delete_object(&key).await.unwrap();
                black_box(outcome)
            });
        });
    }

    group.finish();
}

fn benchmark_chunk_sizes(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("chunk_sizes");
    let payload = Payload::from_bytes(vec![1u8; 4 * 1024 * 1024]);
    group.throughput(Throughput::Bytes(payload.len() as u64));

    for chunk in [16 * 1024, 256 * 1024, 1024 * 1024].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(chunk), chunk, |b, &chunk| {
            let backend = Arc::new(MemoryBackend::new().with_min_part_size(chunk));
            let orchestrator = ChunkedUploadOrchestrator::new(backend.clone(), chunk);
            let keys = KeySequence::new();

            b.to_async(&rt).iter(|| async {
                let key = keys.derive("bench");
                let outcome = orchestrator.upload(payload.reader(), &key).await.unwrap();
                backend.delete_object(&key).await.unwrap();
                black_box(outcome)
            });
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_upload_sizes, benchmark_chunk_sizes);
criterion_main!(benches);
