//! sluice benchmark suite.
//!
//! Benchmarks for key operations:
//! - Chunked line reading at several chunk sizes
//! - Record fingerprinting
//! - Bloom filter membership

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use futures::TryStreamExt;


use sluice::Record;
use sluice::dedup::BloomFilter;
use sluice::record::DEFAULT_IDENTITY_FIELD;
use sluice::source::ChunkedReader;

/// Line throughput of the chunked reader.
///
/// Small chunks stress the carry-over of partial lines and split UTF-8
/// sequences; large chunks approach a buffered read.
fn chunked_reader_benchmarks(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("chunked_reader");

    let count = 10_000;
    let file = bench_utils::generate_jsonl_file(count);
    let size = std::fs::metadata(file.path()).unwrap().len();
    group.throughput(Throughput::Bytes(size));

    for chunk_size in [64_u64, 4 * 1024, 1024 * 1024] {
        group.bench_with_input(
            BenchmarkId::new("lines", chunk_size),
            &chunk_size,
            |b, &chunk_size| {
                b.to_async(&rt).iter(|| async {
                    let lines: Vec<String> = ChunkedReader::new(file.path(), chunk_size)
                        .lines()
                        .try_collect()
                        .await
                        .unwrap();
                    assert_eq!(lines.len(), count);
                    lines
                });
            },
        );
    }

    group.finish();
}

/// Fingerprinting with and without an identity field.
fn fingerprint_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("fingerprint");

    let records: Vec<Record> = bench_utils::generate_json_lines(1_000)
        .iter()
        .map(|line| Record::from_value(serde_json::from_str(line).unwrap()))
        .collect();
    group.throughput(Throughput::Elements(records.len() as u64));

    group.bench_function("identity_field", |b| {
        b.iter(|| {
            records
                .iter()
                .map(|r| r.fingerprint("id"))
                .collect::<Vec<_>>()
        });
    });

    // No record carries this field, so every record is hashed.
    group.bench_function("canonical_hash", |b| {
        b.iter(|| {
            records
                .iter()
                .map(|r| r.fingerprint("missing"))
                .collect::<Vec<_>>()
        });
    });

    let lines: Vec<Record> = (0..1_000)
        .map(|i| Record::from_line(format!("line {i}")))
        .collect();
    group.bench_function("plain_lines", |b| {
        b.iter(|| {
            lines
                .iter()
                .map(|r| r.fingerprint(DEFAULT_IDENTITY_FIELD))
                .collect::<Vec<_>>()
        });
    });

    group.finish();
}

/// Bloom filter check-and-insert throughput.
fn bloom_filter_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("bloom_filter");

    for capacity in [10_000_u64, 1_000_000] {
        let keys: Vec<String> = (0..10_000).map(|i| format!("key-{i}")).collect();
        group.throughput(Throughput::Elements(keys.len() as u64));

        group.bench_with_input(
            BenchmarkId::new("check_and_insert", capacity),
            &keys,
            |b, keys| {
                b.iter(|| {
                    let mut filter = BloomFilter::new(capacity, 0.01).unwrap();
                    keys.iter()
                        .filter(|key| filter.check_and_insert(key.as_bytes()))
                        .count()
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    chunked_reader_benchmarks,
    fingerprint_benchmarks,
    bloom_filter_benchmarks,
);
criterion_main!(benches);
