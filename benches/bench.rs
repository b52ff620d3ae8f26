//! Criterion benchmarks for diskindex.
//!
//! Covers the Exp-Golomb bit coder and writing and reading whole field
//! segments with sparse and dense terms.

use std::hint::black_box;
use std::io::Cursor;
use std::sync::Arc;

use criterion::{BatchSize, BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use diskindex::index::{DocFeatures, FieldReader, FieldWriter, FieldWriterOptions};
use diskindex::schema::{IndexField, Schema};
use diskindex::storage::DefaultFileHeaderContext;
use diskindex::util::bits::{BitDecoder, BitEncoder};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::TempDir;

const DOC_ID_LIMIT: u32 = 100_000;

/// Generate terms with doc id lists of mixed density.
fn generate_terms(count: usize) -> Vec<Vec<(u32, DocFeatures)>> {
    let mut rng = StdRng::seed_from_u64(42);
    let mut terms = Vec::with_capacity(count);
    for i in 0..count {
        let density = if i % 50 == 0 { 0.3 } else { 0.002 };
        let mut docs = Vec::new();
        for doc_id in 0..DOC_ID_LIMIT {
            if rng.random_bool(density) {
                let field_length = rng.random_range(1..64);
                let position = rng.random_range(0..field_length);
                docs.push((doc_id, DocFeatures::with_positions(field_length, vec![position])));
            }
        }
        terms.push(docs);
    }
    terms
}

fn options() -> FieldWriterOptions {
    let schema = Schema::new()
        .with_index_field(IndexField::new("body"))
        .unwrap();
    FieldWriterOptions::new(schema, 0)
        .header_context(Arc::new(DefaultFileHeaderContext::deterministic()))
}

fn write_field(prefix: &str, terms: &[Vec<(u32, DocFeatures)>], dynamic: bool) {
    let mut writer = FieldWriter::new(DOC_ID_LIMIT, terms.len() as u64, prefix);
    writer.open(options().dynamic_format(dynamic)).unwrap();
    for docs in terms {
        writer.begin_next_term("term").unwrap();
        for (doc_id, features) in docs {
            writer.add_document(*doc_id, features).unwrap();
        }
    }
    writer.close().unwrap();
}

/// Benchmark the bit coder.
fn bench_bit_coding(c: &mut Criterion) {
    let mut group = c.benchmark_group("bit_coding");
    let mut rng = StdRng::seed_from_u64(7);
    let values: Vec<u64> = (0..10_000).map(|_| rng.random_range(0..5_000)).collect();
    group.throughput(Throughput::Elements(values.len() as u64));

    for k in [0, 4, 8] {
        group.bench_with_input(BenchmarkId::new("encode", k), &k, |b, &k| {
            b.iter(|| {
                let mut encoder = BitEncoder::new(Vec::new());
                for &value in &values {
                    encoder.write_exp_golomb(black_box(value), k).unwrap();
                }
                black_box(encoder.finish().unwrap())
            })
        });

        let mut encoder = BitEncoder::new(Vec::new());
        for &value in &values {
            encoder.write_exp_golomb(value, k).unwrap();
        }
        let (bytes, _) = encoder.finish().unwrap();
        group.bench_with_input(BenchmarkId::new("decode", k), &k, |b, &k| {
            b.iter(|| {
                let mut decoder = BitDecoder::new(Cursor::new(&bytes));
                let mut sum = 0u64;
                for _ in 0..values.len() {
                    sum += decoder.read_exp_golomb(k).unwrap();
                }
                black_box(sum)
            })
        });
    }

    group.finish();
}

/// Benchmark writing and reading a field segment.
fn bench_field_segment(c: &mut Criterion) {
    let mut group = c.benchmark_group("field_segment");
    group.sample_size(10);

    let terms = generate_terms(500);
    let postings: u64 = terms.iter().map(|docs| docs.len() as u64).sum();
    group.throughput(Throughput::Elements(postings));

    for (name, dynamic) in [("write_dynamic", true), ("write_fixed", false)] {
        group.bench_function(name, |b| {
            b.iter_batched(
                || TempDir::new().unwrap(),
                |dir| {
                    let prefix = format!("{}/body/", dir.path().display());
                    write_field(&prefix, black_box(&terms), dynamic);
                    dir
                },
                BatchSize::PerIteration,
            )
        });
    }

    let dir = TempDir::new().unwrap();
    let prefix = format!("{}/body/", dir.path().display());
    write_field(&prefix, &terms, true);
    group.bench_function("read_all", |b| {
        b.iter(|| {
            let reader = FieldReader::open(prefix.as_str()).unwrap();
            let docs: usize = reader.map(|word| word.unwrap().docs.len()).sum();
            black_box(docs)
        })
    });

    group.finish();
}

criterion_group!(benches, bench_bit_coding, bench_field_segment);
criterion_main!(benches);
