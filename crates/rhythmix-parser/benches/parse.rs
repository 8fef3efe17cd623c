//! Parser benchmarks for rhythmix-parser.
//!
//! Measures lexing and parsing throughput at various expression sizes.

mod datagen;

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use rhythmix_parser::{ChainRegistry, analyse, parse_source};

// ---------------------------------------------------------------------------
// Benchmark: lex only
// ---------------------------------------------------------------------------

fn bench_lex(c: &mut Criterion) {
    let src = datagen::gen_expression(50);

    c.bench_function("lex_50_calls", |b| {
        b.iter(|| {
            let tokens = analyse(black_box(&src)).unwrap();
            black_box(tokens);
        });
    });
}

// ---------------------------------------------------------------------------
// Benchmark: parse N calls (scaling)
// ---------------------------------------------------------------------------

fn bench_parse_scaling(c: &mut Criterion) {
    let chains = ChainRegistry::default();
    let mut group = c.benchmark_group("parse_expression");

    for n in [1, 10, 100, 500] {
        let src = datagen::gen_expression(n);
        let len = src.len();

        group.bench_with_input(BenchmarkId::new("calls", n), &src, |b, src| {
            b.iter(|| {
                let ast = parse_source(black_box(src), &chains).unwrap();
                black_box(ast);
            });
        });

        group.throughput(criterion::Throughput::Bytes(len as u64));
    }

    group.finish();
}

// ---------------------------------------------------------------------------
// Benchmark: chains and arrows
// ---------------------------------------------------------------------------

fn bench_parse_chain(c: &mut Criterion) {
    let chains = ChainRegistry::default();
    let src = datagen::gen_chain(&mut datagen::rng());

    c.bench_function("parse_chain", |b| {
        b.iter(|| {
            let ast = parse_source(black_box(&src), &chains).unwrap();
            black_box(ast);
        });
    });
}

fn bench_parse_arrow(c: &mut Criterion) {
    let chains = ChainRegistry::default();
    let mut group = c.benchmark_group("parse_arrow");

    for n in [2, 16, 128] {
        let src = datagen::gen_arrow(n);
        group.bench_with_input(BenchmarkId::new("stages", n), &src, |b, src| {
            b.iter(|| {
                let ast = parse_source(black_box(src), &chains).unwrap();
                black_box(ast);
            });
        });
    }

    group.finish();
}

// ---------------------------------------------------------------------------
// Criterion harness
// ---------------------------------------------------------------------------

criterion_group!(
    benches,
    bench_lex,
    bench_parse_scaling,
    bench_parse_chain,
    bench_parse_arrow,
);
criterion_main!(benches);
