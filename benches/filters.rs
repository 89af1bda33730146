//! Benchmarks for the stage engine and the heavier filters
//!
//! Run with: cargo bench

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use linepipe::{
    Sequence, command, filter_fn, hash_sample, parallel_map, repeat, sample, sort, write_lines,
    xargs,
};
use std::hint::black_box;

const ITEMS: usize = 10_000;

fn bench_engine(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine");
    group.throughput(Throughput::Elements(ITEMS as u64));

    group.bench_function("single", |b| {
        let pipeline = Sequence::new().then(repeat("", ITEMS));
        b.iter(|| black_box(pipeline.run()))
    });

    group.bench_function("five", |b| {
        let copy = || {
            filter_fn("copy", |input, output| {
                for s in input {
                    output.send(s)?;
                }
                Ok(())
            })
        };
        let pipeline = Sequence::new()
            .then(repeat("", ITEMS))
            .then(copy())
            .then(copy())
            .then(copy())
            .then(copy());
        b.iter(|| black_box(pipeline.run()))
    });

    group.bench_function("write", |b| {
        let pipeline = Sequence::new()
            .then(repeat("hello", ITEMS))
            .then(write_lines(std::io::sink()));
        b.iter(|| black_box(pipeline.run()))
    });

    group.finish();
}

fn bench_filters(c: &mut Criterion) {
    let mut group = c.benchmark_group("filters");
    group.throughput(Throughput::Elements(ITEMS as u64));

    group.bench_function("sample", |b| {
        let pipeline = Sequence::new().then(repeat("hello", ITEMS)).then(sample(10));
        b.iter(|| black_box(pipeline.run()))
    });

    group.bench_function("hash_sample", |b| {
        let pipeline = Sequence::new()
            .then(repeat("hello", ITEMS))
            .then(hash_sample(10));
        b.iter(|| black_box(pipeline.run()))
    });

    group.bench_function("sort", |b| {
        let pipeline = Sequence::new().then(repeat("hello", ITEMS)).then(sort());
        b.iter(|| black_box(pipeline.run()))
    });

    group.bench_function("sort3", |b| {
        let pipeline = Sequence::new()
            .then(repeat("the 3 musketeers", ITEMS))
            .then(sort().num(2).text(1).text(3));
        b.iter(|| black_box(pipeline.run()))
    });

    for workers in [1, 4] {
        group.bench_with_input(
            BenchmarkId::new("parallel_map", workers),
            &workers,
            |b, &workers| {
                let pipeline = Sequence::new()
                    .then(repeat("hello", ITEMS))
                    .then(parallel_map(workers, |s| s.to_uppercase()));
                b.iter(|| black_box(pipeline.run()))
            },
        );
    }

    group.finish();
}

fn bench_processes(c: &mut Criterion) {
    let mut group = c.benchmark_group("processes");
    group.sample_size(10);

    group.bench_function("cmd", |b| {
        let pipeline = Sequence::new()
            .then(repeat("hello", ITEMS))
            .then(command("cat", &[]));
        b.iter(|| black_box(pipeline.run()))
    });

    group.bench_function("xargs", |b| {
        let pipeline = Sequence::new()
            .then(repeat("hello", ITEMS))
            .then(xargs("true", &[]));
        b.iter(|| black_box(pipeline.run()))
    });

    group.bench_function("xargs1", |b| {
        let pipeline = Sequence::new()
            .then(repeat("hello", 100))
            .then(xargs("true", &[]).limit_args(1));
        b.iter(|| black_box(pipeline.run()))
    });

    group.finish();
}

criterion_group!(benches, bench_engine, bench_filters, bench_processes);
criterion_main!(benches);
