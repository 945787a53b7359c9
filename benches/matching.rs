//! Benchmarks for NFA compilation and simulation.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use regex_thompson::{MatcherMemory, Regex};

/// `a?^n a^n`, the classic input that is exponential for backtracking
/// engines.
fn pathological(n: usize) -> (String, String) {
    (format!("{}{}", "a?".repeat(n), "a".repeat(n)), "a".repeat(n))
}

fn bench_compile(c: &mut Criterion) {
    let pattern = "a(b|c)c*a+|abc|a(a+)";
    c.bench_function("compile_small", |b| {
        b.iter(|| Regex::new(black_box(pattern)).unwrap())
    });

    let (pattern, _) = pathological(100);
    c.bench_function("compile_pathological_100", |b| {
        b.iter(|| Regex::new(black_box(&pattern)).unwrap())
    });
}

fn bench_pathological(c: &mut Criterion) {
    let mut group = c.benchmark_group("pathological");
    for n in [10, 20, 40, 80] {
        let (pattern, subject) = pathological(n);
        let regex = Regex::new(&pattern).unwrap();
        let mut memory = MatcherMemory::default();
        group.bench_with_input(BenchmarkId::from_parameter(n), &subject, |b, subject| {
            b.iter(|| {
                let mut matcher = memory.matcher(&regex);
                matcher.chunk(black_box(subject.as_bytes()));
                matcher.finish()
            })
        });
    }
    group.finish();
}

fn bench_long_subject(c: &mut Criterion) {
    let regex = Regex::new("(a|b)*abb").unwrap();
    let subject = "ab".repeat(4096) + "abb";
    let mut memory = MatcherMemory::default();

    c.bench_function("long_subject_8k", |b| {
        b.iter(|| {
            let mut matcher = memory.matcher(&regex);
            matcher.chunk(black_box(subject.as_bytes()));
            matcher.finish()
        })
    });

    c.bench_function("long_subject_8k_fresh_memory", |b| {
        b.iter(|| regex.is_match(black_box(&subject)))
    });
}

fn bench_early_reject(c: &mut Criterion) {
    let regex = Regex::new("x(a|b)*").unwrap();
    let subject = "y".repeat(8192);
    let mut memory = MatcherMemory::default();

    c.bench_function("early_reject_8k", |b| {
        b.iter(|| {
            let mut matcher = memory.matcher(&regex);
            matcher.chunk(black_box(subject.as_bytes()));
            matcher.finish()
        })
    });
}

criterion_group!(
    benches,
    bench_compile,
    bench_pathological,
    bench_long_subject,
    bench_early_reject
);
criterion_main!(benches);
