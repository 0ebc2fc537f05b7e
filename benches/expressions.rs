//! Kernel Benchmarks
//!
//! This benchmark suite compares compiled SIMD kernels against direct Rust loops over the
//! same `f32` buffers, and measures how long compilation takes.
//!
//! ## Benchmark Structure
//!
//! ### 1. Elementwise maps (`benchmark_maps`)
//! `dst[i] = f(src[i])` over a 16k-element buffer:
//! - **Direct**: a plain loop calling the std f32 functions
//! - **Kernel**: the compiled expression, at unroll 1 and 4
//!
//! ### 2. Reductions (`benchmark_reductions`)
//! `Σ f(src[i])` over the same buffer, direct loop vs `red_sum` kernel.
//!
//! ### 3. Compilation Time (`benchmark_compilation_time`)
//! The full pipeline from source string to executable kernel. Compilation is excluded
//! from groups 1 and 2 since kernels are built during setup.
//!
//! ## Usage
//!
//! Run with: `cargo bench --bench expressions`

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use simdgen::{CompileOptions, Kernel};

const LEN: usize = 16 * 1024;

/// Direct evaluation of the benchmarked expressions.
struct DirectEvaluator;

impl DirectEvaluator {
    /// Evaluates: x + 0.5
    fn add(x: f32) -> f32 {
        x + 0.5
    }

    /// Evaluates: log(cosh(x))
    fn log_cosh(x: f32) -> f32 {
        x.cosh().ln()
    }

    /// Evaluates: exp(x*x*0.1 + 0.3)
    fn exp_quadratic(x: f32) -> f32 {
        (x * x * 0.1 + 0.3).exp()
    }

    /// Evaluates: sin(x) * tanh(x) + sqrt(abs(x))
    fn mixed(x: f32) -> f32 {
        x.sin() * x.tanh() + x.abs().sqrt()
    }
}

type TestCase = (&'static str, &'static str, fn(f32) -> f32);

fn test_cases() -> [TestCase; 4] {
    [
        ("add", "x + 0.5", DirectEvaluator::add),
        ("log_cosh", "log(cosh(x))", DirectEvaluator::log_cosh),
        ("exp_quadratic", "exp(x*x*0.1 + 0.3)", DirectEvaluator::exp_quadratic),
        ("mixed", "sin(x) * tanh(x) + sqrt(abs(x))", DirectEvaluator::mixed),
    ]
}

fn input() -> Vec<f32> {
    (0..LEN).map(|i| (i as f32 * 0.1).sin() * 3.0).collect()
}

/// Benchmarks elementwise maps
fn benchmark_maps(c: &mut Criterion) {
    let src = input();
    let mut dst = vec![0.0f32; LEN];

    let mut group = c.benchmark_group("Elementwise Map");
    group.throughput(Throughput::Elements(LEN as u64));

    for (name, source, direct) in test_cases() {
        group.bench_function(BenchmarkId::new("Direct", name), |b| {
            b.iter(|| {
                for (y, &x) in dst.iter_mut().zip(black_box(&src)) {
                    *y = direct(x);
                }
                black_box(&dst);
            })
        });

        for unroll in [1, 4] {
            let options = CompileOptions::default().with_unroll(unroll);
            let kernel = Kernel::compile(source, "x", &options).unwrap();
            group.bench_function(BenchmarkId::new(format!("Kernel/unroll{unroll}"), name), |b| {
                b.iter(|| {
                    kernel.apply(&mut dst, black_box(&src)).unwrap();
                    black_box(&dst);
                })
            });
        }
    }

    group.finish();
}

/// Benchmarks sum reductions
fn benchmark_reductions(c: &mut Criterion) {
    let src = input();

    let mut group = c.benchmark_group("Reduce Sum");
    group.throughput(Throughput::Elements(LEN as u64));

    for (name, source, direct) in test_cases() {
        group.bench_function(BenchmarkId::new("Direct", name), |b| {
            b.iter(|| black_box(&src).iter().map(|&x| direct(x)).sum::<f32>())
        });

        let kernel = Kernel::compile(&format!("red_sum({source})"), "x", &CompileOptions::default())
            .unwrap();
        group.bench_function(BenchmarkId::new("Kernel", name), |b| {
            b.iter(|| kernel.reduce(black_box(&src)).unwrap())
        });
    }

    group.finish();
}

/// Benchmarks compilation time
///
/// Measures parse -> check -> fold -> codegen -> executable mapping for each expression.
fn benchmark_compilation_time(c: &mut Criterion) {
    let mut group = c.benchmark_group("Compilation Time");
    let options = CompileOptions::default().with_verify(false);

    for (name, source, _) in test_cases() {
        group.bench_with_input(BenchmarkId::new("Compile", name), &source, |b, source| {
            b.iter(|| black_box(Kernel::compile(source, "x", &options).unwrap()))
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_maps,
    benchmark_reductions,
    benchmark_compilation_time
);
criterion_main!(benches);
