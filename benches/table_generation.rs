//! Table Generation Benchmarks
//!
//! This benchmark suite measures the two costs of a table run:
//!
//! ### 1. Page rendering (`benchmark_rendering`)
//! Evaluates every cell of a sweep with the JIT backend and with the checked
//! interpreter, sequentially and on the rayon pool. Functions are resolved during
//! setup, so only evaluation and formatting are measured.
//!
//! ### 2. Resolution (`benchmark_resolution`)
//! Measures parsing, binding, simplification and (for the JIT backend) Cranelift
//! compilation of a function descriptor.
//!
//! ## Usage
//!
//! Run with: `cargo bench --bench table_generation`

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use lutgen::{
    EvalBackend, FunctionDescriptor, GeneratorConfig, NumberFormat, RangeSpec, TableGenerator,
};

/// Functions of increasing cost, all over three inputs.
const FUNCTIONS: [(&str, &str); 3] = [
    ("linear", "|v| v[0] * 2.5 + v[1] - v[2] * 0.3"),
    (
        "rational",
        "|v| (v[0]^3 + 2*v[0]^2 - 5*v[0] + 1) / (v[1]^2 + 3*v[1] + 2) + v[2]",
    ),
    (
        "transcendental",
        "|v| sqrt(v[0] * v[1]) * exp(-v[2] / 10) + sin(v[0]) * cos(v[1]) - ln(v[2] + 1)",
    ),
];

fn ranges() -> Vec<RangeSpec> {
    ["a:1:10:1", "b:0.5:50:0.5", "c:0:100:1"]
        .iter()
        .map(|text| RangeSpec::parse(text).expect("valid range"))
        .collect()
}

/// Benchmarks rendering a 10 x 100 x 101 sweep into markdown.
fn benchmark_rendering(c: &mut Criterion) {
    let ranges = ranges();
    let mut group = c.benchmark_group("Table Rendering");
    group.sample_size(20);

    for (name, text) in FUNCTIONS {
        for backend in [EvalBackend::Jit, EvalBackend::Interpreter] {
            let function = FunctionDescriptor::from_input(text)
                .resolve(ranges.len(), backend)
                .expect("function resolves");

            for parallel in [false, true] {
                let generator = TableGenerator::new(GeneratorConfig {
                    parallel,
                    backend,
                    ..GeneratorConfig::default()
                });
                let id = format!(
                    "{backend:?}/{}",
                    if parallel { "parallel" } else { "sequential" }
                );
                group.bench_with_input(BenchmarkId::new(id, name), &function, |b, function| {
                    b.iter(|| {
                        let documents = generator
                            .render(black_box(&ranges), function)
                            .expect("render succeeds");
                        let format = NumberFormat::default();
                        let bytes: usize = documents
                            .iter()
                            .map(|document| document.to_markdown(&format).len())
                            .sum();
                        black_box(bytes)
                    })
                });
            }
        }
    }

    group.finish();
}

/// Benchmarks resolving a descriptor into a callable.
fn benchmark_resolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("Resolution");

    for (name, text) in FUNCTIONS {
        for backend in [EvalBackend::Jit, EvalBackend::Interpreter] {
            group.bench_with_input(
                BenchmarkId::new(format!("{backend:?}"), name),
                text,
                |b, text| {
                    b.iter(|| {
                        let function =
                            FunctionDescriptor::from_input(text).resolve(3, backend);
                        black_box(function)
                    })
                },
            );
        }
    }

    group.finish();
}

criterion_group!(benches, benchmark_rendering, benchmark_resolution);
criterion_main!(benches);
