use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};

const LINES: [&str; 4] = [
    "PLAIN=value\n",
    "# comment line\n",
    "QUOTED=\"escaped\\tvalue\" # note\n",
    "export MULTI='first\nsecond'\n",
];

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");
    for lines in [100usize, 1_000, 10_000] {
        let input = make_input(lines);
        group.bench_with_input(BenchmarkId::from_parameter(lines), &input, |b, input| {
            b.iter(|| envshade::parse_str(black_box(input)).expect("parse should succeed"));
        });
    }
    group.finish();
}

/// Distinct keys so duplicate folding does not shrink the work.
fn make_input(lines: usize) -> String {
    (0..lines)
        .map(|idx| LINES[idx % LINES.len()].replacen('=', &format!("_{idx}="), 1))
        .collect()
}

criterion_group!(benches, bench_parse);
criterion_main!(benches);
