use std::collections::BTreeMap;
use std::hint::black_box;
use std::io;

use criterion::{Criterion, criterion_group, criterion_main};
use envshade::{HarnessDetection, ShadowEnv, TargetEnv};

fn bench_shadow(c: &mut Criterion) {
    let target: BTreeMap<String, String> = (0..2_000)
        .map(|idx| (format!("KEY_{idx}"), "value".to_owned()))
        .collect();
    let shadow = ShadowEnv::builder(TargetEnv::from_memory(target))
        .harness(HarnessDetection::Assume(false))
        .runner(|_: &[String]| -> io::Result<String> { Ok("/go".to_owned()) })
        .build();

    c.bench_function("get_hit", |b| {
        b.iter(|| shadow.get(black_box("KEY_1000"), ""));
    });
    c.bench_function("set", |b| {
        b.iter(|| shadow.set(black_box("KEY_1000"), "other"));
    });
    c.bench_function("reload", |b| {
        b.iter(|| shadow.reload());
    });
    c.bench_function("temp", |b| {
        b.iter(|| shadow.temp(|| shadow.set("KEY_1", "temp")));
    });
}

criterion_group!(benches, bench_shadow);
criterion_main!(benches);
