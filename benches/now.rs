use criterion::{black_box, criterion_group, criterion_main, Criterion};
use sandglass::{Clock, Instant};

fn now(c: &mut Criterion) {
    c.bench_function("std SystemTime::now", |b| {
        b.iter(|| black_box(std::time::SystemTime::now()))
    });
    c.bench_function("real_now", |b| b.iter(|| black_box(Instant::real_now())));

    let system = Clock::system().expect("system clock");
    c.bench_function("system clock now", |b| b.iter(|| black_box(system.now())));
    c.bench_function("system clock now unix nanos", |b| {
        b.iter(|| black_box(system.now().as_unix_nanos()))
    });

    let sandbox = Clock::sandbox();
    c.bench_function("sandbox clock now", |b| b.iter(|| black_box(sandbox.now())));
}

criterion_group!(benches, now);
criterion_main!(benches);
