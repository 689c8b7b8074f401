//! PID 控制器性能基准测试
//!
//! `update()` 在定时线程的热路径上，需要保持在亚微秒级。

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use pidloop_controller::PidController;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

fn build_pid() -> (Arc<AtomicU64>, PidController) {
    let cell = Arc::new(AtomicU64::new(0.0f64.to_bits()));
    let reader = Arc::clone(&cell);
    let pid = PidController::builder(0.8, 0.2, 0.01, move || {
        f64::from_bits(reader.load(Ordering::Relaxed))
    })
    .feedforward(|| 0.05)
    .period(0.001)
    .build()
    .unwrap();
    pid.set_input_range(0.0, 360.0);
    pid.set_continuous(true);
    pid.set_reference(180.0);
    (cell, pid)
}

fn bench_update(c: &mut Criterion) {
    let (cell, pid) = build_pid();
    let mut measurement = 0.0f64;

    c.bench_function("pid_update", |b| {
        b.iter(|| {
            measurement = (measurement + 0.7) % 360.0;
            cell.store(measurement.to_bits(), Ordering::Relaxed);
            black_box(pid.update())
        })
    });
}

fn bench_at_reference(c: &mut Criterion) {
    let (_cell, pid) = build_pid();

    c.bench_function("pid_at_reference", |b| b.iter(|| black_box(pid.at_reference())));
}

fn bench_snapshot(c: &mut Criterion) {
    let (_cell, pid) = build_pid();

    c.bench_function("pid_snapshot", |b| b.iter(|| black_box(pid.snapshot())));
}

criterion_group!(benches, bench_update, bench_at_reference, bench_snapshot);
criterion_main!(benches);
