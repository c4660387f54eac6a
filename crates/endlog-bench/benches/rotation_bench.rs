//! Cost of the rotation path: writes sized so every write forces a new file.

use criterion::{criterion_group, criterion_main, Criterion};
use endlog::LogHandle;
use tempfile::tempdir;

fn bench_forced_rotation(c: &mut Criterion) {
    endlog::set_max_capacity(endlog::CAPACITY_MIN).unwrap();
    let max_payload = endlog::CAPACITY_MIN - 28;
    let record = vec![0u8; max_payload as usize];

    c.bench_function("rotate_every_write", |b| {
        b.iter_batched(
            || {
                let dir = tempdir().unwrap();
                let handle = LogHandle::open(dir.path(), None).unwrap();
                (dir, handle)
            },
            |(_dir, handle)| {
                for _ in 0..4 {
                    handle.write(&record).unwrap();
                }
            },
            criterion::BatchSize::SmallInput,
        );
    });
}

criterion_group!(benches, bench_forced_rotation);
criterion_main!(benches);
