use std::path::Path;

use criterion::{Criterion, criterion_group, criterion_main};
use dftq::program::{Program, espresso::QuantumEspresso};

pub fn read_output(c: &mut Criterion) {
    c.bench_function("read output", |b| {
        b.iter(|| {
            QuantumEspresso.read_output(Path::new("testfiles/qe/si.scf.out"))
        })
    });
}

criterion_group!(benches, read_output);
criterion_main!(benches);
