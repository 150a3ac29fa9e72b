use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::fs;
use tempfile::TempDir;

use blockarc::Archive;

fn bench_add(c: &mut Criterion) {
    let data = vec![42u8; 1024 * 1024];

    c.bench_function("add_1mb", |b| {
        b.iter(|| {
            let dir = TempDir::new().unwrap();
            let src = dir.path().join("bench.bin");
            fs::write(&src, black_box(&data)).unwrap();
            let mut ar = Archive::create(dir.path().join("t")).unwrap();
            ar.add(&src, None).unwrap();
        })
    });

    c.bench_function("add_1mb_deflate", |b| {
        b.iter(|| {
            let dir = TempDir::new().unwrap();
            let src = dir.path().join("bench.bin");
            fs::write(&src, black_box(&data)).unwrap();
            let mut ar = Archive::create(dir.path().join("t")).unwrap();
            ar.add(&src, Some("comp")).unwrap();
        })
    });
}

fn bench_extract(c: &mut Criterion) {
    let data = vec![7u8; 1024 * 1024];
    let dir = TempDir::new().unwrap();
    let src = dir.path().join("bench.bin");
    fs::write(&src, &data).unwrap();
    let mut ar = Archive::create(dir.path().join("t")).unwrap();
    ar.add(&src, None).unwrap();

    c.bench_function("extract_1mb", |b| {
        b.iter(|| {
            let out = dir.path().join("out.bin");
            ar.extract("bench.bin", black_box(&out)).unwrap();
        })
    });
}

fn bench_compact(c: &mut Criterion) {
    c.bench_function("compact_half_empty", |b| {
        b.iter(|| {
            let dir = TempDir::new().unwrap();
            let keep = dir.path().join("keep.bin");
            let drop = dir.path().join("drop.bin");
            fs::write(&keep, vec![1u8; 256 * 1024]).unwrap();
            fs::write(&drop, vec![2u8; 256 * 1024]).unwrap();
            let mut ar = Archive::create(dir.path().join("t")).unwrap();
            ar.add(&keep, None).unwrap();
            ar.add(&drop, None).unwrap();
            ar.remove("drop.bin").unwrap();
            black_box(ar.compact().unwrap());
        })
    });
}

criterion_group!(benches, bench_add, bench_extract, bench_compact);
criterion_main!(benches);
