//! Store Benchmarks
//!
//! Measures the hot paths: batch insert, bound prefix scans, two-atom
//! joins and path search over a synthetic call graph.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use factgraph::{CancelToken, Config, Fact, PathOptions, Store};
use tempfile::TempDir;

fn seeded_store(nodes: usize) -> (Store, TempDir) {
    let temp = TempDir::new().unwrap();
    let store = Store::open(Config::at(temp.path())).unwrap();
    let token = CancelToken::new();

    let mut facts = Vec::with_capacity(nodes * 3);
    for i in 0..nodes {
        let file = format!("f{}.go", i / 10);
        let symbol = format!("{file}:fn{i}");
        facts.push(Fact::new(file.clone(), "defines", symbol.clone(), "repo"));
        facts.push(Fact::new(
            symbol.clone(),
            "calls",
            format!("f{}.go:fn{}", (i + 1) / 10, (i + 1) % nodes),
            "repo",
        ));
        facts.push(Fact::new(file, "in_package", "pkg", "repo"));
    }
    store.add_batch(&facts, &token).unwrap();
    (store, temp)
}

fn bench_add_batch(c: &mut Criterion) {
    c.bench_function("add_batch_1k", |b| {
        b.iter_with_setup(
            || {
                let temp = TempDir::new().unwrap();
                let store = Store::open(Config::at(temp.path())).unwrap();
                let facts: Vec<Fact> = (0..1000)
                    .map(|i| Fact::new(format!("s{i}"), "calls", format!("o{i}"), "g"))
                    .collect();
                (store, facts, temp)
            },
            |(store, facts, _temp)| {
                store.add_batch(&facts, &CancelToken::new()).unwrap();
            },
        );
    });
}

fn bench_scan(c: &mut Criterion) {
    let (store, _temp) = seeded_store(500);
    let token = CancelToken::new();

    c.bench_function("scan_by_subject", |b| {
        b.iter(|| {
            let rows: Vec<_> = store
                .scan(black_box(Some("f3.go")), None, None, None, &token)
                .unwrap()
                .map(|f| f.unwrap())
                .collect();
            black_box(rows)
        });
    });

    c.bench_function("scan_by_predicate", |b| {
        b.iter(|| {
            let count = store
                .scan(None, black_box(Some("defines")), None, None, &token)
                .unwrap()
                .count();
            black_box(count)
        });
    });
}

fn bench_query(c: &mut Criterion) {
    let (store, _temp) = seeded_store(300);
    let token = CancelToken::new();

    c.bench_function("two_atom_join", |b| {
        b.iter(|| {
            let rows = store
                .query(&token, "triples(?f, defines, ?s), triples(?s, calls, ?t)")
                .unwrap();
            black_box(rows)
        });
    });
}

fn bench_pathfinder(c: &mut Criterion) {
    let (store, _temp) = seeded_store(400);
    let token = CancelToken::new();

    c.bench_function("find_path_chain", |b| {
        b.iter(|| {
            let path = store
                .find_path(
                    black_box("f0.go:fn0"),
                    black_box("f1.go:fn10"),
                    &PathOptions::default(),
                    &token,
                )
                .unwrap();
            black_box(path)
        });
    });
}

criterion_group!(
    benches,
    bench_add_batch,
    bench_scan,
    bench_query,
    bench_pathfinder
);
criterion_main!(benches);
