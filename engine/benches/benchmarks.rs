//! Performance benchmarks for pgdoc-engine

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use pgdoc_engine::{categorize, Document, PrimaryKey, QuerySpec, Selector, WriteRow};
use serde_json::{json, Value};
use std::collections::HashMap;

fn wide_selector(width: usize) -> Value {
    let clauses: Vec<Value> = (0..width)
        .map(|i| json!({ format!("field_{i}"): {"$in": [i, format!("v{i}"), null]} }))
        .collect();
    json!({ "$or": clauses, "done": false })
}

fn bench_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile");

    for width in [1, 10, 100] {
        let selector = wide_selector(width);
        group.bench_with_input(BenchmarkId::new("wide_or", width), &selector, |b, selector| {
            b.iter(|| QuerySpec::parse(black_box(selector)).map(|spec| spec.compile()))
        });
    }

    let nested = json!({
        "items": {"$elemMatch": {"qty": {"$gt": 5}, "tags": {"$all": ["a", "b"]}}},
        "$nor": [{"status": "archived"}, {"owner": {"$exists": false}}]
    });
    group.bench_function("nested", |b| {
        b.iter(|| QuerySpec::parse(black_box(&nested)).map(|spec| spec.compile()))
    });

    group.finish();
}

fn bench_evaluate(c: &mut Criterion) {
    let mut group = c.benchmark_group("evaluate");
    let selector = Selector::parse(&wide_selector(10)).unwrap();
    let compiled = QuerySpec::new(selector.clone()).compile();
    let documents: Vec<Value> = (0..1000)
        .map(|i| json!({"done": i % 2 == 0, format!("field_{}", i % 20): i % 20}))
        .collect();

    group.bench_function("predicate_1000_docs", |b| {
        b.iter(|| documents.iter().filter(|d| compiled.matches(black_box(d))).count())
    });
    group.bench_function("selector_1000_docs", |b| {
        b.iter(|| documents.iter().filter(|d| selector.matches(black_box(d))).count())
    });

    group.finish();
}

fn bench_categorize(c: &mut Criterion) {
    let mut group = c.benchmark_group("categorize");
    let key = PrimaryKey::Field("id".into());

    for size in [10, 100, 1000] {
        let stored: HashMap<String, Document> = (0..size / 2)
            .map(|i| {
                let doc = Document::new(json!({"id": format!("d{i}"), "_rev": "1-a"})).unwrap();
                (format!("d{i}"), doc)
            })
            .collect();
        let rows: Vec<WriteRow> = (0..size)
            .map(|i| {
                let document =
                    Document::new(json!({"id": format!("d{i}"), "_rev": "2-b"})).unwrap();
                match stored.get(&format!("d{i}")) {
                    Some(previous) => WriteRow::update(document, previous.clone()),
                    None => WriteRow::insert(document),
                }
            })
            .collect();

        group.bench_with_input(BenchmarkId::new("mixed", size), &rows, |b, rows| {
            b.iter(|| categorize(&key, &stored, black_box(rows.clone()), "bench"))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_compile, bench_evaluate, bench_categorize);
criterion_main!(benches);
