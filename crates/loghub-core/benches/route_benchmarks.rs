//! Benchmarks for route matching and result merging.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use loghub_core::{RouteSet, SearchParams, SearchResult, SearchResults, SearchRoute};

fn route_set(size: usize) -> RouteSet {
    (0..size)
        .map(|i| {
            SearchRoute::new()
                .with_type("KubernetesPod")
                .with_id_prefix(format!("svc-{i}"))
                .with_label("app", "web,api,!batch")
                .with_label("env", "*")
        })
        .collect()
}

fn benchmark_single_route(c: &mut Criterion) {
    let routes = route_set(1);
    let params = SearchParams::new()
        .with_type("KubernetesPod")
        .with_id("svc-0-abc")
        .with_label("app", "api")
        .with_label("env", "prod");

    c.bench_function("match_single_route", |b| {
        b.iter(|| routes.match_params(black_box(&params)));
    });
}

fn benchmark_miss_many_routes(c: &mut Criterion) {
    let routes = route_set(100);
    let params = SearchParams::new()
        .with_type("KubernetesPod")
        .with_id("other")
        .with_label("app", "api");

    c.bench_function("miss_100_routes", |b| {
        b.iter(|| routes.match_params(black_box(&params)));
    });
}

fn benchmark_merge(c: &mut Criterion) {
    let page = SearchResults::from_results(
        (0..100)
            .map(|i| SearchResult::new(format!("line {i}")).with_label("app", "web"))
            .collect(),
    );

    c.bench_function("merge_10_pages_of_100", |b| {
        b.iter(|| {
            let mut acc = SearchResults::default();
            for _ in 0..10 {
                acc.merge(black_box(page.clone()));
            }
            acc
        });
    });
}

fn benchmark_resolve(c: &mut Criterion) {
    c.bench_function("resolve_params", |b| {
        b.iter(|| {
            let params = SearchParams::new().with_start(black_box("1h30m")).resolve();
            params.start_instant()
        });
    });
}

criterion_group!(
    benches,
    benchmark_single_route,
    benchmark_miss_many_routes,
    benchmark_merge,
    benchmark_resolve,
);
criterion_main!(benches);
