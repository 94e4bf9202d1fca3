use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use bane::{router::pattern::compile, Context, Exception, HttpRequestMethod, Request, Router, Server};

fn router_with(count: usize) -> Router {
    let mut router = Router::new();
    for index in 0..count {
        router
            .get(&format!("/resource{}/:id(\\d+)/:slug?", index), |_ctx: Context| async move {
                Ok::<_, Exception>("")
            })
            .unwrap();
    }
    router
}

fn pattern_compile_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("pattern_compile");

    let patterns = [
        ("static", "/about/team"),
        ("named", "/user/:name"),
        ("custom", "/post/:id(\\d+)/:slug?"),
        ("group", "/archive{-:year(\\d{4})}?/:rest*"),
    ];

    for (name, pattern) in patterns.iter() {
        group.bench_with_input(BenchmarkId::from_parameter(name), pattern, |b, pattern| {
            b.iter(|| compile(black_box(pattern)).unwrap());
        });
    }

    group.finish();
}

fn resolve_position_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("router_resolve_position");
    let router = router_with(100);

    // 线性扫描，越靠后的路由解析越慢
    for position in [0usize, 49, 99].iter() {
        let path = format!("/resource{}/42/hello", position);
        group.bench_with_input(BenchmarkId::from_parameter(position), &path, |b, path| {
            b.iter(|| router.resolve(black_box(path), HttpRequestMethod::Get).unwrap());
        });
    }

    group.finish();
}

fn resolve_miss_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("router_resolve_miss");

    for count in [10usize, 100, 1000].iter() {
        let router = router_with(*count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &router, |b, router| {
            b.iter(|| router.resolve(black_box("/missing"), HttpRequestMethod::Get).is_err());
        });
    }

    group.finish();
}

fn params_benchmark(c: &mut Criterion) {
    let router = router_with(1);
    let route = &router.routes()[0];

    c.bench_function("route_params", |b| {
        b.iter(|| route.params(black_box("/resource0/42/hello")));
    });
}

fn dispatch_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let app = Server::new(
        bane::Env::new("production"),
        std::sync::Arc::new(bane::LogFacade),
        router_with(10),
    )
    .into_app();

    c.bench_function("in_process_dispatch", |b| {
        b.iter(|| {
            runtime.block_on(app.respond(Request::new(HttpRequestMethod::Get, "/resource9/1/x")))
        });
    });
}

criterion_group!(
    benches,
    pattern_compile_benchmark,
    resolve_position_benchmark,
    resolve_miss_benchmark,
    params_benchmark,
    dispatch_benchmark
);
criterion_main!(benches);
