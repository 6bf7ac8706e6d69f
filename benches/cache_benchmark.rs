use cookie::Cookie;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use httpx::cache::{CachedResponse, ResponseCache};
use httpx::param::CharacterEncoding;
use httpx::response::Response;

fn snapshot(body_size: usize, encoding: CharacterEncoding) -> CachedResponse {
    let mut response = Response::new();
    response
        .with_content_type("text/html")
        .with_encoding(encoding)
        .add_header("Cache-Control", "no-store")
        .add_cookie(Cookie::new("session", "abc"))
        .with_body("数据".repeat(body_size / 6 + 1));
    CachedResponse::from(&response)
}

fn cache_set_get_benchmark(c: &mut Criterion) {
    let cache = ResponseCache::new();
    let item = snapshot(1024, CharacterEncoding::Utf8);

    c.bench_function("cache_set", |b| {
        b.iter(|| cache.set_item(black_box(item.clone())));
    });

    c.bench_function("cache_get", |b| {
        b.iter(|| black_box(cache.get_cached_item()));
    });

    c.bench_function("cache_expiry_check", |b| {
        b.iter(|| black_box(cache.is_expired(Some(std::time::Duration::from_secs(60)))));
    });
}

fn wire_encoding_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("wire_encoding");

    for size in [256, 4096, 65536].iter() {
        for encoding in [CharacterEncoding::Utf8, CharacterEncoding::Utf16Le] {
            let item = snapshot(*size, encoding);
            group.bench_with_input(
                BenchmarkId::new(encoding.label(), size),
                &item,
                |b, item| {
                    b.iter(|| black_box(item.as_bytes()));
                },
            );
        }
    }

    group.finish();
}

criterion_group!(benches, cache_set_get_benchmark, wire_encoding_benchmark);
criterion_main!(benches);
