//! Benchmarks for the cache path
//!
//! This benchmark measures:
//! - Cache key derivation as params and body grow
//! - Store get/set under a populated map
//! - A full `FetchClient::execute` answered from cache

use async_trait::async_trait;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use resilient_fetch::cache::{CacheKey, CacheStore};
use resilient_fetch::client::RequestDescriptor;
use resilient_fetch::transport::{Transport, TransportError, TransportResponse};
use resilient_fetch::{FetchClient, RequestOptions};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

struct StaticTransport;

#[async_trait]
impl Transport for StaticTransport {
    async fn send(
        &self,
        _request: &RequestDescriptor,
        _cancel: &CancellationToken,
    ) -> Result<TransportResponse, TransportError> {
        Ok(TransportResponse::ok(json!({"services": ["plumbing", "roofing"]})))
    }
}

fn params(n: usize) -> BTreeMap<String, Value> {
    (0..n)
        .map(|i| (format!("param_{i}"), json!({"value": i, "tags": ["a", "b"]})))
        .collect()
}

fn bench_key_derivation(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache_key_derivation");

    for size in [1usize, 8, 64] {
        let p = params(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("params", size), &p, |b, p| {
            b.iter(|| CacheKey::derive("GET", black_box("/api/search"), Some(black_box(p)), None))
        });
    }

    let body = json!({"filter": {"city": "Lyon", "radius": 5}, "sort": "price", "page": 3});
    group.bench_function("json_body", |b| {
        b.iter(|| CacheKey::derive("POST", "/api/search", None, Some(black_box(&body))))
    });

    group.finish();
}

fn bench_store_operations(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache_store");
    let store = CacheStore::new();
    let ttl = Duration::from_secs(300);
    let keys: Vec<CacheKey> = (0..1000)
        .map(|i| CacheKey::new(format!("key-{i}")))
        .collect();
    for key in &keys {
        store.set(key.clone(), json!({"payload": key.as_str()}), ttl);
    }

    group.bench_function("get_hit", |b| {
        let mut i = 0usize;
        b.iter(|| {
            i = (i + 1) % keys.len();
            black_box(store.get(&keys[i]))
        })
    });

    let absent = CacheKey::new("absent");
    group.bench_function("get_miss", |b| b.iter(|| black_box(store.get(&absent))));

    group.bench_function("set_overwrite", |b| {
        let mut i = 0usize;
        b.iter(|| {
            i = (i + 1) % keys.len();
            store.set(keys[i].clone(), json!(i), ttl)
        })
    });

    group.finish();
}

fn bench_cached_execute(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let options = RequestOptions::builder("/api/services")
        .cache_ttl(Duration::from_secs(300))
        .build()
        .unwrap();
    let client: FetchClient<Value> = FetchClient::builder(options)
        .transport(Arc::new(StaticTransport))
        .cache_store(CacheStore::shared())
        .build()
        .unwrap();
    runtime.block_on(client.execute()).unwrap();

    c.bench_function("fetch_client_cached_execute", |b| {
        b.to_async(&runtime)
            .iter(|| async { black_box(client.execute().await.unwrap()) })
    });
}

criterion_group!(
    benches,
    bench_key_derivation,
    bench_store_operations,
    bench_cached_execute
);
criterion_main!(benches);
