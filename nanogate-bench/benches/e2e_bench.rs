//! End-to-end benchmarks against an in-process echo peer.

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use http_body_util::Full;
use hyper::Request;
use nanogate_ipc::{EchoPeer, PoolConfig, Session, SessionConfig, SessionPool};
use nanogate_server::Gateway;
use std::sync::Arc;
use tokio::runtime::Runtime;

fn start_peer(rt: &Runtime, address: &str) -> Arc<EchoPeer> {
    rt.block_on(async {
        let peer = Arc::new(EchoPeer::bind(address).await.unwrap());
        peer.spawn();
        peer
    })
}

fn payload(size: usize) -> Bytes {
    Bytes::from(format!(r#"{{"action":"echo","data":"{}"}}"#, "x".repeat(size)))
}

fn bench_session_tcp(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let peer = start_peer(&rt, "tcp://127.0.0.1:0");

    let session = Session::new(SessionConfig::new());
    rt.block_on(session.connect(peer.address())).unwrap();

    let mut group = c.benchmark_group("session_tcp");
    for size in [100, 10000] {
        let body = payload(size);
        group.throughput(Throughput::Bytes(body.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &body, |b, body| {
            b.to_async(&rt)
                .iter(|| async { black_box(session.request(body).await.unwrap()) });
        });
    }
    group.finish();
}

#[cfg(unix)]
fn bench_session_local(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let dir = tempfile::TempDir::new().unwrap();
    let address = format!("local://{}", dir.path().join("bench.sock").display());
    let peer = start_peer(&rt, &address);

    let session = Session::new(SessionConfig::new());
    rt.block_on(session.connect(peer.address())).unwrap();

    let mut group = c.benchmark_group("session_local");
    for size in [100, 10000] {
        let body = payload(size);
        group.throughput(Throughput::Bytes(body.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &body, |b, body| {
            b.to_async(&rt)
                .iter(|| async { black_box(session.request(body).await.unwrap()) });
        });
    }
    group.finish();
}

#[cfg(not(unix))]
fn bench_session_local(_c: &mut Criterion) {}

fn bench_pool_concurrent(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let peer = start_peer(&rt, "tcp://127.0.0.1:0");

    let mut group = c.benchmark_group("pool_concurrent");
    for pool_size in [1, 4] {
        let pool = Arc::new(SessionPool::new(PoolConfig::new(peer.address(), pool_size)));
        rt.block_on(pool.fill()).unwrap();
        let body = payload(100);

        // 16 in-flight requests per iteration
        group.throughput(Throughput::Elements(16));
        group.bench_with_input(BenchmarkId::from_parameter(pool_size), &pool, |b, pool| {
            b.to_async(&rt).iter(|| async {
                let mut tasks = tokio::task::JoinSet::new();
                for _ in 0..16 {
                    let pool = pool.clone();
                    let body = body.clone();
                    tasks.spawn(async move {
                        let session = pool.select().unwrap();
                        session.request(&body).await.unwrap()
                    });
                }
                while let Some(result) = tasks.join_next().await {
                    black_box(result.unwrap());
                }
            });
        });
    }
    group.finish();
}

fn bench_gateway_handle(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let peer = start_peer(&rt, "tcp://127.0.0.1:0");

    let pool = Arc::new(SessionPool::new(PoolConfig::new(peer.address(), 2)));
    rt.block_on(pool.fill()).unwrap();
    let gateway = Gateway::new(pool);
    let body = payload(100);

    let mut group = c.benchmark_group("gateway_handle");
    group.throughput(Throughput::Elements(1));
    group.bench_function("post", |b| {
        b.to_async(&rt).iter(|| async {
            let request = Request::post("/").body(Full::new(body.clone())).unwrap();
            black_box(gateway.handle(request).await)
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_session_tcp,
    bench_session_local,
    bench_pool_concurrent,
    bench_gateway_handle
);
criterion_main!(benches);
