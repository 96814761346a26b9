//! Prometheus metrics for the gateway.
//!
//! This module provides:
//! - Metrics registry with counters, gauges, and histograms
//! - HTTP server to expose metrics at `/metrics` endpoint

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use nanogate_ipc::Category;
use prometheus::{
    Counter, CounterVec, Encoder, Gauge, Histogram, HistogramOpts, Opts, Registry, TextEncoder,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

/// Round-trip duration buckets (in seconds). The node answers in milliseconds
/// but a stalled exchange runs up to the read/write deadline.
const DURATION_BUCKETS: &[f64] = &[
    0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0, 30.0,
];

/// Prometheus metrics for the gateway.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    /// Total POST requests forwarded to the node.
    pub requests_total: Counter,
    /// Total failed requests by error category.
    pub errors_total: CounterVec,
    /// Total pool reconnects (refills and bulk reconnects).
    pub reconnects_total: Counter,
    /// Sessions currently held by the pool.
    pub pool_sessions: Gauge,
    /// Round-trip duration of forwarded requests.
    pub request_duration: Histogram,
}

impl Metrics {
    /// Creates a new Metrics instance with all metrics registered.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let requests_total = Counter::with_opts(Opts::new(
            "nanogate_requests_total",
            "Total number of requests forwarded to the node",
        ))?;
        registry.register(Box::new(requests_total.clone()))?;

        let errors_total = CounterVec::new(
            Opts::new("nanogate_errors_total", "Total failed requests by category"),
            &["category"],
        )?;
        registry.register(Box::new(errors_total.clone()))?;

        let reconnects_total = Counter::with_opts(Opts::new(
            "nanogate_reconnects_total",
            "Total number of session pool reconnects",
        ))?;
        registry.register(Box::new(reconnects_total.clone()))?;

        let pool_sessions = Gauge::with_opts(Opts::new(
            "nanogate_pool_sessions",
            "Number of sessions held by the pool",
        ))?;
        registry.register(Box::new(pool_sessions.clone()))?;

        let request_duration = Histogram::with_opts(
            HistogramOpts::new(
                "nanogate_request_duration_seconds",
                "Node round-trip duration in seconds",
            )
            .buckets(DURATION_BUCKETS.to_vec()),
        )?;
        registry.register(Box::new(request_duration.clone()))?;

        Ok(Self {
            registry,
            requests_total,
            errors_total,
            reconnects_total,
            pool_sessions,
            request_duration,
        })
    }

    /// Counts one failed request.
    pub fn record_error(&self, category: Category) {
        self.errors_total
            .with_label_values(&[category.as_str()])
            .inc();
    }

    /// Encodes all metrics in Prometheus text format.
    pub fn encode(&self) -> Vec<u8> {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            tracing::warn!("Failed to encode metrics: {}", e);
        }
        buffer
    }
}

/// Runs the HTTP metrics server.
///
/// Serves metrics at `/metrics` and a liveness probe at `/health`.
pub async fn run_metrics_server(
    addr: SocketAddr,
    metrics: Arc<Metrics>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Metrics server listening on http://{}/metrics", addr);

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _)) => {
                        let metrics = metrics.clone();
                        tokio::spawn(async move {
                            let io = TokioIo::new(stream);
                            let service = service_fn(move |req| {
                                let metrics = metrics.clone();
                                async move { Ok::<_, hyper::Error>(route(req, &metrics)) }
                            });
                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                tracing::debug!("Metrics connection error: {}", e);
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!("Metrics server accept error: {}", e);
                    }
                }
            }
            _ = shutdown.recv() => {
                tracing::info!("Metrics server shutting down");
                break;
            }
        }
    }

    Ok(())
}

fn route<B>(req: Request<B>, metrics: &Metrics) -> Response<Full<Bytes>> {
    let (status, content_type, body) = match req.uri().path() {
        "/metrics" => (
            StatusCode::OK,
            "text/plain; version=0.0.4; charset=utf-8",
            Bytes::from(metrics.encode()),
        ),
        "/health" | "/healthz" => (StatusCode::OK, "text/plain", Bytes::from_static(b"OK")),
        _ => (
            StatusCode::NOT_FOUND,
            "text/plain",
            Bytes::from_static(b"Not Found"),
        ),
    };

    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    response.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static(content_type),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();

        metrics.requests_total.inc();
        metrics.reconnects_total.inc();
        metrics.pool_sessions.set(2.0);
        metrics.record_error(Category::Network);
        metrics.record_error(Category::Rest);
        metrics.request_duration.observe(0.002);

        let encoded = String::from_utf8(metrics.encode()).unwrap();
        assert!(encoded.contains("nanogate_requests_total 1"));
        assert!(encoded.contains("nanogate_reconnects_total 1"));
        assert!(encoded.contains("nanogate_pool_sessions 2"));
        assert!(encoded.contains(r#"nanogate_errors_total{category="Network"} 1"#));
        assert!(encoded.contains(r#"nanogate_errors_total{category="REST"} 1"#));
        assert!(encoded.contains("nanogate_request_duration_seconds_count 1"));
    }

    #[test]
    fn test_independent_registries() {
        let first = Metrics::new().unwrap();
        let second = Metrics::new().unwrap();
        first.requests_total.inc();
        assert_eq!(second.requests_total.get(), 0.0);
    }

    #[tokio::test]
    async fn test_routes() {
        let metrics = Metrics::new().unwrap();

        let request = Request::get("/metrics").body(()).unwrap();
        let response = route(request, &metrics);
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert!(String::from_utf8_lossy(&body).contains("nanogate_pool_sessions"));

        let request = Request::get("/health").body(()).unwrap();
        let response = route(request, &metrics);
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"OK");

        let request = Request::get("/other").body(()).unwrap();
        assert_eq!(route(request, &metrics).status(), StatusCode::NOT_FOUND);
    }
}
