//! POST handler forwarding JSON bodies to the node.
//!
//! Every request body is sent verbatim over one pooled session and the node's
//! response payload becomes the HTTP response body. Failures are answered with
//! the serialized [`IpcError`]; a `Network` failure additionally rebuilds the
//! pool's sessions before the response is returned.

use crate::metrics::Metrics;
use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Body;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Method, Request, Response, StatusCode};
use nanogate_ipc::{Category, IpcError, OnFailure, Outcome, SessionPool};
use std::sync::Arc;
use std::time::Instant;

/// Default request body limit (1 MiB).
pub const DEFAULT_MAX_BODY_SIZE: usize = 1024 * 1024;

/// Body of the 405 answer to anything but POST.
pub const METHOD_NOT_ALLOWED_BODY: &str = "Invalid request method. Use POST.";

/// Forwards HTTP requests over a session pool.
pub struct Gateway {
    upstream: Upstream,
    max_body_size: usize,
}

impl Gateway {
    pub fn new(pool: Arc<SessionPool>) -> Self {
        Self {
            upstream: Upstream {
                pool,
                metrics: None,
            },
            max_body_size: DEFAULT_MAX_BODY_SIZE,
        }
    }

    /// Sets the metrics instance.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        metrics.pool_sessions.set(self.upstream.pool.len() as f64);
        self.upstream.metrics = Some(metrics);
        self
    }

    /// Sets the largest accepted request body.
    pub fn with_max_body_size(mut self, max_body_size: usize) -> Self {
        self.max_body_size = max_body_size;
        self
    }

    pub fn pool(&self) -> &Arc<SessionPool> {
        &self.upstream.pool
    }

    /// Handles one HTTP request. Any path is accepted.
    ///
    /// Node I/O runs in its own task: dropping this future, as hyper does
    /// when the client disconnects, never interrupts an exchange or a reconnect.
    pub async fn handle<B>(&self, req: Request<B>) -> Response<Full<Bytes>>
    where
        B: Body,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        if req.method() != Method::POST {
            tracing::debug!("Rejecting {} {}", req.method(), req.uri());
            return respond(
                StatusCode::METHOD_NOT_ALLOWED,
                "text/plain; charset=utf-8",
                Bytes::from_static(METHOD_NOT_ALLOWED_BODY.as_bytes()),
            );
        }

        let metrics = self.upstream.metrics.as_deref();
        let started = Instant::now();
        if let Some(metrics) = metrics {
            metrics.requests_total.inc();
        }

        let result = match read_body(req.into_body(), self.max_body_size).await {
            Ok(body) => {
                let upstream = self.upstream.clone();
                match tokio::spawn(async move { upstream.forward(body).await }).await {
                    Ok(result) => result,
                    Err(e) => Err(IpcError::connection(format!("Forwarding task failed: {}", e))),
                }
            }
            Err(e) => Err(e),
        }
        .on_failure(|err| {
            tracing::warn!("Request failed: {}", err);
            if let Some(metrics) = metrics {
                metrics.record_error(err.category());
            }
        });

        if let Some(metrics) = metrics {
            metrics
                .request_duration
                .observe(started.elapsed().as_secs_f64());
        }

        match result {
            Ok(payload) => respond(StatusCode::OK, "application/json", payload),
            Err(err) => respond(
                status_for(err.category()),
                "application/json",
                Bytes::from(err.to_json()),
            ),
        }
    }
}

/// The pool side of the gateway, cloned into each forwarding task.
#[derive(Clone)]
struct Upstream {
    pool: Arc<SessionPool>,
    metrics: Option<Arc<Metrics>>,
}

impl Upstream {
    /// Sends `body` on the next session. A `Network` failure rebuilds the
    /// pool's sessions before the error is returned.
    async fn forward(&self, body: Bytes) -> Outcome<Bytes> {
        if self.pool.needs_reconnect() {
            self.refill().await?;
        }

        let session = self
            .pool
            .select()
            .ok_or_else(|| IpcError::connection("No connected sessions"))?;

        tracing::debug!(
            "Forwarding {} byte(s) on session {}",
            body.len(),
            session.id()
        );
        let result = session.request(&body).await;
        if let Err(ref err) = result {
            if err.category().triggers_reconnect() {
                self.reconnect().await;
            }
        }
        result
    }

    async fn refill(&self) -> Outcome<()> {
        tracing::info!("Session pool incomplete, filling before request");
        if let Some(ref metrics) = self.metrics {
            metrics.reconnects_total.inc();
        }
        let result = self.pool.fill().await;
        self.update_pool_gauge();
        result
    }

    async fn reconnect(&self) {
        if let Some(ref metrics) = self.metrics {
            metrics.reconnects_total.inc();
        }
        if let Err(e) = self.pool.reconnect_all().await {
            tracing::warn!("Reconnect failed: {}", e);
        }
        self.update_pool_gauge();
    }

    fn update_pool_gauge(&self) {
        if let Some(ref metrics) = self.metrics {
            metrics.pool_sessions.set(self.pool.len() as f64);
        }
    }
}

async fn read_body<B>(body: B, limit: usize) -> Outcome<Bytes>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => Err(IpcError::rest(format!(
            "Request body exceeds {} bytes",
            limit
        ))),
        Err(e) => Err(IpcError::rest(format!("Failed to read request body: {}", e))),
    }
}

fn status_for(category: Category) -> StatusCode {
    match category {
        Category::Connection | Category::Network => StatusCode::BAD_GATEWAY,
        Category::Rest => StatusCode::BAD_REQUEST,
    }
}

fn respond(status: StatusCode, content_type: &'static str, body: Bytes) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}
