//! HTTP listener.

use crate::error::GatewayError;
use crate::handler::Gateway;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

/// Server statistics.
#[derive(Debug, Default)]
pub struct ServerStats {
    pub connections_total: AtomicU64,
    pub connections_active: AtomicU64,
}

/// HTTP server fronting a [`Gateway`].
pub struct GatewayServer {
    gateway: Arc<Gateway>,
    stats: Arc<ServerStats>,
    shutdown: broadcast::Sender<()>,
    running: AtomicBool,
}

impl GatewayServer {
    pub fn new(gateway: Gateway) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            gateway: Arc::new(gateway),
            stats: Arc::new(ServerStats::default()),
            shutdown: shutdown_tx,
            running: AtomicBool::new(false),
        }
    }

    /// Binds `addr` and serves until [`GatewayServer::shutdown`] is called.
    pub async fn run(&self, addr: SocketAddr) -> Result<(), GatewayError> {
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener).await
    }

    /// Serves connections from an already bound listener.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), GatewayError> {
        self.running.store(true, Ordering::SeqCst);
        tracing::info!("Gateway listening on http://{}", listener.local_addr()?);

        let mut shutdown_rx = self.shutdown.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            self.stats.connections_total.fetch_add(1, Ordering::Relaxed);
                            self.stats.connections_active.fetch_add(1, Ordering::Relaxed);

                            let gateway = self.gateway.clone();
                            let stats = self.stats.clone();
                            let mut conn_shutdown = self.shutdown.subscribe();

                            tokio::spawn(async move {
                                tracing::debug!("Client connected: {}", addr);
                                let io = TokioIo::new(stream);
                                let service = service_fn(move |req| {
                                    let gateway = gateway.clone();
                                    async move { Ok::<_, Infallible>(gateway.handle(req).await) }
                                });
                                let conn = http1::Builder::new().serve_connection(io, service);
                                tokio::pin!(conn);

                                tokio::select! {
                                    result = conn.as_mut() => {
                                        if let Err(e) = result {
                                            tracing::debug!("Connection {} error: {}", addr, e);
                                        }
                                    }
                                    _ = conn_shutdown.recv() => {
                                        conn.as_mut().graceful_shutdown();
                                        if let Err(e) = conn.await {
                                            tracing::debug!("Connection {} error: {}", addr, e);
                                        }
                                    }
                                }

                                stats.connections_active.fetch_sub(1, Ordering::Relaxed);
                                tracing::debug!("Client disconnected: {}", addr);
                            });
                        }
                        Err(e) => {
                            tracing::error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    tracing::info!("Gateway shutting down");
                    break;
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Initiates server shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(());
    }

    /// Returns whether the server is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Returns server statistics.
    pub fn stats(&self) -> &ServerStats {
        &self.stats
    }

    pub fn gateway(&self) -> &Arc<Gateway> {
        &self.gateway
    }
}
