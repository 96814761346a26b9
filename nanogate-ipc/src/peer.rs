//! Echo peer speaking the node side of the framing.
//!
//! Accepts request frames on TCP or a Unix-domain socket and answers each
//! with a response frame. By default the response payload is the request
//! payload; a responder closure can substitute replies, including broken ones
//! for exercising the failure paths of sessions and pools.

use crate::endpoint::Endpoint;
use crate::error::{IpcError, Outcome};
use bytes::{BufMut, Bytes, BytesMut};
use nanogate_protocol::{Decoder, ResponseFrame, LENGTH_SIZE};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
#[cfg(unix)]
use tokio::net::UnixListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// How the peer answers one request.
#[derive(Debug, Clone)]
pub enum PeerReply {
    /// A well-formed response frame.
    Respond(Bytes),
    /// A length field promising `declared` bytes followed by `body`.
    Truncated { declared: u32, body: Bytes },
    /// Close the connection without answering.
    Hangup,
    /// Send nothing and keep the connection open.
    Silent,
    /// A well-formed response frame, sent after `delay`.
    Delayed { delay: Duration, body: Bytes },
}

type Responder = Arc<dyn Fn(&Bytes) -> PeerReply + Send + Sync>;

enum PeerListener {
    Tcp(TcpListener),
    #[cfg(unix)]
    Local(UnixListener),
}

/// An in-process IPC peer.
pub struct EchoPeer {
    address: String,
    listener: PeerListener,
    responder: Responder,
    connections: Arc<AtomicUsize>,
    requests: Arc<AtomicU64>,
    shutdown: broadcast::Sender<()>,
}

impl EchoPeer {
    /// Binds to `tcp://host:port` (port 0 picks a free port) or `local:///path`.
    pub async fn bind(address: &str) -> Outcome<Self> {
        let endpoint = Endpoint::parse(address)?;
        let (listener, address) = match &endpoint {
            Endpoint::Tcp { .. } => {
                let addr = endpoint.tcp_addr().unwrap_or_default();
                let listener = TcpListener::bind(addr.as_str())
                    .await
                    .map_err(|e| IpcError::connection(e.to_string()))?;
                let local = listener
                    .local_addr()
                    .map_err(|e| IpcError::connection(e.to_string()))?;
                (PeerListener::Tcp(listener), format!("tcp://{}", local))
            }
            #[cfg(unix)]
            Endpoint::Local { path } => {
                let listener =
                    UnixListener::bind(path).map_err(|e| IpcError::connection(e.to_string()))?;
                (PeerListener::Local(listener), endpoint.to_string())
            }
            #[cfg(not(unix))]
            Endpoint::Local { .. } => {
                return Err(IpcError::connection(
                    "local sockets are not supported on this platform",
                ))
            }
        };

        let (shutdown, _) = broadcast::channel(1);
        Ok(Self {
            address,
            listener,
            responder: Arc::new(|payload: &Bytes| PeerReply::Respond(payload.clone())),
            connections: Arc::new(AtomicUsize::new(0)),
            requests: Arc::new(AtomicU64::new(0)),
            shutdown,
        })
    }

    /// Replaces the echo behaviour.
    pub fn with_responder<F>(mut self, responder: F) -> Self
    where
        F: Fn(&Bytes) -> PeerReply + Send + Sync + 'static,
    {
        self.responder = Arc::new(responder);
        self
    }

    /// Address clients should connect to, with the bound port filled in.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Number of connections accepted so far.
    pub fn connections_accepted(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Number of request frames received so far.
    pub fn requests_served(&self) -> u64 {
        self.requests.load(Ordering::SeqCst)
    }

    /// Runs the accept loop in a background task.
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        let peer = self.clone();
        tokio::spawn(async move { peer.run().await })
    }

    /// Accepts connections until [`EchoPeer::shutdown`] is called.
    pub async fn run(&self) {
        let mut shutdown_rx = self.shutdown.subscribe();
        tracing::info!("Echo peer listening on {}", self.address);

        loop {
            tokio::select! {
                _ = self.accept() => {}
                _ = shutdown_rx.recv() => {
                    tracing::info!("Echo peer shutting down");
                    break;
                }
            }
        }
    }

    /// Stops accepting and drops every open connection.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(());
    }

    async fn accept(&self) {
        match &self.listener {
            PeerListener::Tcp(listener) => match listener.accept().await {
                Ok((stream, addr)) => {
                    if let Err(e) = stream.set_nodelay(true) {
                        tracing::debug!("Failed to set TCP_NODELAY: {}", e);
                    }
                    tracing::debug!("Echo peer accepted {}", addr);
                    self.serve(stream);
                }
                Err(e) => tracing::error!("Echo peer accept error: {}", e),
            },
            #[cfg(unix)]
            PeerListener::Local(listener) => match listener.accept().await {
                Ok((stream, _)) => {
                    tracing::debug!("Echo peer accepted local connection");
                    self.serve(stream);
                }
                Err(e) => tracing::error!("Echo peer accept error: {}", e),
            },
        }
    }

    fn serve<S>(&self, stream: S)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        self.connections.fetch_add(1, Ordering::SeqCst);
        let responder = self.responder.clone();
        let requests = self.requests.clone();
        let mut shutdown_rx = self.shutdown.subscribe();

        tokio::spawn(async move {
            tokio::select! {
                result = handle_connection(stream, responder, requests) => {
                    if let Err(e) = result {
                        tracing::debug!("Echo peer connection error: {}", e);
                    }
                }
                _ = shutdown_rx.recv() => {}
            }
        });
    }
}

/// Reads request frames and answers each according to the responder.
async fn handle_connection<S>(
    mut stream: S,
    responder: Responder,
    requests: Arc<AtomicU64>,
) -> Outcome<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut decoder = Decoder::new();
    let mut buf = [0u8; 8192];

    loop {
        while let Some(payload) = decoder.decode_request()? {
            requests.fetch_add(1, Ordering::SeqCst);

            let reply = match responder(&payload) {
                PeerReply::Respond(body) => ResponseFrame::new(body).encode()?,
                PeerReply::Truncated { declared, body } => {
                    let mut out = BytesMut::with_capacity(LENGTH_SIZE + body.len());
                    out.put_u32(declared);
                    out.put_slice(&body);
                    out
                }
                PeerReply::Hangup => return Ok(()),
                PeerReply::Silent => continue,
                PeerReply::Delayed { delay, body } => {
                    tokio::time::sleep(delay).await;
                    ResponseFrame::new(body).encode()?
                }
            };

            stream
                .write_all(&reply)
                .await
                .map_err(|e| IpcError::network(e.to_string()))?;
        }

        let n = stream
            .read(&mut buf)
            .await
            .map_err(|e| IpcError::network(e.to_string()))?;
        if n == 0 {
            return Ok(());
        }
        decoder.extend(&buf[..n]);
    }
}
