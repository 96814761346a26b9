//! IPC sessions.
//!
//! A [`Session`] owns one transport connection and performs exactly one
//! request/response exchange at a time. Callers sharing a session queue on its
//! lock; every frame part is written or read under a fresh deadline.

use crate::endpoint::Endpoint;
use crate::error::{IpcError, OnFailure, Outcome};
use crate::stream::IpcStream;
use bytes::Bytes;
use nanogate_protocol::{
    decode_length, encode_length, ProtocolError, DEFAULT_MAX_PAYLOAD_SIZE, LENGTH_SIZE, PREAMBLE,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{Mutex, MutexGuard};
use uuid::Uuid;

/// Default connect timeout (15 seconds).
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Default read/write timeout (30 seconds).
pub const DEFAULT_READ_WRITE_TIMEOUT: Duration = Duration::from_secs(30);

/// Session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Dial timeout.
    pub connect_timeout: Duration,
    /// Deadline applied to every individual write or read of a frame part.
    pub read_write_timeout: Duration,
    /// Largest response length accepted from the node.
    pub max_response_size: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_write_timeout: DEFAULT_READ_WRITE_TIMEOUT,
            max_response_size: DEFAULT_MAX_PAYLOAD_SIZE,
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the connect timeout. Zero means unset and keeps the default.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = if timeout.is_zero() {
            DEFAULT_CONNECT_TIMEOUT
        } else {
            timeout
        };
        self
    }

    /// Sets the read/write timeout. Zero means unset and keeps the default.
    pub fn with_read_write_timeout(mut self, timeout: Duration) -> Self {
        self.read_write_timeout = if timeout.is_zero() {
            DEFAULT_READ_WRITE_TIMEOUT
        } else {
            timeout
        };
        self
    }

    pub fn with_max_response_size(mut self, size: u32) -> Self {
        self.max_response_size = size;
        self
    }
}

/// A persistent connection to the node.
pub struct Session {
    /// Identifier used in log output.
    id: String,
    config: SessionConfig,
    /// Transport; `None` while disconnected. All I/O happens under this lock.
    stream: Mutex<Option<IpcStream>>,
    /// Mirrors `stream.is_some()`; only written while `stream` is locked.
    connected: AtomicBool,
}

impl Session {
    /// Creates a new session (not yet connected).
    pub fn new(config: SessionConfig) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            config,
            stream: Mutex::new(None),
            connected: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Returns whether the session holds a usable transport.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Connects to `tcp://host:port` or `local:///path`.
    ///
    /// An address that does not parse leaves the session untouched.
    pub async fn connect(&self, address: &str) -> Outcome<()> {
        let endpoint = Endpoint::parse(address)
            .on_failure(|e| tracing::debug!(session = %self.id, "Rejected address {:?}: {}", address, e))?;
        self.connect_endpoint(&endpoint).await
    }

    /// Connects to an already parsed endpoint.
    pub async fn connect_endpoint(&self, endpoint: &Endpoint) -> Outcome<()> {
        tracing::debug!(session = %self.id, "Connecting to {}...", endpoint);

        let timeout = self.config.connect_timeout;
        let dialed = match tokio::time::timeout(timeout, IpcStream::connect(endpoint)).await {
            Ok(result) => result,
            Err(_) => Err(IpcError::connection(format!(
                "connecting to {} timed out after {:?}",
                endpoint, timeout
            ))),
        };

        let mut guard = self.stream.lock().await;
        match dialed {
            Ok(stream) => {
                *guard = Some(stream);
                self.connected.store(true, Ordering::SeqCst);
                tracing::debug!(session = %self.id, "Connected to {}", endpoint);
                Ok(())
            }
            Err(e) => {
                *guard = None;
                self.connected.store(false, Ordering::SeqCst);
                tracing::warn!(session = %self.id, "Connection to {} failed: {}", endpoint, e);
                Err(e)
            }
        }
    }

    /// Closes the transport. Closing a closed session succeeds.
    ///
    /// The session is disconnected afterwards even if the close itself fails.
    pub async fn close(&self) -> Outcome<()> {
        let mut guard = self.stream.lock().await;
        self.connected.store(false, Ordering::SeqCst);

        let Some(mut stream) = guard.take() else {
            return Ok(());
        };

        tracing::debug!(session = %self.id, "Closing session");
        match tokio::time::timeout(self.config.read_write_timeout, stream.shutdown()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(IpcError::connection(e.to_string())),
            Err(_) => Err(IpcError::connection("close timed out")),
        }
    }

    /// Sends one request frame and returns the payload of the response frame.
    ///
    /// Any failure drops the transport: a partially written request or an
    /// unread response would corrupt the next exchange on this connection.
    /// The same holds when the returned future is dropped before it completes.
    pub async fn request(&self, payload: &[u8]) -> Outcome<Bytes> {
        let mut in_flight = InFlight {
            stream: self.stream.lock().await,
            connected: &self.connected,
            completed: false,
        };
        let Some(stream) = in_flight.stream.as_mut() else {
            return Err(IpcError::network("Not connected"));
        };

        tracing::debug!(session = %self.id, "Sending request ({} bytes)", payload.len());
        let response = exchange(stream, payload, &self.config)
            .await
            .on_failure(|e| tracing::warn!(session = %self.id, "Request failed: {}", e))?;

        in_flight.completed = true;
        tracing::debug!(session = %self.id, "Got response ({} bytes)", response.len());
        Ok(response)
    }
}

/// Locked transport for one exchange. Unless the exchange completed, dropping
/// it discards the transport and marks the session disconnected.
struct InFlight<'a> {
    stream: MutexGuard<'a, Option<IpcStream>>,
    connected: &'a AtomicBool,
    completed: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.completed {
            *self.stream = None;
            self.connected.store(false, Ordering::SeqCst);
        }
    }
}

/// Writes the request frame in three parts, then reads the response frame.
async fn exchange(
    stream: &mut IpcStream,
    payload: &[u8],
    config: &SessionConfig,
) -> Outcome<Bytes> {
    let timeout = config.read_write_timeout;
    let length = encode_length(payload.len())?;

    write_part(stream, &PREAMBLE, timeout, "preamble").await?;
    write_part(stream, &length, timeout, "length").await?;
    write_part(stream, payload, timeout, "payload").await?;

    let mut length = [0u8; LENGTH_SIZE];
    read_part(stream, &mut length, timeout, "length").await?;

    let declared = decode_length(length);
    if declared > config.max_response_size {
        return Err(ProtocolError::FrameTooLarge {
            size: declared as u64,
            max: config.max_response_size as u64,
        }
        .into());
    }

    let mut response = vec![0u8; declared as usize];
    read_part(stream, &mut response, timeout, "payload").await?;
    Ok(Bytes::from(response))
}

async fn write_part(
    stream: &mut IpcStream,
    buf: &[u8],
    timeout: Duration,
    part: &str,
) -> Outcome<()> {
    let write = async {
        stream.write_all(buf).await?;
        stream.flush().await
    };
    match tokio::time::timeout(timeout, write).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(IpcError::network(format!("writing {}: {}", part, e))),
        Err(_) => Err(IpcError::network(format!(
            "writing {} timed out after {:?}",
            part, timeout
        ))),
    }
}

async fn read_part(
    stream: &mut IpcStream,
    buf: &mut [u8],
    timeout: Duration,
    part: &str,
) -> Outcome<()> {
    match tokio::time::timeout(timeout, stream.read_exact(buf)).await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(e)) => Err(IpcError::network(format!("reading {}: {}", part, e))),
        Err(_) => Err(IpcError::network(format!(
            "reading {} timed out after {:?}",
            part, timeout
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Category;
    use crate::peer::{EchoPeer, PeerReply};
    use std::sync::Arc;

    async fn echo_peer() -> Arc<EchoPeer> {
        let peer = Arc::new(EchoPeer::bind("tcp://127.0.0.1:0").await.unwrap());
        peer.spawn();
        peer
    }

    async fn connected_session(peer: &EchoPeer) -> Session {
        let session = Session::new(SessionConfig::default());
        session.connect(peer.address()).await.unwrap();
        session
    }

    #[test]
    fn test_config_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(15));
        assert_eq!(config.read_write_timeout, Duration::from_secs(30));
        assert_eq!(config.max_response_size, DEFAULT_MAX_PAYLOAD_SIZE);
    }

    #[test]
    fn test_zero_timeouts_keep_defaults() {
        let config = SessionConfig::new()
            .with_connect_timeout(Duration::ZERO)
            .with_read_write_timeout(Duration::ZERO);
        assert_eq!(config.connect_timeout, DEFAULT_CONNECT_TIMEOUT);
        assert_eq!(config.read_write_timeout, DEFAULT_READ_WRITE_TIMEOUT);

        let config = SessionConfig::new().with_read_write_timeout(Duration::from_secs(2));
        assert_eq!(config.read_write_timeout, Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_request_without_connect() {
        let session = Session::new(SessionConfig::default());
        assert!(!session.is_connected());

        let err = session.request(b"{}").await.unwrap_err();
        assert_eq!(err.category(), Category::Network);
        assert_eq!(err.message(), "Not connected");
    }

    #[tokio::test]
    async fn test_tcp_echo() {
        let peer = echo_peer().await;
        let session = connected_session(&peer).await;
        assert!(session.is_connected());

        let response = session.request(br#"{"a":1}"#).await.unwrap();
        assert_eq!(response.as_ref(), br#"{"a":1}"#);

        // Several exchanges reuse the same connection
        let response = session.request(br#"{"action":"version"}"#).await.unwrap();
        assert_eq!(response.as_ref(), br#"{"action":"version"}"#);
        assert_eq!(peer.connections_accepted(), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_local_echo() {
        let dir = tempfile::tempdir().unwrap();
        let address = format!("local://{}", dir.path().join("node.sock").display());
        let peer = Arc::new(EchoPeer::bind(&address).await.unwrap());
        peer.spawn();

        let session = Session::new(SessionConfig::default());
        session.connect(&address).await.unwrap();
        let response = session.request(br#"{"a":1}"#).await.unwrap();
        assert_eq!(response.as_ref(), br#"{"a":1}"#);
    }

    #[tokio::test]
    async fn test_empty_payload_roundtrip() {
        let peer = echo_peer().await;
        let session = connected_session(&peer).await;

        let response = session.request(b"").await.unwrap();
        assert!(response.is_empty());
        assert!(session.is_connected());
    }

    #[tokio::test]
    async fn test_invalid_address_keeps_state() {
        let peer = echo_peer().await;
        let session = connected_session(&peer).await;

        let err = session.connect("ftp://bad").await.unwrap_err();
        assert_eq!(err.category(), Category::Connection);
        assert!(err.message().contains("ftp"));

        assert!(session.is_connected());
        assert!(session.request(b"{}").await.is_ok());
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let session = Session::new(SessionConfig::default());
        let err = session
            .connect(&format!("tcp://127.0.0.1:{}", port))
            .await
            .unwrap_err();
        assert_eq!(err.category(), Category::Connection);
        assert!(!session.is_connected());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let peer = echo_peer().await;
        let session = connected_session(&peer).await;

        session.close().await.unwrap();
        assert!(!session.is_connected());
        session.close().await.unwrap();
        assert!(!session.is_connected());

        let err = session.request(b"{}").await.unwrap_err();
        assert_eq!(err.category(), Category::Network);
    }

    #[tokio::test]
    async fn test_truncated_response_times_out() {
        let peer = Arc::new(
            EchoPeer::bind("tcp://127.0.0.1:0")
                .await
                .unwrap()
                .with_responder(|_| PeerReply::Truncated {
                    declared: 100,
                    body: Bytes::from_static(b"short"),
                }),
        );
        peer.spawn();

        let config = SessionConfig::new().with_read_write_timeout(Duration::from_millis(200));
        let session = Session::new(config);
        session.connect(peer.address()).await.unwrap();

        let started = std::time::Instant::now();
        let err = session.request(b"{}").await.unwrap_err();
        assert_eq!(err.category(), Category::Network);
        assert!(err.message().contains("timed out"));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(!session.is_connected());
    }

    #[tokio::test]
    async fn test_peer_hangup_is_network_error() {
        let peer = Arc::new(
            EchoPeer::bind("tcp://127.0.0.1:0")
                .await
                .unwrap()
                .with_responder(|_| PeerReply::Hangup),
        );
        peer.spawn();
        let session = connected_session(&peer).await;

        let err = session.request(b"{}").await.unwrap_err();
        assert_eq!(err.category(), Category::Network);
        assert!(!session.is_connected());

        let err = session.request(b"{}").await.unwrap_err();
        assert_eq!(err.message(), "Not connected");
    }

    #[tokio::test]
    async fn test_oversized_response_rejected() {
        let peer = echo_peer().await;
        let session = Session::new(SessionConfig::new().with_max_response_size(4));
        session.connect(peer.address()).await.unwrap();

        let err = session.request(b"0123456789").await.unwrap_err();
        assert_eq!(err.category(), Category::Network);
        assert!(err.message().contains("too large"));
    }

    #[tokio::test]
    async fn test_abandoned_request_discards_connection() {
        let peer = Arc::new(
            EchoPeer::bind("tcp://127.0.0.1:0")
                .await
                .unwrap()
                .with_responder(|payload| PeerReply::Delayed {
                    delay: Duration::from_millis(300),
                    body: payload.clone(),
                }),
        );
        peer.spawn();
        let session = connected_session(&peer).await;

        // Request frame is written, the caller gives up before the reply
        let abandoned =
            tokio::time::timeout(Duration::from_millis(50), session.request(b"client-A")).await;
        assert!(abandoned.is_err());
        assert!(!session.is_connected());

        // The late reply to client-A is never handed to the next caller
        let err = session.request(b"client-B").await.unwrap_err();
        assert_eq!(err.category(), Category::Network);
        assert_eq!(err.message(), "Not connected");

        session.connect(peer.address()).await.unwrap();
        let response = session.request(b"client-B").await.unwrap();
        assert_eq!(response.as_ref(), b"client-B");
    }

    #[tokio::test]
    async fn test_concurrent_requests_serialize() {
        let peer = echo_peer().await;
        let session = Arc::new(connected_session(&peer).await);

        let mut tasks = Vec::new();
        for i in 0..16 {
            let session = session.clone();
            tasks.push(tokio::spawn(async move {
                let payload = format!(r#"{{"id":{},"pad":"{}"}}"#, i, "x".repeat(i * 512));
                let response = session.request(payload.as_bytes()).await.unwrap();
                assert_eq!(response.as_ref(), payload.as_bytes());
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(peer.requests_served(), 16);
    }
}
