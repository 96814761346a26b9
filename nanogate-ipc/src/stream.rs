//! Transport stream abstraction for TCP and Unix-domain sockets.

use crate::endpoint::Endpoint;
use crate::error::IpcError;
use pin_project_lite::pin_project;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
#[cfg(unix)]
use tokio::net::UnixStream;

#[cfg(unix)]
pin_project! {
    /// A node connection over TCP or a Unix-domain socket.
    #[project = IpcStreamProj]
    pub enum IpcStream {
        Tcp { #[pin] stream: TcpStream },
        Local { #[pin] stream: UnixStream },
    }
}

#[cfg(not(unix))]
pin_project! {
    /// A node connection over TCP.
    #[project = IpcStreamProj]
    pub enum IpcStream {
        Tcp { #[pin] stream: TcpStream },
    }
}

impl IpcStream {
    /// Dials the endpoint. Failures are `Connection` errors.
    pub async fn connect(endpoint: &Endpoint) -> Result<Self, IpcError> {
        match endpoint {
            Endpoint::Tcp { host, port } => {
                // IPv6 literals keep their brackets in the parsed host
                let host = host.trim_start_matches('[').trim_end_matches(']');
                let stream = TcpStream::connect((host, *port))
                    .await
                    .map_err(|e| IpcError::connection(e.to_string()))?;
                if let Err(e) = stream.set_nodelay(true) {
                    tracing::debug!("Failed to set TCP_NODELAY: {}", e);
                }
                Ok(IpcStream::Tcp { stream })
            }
            #[cfg(unix)]
            Endpoint::Local { path } => {
                let stream = UnixStream::connect(path)
                    .await
                    .map_err(|e| IpcError::connection(e.to_string()))?;
                Ok(IpcStream::Local { stream })
            }
            #[cfg(not(unix))]
            Endpoint::Local { .. } => Err(IpcError::connection(
                "local sockets are not supported on this platform",
            )),
        }
    }
}

impl AsyncRead for IpcStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.project() {
            IpcStreamProj::Tcp { stream } => stream.poll_read(cx, buf),
            #[cfg(unix)]
            IpcStreamProj::Local { stream } => stream.poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for IpcStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.project() {
            IpcStreamProj::Tcp { stream } => stream.poll_write(cx, buf),
            #[cfg(unix)]
            IpcStreamProj::Local { stream } => stream.poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.project() {
            IpcStreamProj::Tcp { stream } => stream.poll_flush(cx),
            #[cfg(unix)]
            IpcStreamProj::Local { stream } => stream.poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.project() {
            IpcStreamProj::Tcp { stream } => stream.poll_shutdown(cx),
            #[cfg(unix)]
            IpcStreamProj::Local { stream } => stream.poll_shutdown(cx),
        }
    }
}
