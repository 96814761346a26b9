//! Gateway error types.

use crate::config::ConfigError;
use nanogate_ipc::IpcError;
use thiserror::Error;

/// Gateway errors.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("IPC error: {0}")]
    Ipc(#[from] IpcError),

    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("gateway shutting down")]
    ShuttingDown,
}

impl GatewayError {
    /// Returns whether the error came from the node connection layer.
    pub fn is_ipc(&self) -> bool {
        matches!(self, GatewayError::Ipc(_))
    }
}
