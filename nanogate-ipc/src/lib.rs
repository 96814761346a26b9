//! # nanogate-ipc
//!
//! Connection layer between the gateway and the node.
//!
//! This crate provides:
//! - Address parsing for `tcp://host:port` and `local:///path`
//! - Sessions performing one framed request/response exchange at a time
//! - A round-robin session pool with bulk reconnect
//! - The categorized error type carried back to HTTP callers
//! - An echo peer speaking the node side of the framing

pub mod endpoint;
pub mod error;
pub mod peer;
pub mod pool;
pub mod session;
pub mod stream;

pub use endpoint::Endpoint;
pub use error::{Category, IpcError, OnFailure, Outcome};
pub use peer::{EchoPeer, PeerReply};
pub use pool::{PoolConfig, SessionPool};
pub use session::{Session, SessionConfig};
