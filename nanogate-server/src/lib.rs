//! # nanogate-server
//!
//! HTTP front end for nanogate.
//!
//! This crate provides:
//! - Layered configuration (defaults, YAML file, environment)
//! - The POST handler forwarding JSON bodies over a session pool
//! - The HTTP listener with graceful shutdown
//! - Prometheus metrics and a health endpoint

pub mod config;
pub mod error;
pub mod handler;
pub mod metrics;
pub mod server;

pub use config::{Config, ConfigError, HttpConfig, MetricsConfig, NodeConfig};
pub use error::GatewayError;
pub use handler::Gateway;
pub use metrics::Metrics;
pub use server::GatewayServer;
