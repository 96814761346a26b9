//! Round-robin session pool with bulk reconnect.
//!
//! The pool connects up to `size` sessions to one node address. Requests pick
//! a session with [`SessionPool::select`]; when a request fails with a
//! `Network` error the caller runs [`SessionPool::reconnect_all`], which is the
//! only way a broken session is ever replaced.

use crate::endpoint::Endpoint;
use crate::error::Outcome;
use crate::session::{Session, SessionConfig};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinSet;

/// Default number of sessions.
pub const DEFAULT_POOL_SIZE: usize = 1;

/// Default node address.
pub const DEFAULT_NODE_ADDRESS: &str = "local:///tmp/nano";

/// Pool configuration.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Node address, `tcp://host:port` or `local:///path`.
    pub address: String,
    /// Number of sessions to keep connected.
    pub size: usize,
    /// Settings applied to every session.
    pub session: SessionConfig,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_NODE_ADDRESS.to_string(),
            size: DEFAULT_POOL_SIZE,
            session: SessionConfig::default(),
        }
    }
}

impl PoolConfig {
    pub fn new(address: impl Into<String>, size: usize) -> Self {
        Self {
            address: address.into(),
            size,
            session: SessionConfig::default(),
        }
    }

    pub fn with_session_config(mut self, session: SessionConfig) -> Self {
        self.session = session;
        self
    }
}

/// A fixed-size set of sessions selected round-robin.
pub struct SessionPool {
    config: PoolConfig,
    /// Connected sessions, in fill order.
    sessions: RwLock<Vec<Arc<Session>>>,
    next_index: AtomicUsize,
    /// Set when the last fill connected fewer than `config.size` sessions.
    needs_reconnect: AtomicBool,
    /// Serializes `fill`, `reconnect_all` and `close_all`.
    maintenance: Mutex<()>,
}

impl SessionPool {
    /// Creates an empty pool. Nothing is connected until [`SessionPool::fill`].
    pub fn new(config: PoolConfig) -> Self {
        Self {
            config,
            sessions: RwLock::new(Vec::new()),
            next_index: AtomicUsize::new(0),
            needs_reconnect: AtomicBool::new(true),
            maintenance: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Number of sessions currently held.
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Returns whether the pool holds fewer sessions than configured.
    pub fn needs_reconnect(&self) -> bool {
        self.needs_reconnect.load(Ordering::SeqCst)
    }

    /// Snapshot of the held sessions, in selection order.
    pub fn sessions(&self) -> Vec<Arc<Session>> {
        self.sessions.read().clone()
    }

    /// Connects up to `size` sessions, stopping at the first failure.
    ///
    /// Sessions from a previous fill are replaced and closed. Returns the
    /// connection error that stopped the fill, if any.
    pub async fn fill(&self) -> Outcome<()> {
        let _maintenance = self.maintenance.lock().await;
        self.fill_locked().await
    }

    /// Closes every session, resets the round-robin counter and fills again.
    pub async fn reconnect_all(&self) -> Outcome<()> {
        let _maintenance = self.maintenance.lock().await;

        let previous = std::mem::take(&mut *self.sessions.write());
        self.next_index.store(0, Ordering::SeqCst);
        // Stays set if this call is dropped before the fill completes
        self.needs_reconnect.store(true, Ordering::SeqCst);
        tracing::info!(
            "Reconnecting {} session(s) to {}",
            previous.len(),
            self.config.address
        );
        close_sessions(previous).await;

        self.fill_locked().await
    }

    /// Closes every session and leaves the pool empty.
    pub async fn close_all(&self) {
        let _maintenance = self.maintenance.lock().await;

        let previous = std::mem::take(&mut *self.sessions.write());
        self.needs_reconnect.store(true, Ordering::SeqCst);
        close_sessions(previous).await;
    }

    /// Returns the next session in round-robin order, or `None` if the pool is empty.
    pub fn select(&self) -> Option<Arc<Session>> {
        let sessions = self.sessions.read();
        if sessions.is_empty() {
            return None;
        }
        let next = self.next_index.fetch_add(1, Ordering::Relaxed);
        Some(sessions[next % sessions.len()].clone())
    }

    async fn fill_locked(&self) -> Outcome<()> {
        let size = self.config.size;
        let mut sessions = Vec::with_capacity(size);
        let mut failure = None;

        match Endpoint::parse(&self.config.address) {
            Ok(endpoint) => {
                for _ in 0..size {
                    let session = Session::new(self.config.session.clone());
                    match session.connect_endpoint(&endpoint).await {
                        Ok(()) => sessions.push(Arc::new(session)),
                        Err(e) => {
                            failure = Some(e);
                            break;
                        }
                    }
                }
            }
            Err(e) => failure = Some(e),
        }

        let connected = sessions.len();
        let previous = std::mem::replace(&mut *self.sessions.write(), sessions);
        self.needs_reconnect.store(connected < size, Ordering::SeqCst);
        close_sessions(previous).await;

        if connected < size {
            tracing::warn!(
                "Connected {}/{} session(s) to {}, reconnection attempt required",
                connected,
                size,
                self.config.address
            );
        } else {
            tracing::info!("Connected {} session(s) to {}", connected, self.config.address);
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Closes sessions concurrently; failures are logged and otherwise ignored.
async fn close_sessions(sessions: Vec<Arc<Session>>) {
    if sessions.is_empty() {
        return;
    }

    let mut closing = JoinSet::new();
    for session in sessions {
        closing.spawn(async move {
            if let Err(e) = session.close().await {
                tracing::warn!(session = %session.id(), "Close failed: {}", e);
            }
        });
    }
    while let Some(joined) = closing.join_next().await {
        if let Err(e) = joined {
            tracing::warn!("Close task failed: {}", e);
        }
    }
}
