//! Categorized errors and outcome chaining.
//!
//! Every fallible IPC operation returns an [`Outcome`]. The error carries a
//! [`Category`] that tells the caller which recovery applies: `Network`
//! failures mean the pool must reconnect before the next attempt.

use nanogate_protocol::ProtocolError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Code carried by every failure. Zero is reserved for success.
pub const FAILURE_CODE: i32 = 1;

/// Classification used to decide the recovery action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    /// Address parsing, dialing or closing a transport.
    Connection,
    /// Reading or writing on an established session.
    Network,
    /// The HTTP collaborator (body read, body too large).
    #[serde(rename = "REST")]
    Rest,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Connection => "Connection",
            Category::Network => "Network",
            Category::Rest => "REST",
        }
    }

    /// Returns whether errors in this category warrant rebuilding pool sessions.
    ///
    /// Only `Network` does: a `Connection` failure means the pool never got a
    /// session, and the next request refills it anyway.
    pub fn triggers_reconnect(&self) -> bool {
        matches!(self, Category::Network)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable, categorized failure.
///
/// Serialized with the field names HTTP clients of the gateway already parse:
/// `{"Code":1,"Message":"...","Category":"Network"}`.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
#[error("{code}:{category}:{message}")]
pub struct IpcError {
    code: i32,
    message: String,
    category: Category,
}

impl IpcError {
    pub fn new(category: Category, message: impl Into<String>) -> Self {
        Self {
            code: FAILURE_CODE,
            message: message.into(),
            category,
        }
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(Category::Connection, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(Category::Network, message)
    }

    pub fn rest(message: impl Into<String>) -> Self {
        Self::new(Category::Rest, message)
    }

    pub fn code(&self) -> i32 {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn category(&self) -> Category {
        self.category
    }

    /// Serializes the error as the JSON body returned to HTTP clients.
    pub fn to_json(&self) -> Vec<u8> {
        // A struct of an int, a string and a unit enum always serializes.
        serde_json::to_vec(self).unwrap_or_default()
    }
}

/// A malformed frame leaves the connection unusable, so it is a network failure.
impl From<ProtocolError> for IpcError {
    fn from(err: ProtocolError) -> Self {
        IpcError::network(err.to_string())
    }
}

/// Result of an IPC step.
pub type Outcome<T> = Result<T, IpcError>;

/// Runs a failure handler once at the end of a chain of `?`-composed steps.
///
/// ```
/// use nanogate_ipc::{IpcError, OnFailure, Outcome};
///
/// fn write(ok: bool) -> Outcome<()> {
///     if ok {
///         Ok(())
///     } else {
///         Err(IpcError::network("broken pipe"))
///     }
/// }
///
/// fn steps(log: &mut Vec<&'static str>) -> Outcome<()> {
///     log.push("first");
///     write(false)?;
///     log.push("second");
///     Ok(())
/// }
///
/// let mut log = Vec::new();
/// let mut failures = 0;
/// let result = steps(&mut log).on_failure(|_| failures += 1);
/// assert!(result.is_err());
/// assert_eq!(log, ["first"]);
/// assert_eq!(failures, 1);
/// ```
pub trait OnFailure: Sized {
    fn on_failure<F: FnOnce(&IpcError)>(self, f: F) -> Self;
}

impl<T> OnFailure for Outcome<T> {
    fn on_failure<F: FnOnce(&IpcError)>(self, f: F) -> Self {
        if let Err(ref err) = self {
            f(err);
        }
        self
    }
}
