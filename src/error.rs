//! Error types for the inspector engine.

use std::fmt;

/// Result type for inspector operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy shared by every client implementation.
///
/// All client-library failures are translated into these variants at the
/// adapter boundary; no raw client error type ever reaches the key
/// operations engine. Every variant renders as a plain message string
/// suitable for inline display.
#[derive(Debug, Clone)]
pub enum Error {
    /// Socket or timeout failure while establishing a connection.
    ///
    /// Fatal to the current request. Not retried.
    Connection(String),

    /// The server rejected the supplied credentials.
    Auth(String),

    /// The requested database index could not be selected.
    DatabaseSelect(String),

    /// A key's type could not be resolved, typically because the key
    /// vanished between listing and inspection (concurrent external
    /// mutation).
    ///
    /// Caught per key during batch listing, where it degrades the entry
    /// to an unknown type. Fatal only in single-key flows.
    TypeLookup(String),

    /// A viewed or edited key does not exist.
    ///
    /// This is a redirect-equivalent signal back to the listing view,
    /// not an error message.
    NotFound(String),

    /// The operation is not valid for the key's type, or the active
    /// store lacks the capability.
    Unsupported(String),

    /// Invalid server or codec configuration.
    Config(String),

    /// Any other store-layer failure (command error, protocol error,
    /// lost connection mid-request).
    Client(String),

    /// Generic error with custom message (bad encoder input and the
    /// like).
    Other(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Connection(msg) => write!(f, "Connection failed: {}", msg),
            Error::Auth(msg) => write!(f, "Authentication failed: {}", msg),
            Error::DatabaseSelect(msg) => write!(f, "Database select failed: {}", msg),
            Error::TypeLookup(msg) => write!(f, "Type lookup failed: {}", msg),
            Error::NotFound(key) => write!(f, "Key \"{}\" does not exist", key),
            Error::Unsupported(msg) => write!(f, "Unsupported operation: {}", msg),
            Error::Config(msg) => write!(f, "Config error: {}", msg),
            Error::Client(msg) => write!(f, "Store error: {}", msg),
            Error::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<String> for Error {
    fn from(e: String) -> Self {
        Error::Other(e)
    }
}

impl From<&str> for Error {
    fn from(e: &str) -> Self {
        Error::Other(e.to_string())
    }
}

// ============================================================================
// Conversions from client-library error types
// ============================================================================

/// Fallback translation for `redis` crate errors hit outside the
/// connect/auth/select steps (those steps map their own variants).
#[cfg(feature = "direct")]
impl From<redis::RedisError> for Error {
    fn from(e: redis::RedisError) -> Self {
        if e.is_io_error() || e.is_timeout() {
            Error::Connection(e.to_string())
        } else {
            Error::Client(e.to_string())
        }
    }
}

#[cfg(feature = "pooled")]
impl From<deadpool_redis::PoolError> for Error {
    fn from(e: deadpool_redis::PoolError) -> Self {
        Error::Connection(format!("failed to get pooled connection: {}", e))
    }
}
