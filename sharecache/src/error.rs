//! Client-facing error types.

use serde_json::Value;
use thiserror::Error;

/// Errors surfaced by the [`SharedCache`](crate::client::SharedCache) proxy.
///
/// A memoized computation's own failure is data, not a protocol failure: it
/// comes back as [`CacheError::Rejected`] carrying the original rejection
/// reason verbatim.
#[derive(Debug, Error)]
pub enum CacheError {
    /// A `get` waited on a pending entry past its deadline.
    #[error("get timed out waiting for a pending value to settle")]
    Timeout,

    /// The memoized computation rejected; the value is the original reason.
    #[error("cached computation rejected: {0}")]
    Rejected(Value),

    /// The coordinator is gone or this connection was shut down.
    #[error("coordinator connection closed")]
    ConnectionClosed,

    /// The coordinator refused the request with a protocol error.
    #[error("protocol error: {0}")]
    Protocol(String),
}
