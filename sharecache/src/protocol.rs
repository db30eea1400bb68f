//! Wire protocol between client proxies and the coordinator.
//!
//! Every request carries a call id (correlates the response back to the
//! caller), the cache name it addresses, an operation name and a JSON args
//! object. The operation name travels as a plain string so that a missing or
//! unknown operation is representable and can be answered with a protocol
//! error instead of being unexpressible in the type system.
//!
//! Responses are either a reply correlated by call id, or an uncorrelated
//! error (used when the request was too malformed to correlate, and for
//! coordinator-wide broadcasts).
//!
//! Identifiers are process-wide atomic counters. Call ids correlate calls;
//! writer ids arbitrate concurrent writers to one key and are deliberately
//! a separate type, reused across every message of one logical deferred
//! `set`.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::store::Status;

// =============================================================================
// Identifiers
// =============================================================================

/// Global counter backing all id types. A single sequence keeps any two ids
/// in the process distinct, whichever client minted them.
static SEQUENCE_COUNTER: AtomicU64 = AtomicU64::new(1);

fn next_sequence() -> u64 {
    SEQUENCE_COUNTER.fetch_add(1, Ordering::Relaxed)
}

macro_rules! id_type {
    ($(#[$doc:meta])* $name:ident, $prefix:literal) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            /// Mints a fresh, process-unique id.
            pub fn next() -> Self {
                Self(next_sequence())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

id_type!(
    /// Correlates one request with its response.
    CallId,
    "call-"
);

id_type!(
    /// Identifies the logical write operation that owns a key's in-flight
    /// value. Race resolution compares writer ids, never arrival order.
    WriterId,
    "writer-"
);

id_type!(
    /// Identifies one client connection at the coordinator.
    ClientId,
    "client-"
);

// =============================================================================
// Operation names
// =============================================================================

/// Operation names as they appear on the wire.
pub mod op {
    pub const HAS: &str = "has";
    pub const GET: &str = "get";
    pub const SET: &str = "set";
    pub const DELETE: &str = "delete";
    pub const CLEAR: &str = "clear";
    pub const DISCONNECT: &str = "disconnect";
}

/// Rejection value a timed-out `get` waiter resolves with. The proxy maps
/// this marker to [`CacheError::Timeout`](crate::error::CacheError).
pub const TIMEOUT_REASON: &str = "shared cache get timeout";

// =============================================================================
// Request envelope
// =============================================================================

/// Client → coordinator message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    /// Correlation id for the response.
    pub call_id: CallId,

    /// Which named cache the operation addresses.
    pub cache_name: String,

    /// Operation name; absent or unrecognized names get a protocol error.
    #[serde(default)]
    pub op: Option<String>,

    /// Operation arguments, decoded per operation.
    #[serde(default)]
    pub args: Value,
}

/// Arguments for `has` and `delete`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyArgs {
    pub key: String,
}

/// Arguments for `get`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetArgs {
    pub key: String,

    /// How long this caller is willing to wait for a pending entry to
    /// settle before its waiter rejects.
    pub timeout_ms: u64,
}

/// Arguments for `set`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetArgs {
    pub key: String,
    pub status: Status,
    #[serde(default)]
    pub value: Value,
    pub writer_id: WriterId,
}

// =============================================================================
// Response envelope
// =============================================================================

/// Coordinator → client message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    /// Reply to one call.
    Reply {
        #[serde(rename = "callId")]
        call_id: CallId,
        message: Payload,
    },

    /// Protocol-level or coordinator-wide error, not correlated to a call.
    Error { error: String },
}

/// Operation-specific reply payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    /// `has` result.
    Bool(bool),

    /// `get` result, and the settlement delivered to waiters.
    Entry(EntryReply),

    /// Bare acknowledgment for `set`, `delete` and `clear`.
    Ack,
}

/// The `{value, status}` pair a read resolves with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryReply {
    #[serde(default)]
    pub value: Value,
    pub status: Status,
}

impl EntryReply {
    pub fn new(value: Value, status: Status) -> Self {
        Self { value, status }
    }

    /// What a read of an absent key resolves with: nothing, synchronously.
    pub fn absent() -> Self {
        Self {
            value: Value::Null,
            status: Status::Sync,
        }
    }
}
