//! Client-side proxy for a named shared cache.
//!
//! A [`SharedCache`] is one client connection to the coordinator, bound to
//! one cache name. Each operation sends a request envelope and suspends on a
//! oneshot until the demultiplexer task routes the matching response back by
//! call id (the coordinator answers out of order when reads block on pending
//! entries, so correlation by id is load-bearing).
//!
//! Writes are an explicit tagged choice, not shape-sniffing: callers pass
//! either an immediate value or a deferred computation. A deferred write
//! first stores a `PENDING` placeholder under a fresh writer id, then stores
//! the settled outcome under the same writer once the computation completes,
//! while other clients' reads of the key block on the settlement.
//!
//! # Example
//!
//! ```ignore
//! use sharecache::{CacheWrite, SharedCache};
//! use serde_json::json;
//!
//! let cache = SharedCache::connect(&handle, "tiles").await?;
//!
//! cache.set("ready", CacheWrite::value(json!(42))).await?;
//! assert_eq!(cache.get("ready").await?, json!(42));
//!
//! cache
//!     .set("slow", CacheWrite::deferred(async { Ok(json!("computed")) }))
//!     .await?;
//! // Any client asking for "slow" now blocks until the future settles.
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::future::BoxFuture;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::coordinator::{Connection, CoordinatorHandle, Msg};
use crate::error::CacheError;
use crate::protocol::{
    op, CallId, ClientId, EntryReply, GetArgs, KeyArgs, Payload, Request, Response, SetArgs,
    WriterId, TIMEOUT_REASON,
};
use crate::store::Status;

/// How long `get` waits for a pending entry by default.
pub const DEFAULT_GET_TIMEOUT: Duration = Duration::from_millis(3_000);

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for a [`SharedCache`] connection.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Default deadline for `get` on a pending entry.
    pub get_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            get_timeout: DEFAULT_GET_TIMEOUT,
        }
    }
}

impl ClientConfig {
    /// Overrides the default `get` deadline.
    pub fn with_get_timeout(mut self, timeout: Duration) -> Self {
        self.get_timeout = timeout;
        self
    }
}

// =============================================================================
// Writes
// =============================================================================

/// What a `set` stores: a known value, or a computation still in flight.
pub enum CacheWrite {
    /// An immediately known value, stored synchronously.
    Value(Value),

    /// A deferred computation. `Ok` settles the entry fulfilled, `Err`
    /// settles it rejected with the error as the stored reason.
    Deferred(BoxFuture<'static, Result<Value, Value>>),
}

impl CacheWrite {
    pub fn value(value: impl Into<Value>) -> Self {
        Self::Value(value.into())
    }

    pub fn deferred<F>(computation: F) -> Self
    where
        F: std::future::Future<Output = Result<Value, Value>> + Send + 'static,
    {
        Self::Deferred(Box::pin(computation))
    }
}

// =============================================================================
// Connection plumbing
// =============================================================================

/// The sending half shared between the proxy and its background tasks.
struct Remote {
    client: ClientId,
    cache_name: String,
    tx: mpsc::Sender<Msg>,

    /// Reply slots for in-flight calls, keyed by call id.
    calls: DashMap<CallId, oneshot::Sender<Payload>>,

    /// Set once a disconnect was sent, so Drop does not send a second one.
    disconnected: AtomicBool,
}

impl Remote {
    /// One full round trip: register a reply slot, send the envelope, wait.
    async fn call(&self, op_name: &str, args: Value) -> Result<Payload, CacheError> {
        let call_id = CallId::next();
        let (slot_tx, slot_rx) = oneshot::channel();
        self.calls.insert(call_id, slot_tx);

        let request = Request {
            call_id,
            cache_name: self.cache_name.clone(),
            op: Some(op_name.to_string()),
            args,
        };
        if self
            .tx
            .send(Msg::Request {
                client: self.client,
                request,
            })
            .await
            .is_err()
        {
            self.calls.remove(&call_id);
            return Err(CacheError::ConnectionClosed);
        }

        slot_rx.await.map_err(|_| CacheError::ConnectionClosed)
    }

    /// Sends one `set` message and waits for its acknowledgment.
    async fn set_entry(
        &self,
        key: &str,
        status: Status,
        value: Value,
        writer: WriterId,
    ) -> Result<(), CacheError> {
        let args = encode(SetArgs {
            key: key.to_string(),
            status,
            value,
            writer_id: writer,
        })?;
        match self.call(op::SET, args).await? {
            Payload::Ack => Ok(()),
            other => Err(unexpected(op::SET, other)),
        }
    }

    /// Fire-and-forget disconnect; the coordinator sends no reply for it.
    fn send_disconnect(&self) {
        if self.disconnected.swap(true, Ordering::SeqCst) {
            return;
        }
        let request = Request {
            call_id: CallId::next(),
            cache_name: self.cache_name.clone(),
            op: Some(op::DISCONNECT.to_string()),
            args: Value::Null,
        };
        let _ = self.tx.try_send(Msg::Request {
            client: self.client,
            request,
        });
    }
}

fn encode<T: Serialize>(args: T) -> Result<Value, CacheError> {
    serde_json::to_value(args)
        .map_err(|e| CacheError::Protocol(format!("failed to encode arguments: {e}")))
}

fn unexpected(op_name: &str, payload: Payload) -> CacheError {
    CacheError::Protocol(format!("unexpected reply payload for {op_name}: {payload:?}"))
}

// =============================================================================
// SharedCache
// =============================================================================

/// Async handle to one named cache at the coordinator.
pub struct SharedCache {
    remote: Arc<Remote>,
    default_get_timeout: Duration,
}

impl SharedCache {
    /// Connects to the coordinator with default client configuration.
    pub async fn connect(
        handle: &CoordinatorHandle,
        cache_name: impl Into<String>,
    ) -> Result<Self, CacheError> {
        Self::connect_with(handle, cache_name, ClientConfig::default()).await
    }

    /// Connects with explicit configuration.
    pub async fn connect_with(
        handle: &CoordinatorHandle,
        cache_name: impl Into<String>,
        config: ClientConfig,
    ) -> Result<Self, CacheError> {
        let Connection { client, tx, rx } = handle.connect().await?;

        let remote = Arc::new(Remote {
            client,
            cache_name: cache_name.into(),
            tx,
            calls: DashMap::new(),
            disconnected: AtomicBool::new(false),
        });

        tokio::spawn(demultiplex(Arc::clone(&remote), rx));

        Ok(Self {
            remote,
            default_get_timeout: config.get_timeout,
        })
    }

    /// The cache name this connection is bound to.
    pub fn name(&self) -> &str {
        &self.remote.cache_name
    }

    /// Whether `key` currently holds an entry, pending ones included.
    pub async fn has(&self, key: &str) -> Result<bool, CacheError> {
        let args = encode(KeyArgs {
            key: key.to_string(),
        })?;
        match self.remote.call(op::HAS, args).await? {
            Payload::Bool(found) => Ok(found),
            other => Err(unexpected(op::HAS, other)),
        }
    }

    /// Reads `key`, waiting up to the configured default for a pending
    /// entry to settle.
    pub async fn get(&self, key: &str) -> Result<Value, CacheError> {
        self.get_timeout(key, self.default_get_timeout).await
    }

    /// Reads `key` with an explicit deadline for the pending case.
    ///
    /// Absent keys resolve immediately to `Value::Null`; a memoized
    /// rejection comes back as [`CacheError::Rejected`] with the original
    /// reason.
    pub async fn get_timeout(&self, key: &str, timeout: Duration) -> Result<Value, CacheError> {
        let args = encode(GetArgs {
            key: key.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        })?;
        let reply = match self.remote.call(op::GET, args).await? {
            Payload::Entry(entry) => entry,
            other => return Err(unexpected(op::GET, other)),
        };

        let EntryReply { value, status } = reply;
        match status {
            Status::Rejected if value == Value::String(TIMEOUT_REASON.to_string()) => {
                Err(CacheError::Timeout)
            }
            Status::Rejected => Err(CacheError::Rejected(value)),
            _ => Ok(value),
        }
    }

    /// Stores a value under `key`.
    ///
    /// An immediate write stores a settled entry and returns once acked. A
    /// deferred write returns after the `PENDING` placeholder is acked; the
    /// computation is driven on a background task and its outcome stored
    /// under the same writer id, which settles every blocked reader.
    pub async fn set(&self, key: &str, write: CacheWrite) -> Result<(), CacheError> {
        let writer = WriterId::next();
        match write {
            CacheWrite::Value(value) => {
                self.remote.set_entry(key, Status::Sync, value, writer).await
            }
            CacheWrite::Deferred(computation) => {
                self.remote
                    .set_entry(key, Status::Pending, Value::Null, writer)
                    .await?;

                let remote = Arc::clone(&self.remote);
                let key = key.to_string();
                tokio::spawn(async move {
                    let (status, value) = match computation.await {
                        Ok(value) => (Status::Fulfilled, value),
                        Err(reason) => (Status::Rejected, reason),
                    };
                    if let Err(e) = remote.set_entry(&key, status, value, writer).await {
                        warn!(error = %e, key = %key, "Failed to store settled value");
                    }
                });
                Ok(())
            }
        }
    }

    /// Removes `key`. Readers already blocked on it keep waiting on their
    /// own deadlines.
    pub async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let args = encode(KeyArgs {
            key: key.to_string(),
        })?;
        match self.remote.call(op::DELETE, args).await? {
            Payload::Ack => Ok(()),
            other => Err(unexpected(op::DELETE, other)),
        }
    }

    /// Removes every entry in this named cache.
    pub async fn clear(&self) -> Result<(), CacheError> {
        match self.remote.call(op::CLEAR, Value::Null).await? {
            Payload::Ack => Ok(()),
            other => Err(unexpected(op::CLEAR, other)),
        }
    }

    /// Severs this connection, releasing its cache references at the
    /// coordinator. Also sent best-effort from `Drop`.
    pub fn disconnect(&self) {
        self.remote.send_disconnect();
    }
}

impl Drop for SharedCache {
    fn drop(&mut self) {
        self.remote.send_disconnect();
    }
}

/// Routes responses from the client's outbox to the matching reply slots.
///
/// Uncorrelated errors (protocol errors for malformed requests, coordinator
/// broadcasts) are logged; this proxy never produces malformed requests
/// itself, so callers have nothing to act on.
async fn demultiplex(remote: Arc<Remote>, mut rx: mpsc::Receiver<Response>) {
    while let Some(response) = rx.recv().await {
        match response {
            Response::Reply { call_id, message } => {
                if let Some((_, slot)) = remote.calls.remove(&call_id) {
                    let _ = slot.send(message);
                } else {
                    debug!(call_id = %call_id, "Response for a call nobody waits on");
                }
            }
            Response::Error { error } => {
                warn!(cache = %remote.cache_name, error = %error, "Shared cache error");
            }
        }
    }

    // The outbox closed: the coordinator is gone or we disconnected.
    // Dropping the slots fails every outstanding call fast.
    remote.calls.clear();
    debug!(cache = %remote.cache_name, "Response stream closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn default_config_matches_documented_timeout() {
        let config = ClientConfig::default();
        assert_eq!(config.get_timeout, Duration::from_millis(3_000));

        let config = ClientConfig::default().with_get_timeout(Duration::from_millis(50));
        assert_eq!(config.get_timeout, Duration::from_millis(50));
    }

    #[test]
    fn cache_write_constructors() {
        assert!(matches!(CacheWrite::value(json!(1)), CacheWrite::Value(_)));
        assert!(matches!(
            CacheWrite::deferred(async { Ok(json!(1)) }),
            CacheWrite::Deferred(_)
        ));
    }
}
