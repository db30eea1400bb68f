//! Coordinator actor implementation.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::config::CoordinatorConfig;
use crate::pathset::PathSet;
use crate::protocol::{
    op, CallId, ClientId, EntryReply, GetArgs, KeyArgs, Payload, Request, Response, SetArgs,
    WriterId, TIMEOUT_REASON,
};
use crate::store::{CacheStore, Entry, Status};
use crate::telemetry::CoordinatorMetrics;

// =============================================================================
// Waiters
// =============================================================================

/// Counter for waiter handles; they never leave the coordinator.
static WAITER_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Opaque handle for one suspended read, stored in the pending path sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct WaiterId(u64);

impl WaiterId {
    fn next() -> Self {
        Self(WAITER_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// One element of a pending-waiter path: the cache key, then the writer that
/// owns the in-flight entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum WaitStep {
    Key(String),
    Writer(WriterId),
}

fn wait_path(key: &str, writer: WriterId) -> [WaitStep; 2] {
    [WaitStep::Key(key.to_string()), WaitStep::Writer(writer)]
}

/// A suspended read, waiting for its governing entry to settle.
///
/// Exactly one of two outcomes releases a waiter: the owning write settles
/// (every waiter on the path resolves together) or its own deadline elapses
/// (only this waiter resolves, with a timeout rejection).
#[derive(Debug)]
struct Waiter {
    /// Where the eventual reply goes.
    client: ClientId,

    /// Correlation id of the suspended `get`.
    call_id: CallId,

    /// Cache key the read addressed.
    key: String,

    /// Writer that owned the entry when the read suspended.
    writer: WriterId,
}

// =============================================================================
// Messages
// =============================================================================

/// Everything the coordinator task can receive.
///
/// Timer tasks post `WaiterExpired` into the same channel as client requests,
/// so every state mutation still happens on the coordinator task.
#[derive(Debug)]
pub(crate) enum Msg {
    /// A new client connection, with its response outbox.
    Connect {
        client: ClientId,
        outbox: mpsc::Sender<Response>,
    },

    /// A request envelope from a connected client.
    Request { client: ClientId, request: Request },

    /// A waiter's deadline elapsed. A no-op when the waiter already settled.
    WaiterExpired { waiter: WaiterId },
}

// =============================================================================
// Handle and connections
// =============================================================================

/// Cheaply cloneable handle for connecting clients to a running coordinator.
#[derive(Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::Sender<Msg>,
    outbox_capacity: usize,
    metrics: Arc<CoordinatorMetrics>,
}

impl CoordinatorHandle {
    /// Opens a new client connection.
    ///
    /// Fails when the coordinator task has stopped.
    pub async fn connect(&self) -> Result<Connection, crate::error::CacheError> {
        let client = ClientId::next();
        let (outbox_tx, outbox_rx) = mpsc::channel(self.outbox_capacity);
        self.tx
            .send(Msg::Connect {
                client,
                outbox: outbox_tx,
            })
            .await
            .map_err(|_| crate::error::CacheError::ConnectionClosed)?;
        Ok(Connection {
            client,
            tx: self.tx.clone(),
            rx: outbox_rx,
        })
    }

    /// Point-in-time copy of the coordinator's activity counters.
    pub fn metrics(&self) -> crate::telemetry::MetricsSnapshot {
        self.metrics.snapshot()
    }
}

/// One client's endpoints: a sender into the coordinator and the receiving
/// half of its private response outbox.
pub struct Connection {
    pub(crate) client: ClientId,
    pub(crate) tx: mpsc::Sender<Msg>,
    pub(crate) rx: mpsc::Receiver<Response>,
}

// =============================================================================
// Coordinator
// =============================================================================

/// The protocol engine. Owns every cache store and all pending waiters.
pub struct Coordinator {
    /// Receiver for client requests and internal timer events.
    rx: mpsc::Receiver<Msg>,

    /// Sender cloned into waiter timer tasks.
    tx: mpsc::Sender<Msg>,

    /// Response outbox per connected client.
    clients: HashMap<ClientId, mpsc::Sender<Response>>,

    /// One store per cache name, created lazily on first reference.
    stores: HashMap<String, CacheStore>,

    /// Which clients reference which cache name. A store is destroyed when
    /// its reference set empties.
    cache_refs: HashMap<String, HashSet<ClientId>>,

    /// Pending waiter handles, grouped by `[key, writer]`.
    pending: PathSet<WaitStep, WaiterId>,

    /// Waiter records behind the handles in `pending`.
    waiters: HashMap<WaiterId, Waiter>,

    /// Activity counters, shared with the handle.
    metrics: Arc<CoordinatorMetrics>,
}

impl Coordinator {
    /// Creates a coordinator and the handle clients connect through.
    pub fn new(config: CoordinatorConfig) -> (Self, CoordinatorHandle) {
        let (tx, rx) = mpsc::channel(config.channel_capacity);
        let metrics = Arc::new(CoordinatorMetrics::new());

        let handle = CoordinatorHandle {
            tx: tx.clone(),
            outbox_capacity: config.outbox_capacity,
            metrics: Arc::clone(&metrics),
        };

        let coordinator = Self {
            rx,
            tx,
            clients: HashMap::new(),
            stores: HashMap::new(),
            cache_refs: HashMap::new(),
            pending: PathSet::new(2),
            waiters: HashMap::new(),
            metrics,
        };

        (coordinator, handle)
    }

    /// Runs the coordinator until shutdown is signalled.
    ///
    /// On shutdown, clients still connected receive a broadcast error so
    /// outstanding callers fail fast instead of hanging.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!("Coordinator starting");

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("Coordinator shutting down");
                    break;
                }

                Some(msg) = self.rx.recv() => {
                    self.handle(msg).await;
                }
            }
        }

        if !self.clients.is_empty() {
            self.broadcast("shared cache coordinator is shutting down").await;
        }
        info!("Coordinator stopped");
    }

    async fn handle(&mut self, msg: Msg) {
        match msg {
            Msg::Connect { client, outbox } => {
                debug!(client = %client, "Client connected");
                self.clients.insert(client, outbox);
            }
            Msg::Request { client, request } => {
                if !self.clients.contains_key(&client) {
                    // The connection was already severed; the transport
                    // contract says nothing more arrives from it.
                    debug!(client = %client, "Dropping request from disconnected client");
                    return;
                }
                self.handle_request(client, request).await;
            }
            Msg::WaiterExpired { waiter } => {
                self.expire_waiter(waiter).await;
            }
        }
    }

    async fn handle_request(&mut self, client: ClientId, request: Request) {
        let Request {
            call_id,
            cache_name,
            op,
            args,
        } = request;

        let Some(op_name) = op else {
            self.metrics.protocol_error();
            self.send_error(client, "the operation name has not been provided")
                .await;
            return;
        };

        match op_name.as_str() {
            op::HAS => match serde_json::from_value::<KeyArgs>(args) {
                Ok(args) => self.op_has(client, call_id, &cache_name, args).await,
                Err(e) => self.bad_args(client, op::HAS, e).await,
            },
            op::GET => match serde_json::from_value::<GetArgs>(args) {
                Ok(args) => self.op_get(client, call_id, &cache_name, args).await,
                Err(e) => self.bad_args(client, op::GET, e).await,
            },
            op::SET => match serde_json::from_value::<SetArgs>(args) {
                Ok(args) => self.op_set(client, call_id, &cache_name, args).await,
                Err(e) => self.bad_args(client, op::SET, e).await,
            },
            op::DELETE => match serde_json::from_value::<KeyArgs>(args) {
                Ok(args) => self.op_delete(client, call_id, &cache_name, args).await,
                Err(e) => self.bad_args(client, op::DELETE, e).await,
            },
            op::CLEAR => self.op_clear(client, call_id, &cache_name).await,
            op::DISCONNECT => self.op_disconnect(client),
            unknown => {
                self.metrics.protocol_error();
                self.send_error(client, format!("unknown operation: {unknown}"))
                    .await;
            }
        }
    }

    // -------------------------------------------------------------------------
    // Operations
    // -------------------------------------------------------------------------

    /// `has`: pure lookup, no side effects beyond the lazy store creation.
    async fn op_has(&mut self, client: ClientId, call_id: CallId, cache: &str, args: KeyArgs) {
        let found = self.store_mut(cache, client).contains(&args.key);
        self.reply(client, call_id, Payload::Bool(found)).await;
    }

    /// `get`: reply immediately for settled (or absent) entries; suspend on
    /// pending entries by registering a waiter with its own deadline.
    async fn op_get(&mut self, client: ClientId, call_id: CallId, cache: &str, args: GetArgs) {
        let entry = self.store_mut(cache, client).get(&args.key).cloned();

        let (writer, key) = match entry {
            None => {
                self.metrics.lookup_miss();
                self.reply(client, call_id, Payload::Entry(EntryReply::absent()))
                    .await;
                return;
            }
            Some(entry) if entry.status.is_settled() => {
                self.metrics.lookup_hit();
                self.reply(
                    client,
                    call_id,
                    Payload::Entry(EntryReply::new(entry.value, entry.status)),
                )
                .await;
                return;
            }
            Some(entry) => (entry.writer, args.key),
        };

        // The entry is pending: wait for the owning writer to settle, but
        // not forever, since the owning client may already be gone.
        let waiter_id = WaiterId::next();
        self.waiters.insert(
            waiter_id,
            Waiter {
                client,
                call_id,
                key: key.clone(),
                writer,
            },
        );
        self.pending.insert(&wait_path(&key, writer), waiter_id);
        self.metrics.waiter_registered();

        debug!(
            client = %client,
            key = %key,
            writer = %writer,
            timeout_ms = args.timeout_ms,
            "Read suspended on pending entry"
        );

        let tx = self.tx.clone();
        let deadline = Duration::from_millis(args.timeout_ms);
        tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            // A no-op if the waiter settled first.
            let _ = tx.send(Msg::WaiterExpired { waiter: waiter_id }).await;
        });
    }

    /// `set`: apply the write-race rule, then wake waiters on settlement.
    ///
    /// A write is accepted when it starts a new pending/sync entry, or when
    /// the caller's writer id owns the current entry and is finalizing it.
    /// A losing write is dropped silently: its result is stale by definition.
    async fn op_set(&mut self, client: ClientId, call_id: CallId, cache: &str, args: SetArgs) {
        let SetArgs {
            key,
            status,
            value,
            writer_id,
        } = args;

        let store = self.store_mut(cache, client);
        let owner = store.get(&key).map(|entry| entry.writer);

        let accepted =
            matches!(status, Status::Pending | Status::Sync) || owner == Some(writer_id);
        if accepted {
            store.set(key.clone(), Entry::new(value.clone(), status, writer_id));
            self.metrics.write_accepted();
        } else {
            self.metrics.write_dropped();
            debug!(
                key = %key,
                writer = %writer_id,
                owner = ?owner,
                "Write lost the race to a pending entry, dropped"
            );
        }

        // A settlement wakes every waiter registered under this writer's
        // path, whether or not the store kept the write.
        if status.settles_deferred() {
            let woken = self.pending.take(&wait_path(&key, writer_id));
            for waiter_id in woken {
                if let Some(waiter) = self.waiters.remove(&waiter_id) {
                    self.metrics.waiter_settled();
                    self.reply(
                        waiter.client,
                        waiter.call_id,
                        Payload::Entry(EntryReply::new(value.clone(), status)),
                    )
                    .await;
                }
            }
        }

        self.reply(client, call_id, Payload::Ack).await;
    }

    /// `delete`: unconditional removal. Waiters for the key stay registered
    /// and run out their own deadlines.
    async fn op_delete(&mut self, client: ClientId, call_id: CallId, cache: &str, args: KeyArgs) {
        self.store_mut(cache, client).remove(&args.key);
        self.reply(client, call_id, Payload::Ack).await;
    }

    /// `clear`: drop every entry in the named store. Same waiter caveat as
    /// `delete`.
    async fn op_clear(&mut self, client: ClientId, call_id: CallId, cache: &str) {
        self.store_mut(cache, client).clear();
        self.reply(client, call_id, Payload::Ack).await;
    }

    /// `disconnect`: sever the client and release its cache references.
    /// Stores nobody references anymore are destroyed; entries and waiters
    /// of other clients are untouched.
    fn op_disconnect(&mut self, client: ClientId) {
        self.clients.remove(&client);

        let mut unreferenced = Vec::new();
        for (name, refs) in &mut self.cache_refs {
            if refs.remove(&client) && refs.is_empty() {
                unreferenced.push(name.clone());
            }
        }
        for name in unreferenced {
            self.cache_refs.remove(&name);
            self.stores.remove(&name);
            debug!(cache = %name, "Destroyed store, last referencing client disconnected");
        }

        debug!(client = %client, "Client disconnected");
    }

    // -------------------------------------------------------------------------
    // Waiter expiry
    // -------------------------------------------------------------------------

    /// Resolves a single waiter with a timeout rejection. Waiters that
    /// already settled are gone from the table, which makes late timer
    /// events harmless.
    async fn expire_waiter(&mut self, waiter_id: WaiterId) {
        let Some(waiter) = self.waiters.remove(&waiter_id) else {
            return;
        };
        self.pending
            .remove(&wait_path(&waiter.key, waiter.writer), &waiter_id);
        self.metrics.waiter_expired();

        debug!(
            client = %waiter.client,
            key = %waiter.key,
            writer = %waiter.writer,
            "Waiter deadline elapsed"
        );

        self.reply(
            waiter.client,
            waiter.call_id,
            Payload::Entry(EntryReply::new(
                Value::String(TIMEOUT_REASON.to_string()),
                Status::Rejected,
            )),
        )
        .await;
    }

    // -------------------------------------------------------------------------
    // Plumbing
    // -------------------------------------------------------------------------

    /// Store for `cache`, created on first reference, with `client` recorded
    /// as a referencing client.
    fn store_mut(&mut self, cache: &str, client: ClientId) -> &mut CacheStore {
        self.cache_refs
            .entry(cache.to_string())
            .or_default()
            .insert(client);
        self.stores.entry(cache.to_string()).or_default()
    }

    async fn reply(&self, client: ClientId, call_id: CallId, message: Payload) {
        self.send(client, Response::Reply { call_id, message }).await;
    }

    async fn send_error(&self, client: ClientId, error: impl Into<String>) {
        self.send(
            client,
            Response::Error {
                error: error.into(),
            },
        )
        .await;
    }

    async fn bad_args(&self, client: ClientId, op_name: &str, error: serde_json::Error) {
        self.metrics.protocol_error();
        self.send_error(client, format!("invalid arguments for {op_name}: {error}"))
            .await;
    }

    async fn send(&self, client: ClientId, response: Response) {
        if let Some(outbox) = self.clients.get(&client) {
            if outbox.send(response).await.is_err() {
                debug!(client = %client, "Client outbox closed, response dropped");
            }
        }
    }

    /// Coordinator-wide errors go to every connected client.
    async fn broadcast(&self, error: &str) {
        warn!(error = %error, "Broadcasting coordinator error");
        for outbox in self.clients.values() {
            let _ = outbox
                .send(Response::Error {
                    error: error.to_string(),
                })
                .await;
        }
    }
}
