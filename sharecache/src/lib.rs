//! ShareCache - a cache shared between independent clients through a
//! single coordinating actor.
//!
//! Clients never share memory: every operation is a message to the
//! coordinator, which is the sole owner of all cache state and processes
//! requests one at a time. The interesting part is memoization of
//! asynchronous computations: one client stores a `PENDING` placeholder and
//! later its settled outcome, while every other client reading the same key
//! blocks (with its own deadline) until the value settles. Races between
//! concurrent writers to one key are resolved by writer identity, never by
//! arrival order.
//!
//! # Components
//!
//! - [`pathset::PathSet`] - self-pruning trie grouping pending waiters by
//!   `[cache key, writer id]`
//! - [`store::CacheStore`] - one key space per cache name
//! - [`coordinator::Coordinator`] - the protocol engine, a tokio actor
//! - [`client::SharedCache`] - per-connection async proxy
//!
//! # Example
//!
//! ```ignore
//! use sharecache::{CacheWrite, Coordinator, CoordinatorConfig, SharedCache};
//! use serde_json::json;
//! use tokio_util::sync::CancellationToken;
//!
//! let (coordinator, handle) = Coordinator::new(CoordinatorConfig::default());
//! let shutdown = CancellationToken::new();
//! tokio::spawn(coordinator.run(shutdown.clone()));
//!
//! let cache = SharedCache::connect(&handle, "reports").await?;
//! cache
//!     .set("today", CacheWrite::deferred(async { Ok(json!("done")) }))
//!     .await?;
//!
//! // Other connections reading "today" block until the future settles.
//! assert_eq!(cache.get("today").await?, json!("done"));
//! ```

pub mod client;
pub mod coordinator;
pub mod error;
pub mod pathset;
pub mod protocol;
pub mod store;
pub mod telemetry;

pub use client::{CacheWrite, ClientConfig, SharedCache, DEFAULT_GET_TIMEOUT};
pub use coordinator::{Coordinator, CoordinatorConfig, CoordinatorHandle};
pub use error::CacheError;
pub use store::Status;
