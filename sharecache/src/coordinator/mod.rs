//! The coordinator: sole owner of all shared cache state.
//!
//! Clients never touch a cache directly. Each client sends request envelopes
//! into the coordinator's channel and receives responses on its own outbox.
//! The coordinator is one tokio task that processes messages to completion,
//! one at a time, so the write-race check in `set` is atomic relative to
//! every other operation by construction.
//!
//! # Architecture
//!
//! ```text
//!  SharedCache ──Request──► ┌──────────────────────────────┐
//!  SharedCache ──Request──► │         Coordinator          │
//!                           │                              │
//!                           │  stores:  name → CacheStore  │
//!                           │  pending: [key, writer] →    │
//!                           │           waiter set         │
//!                           │  refs:    name → client set  │
//!                           └──────┬────────────────┬──────┘
//!                                  │                │
//!                           Response to      sleep task per waiter,
//!                           client outbox    expiry posted back into
//!                                            the same channel
//! ```
//!
//! Long waits never block the loop: a `get` against a pending entry registers
//! a waiter and returns control immediately; an independent sleep task posts
//! an expiry message back into the coordinator's own channel, so the single
//! point of mutation is preserved.

mod config;
mod daemon;

pub use config::CoordinatorConfig;
pub use daemon::{Connection, Coordinator, CoordinatorHandle};

pub(crate) use daemon::Msg;
