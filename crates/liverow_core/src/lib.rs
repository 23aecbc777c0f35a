//! # LiveRow Core
//!
//! Synchronization engine keeping in-process objects, a relational store,
//! and a key-value cache tier mutually consistent.
//!
//! This crate provides:
//! - The identity map: weakly-held singleton instances per (type, id)
//! - Unique instances with scalar/reference/collection/cache-value
//!   accessors and detached snapshots
//! - The change-notification listener with reconnect/backoff and a sharded
//!   handler-dispatch pool
//! - The delete-strategy subsystem (store-side triggers plus a mirrored
//!   local delete path)
//! - The transactional batch-insert coordinator
//!
//! ## Consistency model
//!
//! Writes go through accessors to the relational store; committed changes
//! come back through the store's change feed and are routed to the identity
//! map and registered handlers. A local write's side effects (handler
//! firing, cache propagation) are not guaranteed visible before `set`
//! returns - the engine favors eventual, notification-driven convergence
//! over synchronous round-trips.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod batch;
mod coalesce;
mod config;
mod delete;
mod dispatch;
mod engine;
mod error;
mod fields;
mod handlers;
mod identity;
mod instance;
mod key;
mod listener;
mod snapshot;

pub use batch::{CommitMode, InsertBatch, InsertTicket};
pub use config::{EngineConfig, RetryConfig};
pub use engine::Engine;
pub use error::{CoreError, CoreResult};
pub use fields::{CacheValue, Collection, CollectionIter, Field, Member, Reference, ScalarValue};
pub use handlers::{
    CacheHandler, CacheUpdateEvent, CollectionDelta, CollectionEvent, CollectionHandler,
    HandlerRegistry, UpdateEvent, UpdateHandler,
};
pub use identity::IdentityMap;
pub use instance::UniqueInstance;
pub use key::RowKey;
pub use listener::ListenerState;
pub use snapshot::Snapshot;
