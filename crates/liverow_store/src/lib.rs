//! # LiveRow Store
//!
//! Relational store and cache tier backends for LiveRow.
//!
//! This crate provides:
//! - The [`RelationalStore`] trait: query/execute over the constrained op
//!   AST, atomic multi-op transactions, DDL, trigger install, and a
//!   change-feed subscription
//! - [`MemoryStore`]: the embedded engine used for local and test
//!   execution - interprets ops directly, enforces installed trigger
//!   rules, and emits change-feed payloads after commit
//! - [`PostgresStore`]: the production store - renders ops at
//!   [`liverow_sql::Dialect::Postgres`] and pumps LISTEN/NOTIFY payloads
//!   through a dedicated connection
//! - The [`CacheTier`] trait with [`MemoryCache`] and [`RedisCache`]
//! - The [`ChangePayload`] wire type decoded by the change listener
//!
//! Backends do not interpret payloads or track object identity - that is
//! the engine's job. They deliver raw payload text in commit order per row.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod cache;
mod change;
mod error;
mod memory;
mod memory_cache;
mod postgres_store;
mod redis_cache;

pub use backend::{ChangeSubscription, RelationalStore, Row};
pub use cache::{CacheEvent, CacheEventKind, CacheSubscription, CacheTier};
pub use change::{cache_key, ChangeOp, ChangePayload};
pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use memory_cache::MemoryCache;
pub use postgres_store::PostgresStore;
pub use redis_cache::RedisCache;
