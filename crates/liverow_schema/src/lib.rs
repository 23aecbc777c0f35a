//! # LiveRow Schema
//!
//! Type descriptor registry for LiveRow.
//!
//! This crate provides:
//! - The structural contract supplied by the code-generation step
//!   ([`TypeSpec`], [`FieldSpec`], [`EntityType`])
//! - Parsing and validation of that contract into immutable
//!   [`TypeDescriptor`]s
//! - A process-wide, write-once [`Registry`] that resolves descriptors by
//!   Rust type or by (schema, table)
//!
//! ## Registration model
//!
//! Descriptors are parsed exactly once per type. `register` is idempotent:
//! re-registering an already-known type returns the existing descriptor.
//! Contradictory metadata (a field carrying two parent annotations, an id
//! column with no name) fails with a [`SchemaError`] at registration time
//! and is never retried. After the registration phase the registry is
//! read-only and `describe` is safe from any thread.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod descriptor;
mod error;
mod registry;
mod spec;
mod strategy;

pub use descriptor::{
    CacheValueDescriptor, CollectionDescriptor, CollectionKind, ColumnDescriptor, IdColumn, Link,
    ReferenceDescriptor, TableRef, TypeDescriptor,
};
pub use error::{SchemaError, SchemaResult};
pub use registry::{EntityType, Registry};
pub use spec::{CacheSpec, CollectionSpec, FieldSpec, IdColumnSpec, LinkSpec, ReferenceSpec, TypeSpec};
pub use strategy::{DeleteStrategy, InsertStrategy};
