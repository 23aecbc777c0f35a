//! Update/add/remove handler registry.

use crate::key::RowKey;
use liverow_codec::{Kind, Value};
use liverow_schema::{CollectionDescriptor, CollectionKind, Link, TypeDescriptor};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// A scalar column changed on a row.
#[derive(Debug, Clone)]
pub struct UpdateEvent {
    /// The affected row.
    pub row: RowKey,
    /// The changed column.
    pub column: String,
    /// Value before the change.
    pub old: Value,
    /// Value after the change.
    pub new: Value,
}

/// Handler for scalar column changes.
pub type UpdateHandler = Arc<dyn Fn(&UpdateEvent) + Send + Sync>;

/// Whether a member entered or left a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionDelta {
    /// A member was added.
    Added,
    /// A member was removed.
    Removed,
}

/// A collection membership changed.
#[derive(Debug, Clone)]
pub struct CollectionEvent {
    /// Qualified table of the collection's holder.
    pub holder_table: String,
    /// Holder id columns, text-encoded.
    pub holder_ids: Vec<(String, String)>,
    /// The collection field.
    pub field: String,
    /// Added or removed.
    pub delta: CollectionDelta,
    /// Member identification (id columns or element value), text-encoded.
    pub member: Vec<(String, String)>,
}

/// Handler for collection membership changes.
pub type CollectionHandler = Arc<dyn Fn(&CollectionEvent) + Send + Sync>;

/// A cache-tier value changed.
#[derive(Debug, Clone)]
pub struct CacheUpdateEvent {
    /// The full cache key.
    pub key: String,
    /// New raw value; `None` when the key is absent (at the fallback).
    pub value: Option<String>,
}

/// Handler for cache-tier value changes.
pub type CacheHandler = Arc<dyn Fn(&CacheUpdateEvent) + Send + Sync>;

/// How a collection route extracts member identity from a backing-table row.
#[derive(Debug, Clone)]
pub(crate) enum MemberSide {
    /// Member id columns read through target links (join column, member id
    /// column).
    Links(Vec<Link>),
    /// Child rows identify themselves by their own id columns.
    OwnIds(Vec<String>),
    /// Scalar elements in the named column.
    Element(String, Kind),
}

/// Routing info from one backing-table mutation to one collection handler.
#[derive(Clone)]
pub(crate) struct CollectionRoute {
    pub holder_table: String,
    pub field: String,
    /// Links from backing-table columns to holder id columns.
    pub holder_links: Vec<Link>,
    pub member_side: MemberSide,
    pub handler: CollectionHandler,
}

/// Per-type handler registry.
///
/// Handlers are keyed by (schema, table, column-or-collection) and
/// registered once per type: a second registration for the same key is a
/// no-op, so resolving many instances of a type never duplicates handlers.
/// Registration is independent of connection lifetime - a listener
/// reconnect never touches this registry.
#[derive(Default)]
pub struct HandlerRegistry {
    updates: RwLock<HashMap<(String, String), UpdateHandler>>,
    collections: RwLock<HashMap<String, Vec<CollectionRoute>>>,
    caches: RwLock<HashMap<String, CacheHandler>>,
    registered: RwLock<HashSet<(String, String)>>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn claim(&self, table: &str, field: &str) -> bool {
        self.registered
            .write()
            .insert((table.to_owned(), field.to_owned()))
    }

    /// Registers an update handler for a column. Returns false (and keeps
    /// the existing handler) if the key is already registered.
    pub fn register_update(
        &self,
        descriptor: &TypeDescriptor,
        column: &str,
        handler: UpdateHandler,
    ) -> bool {
        let table = descriptor.qualified_table();
        if !self.claim(&table, column) {
            return false;
        }
        self.updates
            .write()
            .insert((table, column.to_owned()), handler);
        true
    }

    /// Registers add/remove handlers for a collection. Returns false if the
    /// collection is already registered.
    pub fn register_collection(
        &self,
        descriptor: &TypeDescriptor,
        collection: &CollectionDescriptor,
        member_ids: Option<Vec<String>>,
        handler: CollectionHandler,
    ) -> bool {
        let holder_table = descriptor.qualified_table();
        if !self.claim(&holder_table, &collection.field) {
            return false;
        }
        let backing = collection.backing_table().qualified();
        let member_side = match &collection.kind {
            CollectionKind::ManyToMany { target_links, .. } => {
                MemberSide::Links(target_links.clone())
            }
            CollectionKind::OneToMany { .. } => {
                MemberSide::OwnIds(member_ids.unwrap_or_default())
            }
            CollectionKind::ScalarSet {
                element_column,
                element_kind,
                ..
            } => MemberSide::Element(element_column.clone(), *element_kind),
        };
        let route = CollectionRoute {
            holder_table,
            field: collection.field.clone(),
            holder_links: collection.holder_links().to_vec(),
            member_side,
            handler,
        };
        self.collections.write().entry(backing).or_default().push(route);
        true
    }

    /// Registers a cache-value handler. Returns false if already registered.
    pub fn register_cache(
        &self,
        descriptor: &TypeDescriptor,
        column: &str,
        handler: CacheHandler,
    ) -> bool {
        let table = descriptor.qualified_table();
        if !self.claim(&table, &format!("cache:{column}")) {
            return false;
        }
        let prefix = format!("{table}.{column}");
        self.caches.write().insert(prefix, handler);
        true
    }

    /// Looks up the update handler for (table, column).
    pub fn update_handler(&self, table: &str, column: &str) -> Option<UpdateHandler> {
        self.updates
            .read()
            .get(&(table.to_owned(), column.to_owned()))
            .cloned()
    }

    /// Returns the collection routes watching a backing table.
    pub(crate) fn collection_routes(&self, backing_table: &str) -> Vec<CollectionRoute> {
        self.collections
            .read()
            .get(backing_table)
            .cloned()
            .unwrap_or_default()
    }

    /// Looks up the cache handler for a key prefix `schema.table.column`.
    pub fn cache_handler(&self, prefix: &str) -> Option<CacheHandler> {
        self.caches.read().get(prefix).cloned()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("updates", &self.updates.read().len())
            .field("collections", &self.collections.read().len())
            .field("caches", &self.caches.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use liverow_schema::{FieldSpec, TypeSpec};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::parse(
            &TypeSpec::new("User", "app", "users")
                .with_id("id", Kind::Int64)
                .with_field(FieldSpec::column("name", "name", Kind::Text)),
        )
        .unwrap()
    }

    #[test]
    fn duplicate_registration_is_a_noop() {
        let registry = HandlerRegistry::new();
        let descriptor = descriptor();
        let count = Arc::new(AtomicUsize::new(0));

        let first = {
            let count = Arc::clone(&count);
            registry.register_update(
                &descriptor,
                "name",
                Arc::new(move |_| {
                    count.fetch_add(1, Ordering::SeqCst);
                }),
            )
        };
        let second = registry.register_update(&descriptor, "name", Arc::new(|_| {}));
        assert!(first);
        assert!(!second);

        let handler = registry.update_handler("app.users", "name").unwrap();
        handler(&UpdateEvent {
            row: RowKey {
                qualified: "app.users".to_owned(),
                ids: vec![("id".to_owned(), "1".to_owned())],
            },
            column: "name".to_owned(),
            old: Value::Null,
            new: Value::text("x"),
        });
        // The first handler is still the registered one.
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unknown_lookups_return_none() {
        let registry = HandlerRegistry::new();
        assert!(registry.update_handler("app.users", "name").is_none());
        assert!(registry.collection_routes("app.user_friends").is_empty());
        assert!(registry.cache_handler("app.users.count").is_none());
    }
}
