//! Identity-mapped unique instances.

use crate::engine::EngineShared;
use crate::error::{CoreError, CoreResult};
use crate::fields::{CacheValue, Collection, Field, Reference, ScalarValue};
use crate::key::RowKey;
use crate::snapshot::Snapshot;
use liverow_codec::Value;
use liverow_schema::TypeDescriptor;
use liverow_sql::select_by_id;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// The identity-mapped object representing one logical row.
///
/// Instances are created on first resolution for a (type, id) - from a local
/// insert, a query result, or a decoded change notification - and held
/// weakly by the identity map. Id values are immutable; id mutation is
/// unsupported.
///
/// Accessors bound to a deleted instance fail fast with
/// [`CoreError::StaleState`] rather than returning stale data.
pub struct UniqueInstance {
    descriptor: Arc<TypeDescriptor>,
    ids: Vec<Value>,
    key: RowKey,
    deleted: AtomicBool,
    /// Last values seen per column, for no-op write suppression and
    /// notification diffing. The store stays the source of truth.
    pub(crate) last_seen: RwLock<HashMap<String, Value>>,
    pub(crate) engine: Weak<EngineShared>,
}

impl UniqueInstance {
    pub(crate) fn new(
        descriptor: Arc<TypeDescriptor>,
        ids: Vec<Value>,
        key: RowKey,
        engine: Weak<EngineShared>,
    ) -> Self {
        Self {
            descriptor,
            ids,
            key,
            deleted: AtomicBool::new(false),
            last_seen: RwLock::new(HashMap::new()),
            engine,
        }
    }

    /// Returns the type descriptor.
    pub fn descriptor(&self) -> &Arc<TypeDescriptor> {
        &self.descriptor
    }

    /// Returns the id column values, in descriptor order.
    pub fn ids(&self) -> &[Value] {
        &self.ids
    }

    /// Returns the canonical row key.
    pub fn row_key(&self) -> &RowKey {
        &self.key
    }

    /// Returns true if this instance has been deleted.
    pub fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::Acquire)
    }

    pub(crate) fn set_deleted(&self) {
        self.deleted.store(true, Ordering::Release);
    }

    pub(crate) fn ensure_live(&self) -> CoreResult<()> {
        if self.is_deleted() {
            Err(CoreError::stale(
                self.descriptor.qualified_table(),
                self.key.ids_display(),
            ))
        } else {
            Ok(())
        }
    }

    pub(crate) fn engine(&self) -> CoreResult<Arc<EngineShared>> {
        self.engine.upgrade().ok_or(CoreError::Shutdown)
    }

    /// Records column values observed from a query or notification.
    pub(crate) fn observe(&self, values: impl IntoIterator<Item = (String, Value)>) {
        let mut last_seen = self.last_seen.write();
        for (column, value) in values {
            last_seen.insert(column, value);
        }
    }

    /// Binds the scalar accessor for a field.
    pub fn scalar(self: &Arc<Self>, field: &str) -> CoreResult<ScalarValue> {
        ScalarValue::bind(Arc::clone(self), field)
    }

    /// Binds the reference accessor for a field.
    pub fn reference(self: &Arc<Self>, field: &str) -> CoreResult<Reference> {
        Reference::bind(Arc::clone(self), field)
    }

    /// Binds the collection accessor for a field.
    pub fn collection(self: &Arc<Self>, field: &str) -> CoreResult<Collection> {
        Collection::bind(Arc::clone(self), field)
    }

    /// Binds the cache-value accessor for a field, with its fallback
    /// function.
    pub fn cache_value(
        self: &Arc<Self>,
        field: &str,
        fallback: impl Fn() -> Value + Send + Sync + 'static,
    ) -> CoreResult<CacheValue> {
        CacheValue::bind(Arc::clone(self), field, Arc::new(fallback))
    }

    /// Binds any field as the closed accessor sum type.
    pub fn field(self: &Arc<Self>, name: &str) -> CoreResult<Field> {
        let descriptor = &self.descriptor;
        if descriptor.collection(name).is_some() {
            return Ok(Field::Collection(self.collection(name)?));
        }
        if descriptor.cache_value(name).is_some() {
            return Ok(Field::Cache(self.cache_value(name, || Value::Null)?));
        }
        if descriptor.reference(name).is_some() {
            return Ok(Field::Reference(self.reference(name)?));
        }
        Ok(Field::Scalar(self.scalar(name)?))
    }

    /// Creates a detached snapshot frozen at current field values.
    ///
    /// The snapshot reads the row once; its values never reflect further
    /// changes, and snapshot reads never touch the store again.
    pub fn snapshot(&self) -> CoreResult<Snapshot> {
        self.ensure_live()?;
        let engine = self.engine()?;

        let fields: Vec<&str> = self
            .descriptor
            .columns
            .iter()
            .filter(|c| c.is_local())
            .map(|c| c.field.as_str())
            .collect();
        let mut values = HashMap::new();
        if !fields.is_empty() {
            let op = select_by_id(&self.descriptor, &fields, &self.ids)?;
            let rows = engine.store.query(&op)?;
            let row = rows.first().ok_or_else(|| {
                CoreError::stale(self.descriptor.qualified_table(), self.key.ids_display())
            })?;
            for (index, field) in fields.iter().enumerate() {
                values.insert((*field).to_owned(), row.get(index).clone());
            }
        }
        Ok(Snapshot::new(
            Arc::clone(&self.descriptor),
            self.ids.clone(),
            values,
        ))
    }
}

impl std::fmt::Debug for UniqueInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UniqueInstance")
            .field("table", &self.key.qualified)
            .field("ids", &self.key.ids_display())
            .field("deleted", &self.is_deleted())
            .finish()
    }
}
