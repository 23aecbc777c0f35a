//! Engine facade.

use crate::batch::InsertBatch;
use crate::coalesce::Coalescer;
use crate::config::EngineConfig;
use crate::delete;
use crate::dispatch::Dispatcher;
use crate::error::{CoreError, CoreResult};
use crate::handlers::{
    CacheHandler, CacheUpdateEvent, CollectionEvent, HandlerRegistry, UpdateEvent,
};
use crate::identity::IdentityMap;
use crate::instance::UniqueInstance;
use crate::key::RowKey;
use crate::listener::{CacheListener, ChangeListener, ListenerState};
use liverow_codec::Value;
use liverow_schema::{ColumnDescriptor, EntityType, Registry, TableRef, TypeDescriptor};
use liverow_sql::{
    insert_row, select_ids, ColumnValue, DmlOp, Eq, SelectColumn, SelectOp, SqlBuildError,
};
use liverow_store::{CacheTier, RelationalStore};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::debug;

/// Shared engine state reachable from instances, accessors, and the
/// listener threads.
pub(crate) struct EngineShared {
    pub store: Arc<dyn RelationalStore>,
    pub cache: Arc<dyn CacheTier>,
    pub registry: Arc<Registry>,
    pub identity: IdentityMap,
    pub handlers: HandlerRegistry,
    pub coalescer: Coalescer,
    pub config: EngineConfig,
    shutdown: AtomicBool,
}

impl EngineShared {
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Resolves the instance for (descriptor, ids): cache hit returns the
    /// live singleton; cache miss loads the row, returning `None` for an
    /// absent row.
    pub fn resolve(
        self: &Arc<Self>,
        descriptor: &Arc<TypeDescriptor>,
        ids: &[Value],
    ) -> CoreResult<Option<Arc<UniqueInstance>>> {
        let key = RowKey::new(descriptor, ids)?;
        if let Some(live) = self.identity.get(&key) {
            return Ok(Some(live));
        }
        let probe = select_ids(descriptor, ids)?;
        if self.store.query(&probe)?.is_empty() {
            return Ok(None);
        }
        let instance = Arc::new(UniqueInstance::new(
            Arc::clone(descriptor),
            ids.to_vec(),
            key,
            Arc::downgrade(self),
        ));
        Ok(Some(self.identity.insert(&instance)))
    }

    /// Returns the live instance for (descriptor, ids), or constructs one
    /// without probing the store (the caller knows the row exists).
    pub fn adopt(
        self: &Arc<Self>,
        descriptor: &Arc<TypeDescriptor>,
        ids: &[Value],
        observed: Vec<(String, Value)>,
    ) -> CoreResult<Arc<UniqueInstance>> {
        let key = RowKey::new(descriptor, ids)?;
        if let Some(live) = self.identity.get(&key) {
            live.observe(observed);
            return Ok(live);
        }
        let instance = Arc::new(UniqueInstance::new(
            Arc::clone(descriptor),
            ids.to_vec(),
            key,
            Arc::downgrade(self),
        ));
        instance.observe(observed);
        Ok(self.identity.insert(&instance))
    }
}

/// The synchronization engine.
///
/// Owns the relational store, the cache tier, the identity map, the handler
/// registry, the change/cache listeners, the dispatch pool, and the write
/// coalescer. Dropping the engine shuts everything down and joins the
/// worker threads.
pub struct Engine {
    shared: Arc<EngineShared>,
    dispatcher: Arc<Dispatcher>,
    listener: Mutex<ChangeListener>,
    cache_listener: Mutex<CacheListener>,
    coalescer_worker: Mutex<Option<JoinHandle<()>>>,
}

impl Engine {
    /// Opens an engine over a store and cache tier with its own registry.
    pub fn open(
        store: Arc<dyn RelationalStore>,
        cache: Arc<dyn CacheTier>,
        config: EngineConfig,
    ) -> Arc<Engine> {
        Self::open_with_registry(store, cache, Arc::new(Registry::new()), config)
    }

    /// Opens an engine over an existing registry (e.g.
    /// [`Registry::global`]-backed setups).
    pub fn open_with_registry(
        store: Arc<dyn RelationalStore>,
        cache: Arc<dyn CacheTier>,
        registry: Arc<Registry>,
        config: EngineConfig,
    ) -> Arc<Engine> {
        let shared = Arc::new(EngineShared {
            store,
            cache,
            registry,
            identity: IdentityMap::new(),
            handlers: HandlerRegistry::new(),
            coalescer: Coalescer::new(),
            config: config.clone(),
            shutdown: AtomicBool::new(false),
        });
        let dispatcher = Arc::new(Dispatcher::new(config.dispatcher_workers));
        let listener = ChangeListener::start(Arc::clone(&shared), Arc::clone(&dispatcher));
        let cache_listener = CacheListener::start(Arc::clone(&shared));

        let worker_shared = Arc::clone(&shared);
        let coalescer_worker = thread::Builder::new()
            .name("liverow-coalescer".to_owned())
            .spawn(move || {
                while !worker_shared.is_shutdown() {
                    thread::sleep(worker_shared.config.coalescer_tick);
                    worker_shared
                        .coalescer
                        .flush_due(worker_shared.store.as_ref());
                }
                worker_shared
                    .coalescer
                    .flush_all(worker_shared.store.as_ref());
            })
            .unwrap_or_else(|e| panic!("failed to spawn coalescer: {e}"));

        Arc::new(Engine {
            shared,
            dispatcher,
            listener: Mutex::new(listener),
            cache_listener: Mutex::new(cache_listener),
            coalescer_worker: Mutex::new(Some(coalescer_worker)),
        })
    }

    /// Returns the registry this engine resolves descriptors from.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.shared.registry
    }

    /// Registers a type (idempotent).
    pub fn register<T: EntityType>(&self) -> CoreResult<Arc<TypeDescriptor>> {
        Ok(self.shared.registry.register::<T>()?)
    }

    /// Applies DDL and installs triggers for every registered type.
    pub fn sync_schema(&self) -> CoreResult<()> {
        delete::sync_schema(&self.shared)
    }

    /// Resolves the unique instance for (type, ids).
    ///
    /// `Ok(None)` means the row does not exist.
    pub fn resolve<T: EntityType>(
        &self,
        ids: &[Value],
    ) -> CoreResult<Option<Arc<UniqueInstance>>> {
        let descriptor = self.shared.registry.describe::<T>()?;
        self.shared.resolve(&descriptor, ids)
    }

    /// Resolves by descriptor.
    pub fn resolve_row(
        &self,
        descriptor: &Arc<TypeDescriptor>,
        ids: &[Value],
    ) -> CoreResult<Option<Arc<UniqueInstance>>> {
        self.shared.resolve(descriptor, ids)
    }

    /// Evicts the identity-map entry for (type, ids) without touching
    /// outstanding references. A later resolve yields a distinct instance.
    pub fn evict<T: EntityType>(&self, ids: &[Value]) -> CoreResult<()> {
        let descriptor = self.shared.registry.describe::<T>()?;
        let key = RowKey::new(&descriptor, ids)?;
        self.shared.identity.evict(&key);
        Ok(())
    }

    /// Creates a row and returns its live instance.
    pub fn create<T: EntityType>(
        &self,
        ids: &[Value],
        fields: &[(&str, Value)],
    ) -> CoreResult<Arc<UniqueInstance>> {
        let descriptor = self.shared.registry.describe::<T>()?;
        self.create_row(&descriptor, ids, fields)
    }

    /// Creates a row by descriptor.
    pub fn create_row(
        &self,
        descriptor: &Arc<TypeDescriptor>,
        ids: &[Value],
        fields: &[(&str, Value)],
    ) -> CoreResult<Arc<UniqueInstance>> {
        let mut values: Vec<ColumnValue> = descriptor
            .id_columns
            .iter()
            .zip(ids.iter())
            .map(|(id, value)| ColumnValue::new(id.column.clone(), value.clone()))
            .collect();
        let mut observed = Vec::new();
        let mut foreign: Vec<(ColumnDescriptor, Value)> = Vec::new();

        for (field, value) in fields {
            let column = descriptor.column(field).cloned().ok_or_else(|| {
                CoreError::Build(SqlBuildError::UnknownLinkColumn {
                    table: descriptor.qualified_table(),
                    column: (*field).to_owned(),
                })
            })?;
            if column.is_local() {
                observed.push((column.column.clone(), value.clone()));
                values.push(ColumnValue::new(column.column.clone(), value.clone()));
            } else {
                foreign.push((column, value.clone()));
            }
        }

        let op = insert_row(descriptor, values)?;
        self.shared.store.execute(&op)?;

        for (column, value) in foreign {
            self.apply_foreign_insert(descriptor, ids, &column, value)?;
        }

        self.shared.adopt(descriptor, ids, observed)
    }

    /// Applies a foreign-column-bound value at insert time, honoring the
    /// column's insert strategy.
    fn apply_foreign_insert(
        &self,
        descriptor: &Arc<TypeDescriptor>,
        ids: &[Value],
        column: &ColumnDescriptor,
        value: Value,
    ) -> CoreResult<()> {
        use liverow_schema::InsertStrategy;

        let table = TableRef::new(
            column
                .schema_override
                .clone()
                .unwrap_or_else(|| descriptor.table.schema.clone()),
            column
                .table_override
                .clone()
                .unwrap_or_else(|| descriptor.table.table.clone()),
        );
        let filter: Vec<Eq> = descriptor
            .id_columns
            .iter()
            .zip(ids.iter())
            .map(|(id, value)| Eq::base(id.column.clone(), value.clone()))
            .collect();
        let strategy = column
            .insert_strategy
            .unwrap_or(InsertStrategy::OverwriteExisting);

        let probe = SelectOp {
            table: table.clone(),
            join: None,
            columns: vec![SelectColumn::base(column.column.clone(), column.kind)],
            filter: filter.clone(),
        };
        let rows = self.shared.store.query(&probe)?;
        match rows.first() {
            Some(row) if strategy == InsertStrategy::PreferExisting && !row.get(0).is_null() => {
                debug!(table = %table.qualified(), column = %column.column,
                    "kept pre-existing foreign value");
            }
            Some(_) => {
                self.shared.store.execute(&DmlOp::Update {
                    table,
                    set: vec![ColumnValue::new(column.column.clone(), value)],
                    filter,
                })?;
            }
            None => {
                let mut values: Vec<ColumnValue> = descriptor
                    .id_columns
                    .iter()
                    .zip(ids.iter())
                    .map(|(id, value)| ColumnValue::new(id.column.clone(), value.clone()))
                    .collect();
                values.push(ColumnValue::new(column.column.clone(), value));
                self.shared.store.execute(&DmlOp::Insert { table, values })?;
            }
        }
        Ok(())
    }

    /// Deletes an instance's row, enacting declared delete strategies.
    pub fn delete(&self, instance: &Arc<UniqueInstance>) -> CoreResult<()> {
        delete::local_delete(&self.shared, instance)
    }

    /// Begins a batch insert.
    pub fn begin_batch(&self) -> InsertBatch {
        InsertBatch::new(Arc::clone(&self.shared))
    }

    /// Registers an update handler for a scalar field, once per type.
    ///
    /// Returns false when the (type, field) pair is already registered;
    /// the existing handler stays.
    pub fn on_update<T: EntityType>(
        &self,
        field: &str,
        handler: impl Fn(&UpdateEvent) + Send + Sync + 'static,
    ) -> CoreResult<bool> {
        let descriptor = self.shared.registry.describe::<T>()?;
        let column = descriptor.column(field).ok_or_else(|| {
            CoreError::Build(SqlBuildError::UnknownLinkColumn {
                table: descriptor.qualified_table(),
                column: field.to_owned(),
            })
        })?;
        Ok(self
            .shared
            .handlers
            .register_update(&descriptor, &column.column, Arc::new(handler)))
    }

    /// Registers add/remove handlers for a collection field, once per type.
    pub fn on_collection<T: EntityType>(
        &self,
        field: &str,
        handler: impl Fn(&CollectionEvent) + Send + Sync + 'static,
    ) -> CoreResult<bool> {
        let descriptor = self.shared.registry.describe::<T>()?;
        let collection = descriptor.collection(field).ok_or_else(|| {
            CoreError::Build(SqlBuildError::UnknownLinkColumn {
                table: descriptor.qualified_table(),
                column: field.to_owned(),
            })
        })?;
        let member_ids = match &collection.kind {
            liverow_schema::CollectionKind::OneToMany { child, .. } => self
                .shared
                .registry
                .describe_table(&child.schema, &child.table)
                .map(|child| {
                    child
                        .id_columns
                        .iter()
                        .map(|id| id.column.clone())
                        .collect::<Vec<String>>()
                }),
            _ => None,
        };
        Ok(self.shared.handlers.register_collection(
            &descriptor,
            collection,
            member_ids,
            Arc::new(handler),
        ))
    }

    /// Registers a cache-value update handler, once per type.
    pub fn on_cache_update<T: EntityType>(
        &self,
        field: &str,
        handler: impl Fn(&CacheUpdateEvent) + Send + Sync + 'static,
    ) -> CoreResult<bool> {
        let descriptor = self.shared.registry.describe::<T>()?;
        let cache_value = descriptor.cache_value(field).ok_or_else(|| {
            CoreError::Build(SqlBuildError::UnknownLinkColumn {
                table: descriptor.qualified_table(),
                column: field.to_owned(),
            })
        })?;
        let handler: CacheHandler = Arc::new(handler);
        Ok(self
            .shared
            .handlers
            .register_cache(&descriptor, &cache_value.column, handler))
    }

    /// Returns the change listener's connection state.
    pub fn listener_state(&self) -> ListenerState {
        self.listener.lock().state()
    }

    /// Flushes all coalesced writes immediately.
    pub fn flush_pending_writes(&self) -> usize {
        self.shared.coalescer.flush_all(self.shared.store.as_ref())
    }

    /// Returns the number of live identity-map entries.
    pub fn live_instances(&self) -> usize {
        self.shared.identity.live_count()
    }

    /// Shuts the engine down: stops the listeners, flushes pending writes,
    /// drains the dispatch pool, and joins every worker thread.
    pub fn shutdown(&self) {
        if self.shared.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        self.listener.lock().join();
        self.cache_listener.lock().join();
        if let Some(handle) = self.coalescer_worker.lock().take() {
            let _ = handle.join();
        }
        self.dispatcher.shutdown();
        debug!("engine shut down");
    }

}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("live_instances", &self.live_instances())
            .field("listener", &self.listener_state())
            .finish()
    }
}
