//! Change-notification listener and routing.

use crate::dispatch::Dispatcher;
use crate::engine::EngineShared;
use crate::handlers::{
    CacheUpdateEvent, CollectionDelta, CollectionEvent, MemberSide, UpdateEvent,
};
use crate::key::RowKey;
use liverow_codec::{decode_text, Value};
use liverow_schema::TypeDescriptor;
use liverow_store::{CacheEventKind, ChangeOp, ChangePayload};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::mpsc::RecvTimeoutError;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

/// Connection state of a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    /// Subscribed and processing notifications.
    Connected,
    /// Subscription lost; retrying with backoff.
    Reconnecting,
}

/// The dedicated change-feed listener.
///
/// Owns one long-lived subscription per connection attempt and re-subscribes
/// with exponential backoff on loss - losing the feed silently would break
/// the consistency contract, so retries are unbounded. Handler registration
/// lives in the engine's registry and is untouched by reconnects.
pub(crate) struct ChangeListener {
    state: Arc<RwLock<ListenerState>>,
    handle: Option<JoinHandle<()>>,
}

impl ChangeListener {
    /// Starts the listener thread.
    pub fn start(shared: Arc<EngineShared>, dispatcher: Arc<Dispatcher>) -> Self {
        let state = Arc::new(RwLock::new(ListenerState::Reconnecting));
        let thread_state = Arc::clone(&state);
        let handle = thread::Builder::new()
            .name("liverow-listener".to_owned())
            .spawn(move || run_listener(&shared, &dispatcher, &thread_state))
            .unwrap_or_else(|e| panic!("failed to spawn listener: {e}"));
        Self {
            state,
            handle: Some(handle),
        }
    }

    /// Returns the current connection state.
    pub fn state(&self) -> ListenerState {
        *self.state.read()
    }

    /// Joins the listener thread. The engine sets its shutdown flag first.
    pub fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn run_listener(
    shared: &Arc<EngineShared>,
    dispatcher: &Arc<Dispatcher>,
    state: &Arc<RwLock<ListenerState>>,
) {
    let mut attempt: u32 = 0;
    loop {
        if shared.is_shutdown() {
            return;
        }
        match shared.store.subscribe() {
            Ok(subscription) => {
                *state.write() = ListenerState::Connected;
                attempt = 0;
                debug!("change feed connected");
                loop {
                    if shared.is_shutdown() {
                        return;
                    }
                    match subscription.receiver().recv_timeout(Duration::from_millis(50)) {
                        Ok(wire) => match ChangePayload::from_wire(&wire) {
                            Ok(payload) => route_payload(shared, dispatcher, payload),
                            Err(e) => warn!(error = %e, "dropping malformed change payload"),
                        },
                        Err(RecvTimeoutError::Timeout) => continue,
                        Err(RecvTimeoutError::Disconnected) => {
                            warn!("change feed disconnected");
                            break;
                        }
                    }
                }
            }
            Err(e) => warn!(error = %e, "change feed subscribe failed"),
        }
        *state.write() = ListenerState::Reconnecting;
        attempt += 1;
        sleep_interruptible(shared, shared.config.retry.delay_for_attempt(attempt));
    }
}

fn sleep_interruptible(shared: &EngineShared, delay: Duration) {
    let step = Duration::from_millis(50);
    let mut remaining = delay;
    while !remaining.is_zero() {
        if shared.is_shutdown() {
            return;
        }
        let slice = remaining.min(step);
        thread::sleep(slice);
        remaining = remaining.saturating_sub(slice);
    }
}

/// Decodes a payload side's id values for a descriptor.
fn decode_ids(
    descriptor: &TypeDescriptor,
    side: &BTreeMap<String, String>,
) -> Option<Vec<Value>> {
    let mut ids = Vec::with_capacity(descriptor.id_columns.len());
    for id in &descriptor.id_columns {
        let text = side.get(&id.column)?;
        let value = decode_text(id.kind, Some(text)).ok()?;
        ids.push(value);
    }
    Some(ids)
}

/// Routes one decoded payload: identity-map bookkeeping plus update
/// handlers for the mutated row, then add/remove handlers for any
/// collections whose backing table this is.
fn route_payload(shared: &Arc<EngineShared>, dispatcher: &Arc<Dispatcher>, payload: ChangePayload) {
    let qualified = format!("{}.{}", payload.schema, payload.table);

    if let Some(descriptor) = shared
        .registry
        .describe_table(&payload.schema, &payload.table)
    {
        let side = match payload.op {
            ChangeOp::Delete => &payload.old,
            _ => &payload.new,
        };
        if let Some(ids) = decode_ids(&descriptor, side) {
            if let Ok(key) = RowKey::new(&descriptor, &ids) {
                let shard = key.shard(dispatcher.shards());
                let shared = Arc::clone(shared);
                let payload = payload.clone();
                dispatcher.dispatch(
                    shard,
                    Box::new(move || handle_row_event(&shared, &descriptor, ids, key, &payload)),
                );
            }
        }
    }

    for route in shared.handlers.collection_routes(&qualified) {
        for event in collection_events(&route, &payload) {
            let shard = {
                use std::hash::{Hash, Hasher};
                let mut hasher = std::collections::hash_map::DefaultHasher::new();
                event.holder_table.hash(&mut hasher);
                event.holder_ids.hash(&mut hasher);
                (hasher.finish() as usize) % dispatcher.shards()
            };
            let handler = Arc::clone(&route.handler);
            dispatcher.dispatch(shard, Box::new(move || handler(&event)));
        }
    }
}

fn handle_row_event(
    shared: &Arc<EngineShared>,
    descriptor: &Arc<TypeDescriptor>,
    ids: Vec<Value>,
    key: RowKey,
    payload: &ChangePayload,
) {
    match payload.op {
        ChangeOp::Insert => {
            // Populate a fresh instance for the unseen id. If nothing holds
            // a strong reference, the weak map entry just ages out.
            let observed = decode_columns(descriptor, &payload.new);
            if let Err(e) = shared.adopt(descriptor, &ids, observed) {
                warn!(table = %key.qualified, error = %e, "failed to adopt inserted row");
            }
        }
        ChangeOp::Update => {
            // Only columns that actually changed fire handlers, in
            // descriptor declaration order.
            let changed: Vec<_> = descriptor
                .columns
                .iter()
                .filter(|column| payload.old.get(&column.column) != payload.new.get(&column.column))
                .collect();
            if changed.is_empty() {
                return;
            }
            if let Some(live) = shared.identity.get(&key) {
                let observed: Vec<(String, Value)> = changed
                    .iter()
                    .filter_map(|column| {
                        decode_text(column.kind, payload.new.get(&column.column).map(String::as_str))
                            .ok()
                            .map(|value| (column.column.clone(), value))
                    })
                    .collect();
                live.observe(observed);
            }
            for column in changed {
                let Some(handler) = shared.handlers.update_handler(&key.qualified, &column.column)
                else {
                    continue;
                };
                let old = decode_text(
                    column.kind,
                    payload.old.get(&column.column).map(String::as_str),
                );
                let new = decode_text(
                    column.kind,
                    payload.new.get(&column.column).map(String::as_str),
                );
                let (Ok(old), Ok(new)) = (old, new) else {
                    warn!(table = %key.qualified, column = %column.column,
                        "dropping update with undecodable values");
                    continue;
                };
                handler(&UpdateEvent {
                    row: key.clone(),
                    column: column.column.clone(),
                    old,
                    new,
                });
            }
        }
        ChangeOp::Delete => {
            shared.identity.mark_deleted(&key);
        }
    }
}

fn decode_columns(
    descriptor: &TypeDescriptor,
    side: &BTreeMap<String, String>,
) -> Vec<(String, Value)> {
    descriptor
        .columns
        .iter()
        .filter_map(|column| {
            let text = side.get(&column.column)?;
            decode_text(column.kind, Some(text))
                .ok()
                .map(|value| (column.column.clone(), value))
        })
        .collect()
}

/// Translates a backing-table payload into collection add/remove events.
fn collection_events(
    route: &crate::handlers::CollectionRoute,
    payload: &ChangePayload,
) -> Vec<CollectionEvent> {
    let holder_ids = |side: &BTreeMap<String, String>| -> Option<Vec<(String, String)>> {
        route
            .holder_links
            .iter()
            .map(|link| {
                side.get(&link.local)
                    .map(|value| (link.remote.clone(), value.clone()))
            })
            .collect()
    };
    let member = |side: &BTreeMap<String, String>| -> Vec<(String, String)> {
        match &route.member_side {
            MemberSide::Links(links) => links
                .iter()
                .filter_map(|link| {
                    side.get(&link.local)
                        .map(|value| (link.remote.clone(), value.clone()))
                })
                .collect(),
            MemberSide::OwnIds(columns) => columns
                .iter()
                .filter_map(|column| {
                    side.get(column).map(|value| (column.clone(), value.clone()))
                })
                .collect(),
            MemberSide::Element(column, _) => side
                .get(column)
                .map(|value| vec![(column.clone(), value.clone())])
                .unwrap_or_default(),
        }
    };
    let event = |delta, side: &BTreeMap<String, String>| -> Option<CollectionEvent> {
        Some(CollectionEvent {
            holder_table: route.holder_table.clone(),
            holder_ids: holder_ids(side)?,
            field: route.field.clone(),
            delta,
            member: member(side),
        })
    };

    match payload.op {
        ChangeOp::Insert => event(CollectionDelta::Added, &payload.new)
            .into_iter()
            .collect(),
        ChangeOp::Delete => event(CollectionDelta::Removed, &payload.old)
            .into_iter()
            .collect(),
        ChangeOp::Update => {
            // A rewritten link column moves the row between collections:
            // removal from the old holder, addition to the new one.
            let watched_changed = route.holder_links.iter().any(|link| {
                payload.old.get(&link.local) != payload.new.get(&link.local)
            }) || match &route.member_side {
                MemberSide::Links(links) => links
                    .iter()
                    .any(|link| payload.old.get(&link.local) != payload.new.get(&link.local)),
                MemberSide::OwnIds(columns) => columns
                    .iter()
                    .any(|column| payload.old.get(column) != payload.new.get(column)),
                MemberSide::Element(column, _) => {
                    payload.old.get(column) != payload.new.get(column)
                }
            };
            if !watched_changed {
                return Vec::new();
            }
            let mut events = Vec::new();
            if let Some(removed) = event(CollectionDelta::Removed, &payload.old) {
                events.push(removed);
            }
            if let Some(added) = event(CollectionDelta::Added, &payload.new) {
                events.push(added);
            }
            events
        }
    }
}

/// The cache-tier keyspace listener.
///
/// Maps keyspace events back to registered cache handlers, re-reading the
/// key for the current value. Handlers fire only when the raw value
/// actually changed - a same-value echo (including the engine observing
/// its own write) is suppressed.
pub(crate) struct CacheListener {
    handle: Option<JoinHandle<()>>,
}

impl CacheListener {
    /// Starts the cache listener thread.
    pub fn start(shared: Arc<EngineShared>) -> Self {
        let handle = thread::Builder::new()
            .name("liverow-cache-listener".to_owned())
            .spawn(move || run_cache_listener(&shared))
            .unwrap_or_else(|e| panic!("failed to spawn cache listener: {e}"));
        Self {
            handle: Some(handle),
        }
    }

    /// Joins the listener thread.
    pub fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn run_cache_listener(shared: &Arc<EngineShared>) {
    let mut attempt: u32 = 0;
    let mut last_values: HashMap<String, Option<String>> = HashMap::new();
    loop {
        if shared.is_shutdown() {
            return;
        }
        match shared.cache.subscribe() {
            Ok(subscription) => {
                attempt = 0;
                debug!("cache keyspace feed connected");
                loop {
                    if shared.is_shutdown() {
                        return;
                    }
                    match subscription.receiver().recv_timeout(Duration::from_millis(50)) {
                        Ok(event) => {
                            let value = match event.kind {
                                CacheEventKind::Set => {
                                    shared.cache.get(&event.key).ok().flatten()
                                }
                                CacheEventKind::Del | CacheEventKind::Expired => None,
                            };
                            let unchanged = last_values.get(&event.key) == Some(&value);
                            last_values.insert(event.key.clone(), value.clone());
                            if unchanged {
                                continue;
                            }
                            let Some((prefix, _)) = event.key.split_once(':') else {
                                continue;
                            };
                            if let Some(handler) = shared.handlers.cache_handler(prefix) {
                                handler(&CacheUpdateEvent {
                                    key: event.key.clone(),
                                    value,
                                });
                            }
                        }
                        Err(RecvTimeoutError::Timeout) => continue,
                        Err(RecvTimeoutError::Disconnected) => {
                            warn!("cache keyspace feed disconnected");
                            break;
                        }
                    }
                }
            }
            Err(e) => warn!(error = %e, "cache keyspace subscribe failed"),
        }
        attempt += 1;
        sleep_interruptible(shared, shared.config.retry.delay_for_attempt(attempt));
    }
}
