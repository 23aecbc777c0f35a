//! Cross-crate integration helpers and scenarios.

use std::time::{Duration, Instant};

/// Polls a condition until it holds or the timeout elapses.
///
/// Cross-thread effects (listener dispatch, coalesced flushes) land within
/// milliseconds on the embedded store; tests observe them by polling with a
/// bounded deadline instead of sleeping fixed amounts.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}

/// Default deadline for observing notification-driven effects.
pub const SETTLE: Duration = Duration::from_secs(2);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::*;
    use liverow_codec::Value;
    use liverow_core::{CollectionDelta, CommitMode, CoreError, ListenerState, Member};
    use liverow_schema::TableRef;
    use liverow_sql::{ColumnValue, DmlOp, Eq};
    use liverow_store::RelationalStore;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use uuid::Uuid;

    fn uuid() -> Value {
        Value::Uuid(Uuid::new_v4())
    }

    #[test]
    fn resolve_returns_same_instance_while_live() {
        let fixture = test_engine();
        let user = create_user(&fixture, "alice");
        let ids = user.ids().to_vec();

        let a = fixture.engine.resolve::<User>(&ids).unwrap().unwrap();
        let b = fixture.engine.resolve::<User>(&ids).unwrap().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(Arc::ptr_eq(&a, &user));
    }

    #[test]
    fn evict_yields_distinct_instance() {
        let fixture = test_engine();
        let user = create_user(&fixture, "alice");
        let ids = user.ids().to_vec();

        fixture.engine.evict::<User>(&ids).unwrap();
        let fresh = fixture.engine.resolve::<User>(&ids).unwrap().unwrap();
        assert!(!Arc::ptr_eq(&user, &fresh));
        // The old reference is decoupled, not deleted.
        assert!(!user.is_deleted());
        assert_eq!(
            user.scalar("name").unwrap().get().unwrap(),
            Value::text("alice")
        );
    }

    #[test]
    fn resolve_absent_row_returns_none() {
        let fixture = test_engine();
        assert!(fixture.engine.resolve::<User>(&[uuid()]).unwrap().is_none());
    }

    #[test]
    fn noop_write_never_fires_handler_real_write_fires_once() {
        let fixture = test_engine();
        let count = Arc::new(AtomicUsize::new(0));
        {
            let count = Arc::clone(&count);
            fixture
                .engine
                .on_update::<User>("name", move |_| {
                    count.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
        }

        let user = create_user(&fixture, "alice");
        let name = user.scalar("name").unwrap();

        // Same value: suppressed, no write, no handler.
        assert!(!name.set(Value::text("alice")).unwrap());
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(count.load(Ordering::SeqCst), 0);

        // Different value: exactly one handler invocation.
        assert!(name.set(Value::text("bob")).unwrap());
        assert!(wait_until(SETTLE, || count.load(Ordering::SeqCst) == 1));
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn duplicate_handler_registration_is_rejected() {
        let fixture = test_engine();
        assert!(fixture.engine.on_update::<User>("name", |_| {}).unwrap());
        assert!(!fixture.engine.on_update::<User>("name", |_| {}).unwrap());
    }

    #[test]
    fn cache_value_fallback_and_ttl() {
        let fixture = test_engine();
        let user = create_user(&fixture, "alice");
        let sessions = user
            .cache_value("session_count", || Value::Int64(0))
            .unwrap();

        // Absent key reads as the fallback.
        assert_eq!(sessions.get().unwrap(), Value::Int64(0));

        sessions.set(Value::Int64(5)).unwrap();
        assert_eq!(sessions.get().unwrap(), Value::Int64(5));

        // Setting the fallback deletes the key.
        sessions.set(Value::Int64(0)).unwrap();
        assert_eq!(fixture.cache_get(&sessions.key()), None);
        assert_eq!(sessions.get().unwrap(), Value::Int64(0));

        // The declared TTL reverts the value to the fallback and removes
        // the key.
        sessions.set(Value::Int64(7)).unwrap();
        assert!(wait_until(SETTLE, || sessions.get().unwrap()
            == Value::Int64(0)));
        assert_eq!(fixture.cache_get(&sessions.key()), None);
    }

    #[test]
    fn reference_cascade_deletes_referenced_row() {
        let fixture = test_engine();
        let stats_id = uuid();
        let stats = fixture
            .engine
            .create::<BadgeStats>(&[stats_id.clone()], &[])
            .unwrap();
        let badge = fixture
            .engine
            .create::<Badge>(&[uuid()], &[("stats", stats_id.clone())])
            .unwrap();

        fixture.engine.delete(&badge).unwrap();
        assert!(badge.is_deleted());
        assert!(stats.is_deleted());
        assert!(fixture
            .engine
            .resolve::<BadgeStats>(&[stats_id])
            .unwrap()
            .is_none());
    }

    #[test]
    fn reference_set_null_keeps_row_and_nulls_link() {
        let fixture = test_engine();
        let user = create_user(&fixture, "alice");
        let user_id = user.ids()[0].clone();
        let profile_id = uuid();
        let profile = fixture
            .engine
            .create::<Profile>(&[profile_id.clone()], &[("user", user_id)])
            .unwrap();

        fixture.engine.delete(&user).unwrap();

        assert!(!profile.is_deleted());
        let resolved = fixture
            .engine
            .resolve::<Profile>(&[profile_id])
            .unwrap()
            .unwrap();
        assert!(resolved.reference("user").unwrap().get().unwrap().is_none());
    }

    #[test]
    fn no_action_leaves_dangling_reference() {
        let fixture = test_engine();
        let user = create_user(&fixture, "alice");
        let user_id = user.ids()[0].clone();
        let audit_id = uuid();
        fixture
            .engine
            .create::<AuditRow>(
                &[audit_id.clone()],
                &[("action", Value::text("login")), ("user", user_id.clone())],
            )
            .unwrap();

        fixture.engine.delete(&user).unwrap();

        // The audit row still carries the dangling link value.
        let audit = fixture
            .engine
            .resolve::<AuditRow>(&[audit_id])
            .unwrap()
            .unwrap();
        let link = audit.scalar("user").unwrap().get().unwrap();
        assert_eq!(link, user_id);
    }

    #[test]
    fn one_to_many_cascade_deletes_children() {
        let fixture = test_engine();
        let user = create_user(&fixture, "alice");
        let post_id = uuid();
        fixture
            .engine
            .create::<Post>(
                &[post_id.clone()],
                &[
                    ("title", Value::text("hello")),
                    ("author", user.ids()[0].clone()),
                ],
            )
            .unwrap();

        fixture.engine.delete(&user).unwrap();
        assert!(fixture.engine.resolve::<Post>(&[post_id]).unwrap().is_none());
    }

    #[test]
    fn batch_failure_rolls_back_everything() {
        let fixture = test_engine();
        let first_id = Uuid::new_v4();

        let mut batch = fixture.engine.begin_batch();
        let t1 = batch
            .add::<User>(&[Value::Uuid(first_id)], &[("name", Value::text("a"))])
            .unwrap();
        let t2 = batch
            .add::<User>(&[uuid()], &[("name", Value::text("b"))])
            .unwrap();
        // Post-insert action colliding with the first row's primary key.
        batch.add_post_insert_action(move || {
            Ok(vec![DmlOp::Insert {
                table: TableRef::new("app", "users"),
                values: vec![
                    ColumnValue::new("id", Value::Uuid(first_id)),
                    ColumnValue::new("name", Value::text("dup")),
                ],
            }])
        });

        let result = batch.commit(CommitMode::Sync);
        assert!(matches!(result, Err(CoreError::Transaction { .. })));
        assert!(matches!(
            t1.wait(Duration::from_secs(1)),
            Err(CoreError::Transaction { .. })
        ));
        assert!(matches!(
            t2.wait(Duration::from_secs(1)),
            Err(CoreError::Transaction { .. })
        ));
        assert_eq!(fixture.store.row_count(&TableRef::new("app", "users")), 0);
    }

    #[test]
    fn batch_commit_resolves_tickets_and_runs_post_actions() {
        let fixture = test_engine();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        let mut batch = fixture.engine.begin_batch();
        let ta = batch
            .add::<User>(&[Value::Uuid(a)], &[("name", Value::text("a"))])
            .unwrap();
        let tb = batch
            .add::<User>(&[Value::Uuid(b)], &[("name", Value::text("b"))])
            .unwrap();
        // Tie the two just-inserted rows together inside the same
        // transaction.
        batch.add_post_insert_action(move || {
            Ok(vec![DmlOp::Upsert {
                table: TableRef::new("app", "user_friends"),
                key: vec![
                    ColumnValue::new("source_id", Value::Uuid(a)),
                    ColumnValue::new("target_id", Value::Uuid(b)),
                ],
                values: vec![],
            }])
        });
        batch.commit(CommitMode::Sync).unwrap();

        let user_a = ta.wait(Duration::from_secs(1)).unwrap();
        let user_b = tb.wait(Duration::from_secs(1)).unwrap();
        assert_eq!(
            user_a.scalar("name").unwrap().get().unwrap(),
            Value::text("a")
        );
        let friends = user_a.collection("friends").unwrap();
        assert!(friends.contains(&user_b).unwrap());
    }

    #[test]
    fn async_commit_resolves_in_background() {
        let fixture = test_engine();
        let mut batch = fixture.engine.begin_batch();
        let ticket = batch
            .add::<User>(&[uuid()], &[("name", Value::text("bg"))])
            .unwrap();
        batch.commit(CommitMode::Async).unwrap();
        let user = ticket.wait(Duration::from_secs(2)).unwrap();
        assert!(!user.is_deleted());
    }

    #[test]
    fn friends_scenario_with_external_writer() {
        let fixture = test_engine();
        let added = Arc::new(AtomicUsize::new(0));
        let removed = Arc::new(AtomicUsize::new(0));
        let deltas = Arc::new(Mutex::new(Vec::new()));
        {
            let added = Arc::clone(&added);
            let removed = Arc::clone(&removed);
            let deltas = Arc::clone(&deltas);
            fixture
                .engine
                .on_collection::<User>("friends", move |event| {
                    match event.delta {
                        CollectionDelta::Added => added.fetch_add(1, Ordering::SeqCst),
                        CollectionDelta::Removed => removed.fetch_add(1, Ordering::SeqCst),
                    };
                    deltas.lock().push(event.delta);
                })
                .unwrap();
        }

        let alice = create_user(&fixture, "alice");
        let friends = alice.collection("friends").unwrap();
        let mut friend_instances = Vec::new();
        for i in 0..5 {
            let friend = create_user(&fixture, &format!("friend-{i}"));
            friends.add(&friend).unwrap();
            friend_instances.push(friend);
        }
        assert_eq!(friends.len().unwrap(), 5);
        assert!(wait_until(SETTLE, || added.load(Ordering::SeqCst) == 5));

        // Iterator removal drops exactly one membership and one join row.
        let mut iter = friends.iter().unwrap();
        let first = iter.next();
        assert!(matches!(first, Some(Member::Instance(_))));
        assert!(iter.remove_current().unwrap());
        assert_eq!(friends.len().unwrap(), 4);
        assert_eq!(
            fixture.store.row_count(&TableRef::new("app", "user_friends")),
            4
        );
        assert!(wait_until(SETTLE, || removed.load(Ordering::SeqCst) == 1));

        // An external writer rewriting a join-table link is observed by the
        // listener with the same delta semantics as the in-process path.
        let outsider = create_user(&fixture, "outsider");
        let survivor = friend_instances
            .iter()
            .find(|f| friends.contains(f).unwrap())
            .unwrap();
        fixture
            .store
            .execute(&DmlOp::Update {
                table: TableRef::new("app", "user_friends"),
                set: vec![ColumnValue::new("target_id", outsider.ids()[0].clone())],
                filter: vec![
                    Eq::base("source_id", alice.ids()[0].clone()),
                    Eq::base("target_id", survivor.ids()[0].clone()),
                ],
            })
            .unwrap();

        assert!(wait_until(SETTLE, || removed.load(Ordering::SeqCst) == 2));
        assert!(wait_until(SETTLE, || added.load(Ordering::SeqCst) == 6));
        assert!(friends.contains(&outsider).unwrap());
    }

    #[test]
    fn listener_reconnects_and_keeps_handlers() {
        let fixture = test_engine();
        let count = Arc::new(AtomicUsize::new(0));
        {
            let count = Arc::clone(&count);
            fixture
                .engine
                .on_update::<User>("name", move |_| {
                    count.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
        }
        let user = create_user(&fixture, "alice");
        assert!(wait_until(SETTLE, || fixture.engine.listener_state()
            == ListenerState::Connected));

        fixture.store.drop_subscriptions();
        assert!(wait_until(SETTLE, || fixture.engine.listener_state()
            == ListenerState::Connected));

        // Handlers registered before the drop still fire after reconnect.
        user.scalar("name").unwrap().set(Value::text("bob")).unwrap();
        assert!(wait_until(SETTLE, || count.load(Ordering::SeqCst) == 1));
    }

    #[test]
    fn stale_accessor_fails_fast() {
        let fixture = test_engine();
        let user = create_user(&fixture, "alice");
        fixture.engine.delete(&user).unwrap();

        assert!(user.is_deleted());
        assert!(matches!(
            user.scalar("name"),
            Err(CoreError::StaleState { .. })
        ));
        assert!(matches!(
            user.collection("friends"),
            Err(CoreError::StaleState { .. })
        ));
    }

    #[test]
    fn delete_notification_marks_instance_deleted() {
        let fixture = test_engine();
        let user = create_user(&fixture, "alice");

        // An external writer deletes the row directly against the store.
        fixture
            .store
            .execute(&DmlOp::Delete {
                table: TableRef::new("app", "users"),
                filter: vec![Eq::base("id", user.ids()[0].clone())],
                limit_one: false,
            })
            .unwrap();

        assert!(wait_until(SETTLE, || user.is_deleted()));
    }

    #[test]
    fn snapshot_is_frozen() {
        let fixture = test_engine();
        let user = create_user(&fixture, "alice");
        let snapshot = user.snapshot().unwrap();

        user.scalar("name").unwrap().set(Value::text("bob")).unwrap();
        assert_eq!(snapshot.get("name"), &Value::text("alice"));
        assert_eq!(
            user.scalar("name").unwrap().get().unwrap(),
            Value::text("bob")
        );
    }

    #[test]
    fn coalesced_writes_flush_last_value_once() {
        let fixture = test_engine();
        let count = Arc::new(AtomicUsize::new(0));
        {
            let count = Arc::clone(&count);
            fixture
                .engine
                .on_update::<User>("bio", move |_| {
                    count.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
        }
        let user = create_user(&fixture, "alice");
        let bio = user.scalar("bio").unwrap();

        bio.set(Value::text("first")).unwrap();
        bio.set(Value::text("second")).unwrap();

        // Only the last value lands, in a single flush.
        assert!(wait_until(SETTLE, || {
            let resolved = fixture.engine.resolve::<User>(user.ids()).unwrap().unwrap();
            resolved.scalar("bio").unwrap().get().unwrap() == Value::text("second")
        }));
        assert!(wait_until(SETTLE, || count.load(Ordering::SeqCst) == 1));
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn scalar_set_collection_round_trip() {
        let fixture = test_engine();
        let user = create_user(&fixture, "alice");
        let tags = user.collection("tags").unwrap();

        tags.add_value(&Value::text("admin")).unwrap();
        tags.add_value(&Value::text("beta")).unwrap();
        // Re-adding an element is a no-op.
        tags.add_value(&Value::text("admin")).unwrap();

        assert_eq!(tags.len().unwrap(), 2);
        assert!(tags.contains_value(&Value::text("admin")).unwrap());
        assert!(tags.remove_value(&Value::text("admin")).unwrap());
        assert!(!tags.contains_value(&Value::text("admin")).unwrap());
        assert_eq!(tags.values().unwrap(), vec![Value::text("beta")]);
    }

    #[test]
    fn cache_handler_fires_only_on_value_change() {
        let fixture = test_engine();
        let count = Arc::new(AtomicUsize::new(0));
        {
            let count = Arc::clone(&count);
            fixture
                .engine
                .on_cache_update::<User>("session_count", move |event| {
                    if event.value.is_some() {
                        count.fetch_add(1, Ordering::SeqCst);
                    }
                })
                .unwrap();
        }
        let user = create_user(&fixture, "alice");
        let sessions = user
            .cache_value("session_count", || Value::Int64(0))
            .unwrap();

        sessions.set(Value::Int64(5)).unwrap();
        assert!(wait_until(SETTLE, || count.load(Ordering::SeqCst) == 1));

        // Re-writing the same value is an echo, not a change.
        sessions.set(Value::Int64(5)).unwrap();
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn reference_get_and_set() {
        let fixture = test_engine();
        let user = create_user(&fixture, "alice");
        let post = fixture
            .engine
            .create::<Post>(
                &[uuid()],
                &[
                    ("title", Value::text("hello")),
                    ("author", user.ids()[0].clone()),
                ],
            )
            .unwrap();

        let author = post.reference("author").unwrap();
        let resolved = author.get().unwrap().unwrap();
        assert!(Arc::ptr_eq(&resolved, &user));

        author.set(None).unwrap();
        assert!(author.get().unwrap().is_none());

        author.set(Some(&user)).unwrap();
        assert!(author.get().unwrap().is_some());
    }

    impl TestEngine {
        fn cache_get(&self, key: &str) -> Option<String> {
            use liverow_store::CacheTier;
            self.cache.get(key).unwrap()
        }
    }
}
