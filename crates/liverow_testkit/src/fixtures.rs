//! Fixture entity types and engine constructors.

use liverow_codec::{Kind, Value};
use liverow_core::{Engine, EngineConfig, RetryConfig};
use liverow_schema::{
    CacheSpec, CollectionSpec, DeleteStrategy, EntityType, FieldSpec, LinkSpec, ReferenceSpec,
    TypeSpec,
};
use liverow_store::{MemoryCache, MemoryStore};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// A user: scalars, a short-TTL cache value, a one-to-many collection of
/// posts, a many-to-many self-join of friends, and a scalar tag set.
pub struct User;

impl EntityType for User {
    fn spec() -> TypeSpec {
        TypeSpec::new("User", "app", "users")
            .with_id("id", Kind::Uuid)
            .with_field(FieldSpec::column("name", "name", Kind::Text))
            .with_field(FieldSpec::column("age", "age", Kind::Int32).nullable())
            .with_field(
                FieldSpec::column("bio", "bio", Kind::Text)
                    .nullable()
                    .with_update_interval(Duration::from_millis(80)),
            )
            .with_field(FieldSpec::cache(
                "session_count",
                Kind::Int64,
                CacheSpec::new().with_ttl(Duration::from_millis(200)),
            ))
            .with_field(FieldSpec::collection(
                "posts",
                CollectionSpec::OneToMany {
                    child_schema: "app",
                    child_table: "posts",
                    links: vec![LinkSpec::new("author_id", "id")],
                    delete: DeleteStrategy::Cascade,
                },
            ))
            .with_field(FieldSpec::collection(
                "friends",
                CollectionSpec::ManyToMany {
                    join_schema: "app",
                    join_table: "user_friends",
                    target_schema: "app",
                    target_table: "users",
                    source_links: vec![LinkSpec::new("source_id", "id")],
                    target_links: vec![LinkSpec::new("target_id", "id")],
                    delete: DeleteStrategy::Unlink,
                },
            ))
            .with_field(FieldSpec::collection(
                "tags",
                CollectionSpec::ScalarSet {
                    table_schema: "app",
                    table: "user_tags",
                    links: vec![LinkSpec::new("user_id", "id")],
                    element_column: "tag",
                    element_kind: Kind::Text,
                    delete: DeleteStrategy::Unlink,
                },
            ))
    }
}

/// A post: child side of the user's one-to-many collection.
pub struct Post;

impl EntityType for Post {
    fn spec() -> TypeSpec {
        TypeSpec::new("Post", "app", "posts")
            .with_id("id", Kind::Uuid)
            .with_field(FieldSpec::column("title", "title", Kind::Text))
            .with_field(FieldSpec::reference(
                "author",
                "author_id",
                ReferenceSpec {
                    target_schema: "app",
                    target_table: "users",
                    links: vec![LinkSpec::new("author_id", "id")],
                    link_kind: Kind::Uuid,
                    delete: DeleteStrategy::NoAction,
                    physical_fk: false,
                },
            ))
    }
}

/// A profile: `SetNull` reference, so a deleted user leaves the profile
/// behind with a nulled link.
pub struct Profile;

impl EntityType for Profile {
    fn spec() -> TypeSpec {
        TypeSpec::new("Profile", "app", "profiles")
            .with_id("id", Kind::Uuid)
            .with_field(FieldSpec::reference(
                "user",
                "user_id",
                ReferenceSpec {
                    target_schema: "app",
                    target_table: "users",
                    links: vec![LinkSpec::new("user_id", "id")],
                    link_kind: Kind::Uuid,
                    delete: DeleteStrategy::SetNull,
                    physical_fk: false,
                },
            ))
    }
}

/// A badge owning its stats row: `Cascade` reference, so deleting the badge
/// deletes the referenced stats row.
pub struct Badge;

impl EntityType for Badge {
    fn spec() -> TypeSpec {
        TypeSpec::new("Badge", "app", "badges")
            .with_id("id", Kind::Uuid)
            .with_field(FieldSpec::reference(
                "stats",
                "stats_id",
                ReferenceSpec {
                    target_schema: "app",
                    target_table: "badge_stats",
                    links: vec![LinkSpec::new("stats_id", "id")],
                    link_kind: Kind::Uuid,
                    delete: DeleteStrategy::Cascade,
                    physical_fk: false,
                },
            ))
    }
}

/// Stats row owned by a badge.
pub struct BadgeStats;

impl EntityType for BadgeStats {
    fn spec() -> TypeSpec {
        TypeSpec::new("BadgeStats", "app", "badge_stats")
            .with_id("id", Kind::Uuid)
            .with_field(FieldSpec::column("points", "points", Kind::Int64).with_default(Value::Int64(0)))
    }
}

/// An audit row: `NoAction` reference, dangling by design after a user
/// delete.
pub struct AuditRow;

impl EntityType for AuditRow {
    fn spec() -> TypeSpec {
        TypeSpec::new("AuditRow", "app", "audit_rows")
            .with_id("id", Kind::Uuid)
            .with_field(FieldSpec::column("action", "action", Kind::Text))
            .with_field(FieldSpec::reference(
                "user",
                "user_id",
                ReferenceSpec {
                    target_schema: "app",
                    target_table: "users",
                    links: vec![LinkSpec::new("user_id", "id")],
                    link_kind: Kind::Uuid,
                    delete: DeleteStrategy::NoAction,
                    physical_fk: false,
                },
            ))
    }
}

/// A running engine over the embedded store and cache, with every fixture
/// type registered and the schema synced.
pub struct TestEngine {
    /// The engine under test.
    pub engine: Arc<Engine>,
    /// The embedded relational store.
    pub store: Arc<MemoryStore>,
    /// The embedded cache tier.
    pub cache: Arc<MemoryCache>,
}

/// Builds a [`TestEngine`] with fast reconnect backoff.
pub fn test_engine() -> TestEngine {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    let store = Arc::new(MemoryStore::new());
    let cache = Arc::new(MemoryCache::new());
    let config = EngineConfig::new()
        .with_retry(RetryConfig::new(Duration::from_millis(10)).without_jitter())
        .with_coalescer_tick(Duration::from_millis(10));
    let engine = Engine::open(
        Arc::clone(&store) as Arc<dyn liverow_store::RelationalStore>,
        Arc::clone(&cache) as Arc<dyn liverow_store::CacheTier>,
        config,
    );
    engine.register::<User>().expect("register User");
    engine.register::<Post>().expect("register Post");
    engine.register::<Profile>().expect("register Profile");
    engine.register::<Badge>().expect("register Badge");
    engine.register::<BadgeStats>().expect("register BadgeStats");
    engine.register::<AuditRow>().expect("register AuditRow");
    engine.sync_schema().expect("sync schema");
    TestEngine {
        engine,
        store,
        cache,
    }
}

/// Creates a user row and returns its instance.
pub fn create_user(
    fixture: &TestEngine,
    name: &str,
) -> std::sync::Arc<liverow_core::UniqueInstance> {
    let id = Uuid::new_v4();
    fixture
        .engine
        .create::<User>(&[Value::Uuid(id)], &[("name", Value::text(name))])
        .expect("create user")
}
