//! Process-wide descriptor registry.

use crate::descriptor::TypeDescriptor;
use crate::error::{SchemaError, SchemaResult};
use crate::spec::TypeSpec;
use parking_lot::RwLock;
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

/// A data type with externally-supplied field metadata.
///
/// Implementations are produced by the code-generation step or written by
/// hand. `spec()` must return the same metadata on every call.
pub trait EntityType: Send + Sync + 'static {
    /// Returns the declarative metadata for this type.
    fn spec() -> TypeSpec;
}

#[derive(Default)]
struct Inner {
    by_type: HashMap<TypeId, Arc<TypeDescriptor>>,
    by_table: HashMap<(String, String), Arc<TypeDescriptor>>,
    /// Registration order, for deterministic schema dumps.
    ordered: Vec<Arc<TypeDescriptor>>,
}

/// Registry of parsed type descriptors.
///
/// Registration happens once per type during startup; afterwards the
/// registry is effectively read-only and lookups are safe from any thread.
#[derive(Default)]
pub struct Registry {
    inner: RwLock<Inner>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the process-global registry.
    pub fn global() -> &'static Registry {
        static GLOBAL: OnceLock<Registry> = OnceLock::new();
        GLOBAL.get_or_init(Registry::new)
    }

    /// Registers a type, parsing its metadata.
    ///
    /// Idempotent: re-registering an already-known type returns the
    /// existing descriptor without re-parsing.
    ///
    /// # Errors
    ///
    /// Fails with a [`SchemaError`] when the metadata is absent or
    /// contradictory, or when a different type already claims the same
    /// (schema, table).
    pub fn register<T: EntityType>(&self) -> SchemaResult<Arc<TypeDescriptor>> {
        let type_id = TypeId::of::<T>();
        if let Some(existing) = self.inner.read().by_type.get(&type_id) {
            return Ok(Arc::clone(existing));
        }

        let descriptor = Arc::new(TypeDescriptor::parse(&T::spec())?);
        let mut inner = self.inner.write();
        // Double-checked: another thread may have registered concurrently.
        if let Some(existing) = inner.by_type.get(&type_id) {
            return Ok(Arc::clone(existing));
        }
        let table_key = (
            descriptor.table.schema.clone(),
            descriptor.table.table.clone(),
        );
        if inner.by_table.contains_key(&table_key) {
            return Err(SchemaError::DuplicateTable {
                schema: table_key.0,
                table: table_key.1,
            });
        }
        inner.by_type.insert(type_id, Arc::clone(&descriptor));
        inner.by_table.insert(table_key, Arc::clone(&descriptor));
        inner.ordered.push(Arc::clone(&descriptor));
        Ok(descriptor)
    }

    /// Returns the descriptor for a registered type.
    ///
    /// # Errors
    ///
    /// Fails with [`SchemaError::UnknownType`] when the type was never
    /// registered.
    pub fn describe<T: EntityType>(&self) -> SchemaResult<Arc<TypeDescriptor>> {
        self.inner
            .read()
            .by_type
            .get(&TypeId::of::<T>())
            .cloned()
            .ok_or_else(|| SchemaError::UnknownType {
                type_name: std::any::type_name::<T>().to_owned(),
            })
    }

    /// Returns the descriptor owning the given (schema, table), if any.
    pub fn describe_table(&self, schema: &str, table: &str) -> Option<Arc<TypeDescriptor>> {
        self.inner
            .read()
            .by_table
            .get(&(schema.to_owned(), table.to_owned()))
            .cloned()
    }

    /// Returns all registered descriptors in registration order.
    pub fn descriptors(&self) -> Vec<Arc<TypeDescriptor>> {
        self.inner.read().ordered.clone()
    }

    /// Returns the number of registered types.
    pub fn len(&self) -> usize {
        self.inner.read().ordered.len()
    }

    /// Returns true if no types are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("types", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::FieldSpec;
    use liverow_codec::Kind;

    struct User;
    impl EntityType for User {
        fn spec() -> TypeSpec {
            TypeSpec::new("User", "app", "users")
                .with_id("id", Kind::Uuid)
                .with_field(FieldSpec::column("name", "name", Kind::Text))
        }
    }

    struct UserAlias;
    impl EntityType for UserAlias {
        fn spec() -> TypeSpec {
            TypeSpec::new("UserAlias", "app", "users").with_id("id", Kind::Uuid)
        }
    }

    struct Broken;
    impl EntityType for Broken {
        fn spec() -> TypeSpec {
            TypeSpec::new("Broken", "app", "broken")
        }
    }

    #[test]
    fn register_is_idempotent() {
        let registry = Registry::new();
        let first = registry.register::<User>().unwrap();
        let second = registry.register::<User>().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn describe_after_register() {
        let registry = Registry::new();
        registry.register::<User>().unwrap();
        let descriptor = registry.describe::<User>().unwrap();
        assert_eq!(descriptor.qualified_table(), "app.users");
        assert!(registry.describe_table("app", "users").is_some());
        assert!(registry.describe_table("app", "missing").is_none());
    }

    #[test]
    fn describe_unregistered_fails() {
        let registry = Registry::new();
        assert!(matches!(
            registry.describe::<User>(),
            Err(SchemaError::UnknownType { .. })
        ));
    }

    #[test]
    fn duplicate_table_rejected() {
        let registry = Registry::new();
        registry.register::<User>().unwrap();
        assert!(matches!(
            registry.register::<UserAlias>(),
            Err(SchemaError::DuplicateTable { .. })
        ));
    }

    #[test]
    fn broken_metadata_surfaces_at_registration() {
        let registry = Registry::new();
        assert!(registry.register::<Broken>().is_err());
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn registration_order_preserved() {
        struct Post;
        impl EntityType for Post {
            fn spec() -> TypeSpec {
                TypeSpec::new("Post", "app", "posts").with_id("id", Kind::Uuid)
            }
        }

        let registry = Registry::new();
        registry.register::<User>().unwrap();
        registry.register::<Post>().unwrap();
        let names: Vec<String> = registry
            .descriptors()
            .iter()
            .map(|d| d.type_name.clone())
            .collect();
        assert_eq!(names, vec!["User", "Post"]);
    }
}
