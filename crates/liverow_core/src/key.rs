//! Canonical row keys.

use crate::error::{CoreError, CoreResult};
use liverow_codec::{encode_text, Value};
use liverow_schema::TypeDescriptor;
use liverow_sql::SqlBuildError;

/// Canonical identity of one logical row: qualified table plus text-encoded
/// id column values in descriptor order.
///
/// Row keys key the identity map, shard handler dispatch, and prefix cache
/// keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RowKey {
    /// `schema.table`.
    pub qualified: String,
    /// (id column, canonical text value) pairs in descriptor order.
    pub ids: Vec<(String, String)>,
}

impl RowKey {
    /// Builds the key for a descriptor and id values.
    ///
    /// # Errors
    ///
    /// Fails when the id value count does not match the descriptor, or an
    /// id value is NULL (ids are never NULL).
    pub fn new(descriptor: &TypeDescriptor, ids: &[Value]) -> CoreResult<Self> {
        if ids.len() != descriptor.id_columns.len() {
            return Err(CoreError::Build(SqlBuildError::LinkArityMismatch {
                table: descriptor.qualified_table(),
                expected: descriptor.id_columns.len(),
                actual: ids.len(),
            }));
        }
        let mut pairs = Vec::with_capacity(ids.len());
        for (id_column, value) in descriptor.id_columns.iter().zip(ids.iter()) {
            let Some(text) = encode_text(value)? else {
                return Err(CoreError::stale(
                    descriptor.qualified_table(),
                    "NULL id value",
                ));
            };
            pairs.push((id_column.column.clone(), text));
        }
        Ok(Self {
            qualified: descriptor.qualified_table(),
            ids: pairs,
        })
    }

    /// Builds the cache key for one column of this row.
    pub fn cache_key(&self, column: &str) -> String {
        let (schema, table) = self
            .qualified
            .split_once('.')
            .unwrap_or((self.qualified.as_str(), ""));
        liverow_store::cache_key(schema, table, column, &self.ids)
    }

    /// Renders the id part for diagnostics.
    pub fn ids_display(&self) -> String {
        let parts: Vec<String> = self
            .ids
            .iter()
            .map(|(column, value)| format!("{column}={value}"))
            .collect();
        parts.join(",")
    }

    /// Stable shard index for dispatch ordering.
    pub fn shard(&self, shards: usize) -> usize {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        self.hash(&mut hasher);
        (hasher.finish() as usize) % shards.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use liverow_codec::Kind;
    use liverow_schema::{TypeDescriptor, TypeSpec};

    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::parse(&TypeSpec::new("User", "app", "users").with_id("id", Kind::Int64))
            .unwrap()
    }

    #[test]
    fn key_carries_encoded_ids() {
        let key = RowKey::new(&descriptor(), &[Value::Int64(42)]).unwrap();
        assert_eq!(key.qualified, "app.users");
        assert_eq!(key.ids, vec![("id".to_owned(), "42".to_owned())]);
        assert_eq!(key.cache_key("session_count"), "app.users.session_count:id=42");
    }

    #[test]
    fn arity_mismatch_rejected() {
        assert!(RowKey::new(&descriptor(), &[]).is_err());
    }

    #[test]
    fn null_id_rejected() {
        assert!(RowKey::new(&descriptor(), &[Value::Null]).is_err());
    }

    #[test]
    fn shard_is_stable() {
        let key = RowKey::new(&descriptor(), &[Value::Int64(42)]).unwrap();
        assert_eq!(key.shard(4), key.shard(4));
        assert!(key.shard(4) < 4);
    }
}
