//! Cache-tier value accessor.

use crate::error::{CoreError, CoreResult};
use crate::instance::UniqueInstance;
use liverow_codec::{decode_text, encode_text, Value};
use liverow_schema::CacheValueDescriptor;
use std::sync::Arc;

/// Accessor for one cache-tier value of one instance.
///
/// "At the fallback" is represented by key absence: `set(fallback)` deletes
/// the key, and `get` on an absent (or expired) key returns the fallback.
/// This keeps cache-tier writes to the minimum.
pub struct CacheValue {
    instance: Arc<UniqueInstance>,
    descriptor: CacheValueDescriptor,
    fallback: Arc<dyn Fn() -> Value + Send + Sync>,
}

impl CacheValue {
    pub(crate) fn bind(
        instance: Arc<UniqueInstance>,
        field: &str,
        fallback: Arc<dyn Fn() -> Value + Send + Sync>,
    ) -> CoreResult<Self> {
        instance.ensure_live()?;
        let descriptor = instance
            .descriptor()
            .cache_value(field)
            .cloned()
            .ok_or_else(|| {
                CoreError::Build(liverow_sql::SqlBuildError::UnknownLinkColumn {
                    table: instance.descriptor().qualified_table(),
                    column: field.to_owned(),
                })
            })?;
        Ok(Self {
            instance,
            descriptor,
            fallback,
        })
    }

    /// Returns the full cache key for this value.
    pub fn key(&self) -> String {
        self.instance.row_key().cache_key(&self.descriptor.column)
    }

    /// Reads the cached value, falling back when the key is absent.
    pub fn get(&self) -> CoreResult<Value> {
        self.instance.ensure_live()?;
        let engine = self.instance.engine()?;
        match engine.cache.get(&self.key())? {
            Some(text) => Ok(decode_text(self.descriptor.kind, Some(&text))?),
            None => Ok((self.fallback)()),
        }
    }

    /// Writes the cached value with the declared TTL, or deletes the key
    /// when the value equals the fallback.
    pub fn set(&self, value: Value) -> CoreResult<()> {
        self.instance.ensure_live()?;
        let engine = self.instance.engine()?;
        let key = self.key();

        if value == (self.fallback)() {
            engine.cache.del(&key)?;
            return Ok(());
        }
        match encode_text(&value)? {
            None => {
                engine.cache.del(&key)?;
            }
            Some(text) => {
                engine.cache.set(&key, &text, self.descriptor.ttl)?;
            }
        }
        Ok(())
    }
}
