//! Detached snapshots.

use liverow_codec::Value;
use liverow_schema::TypeDescriptor;
use std::collections::HashMap;
use std::sync::Arc;

/// A detached, frozen copy of a unique instance's field values.
///
/// Same id, same type, independent state: reads are served from
/// at-snapshot-time values forever and never reflect further changes.
#[derive(Debug, Clone)]
pub struct Snapshot {
    descriptor: Arc<TypeDescriptor>,
    ids: Vec<Value>,
    values: HashMap<String, Value>,
}

impl Snapshot {
    pub(crate) fn new(
        descriptor: Arc<TypeDescriptor>,
        ids: Vec<Value>,
        values: HashMap<String, Value>,
    ) -> Self {
        Self {
            descriptor,
            ids,
            values,
        }
    }

    /// Returns the type descriptor.
    pub fn descriptor(&self) -> &Arc<TypeDescriptor> {
        &self.descriptor
    }

    /// Returns the id column values.
    pub fn ids(&self) -> &[Value] {
        &self.ids
    }

    /// Returns the frozen value of a scalar field.
    ///
    /// Unknown fields return `Value::Null`, matching an unset column.
    pub fn get(&self, field: &str) -> &Value {
        self.values.get(field).unwrap_or(&Value::Null)
    }
}
