//! The change-feed payload wire type.

use crate::error::{StoreError, StoreResult};
use liverow_codec::{encode_text, Value};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// The operation a payload describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOp {
    /// A row was inserted.
    Insert,
    /// A row was updated.
    Update,
    /// A row was deleted.
    Delete,
}

/// One committed row mutation, as published on the change feed.
///
/// Column values are text-encoded with the canonical codec; NULL columns
/// are absent from the maps. `old` is empty for inserts, `new` is empty
/// for deletes. A payload is consumed once by the listener and discarded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangePayload {
    /// Schema of the mutated table.
    pub schema: String,
    /// Mutated table.
    pub table: String,
    /// Operation kind.
    pub op: ChangeOp,
    /// Column values before the mutation.
    #[serde(default, deserialize_with = "text_map")]
    pub old: BTreeMap<String, String>,
    /// Column values after the mutation.
    #[serde(default, deserialize_with = "text_map")]
    pub new: BTreeMap<String, String>,
}

/// Normalizes a payload column map to canonical text.
///
/// The Postgres notify trigger embeds `row_to_json` output, so values
/// arrive JSON-typed (numbers, booleans, strings); the embedded store
/// emits text directly. NULL columns and a NULL map both decode to
/// absence.
fn text_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<BTreeMap<String, serde_json::Value>> =
        Option::deserialize(deserializer)?;
    let mut map = BTreeMap::new();
    for (column, value) in raw.unwrap_or_default() {
        let text = match value {
            serde_json::Value::Null => continue,
            serde_json::Value::String(s) => s,
            serde_json::Value::Bool(b) => (if b { "t" } else { "f" }).to_owned(),
            serde_json::Value::Number(n) => n.to_string(),
            other => other.to_string(),
        };
        map.insert(column, text);
    }
    Ok(map)
}

impl ChangePayload {
    /// Serializes the payload to its wire form.
    pub fn to_wire(&self) -> String {
        // Serialization of string maps cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Decodes a payload from its wire form.
    pub fn from_wire(text: &str) -> StoreResult<Self> {
        serde_json::from_str(text).map_err(|e| StoreError::payload(e.to_string()))
    }

    /// Builds the text-encoded column map for one side of a payload.
    pub fn encode_columns<'a>(
        values: impl Iterator<Item = (&'a String, &'a Value)>,
    ) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        for (column, value) in values {
            if let Ok(Some(text)) = encode_text(value) {
                map.insert(column.clone(), text);
            }
        }
        map
    }
}

/// Builds the canonical cache key for a column of a specific row:
/// `{schema}.{table}.{column}:{id-column=value,...}` with id columns in
/// descriptor order.
pub fn cache_key(
    schema: &str,
    table: &str,
    column: &str,
    ids: &[(String, String)],
) -> String {
    let id_part: Vec<String> = ids
        .iter()
        .map(|(column, value)| format!("{column}={value}"))
        .collect();
    format!("{schema}.{table}.{column}:{}", id_part.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_round_trip() {
        let mut new = BTreeMap::new();
        new.insert("name".to_owned(), "alice".to_owned());
        let payload = ChangePayload {
            schema: "app".to_owned(),
            table: "users".to_owned(),
            op: ChangeOp::Insert,
            old: BTreeMap::new(),
            new,
        };
        let decoded = ChangePayload::from_wire(&payload.to_wire()).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn missing_maps_default_to_empty() {
        let payload =
            ChangePayload::from_wire(r#"{"schema":"app","table":"users","op":"delete"}"#).unwrap();
        assert_eq!(payload.op, ChangeOp::Delete);
        assert!(payload.old.is_empty());
        assert!(payload.new.is_empty());
    }

    #[test]
    fn null_columns_absent_from_encoded_map() {
        let name_column = "name".to_owned();
        let age_column = "age".to_owned();
        let name = Value::text("alice");
        let age = Value::Null;
        let map = ChangePayload::encode_columns(
            [(&name_column, &name), (&age_column, &age)].into_iter(),
        );
        assert_eq!(map.get("name").map(String::as_str), Some("alice"));
        assert!(!map.contains_key("age"));
    }

    #[test]
    fn cache_key_format() {
        let key = cache_key(
            "app",
            "users",
            "session_count",
            &[("id".to_owned(), "42".to_owned())],
        );
        assert_eq!(key, "app.users.session_count:id=42");
    }

    #[test]
    fn json_typed_values_normalize_to_text() {
        let payload = ChangePayload::from_wire(
            r#"{"schema":"app","table":"users","op":"update",
                "old":{"age":41,"active":true,"bio":null},
                "new":{"age":42,"active":false,"name":"alice"}}"#,
        )
        .unwrap();
        assert_eq!(payload.old.get("age").map(String::as_str), Some("41"));
        assert_eq!(payload.old.get("active").map(String::as_str), Some("t"));
        assert!(!payload.old.contains_key("bio"));
        assert_eq!(payload.new.get("active").map(String::as_str), Some("f"));
        assert_eq!(payload.new.get("name").map(String::as_str), Some("alice"));
    }

    #[test]
    fn malformed_payload_rejected() {
        assert!(ChangePayload::from_wire("not json").is_err());
    }
}
