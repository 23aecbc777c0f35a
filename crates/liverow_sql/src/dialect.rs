//! Dialect selection and identifier/literal rendering.

use liverow_codec::{encode_text, Value};

/// The two supported SQL dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    /// The embedded engine dialect, used for local and test execution.
    Embedded,
    /// The production relational dialect.
    Postgres,
}

impl Dialect {
    /// Quotes an identifier.
    pub fn quote(self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    /// Quotes a `schema.table` pair.
    pub fn quote_table(self, schema: &str, table: &str) -> String {
        format!("{}.{}", self.quote(schema), self.quote(table))
    }

    /// Returns the parameter placeholder for the 1-based position `n`.
    pub fn placeholder(self, n: usize) -> String {
        match self {
            Dialect::Embedded => "?".to_owned(),
            Dialect::Postgres => format!("${n}"),
        }
    }

    /// Renders a value as an inline literal, for DDL and schema dumps.
    pub fn literal(self, value: &Value) -> String {
        let Ok(Some(text)) = encode_text(value) else {
            return "NULL".to_owned();
        };
        match value {
            Value::Bool(b) => (if *b { "TRUE" } else { "FALSE" }).to_owned(),
            Value::Int16(_)
            | Value::Int32(_)
            | Value::Int64(_)
            | Value::Float32(_)
            | Value::Float64(_) => text,
            Value::Bytes(_) => match self {
                // Embedded hex literal vs Postgres bytea escape form.
                Dialect::Embedded => format!("X'{}'", &text[2..]),
                Dialect::Postgres => format!("'{text}'"),
            },
            _ => format!("'{}'", text.replace('\'', "''")),
        }
    }

    /// Renders the SQL type name for a column kind.
    pub fn type_name(self, kind: liverow_codec::Kind) -> &'static str {
        use liverow_codec::Kind;
        match (self, kind) {
            (_, Kind::Bool) => "BOOLEAN",
            (_, Kind::Int16) => "SMALLINT",
            (_, Kind::Int32) => "INTEGER",
            (_, Kind::Int64) => "BIGINT",
            (Dialect::Embedded, Kind::Float32) => "REAL",
            (Dialect::Postgres, Kind::Float32) => "REAL",
            (Dialect::Embedded, Kind::Float64) => "DOUBLE",
            (Dialect::Postgres, Kind::Float64) => "DOUBLE PRECISION",
            (_, Kind::Text) => "TEXT",
            (Dialect::Embedded, Kind::Bytes) => "BINARY VARYING",
            (Dialect::Postgres, Kind::Bytes) => "BYTEA",
            (_, Kind::Uuid) => "UUID",
            (Dialect::Embedded, Kind::Timestamp) => "TIMESTAMP",
            (Dialect::Postgres, Kind::Timestamp) => "TIMESTAMPTZ",
        }
    }
}

/// A statement rendered in both dialects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementPair {
    /// Embedded-dialect rendering.
    pub embedded: String,
    /// Postgres-dialect rendering.
    pub postgres: String,
}

impl StatementPair {
    /// Returns the rendering for a dialect.
    pub fn for_dialect(&self, dialect: Dialect) -> &str {
        match dialect {
            Dialect::Embedded => &self.embedded,
            Dialect::Postgres => &self.postgres,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoting_escapes_embedded_quotes() {
        assert_eq!(Dialect::Postgres.quote("users"), "\"users\"");
        assert_eq!(Dialect::Postgres.quote("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn placeholders_differ_per_dialect() {
        assert_eq!(Dialect::Embedded.placeholder(3), "?");
        assert_eq!(Dialect::Postgres.placeholder(3), "$3");
    }

    #[test]
    fn string_literal_escaped() {
        assert_eq!(
            Dialect::Postgres.literal(&Value::text("it's")),
            "'it''s'"
        );
    }

    #[test]
    fn bytes_literal_per_dialect() {
        let v = Value::Bytes(vec![0xab]);
        assert_eq!(Dialect::Embedded.literal(&v), "X'ab'");
        assert_eq!(Dialect::Postgres.literal(&v), "'\\xab'");
    }

    #[test]
    fn null_literal() {
        assert_eq!(Dialect::Postgres.literal(&Value::Null), "NULL");
    }
}
