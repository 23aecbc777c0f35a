//! Text rendering of ops, per dialect.

use crate::dialect::Dialect;
use crate::ops::{Alias, ColumnValue, DdlOp, DmlOp, Eq, SelectOp};
use liverow_codec::Value;

fn alias_prefix(alias: Alias) -> &'static str {
    match alias {
        Alias::Base => "t",
        Alias::Join => "j",
    }
}

/// Appends a WHERE clause for equality predicates, pushing parameters.
///
/// NULL predicates render as `IS NULL` and consume no parameter.
fn push_filter(
    sql: &mut String,
    params: &mut Vec<Value>,
    dialect: Dialect,
    filter: &[Eq],
    qualify: bool,
) {
    if filter.is_empty() {
        return;
    }
    sql.push_str(" WHERE ");
    for (i, eq) in filter.iter().enumerate() {
        if i > 0 {
            sql.push_str(" AND ");
        }
        if qualify {
            sql.push_str(alias_prefix(eq.alias));
            sql.push('.');
        }
        sql.push_str(&dialect.quote(&eq.column));
        if eq.value.is_null() {
            sql.push_str(" IS NULL");
        } else {
            params.push(eq.value.clone());
            sql.push_str(" = ");
            sql.push_str(&dialect.placeholder(params.len()));
        }
    }
}

fn push_set(sql: &mut String, params: &mut Vec<Value>, dialect: Dialect, set: &[ColumnValue]) {
    for (i, cv) in set.iter().enumerate() {
        if i > 0 {
            sql.push_str(", ");
        }
        sql.push_str(&dialect.quote(&cv.column));
        if cv.value.is_null() {
            sql.push_str(" = NULL");
        } else {
            params.push(cv.value.clone());
            sql.push_str(" = ");
            sql.push_str(&dialect.placeholder(params.len()));
        }
    }
}

/// Renders a select, returning the SQL text and its parameters in order.
pub fn render_select(op: &SelectOp, dialect: Dialect) -> (String, Vec<Value>) {
    let mut sql = String::from("SELECT ");
    let mut params = Vec::new();

    for (i, column) in op.columns.iter().enumerate() {
        if i > 0 {
            sql.push_str(", ");
        }
        sql.push_str(alias_prefix(column.alias));
        sql.push('.');
        sql.push_str(&dialect.quote(&column.column));
    }

    sql.push_str(" FROM ");
    sql.push_str(&dialect.quote_table(&op.table.schema, &op.table.table));
    sql.push_str(" t");

    if let Some(join) = &op.join {
        sql.push_str(" JOIN ");
        sql.push_str(&dialect.quote_table(&join.table.schema, &join.table.table));
        sql.push_str(" j ON ");
        for (i, (join_column, base_column)) in join.on.iter().enumerate() {
            if i > 0 {
                sql.push_str(" AND ");
            }
            sql.push_str("j.");
            sql.push_str(&dialect.quote(join_column));
            sql.push_str(" = t.");
            sql.push_str(&dialect.quote(base_column));
        }
    }

    push_filter(&mut sql, &mut params, dialect, &op.filter, true);
    (sql, params)
}

/// Renders a mutation, returning the SQL text and its parameters in order.
pub fn render_dml(op: &DmlOp, dialect: Dialect) -> (String, Vec<Value>) {
    let mut params = Vec::new();
    let sql = match op {
        DmlOp::Insert { table, values } => {
            let mut sql = String::from("INSERT INTO ");
            sql.push_str(&dialect.quote_table(&table.schema, &table.table));
            sql.push_str(" (");
            for (i, cv) in values.iter().enumerate() {
                if i > 0 {
                    sql.push_str(", ");
                }
                sql.push_str(&dialect.quote(&cv.column));
            }
            sql.push_str(") VALUES (");
            for (i, cv) in values.iter().enumerate() {
                if i > 0 {
                    sql.push_str(", ");
                }
                if cv.value.is_null() {
                    sql.push_str("NULL");
                } else {
                    params.push(cv.value.clone());
                    sql.push_str(&dialect.placeholder(params.len()));
                }
            }
            sql.push(')');
            sql
        }
        DmlOp::Update { table, set, filter } => {
            let mut sql = String::from("UPDATE ");
            sql.push_str(&dialect.quote_table(&table.schema, &table.table));
            sql.push_str(" SET ");
            push_set(&mut sql, &mut params, dialect, set);
            push_filter(&mut sql, &mut params, dialect, filter, false);
            sql
        }
        DmlOp::Delete {
            table,
            filter,
            limit_one,
        } => {
            let quoted = dialect.quote_table(&table.schema, &table.table);
            let mut sql = format!("DELETE FROM {quoted}");
            if *limit_one {
                match dialect {
                    Dialect::Embedded => {
                        push_filter(&mut sql, &mut params, dialect, filter, false);
                        sql.push_str(" LIMIT 1");
                    }
                    Dialect::Postgres => {
                        // Postgres has no DELETE ... LIMIT; target one row
                        // through its ctid.
                        let mut sub = format!("SELECT ctid FROM {quoted}");
                        push_filter(&mut sub, &mut params, dialect, filter, false);
                        sub.push_str(" LIMIT 1");
                        sql.push_str(" WHERE ctid IN (");
                        sql.push_str(&sub);
                        sql.push(')');
                    }
                }
            } else {
                push_filter(&mut sql, &mut params, dialect, filter, false);
            }
            sql
        }
        DmlOp::Upsert { table, key, values } => {
            let quoted = dialect.quote_table(&table.schema, &table.table);
            let all: Vec<&ColumnValue> = key.iter().chain(values.iter()).collect();
            match dialect {
                Dialect::Embedded => {
                    let mut sql = format!("MERGE INTO {quoted} (");
                    for (i, cv) in all.iter().enumerate() {
                        if i > 0 {
                            sql.push_str(", ");
                        }
                        sql.push_str(&dialect.quote(&cv.column));
                    }
                    sql.push_str(") KEY (");
                    for (i, cv) in key.iter().enumerate() {
                        if i > 0 {
                            sql.push_str(", ");
                        }
                        sql.push_str(&dialect.quote(&cv.column));
                    }
                    sql.push_str(") VALUES (");
                    for (i, cv) in all.iter().enumerate() {
                        if i > 0 {
                            sql.push_str(", ");
                        }
                        if cv.value.is_null() {
                            sql.push_str("NULL");
                        } else {
                            params.push(cv.value.clone());
                            sql.push_str(&dialect.placeholder(params.len()));
                        }
                    }
                    sql.push(')');
                    sql
                }
                Dialect::Postgres => {
                    let mut sql = format!("INSERT INTO {quoted} (");
                    for (i, cv) in all.iter().enumerate() {
                        if i > 0 {
                            sql.push_str(", ");
                        }
                        sql.push_str(&dialect.quote(&cv.column));
                    }
                    sql.push_str(") VALUES (");
                    for (i, cv) in all.iter().enumerate() {
                        if i > 0 {
                            sql.push_str(", ");
                        }
                        if cv.value.is_null() {
                            sql.push_str("NULL");
                        } else {
                            params.push(cv.value.clone());
                            sql.push_str(&dialect.placeholder(params.len()));
                        }
                    }
                    sql.push_str(") ON CONFLICT (");
                    for (i, cv) in key.iter().enumerate() {
                        if i > 0 {
                            sql.push_str(", ");
                        }
                        sql.push_str(&dialect.quote(&cv.column));
                    }
                    sql.push_str(") DO NOTHING");
                    sql
                }
            }
        }
    };
    (sql, params)
}

/// Renders a DDL op as inline-literal text.
pub fn render_ddl(op: &DdlOp, dialect: Dialect) -> String {
    match op {
        DdlOp::CreateSchema { schema } => {
            format!("CREATE SCHEMA IF NOT EXISTS {}", dialect.quote(schema))
        }
        DdlOp::CreateTable {
            table,
            columns,
            primary_key,
        } => {
            let mut sql = format!(
                "CREATE TABLE IF NOT EXISTS {} (",
                dialect.quote_table(&table.schema, &table.table)
            );
            for (i, column) in columns.iter().enumerate() {
                if i > 0 {
                    sql.push_str(", ");
                }
                sql.push_str(&dialect.quote(&column.name));
                sql.push(' ');
                sql.push_str(dialect.type_name(column.kind));
                if !column.nullable {
                    sql.push_str(" NOT NULL");
                }
                if let Some(default) = &column.default {
                    sql.push_str(" DEFAULT ");
                    sql.push_str(&dialect.literal(default));
                }
            }
            if !primary_key.is_empty() {
                sql.push_str(", PRIMARY KEY (");
                for (i, column) in primary_key.iter().enumerate() {
                    if i > 0 {
                        sql.push_str(", ");
                    }
                    sql.push_str(&dialect.quote(column));
                }
                sql.push(')');
            }
            sql.push(')');
            sql
        }
        DdlOp::CreateIndex {
            name,
            table,
            columns,
        } => {
            let mut sql = format!(
                "CREATE INDEX IF NOT EXISTS {} ON {} (",
                dialect.quote(name),
                dialect.quote_table(&table.schema, &table.table)
            );
            for (i, column) in columns.iter().enumerate() {
                if i > 0 {
                    sql.push_str(", ");
                }
                sql.push_str(&dialect.quote(column));
            }
            sql.push(')');
            sql
        }
        DdlOp::AddForeignKey {
            name,
            table,
            columns,
            target,
            target_columns,
            on_delete,
            on_update,
        } => {
            let mut sql = format!(
                "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY (",
                dialect.quote_table(&table.schema, &table.table),
                dialect.quote(name)
            );
            for (i, column) in columns.iter().enumerate() {
                if i > 0 {
                    sql.push_str(", ");
                }
                sql.push_str(&dialect.quote(column));
            }
            sql.push_str(") REFERENCES ");
            sql.push_str(&dialect.quote_table(&target.schema, &target.table));
            sql.push_str(" (");
            for (i, column) in target_columns.iter().enumerate() {
                if i > 0 {
                    sql.push_str(", ");
                }
                sql.push_str(&dialect.quote(column));
            }
            sql.push(')');
            sql.push_str(" ON DELETE ");
            sql.push_str(on_delete.as_sql());
            sql.push_str(" ON UPDATE ");
            sql.push_str(on_update.as_sql());
            sql
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::SelectColumn;
    use liverow_codec::Kind;
    use liverow_schema::TableRef;

    fn users() -> TableRef {
        TableRef::new("app", "users")
    }

    #[test]
    fn select_by_id_renders_both_dialects() {
        let op = SelectOp {
            table: users(),
            join: None,
            columns: vec![SelectColumn::base("name", Kind::Text)],
            filter: vec![Eq::base("id", Value::Int64(7))],
        };
        let (embedded, params) = render_select(&op, Dialect::Embedded);
        assert_eq!(
            embedded,
            "SELECT t.\"name\" FROM \"app\".\"users\" t WHERE t.\"id\" = ?"
        );
        assert_eq!(params, vec![Value::Int64(7)]);

        let (postgres, _) = render_select(&op, Dialect::Postgres);
        assert_eq!(
            postgres,
            "SELECT t.\"name\" FROM \"app\".\"users\" t WHERE t.\"id\" = $1"
        );
    }

    #[test]
    fn join_select_renders_on_clause() {
        let op = SelectOp {
            table: TableRef::new("app", "friends"),
            join: Some(crate::ops::Join {
                table: TableRef::new("app", "user_friends"),
                on: vec![("target_id".to_owned(), "id".to_owned())],
            }),
            columns: vec![SelectColumn::base("id", Kind::Uuid)],
            filter: vec![Eq::join("source_id", Value::Int64(1))],
        };
        let (sql, _) = render_select(&op, Dialect::Postgres);
        assert_eq!(
            sql,
            "SELECT t.\"id\" FROM \"app\".\"friends\" t \
             JOIN \"app\".\"user_friends\" j ON j.\"target_id\" = t.\"id\" \
             WHERE j.\"source_id\" = $1"
        );
    }

    #[test]
    fn null_predicate_renders_is_null() {
        let op = DmlOp::Update {
            table: users(),
            set: vec![ColumnValue::new("name", Value::text("bob"))],
            filter: vec![Eq::base("deleted_at", Value::Null)],
        };
        let (sql, params) = render_dml(&op, Dialect::Postgres);
        assert_eq!(
            sql,
            "UPDATE \"app\".\"users\" SET \"name\" = $1 WHERE \"deleted_at\" IS NULL"
        );
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn delete_limit_one_targets_ctid_on_postgres() {
        let op = DmlOp::Delete {
            table: users(),
            filter: vec![Eq::base("id", Value::Int64(5))],
            limit_one: true,
        };
        let (embedded, _) = render_dml(&op, Dialect::Embedded);
        assert_eq!(
            embedded,
            "DELETE FROM \"app\".\"users\" WHERE \"id\" = ? LIMIT 1"
        );
        let (postgres, _) = render_dml(&op, Dialect::Postgres);
        assert_eq!(
            postgres,
            "DELETE FROM \"app\".\"users\" WHERE ctid IN \
             (SELECT ctid FROM \"app\".\"users\" WHERE \"id\" = $1 LIMIT 1)"
        );
    }

    #[test]
    fn upsert_merge_vs_on_conflict() {
        let op = DmlOp::Upsert {
            table: TableRef::new("app", "user_friends"),
            key: vec![
                ColumnValue::new("source_id", Value::Int64(1)),
                ColumnValue::new("target_id", Value::Int64(2)),
            ],
            values: vec![],
        };
        let (embedded, _) = render_dml(&op, Dialect::Embedded);
        assert_eq!(
            embedded,
            "MERGE INTO \"app\".\"user_friends\" (\"source_id\", \"target_id\") \
             KEY (\"source_id\", \"target_id\") VALUES (?, ?)"
        );
        let (postgres, _) = render_dml(&op, Dialect::Postgres);
        assert_eq!(
            postgres,
            "INSERT INTO \"app\".\"user_friends\" (\"source_id\", \"target_id\") \
             VALUES ($1, $2) ON CONFLICT (\"source_id\", \"target_id\") DO NOTHING"
        );
    }

    #[test]
    fn insert_renders_null_inline() {
        let op = DmlOp::Insert {
            table: users(),
            values: vec![
                ColumnValue::new("id", Value::Int64(1)),
                ColumnValue::new("age", Value::Null),
            ],
        };
        let (sql, params) = render_dml(&op, Dialect::Postgres);
        assert_eq!(
            sql,
            "INSERT INTO \"app\".\"users\" (\"id\", \"age\") VALUES ($1, NULL)"
        );
        assert_eq!(params, vec![Value::Int64(1)]);
    }

    #[test]
    fn create_table_ddl() {
        let op = DdlOp::CreateTable {
            table: users(),
            columns: vec![
                crate::ops::ColumnDef {
                    name: "id".to_owned(),
                    kind: Kind::Uuid,
                    nullable: false,
                    default: None,
                },
                crate::ops::ColumnDef {
                    name: "age".to_owned(),
                    kind: Kind::Int32,
                    nullable: true,
                    default: Some(Value::Int32(0)),
                },
            ],
            primary_key: vec!["id".to_owned()],
        };
        assert_eq!(
            render_ddl(&op, Dialect::Postgres),
            "CREATE TABLE IF NOT EXISTS \"app\".\"users\" (\"id\" UUID NOT NULL, \
             \"age\" INTEGER DEFAULT 0, PRIMARY KEY (\"id\"))"
        );
    }
}
