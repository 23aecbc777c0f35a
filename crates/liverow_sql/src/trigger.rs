//! Delete-strategy and change-feed trigger definitions.
//!
//! A [`TriggerDef`] is the structured form both stores consume: the embedded
//! store enacts the action directly, the Postgres store installs the rendered
//! function/trigger pair. Rendered installs always drop any previous trigger
//! of the same name first, so re-declaring a relation with a different
//! strategy replaces the old trigger instead of stacking a second one.

use crate::dialect::{Dialect, StatementPair};
use crate::error::{SqlBuildError, SqlResult};
use liverow_schema::{CollectionKind, DeleteStrategy, TableRef, TypeDescriptor};
use std::fmt::Write as _;

/// The notification channel all change-feed payloads are published on.
pub const NOTIFY_CHANNEL: &str = "liverow_changes";

/// A column pair binding affected rows to the deleted parent row.
///
/// Rows in the affected table match when `column` equals the deleted row's
/// `parent_column` value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerLink {
    /// Column on the affected table.
    pub column: String,
    /// Column on the row the trigger fired for.
    pub parent_column: String,
}

/// What a trigger does when it fires.
#[derive(Debug, Clone, PartialEq)]
pub enum TriggerAction {
    /// Delete matching rows in another table.
    DeleteRows {
        /// Affected table.
        table: TableRef,
        /// Match columns.
        links: Vec<TriggerLink>,
    },
    /// Null the link columns of matching rows in another table.
    SetNullColumns {
        /// Affected table.
        table: TableRef,
        /// Match columns; the `column` side is also the column nulled.
        links: Vec<TriggerLink>,
    },
    /// Delete matching join rows and the member rows they point at.
    DeleteJoinAndMembers {
        /// Join table.
        join: TableRef,
        /// Match columns on the join table.
        join_links: Vec<TriggerLink>,
        /// Member table.
        member: TableRef,
        /// (join column, member column) pairs.
        member_links: Vec<(String, String)>,
    },
    /// Publish a change-feed payload for every row mutation.
    Notify,
}

/// A trigger bound to a table.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerDef {
    /// Trigger name (unique per table).
    pub name: String,
    /// Table whose mutations fire the trigger. Delete-strategy triggers
    /// fire on DELETE; the notify trigger fires on every operation.
    pub table: TableRef,
    /// Action taken.
    pub action: TriggerAction,
}

/// Builds the canonical trigger name for a declared relation.
///
/// The name depends only on the declaring table and field, never on the
/// strategy: a relation re-declared with a different strategy produces a
/// trigger with the same name, which replaces the old one on install.
pub fn trigger_name(table: &TableRef, field: &str) -> String {
    format!("lr_del_{}_{field}", table.table)
}

/// Builds the change-feed notify trigger for a type's table.
pub fn notify_trigger(descriptor: &TypeDescriptor) -> TriggerDef {
    TriggerDef {
        name: format!("lr_notify_{}", descriptor.table.table),
        table: descriptor.table.clone(),
        action: TriggerAction::Notify,
    }
}

/// Builds the change-feed notify trigger for a collection backing table
/// that is not itself a registered type (join and element tables).
pub fn backing_notify_trigger(table: &TableRef) -> TriggerDef {
    TriggerDef {
        name: format!("lr_notify_{}", table.table),
        table: table.clone(),
        action: TriggerAction::Notify,
    }
}

/// Builds the delete-strategy triggers declared by a type.
///
/// Direction follows the strategy:
/// - reference `Cascade`/`Unlink`: fires on the referring table's DELETE and
///   deletes the referenced row
/// - reference `SetNull`: fires on the referenced table's DELETE and nulls
///   the referring side's link columns
/// - collection strategies fire on the holder's DELETE and affect the
///   backing (child/join/element) table
pub fn delete_triggers(descriptor: &TypeDescriptor) -> SqlResult<Vec<TriggerDef>> {
    let mut triggers = Vec::new();

    for reference in &descriptor.references {
        match reference.delete {
            DeleteStrategy::Cascade | DeleteStrategy::Unlink => triggers.push(TriggerDef {
                name: trigger_name(&descriptor.table, &reference.field),
                table: descriptor.table.clone(),
                action: TriggerAction::DeleteRows {
                    table: reference.target.clone(),
                    links: reference
                        .links
                        .iter()
                        .map(|l| TriggerLink {
                            column: l.remote.clone(),
                            parent_column: l.local.clone(),
                        })
                        .collect(),
                },
            }),
            DeleteStrategy::SetNull => triggers.push(TriggerDef {
                name: trigger_name(&descriptor.table, &reference.field),
                table: reference.target.clone(),
                action: TriggerAction::SetNullColumns {
                    table: descriptor.table.clone(),
                    links: reference
                        .links
                        .iter()
                        .map(|l| TriggerLink {
                            column: l.local.clone(),
                            parent_column: l.remote.clone(),
                        })
                        .collect(),
                },
            }),
            DeleteStrategy::NoAction => {}
        }
    }

    for collection in &descriptor.collections {
        let links: Vec<TriggerLink> = collection
            .holder_links()
            .iter()
            .map(|l| TriggerLink {
                column: l.local.clone(),
                parent_column: l.remote.clone(),
            })
            .collect();
        let action = match (&collection.kind, collection.delete) {
            (_, DeleteStrategy::NoAction) => continue,
            (CollectionKind::OneToMany { child, .. }, DeleteStrategy::Cascade) => {
                TriggerAction::DeleteRows {
                    table: child.clone(),
                    links,
                }
            }
            (
                CollectionKind::OneToMany { child, .. },
                DeleteStrategy::SetNull | DeleteStrategy::Unlink,
            ) => TriggerAction::SetNullColumns {
                table: child.clone(),
                links,
            },
            (
                CollectionKind::ManyToMany {
                    join,
                    target,
                    target_links,
                    ..
                },
                DeleteStrategy::Cascade,
            ) => TriggerAction::DeleteJoinAndMembers {
                join: join.clone(),
                join_links: links,
                member: target.clone(),
                member_links: target_links
                    .iter()
                    .map(|l| (l.local.clone(), l.remote.clone()))
                    .collect(),
            },
            (
                CollectionKind::ManyToMany { join, .. },
                DeleteStrategy::Unlink | DeleteStrategy::SetNull,
            ) => TriggerAction::DeleteRows {
                table: join.clone(),
                links,
            },
            (
                CollectionKind::ScalarSet { table, .. },
                DeleteStrategy::Cascade | DeleteStrategy::Unlink,
            ) => TriggerAction::DeleteRows {
                table: table.clone(),
                links,
            },
            (CollectionKind::ScalarSet { table, .. }, DeleteStrategy::SetNull) => {
                TriggerAction::SetNullColumns {
                    table: table.clone(),
                    links,
                }
            }
        };
        if matches!(&action, TriggerAction::DeleteRows { links, .. }
            | TriggerAction::SetNullColumns { links, .. } if links.is_empty())
        {
            return Err(SqlBuildError::EmptyColumnList {
                table: collection.backing_table().qualified(),
            });
        }
        triggers.push(TriggerDef {
            name: trigger_name(&descriptor.table, &collection.field),
            table: descriptor.table.clone(),
            action,
        });
    }

    Ok(triggers)
}

/// Renders a trigger definition in both dialects.
pub fn render_trigger(def: &TriggerDef) -> StatementPair {
    StatementPair {
        embedded: render_embedded(def),
        postgres: render_postgres(def),
    }
}

fn render_embedded(def: &TriggerDef) -> String {
    let d = Dialect::Embedded;
    let events = match def.action {
        TriggerAction::Notify => "INSERT, UPDATE, DELETE",
        _ => "DELETE",
    };
    format!(
        "CREATE TRIGGER IF NOT EXISTS {} AFTER {events} ON {} FOR EACH ROW CALL 'liverow.{}'",
        d.quote(&def.name),
        d.quote_table(&def.table.schema, &def.table.table),
        action_tag(&def.action),
    )
}

fn action_tag(action: &TriggerAction) -> &'static str {
    match action {
        TriggerAction::DeleteRows { .. } => "DeleteRowsTrigger",
        TriggerAction::SetNullColumns { .. } => "SetNullTrigger",
        TriggerAction::DeleteJoinAndMembers { .. } => "UnlinkMembersTrigger",
        TriggerAction::Notify => "NotifyTrigger",
    }
}

fn render_postgres(def: &TriggerDef) -> String {
    let d = Dialect::Postgres;
    let fn_name = format!("{}_fn", def.name);
    let qualified_fn = format!("{}.{}", d.quote(&def.table.schema), d.quote(&fn_name));
    let table = d.quote_table(&def.table.schema, &def.table.table);

    let mut body = String::new();
    match &def.action {
        TriggerAction::DeleteRows { table, links } => {
            let _ = write!(
                body,
                "  DELETE FROM {}{};\n  RETURN OLD;",
                d.quote_table(&table.schema, &table.table),
                old_match(d, links),
            );
        }
        TriggerAction::SetNullColumns { table, links } => {
            let sets: Vec<String> = links
                .iter()
                .map(|l| format!("{} = NULL", d.quote(&l.column)))
                .collect();
            let _ = write!(
                body,
                "  UPDATE {} SET {}{};\n  RETURN OLD;",
                d.quote_table(&table.schema, &table.table),
                sets.join(", "),
                old_match(d, links),
            );
        }
        TriggerAction::DeleteJoinAndMembers {
            join,
            join_links,
            member,
            member_links,
        } => {
            let join_quoted = d.quote_table(&join.schema, &join.table);
            let member_quoted = d.quote_table(&member.schema, &member.table);
            let mut using: Vec<String> = member_links
                .iter()
                .map(|(join_column, member_column)| {
                    format!(
                        "j.{} = {member_quoted}.{}",
                        d.quote(join_column),
                        d.quote(member_column)
                    )
                })
                .collect();
            using.extend(
                join_links
                    .iter()
                    .map(|l| format!("j.{} = OLD.{}", d.quote(&l.column), d.quote(&l.parent_column))),
            );
            let _ = write!(
                body,
                "  DELETE FROM {member_quoted} USING {join_quoted} j WHERE {};\n  DELETE FROM {join_quoted}{};\n  RETURN OLD;",
                using.join(" AND "),
                old_match(d, join_links),
            );
        }
        TriggerAction::Notify => {
            let _ = write!(
                body,
                "  PERFORM pg_notify('{NOTIFY_CHANNEL}', json_build_object(\
                 'schema', '{schema}', 'table', '{table_name}', 'op', lower(TG_OP), \
                 'old', CASE WHEN TG_OP = 'INSERT' THEN NULL ELSE row_to_json(OLD) END, \
                 'new', CASE WHEN TG_OP = 'DELETE' THEN NULL ELSE row_to_json(NEW) END)::text);\n  RETURN NULL;",
                schema = def.table.schema,
                table_name = def.table.table,
            );
        }
    }

    let events = match def.action {
        TriggerAction::Notify => "INSERT OR UPDATE OR DELETE",
        _ => "DELETE",
    };

    format!(
        "CREATE OR REPLACE FUNCTION {qualified_fn}() RETURNS trigger AS $$\nBEGIN\n{body}\nEND;\n$$ LANGUAGE plpgsql;\n\
         DROP TRIGGER IF EXISTS {name} ON {table};\n\
         CREATE TRIGGER {name} AFTER {events} ON {table} FOR EACH ROW EXECUTE FUNCTION {qualified_fn}()",
        name = d.quote(&def.name),
    )
}

fn old_match(d: Dialect, links: &[TriggerLink]) -> String {
    let clauses: Vec<String> = links
        .iter()
        .map(|l| format!("{} = OLD.{}", d.quote(&l.column), d.quote(&l.parent_column)))
        .collect();
    if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use liverow_codec::Kind;
    use liverow_schema::{
        CollectionSpec, FieldSpec, LinkSpec, ReferenceSpec, TypeSpec,
    };

    fn post_descriptor() -> TypeDescriptor {
        let spec = TypeSpec::new("Post", "app", "posts")
            .with_id("id", Kind::Uuid)
            .with_field(FieldSpec::reference(
                "stats",
                "stats_id",
                ReferenceSpec {
                    target_schema: "app",
                    target_table: "post_stats",
                    links: vec![LinkSpec::new("stats_id", "id")],
                    link_kind: Kind::Uuid,
                    delete: DeleteStrategy::Cascade,
                    physical_fk: false,
                },
            ));
        TypeDescriptor::parse(&spec).unwrap()
    }

    #[test]
    fn reference_cascade_fires_on_referring_table() {
        let triggers = delete_triggers(&post_descriptor()).unwrap();
        assert_eq!(triggers.len(), 1);
        let trigger = &triggers[0];
        assert_eq!(trigger.table.table, "posts");
        let TriggerAction::DeleteRows { table, links } = &trigger.action else {
            panic!("expected DeleteRows");
        };
        assert_eq!(table.table, "post_stats");
        assert_eq!(links[0].column, "id");
        assert_eq!(links[0].parent_column, "stats_id");
    }

    #[test]
    fn reference_set_null_fires_on_referenced_table() {
        let spec = TypeSpec::new("Profile", "app", "profiles")
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
                    physical_fk: true,
                },
            ));
        let descriptor = TypeDescriptor::parse(&spec).unwrap();
        let triggers = delete_triggers(&descriptor).unwrap();
        assert_eq!(triggers.len(), 1);
        assert_eq!(triggers[0].table.table, "users");
        let TriggerAction::SetNullColumns { table, links } = &triggers[0].action else {
            panic!("expected SetNullColumns");
        };
        assert_eq!(table.table, "profiles");
        assert_eq!(links[0].column, "user_id");
        assert_eq!(links[0].parent_column, "id");
    }

    #[test]
    fn many_to_many_unlink_deletes_join_rows_only() {
        let spec = TypeSpec::new("User", "app", "users")
            .with_id("id", Kind::Uuid)
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
            ));
        let descriptor = TypeDescriptor::parse(&spec).unwrap();
        let triggers = delete_triggers(&descriptor).unwrap();
        assert_eq!(triggers.len(), 1);
        let TriggerAction::DeleteRows { table, .. } = &triggers[0].action else {
            panic!("expected DeleteRows on the join table");
        };
        assert_eq!(table.table, "user_friends");
    }

    #[test]
    fn postgres_rendering_drops_before_create() {
        let triggers = delete_triggers(&post_descriptor()).unwrap();
        let rendered = render_trigger(&triggers[0]);
        assert!(rendered.postgres.contains("DROP TRIGGER IF EXISTS"));
        assert!(rendered.postgres.contains("CREATE TRIGGER"));
        assert!(rendered.postgres.contains("AFTER DELETE"));
        assert!(rendered.embedded.starts_with("CREATE TRIGGER IF NOT EXISTS"));
    }

    #[test]
    fn notify_rendering_publishes_payload() {
        let rendered = render_trigger(&notify_trigger(&post_descriptor()));
        assert!(rendered.postgres.contains("pg_notify"));
        assert!(rendered.postgres.contains(NOTIFY_CHANNEL));
        assert!(rendered.postgres.contains("AFTER INSERT OR UPDATE OR DELETE"));
    }
}
