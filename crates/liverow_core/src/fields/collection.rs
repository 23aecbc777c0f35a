//! Collection accessor.

use crate::error::{CoreError, CoreResult};
use crate::instance::UniqueInstance;
use liverow_codec::Value;
use liverow_schema::{CollectionDescriptor, CollectionKind, TypeDescriptor};
use liverow_sql::{
    collection_select, join_row_delete, join_row_upsert, ColumnValue, DmlOp, Eq, SqlBuildError,
};
use std::collections::BTreeSet;
use std::sync::Arc;

/// One collection member: a referenced instance, or a scalar element.
#[derive(Clone)]
pub enum Member {
    /// A member row of a one-to-many or many-to-many collection.
    Instance(Arc<UniqueInstance>),
    /// An element of a scalar set.
    Value(Value),
}

/// Accessor for a one-to-many, many-to-many, or scalar-set collection.
///
/// Membership is always backed by a query; the accessor holds no member
/// state. One-to-many `add` rewrites the child's link columns; many-to-many
/// `add` upserts a join-table row.
#[derive(Clone)]
pub struct Collection {
    instance: Arc<UniqueInstance>,
    collection: CollectionDescriptor,
}

impl Collection {
    pub(crate) fn bind(instance: Arc<UniqueInstance>, field: &str) -> CoreResult<Self> {
        instance.ensure_live()?;
        let collection = instance
            .descriptor()
            .collection(field)
            .cloned()
            .ok_or_else(|| {
                CoreError::Build(SqlBuildError::UnknownLinkColumn {
                    table: instance.descriptor().qualified_table(),
                    column: field.to_owned(),
                })
            })?;
        Ok(Self {
            instance,
            collection,
        })
    }

    /// Returns the collection descriptor.
    pub fn collection_descriptor(&self) -> &CollectionDescriptor {
        &self.collection
    }

    fn target_descriptor(&self) -> CoreResult<Option<Arc<TypeDescriptor>>> {
        let engine = self.instance.engine()?;
        let table = match &self.collection.kind {
            CollectionKind::OneToMany { child, .. } => child,
            CollectionKind::ManyToMany { target, .. } => target,
            CollectionKind::ScalarSet { .. } => return Ok(None),
        };
        engine
            .registry
            .describe_table(&table.schema, &table.table)
            .map(Some)
            .ok_or_else(|| {
                CoreError::Build(SqlBuildError::UnknownLinkTarget {
                    table: table.qualified(),
                })
            })
    }

    fn member_rows(&self) -> CoreResult<Vec<Vec<Value>>> {
        self.instance.ensure_live()?;
        let engine = self.instance.engine()?;
        let target = self.target_descriptor()?;
        let op = collection_select(
            self.instance.descriptor(),
            &self.collection,
            target.as_deref(),
            self.instance.ids(),
        )?;
        let rows = engine.store.query(&op)?;
        Ok(rows.into_iter().map(|row| row.values).collect())
    }

    /// Returns the member count.
    pub fn len(&self) -> CoreResult<usize> {
        Ok(self.member_rows()?.len())
    }

    /// Returns true if the collection has no members.
    pub fn is_empty(&self) -> CoreResult<bool> {
        Ok(self.member_rows()?.is_empty())
    }

    /// Resolves all member instances (one-to-many and many-to-many).
    pub fn members(&self) -> CoreResult<Vec<Arc<UniqueInstance>>> {
        let target = self.target_descriptor()?.ok_or_else(|| {
            CoreError::Build(SqlBuildError::UnknownLinkTarget {
                table: self.collection.backing_table().qualified(),
            })
        })?;
        let engine = self.instance.engine()?;
        let mut members = Vec::new();
        for ids in self.member_rows()? {
            if let Some(member) = engine.resolve(&target, &ids)? {
                members.push(member);
            }
        }
        Ok(members)
    }

    /// Returns all elements of a scalar set.
    pub fn values(&self) -> CoreResult<Vec<Value>> {
        let rows = self.member_rows()?;
        Ok(rows
            .into_iter()
            .filter_map(|mut row| row.pop())
            .collect())
    }

    /// Returns true if the given instance is a member.
    pub fn contains(&self, member: &Arc<UniqueInstance>) -> CoreResult<bool> {
        let member_ids = member.ids().to_vec();
        Ok(self.member_rows()?.iter().any(|ids| *ids == member_ids))
    }

    /// Returns true if the given element is in a scalar set.
    pub fn contains_value(&self, value: &Value) -> CoreResult<bool> {
        Ok(self.values()?.iter().any(|v| v == value))
    }

    /// Adds a member.
    ///
    /// One-to-many: rewrites the child's link columns to point at the
    /// holder. Many-to-many: upserts the join row (re-adding is a no-op).
    pub fn add(&self, member: &Arc<UniqueInstance>) -> CoreResult<()> {
        self.instance.ensure_live()?;
        member.ensure_live()?;
        let engine = self.instance.engine()?;
        let holder = self.instance.descriptor();

        match &self.collection.kind {
            CollectionKind::OneToMany { links, .. } => {
                let set = self.child_link_values(links, Some(self.instance.ids()))?;
                let child = member.descriptor();
                let op = liverow_sql::update_columns(child, set, member.ids())?;
                engine.store.execute(&op)?;
            }
            CollectionKind::ManyToMany { .. } => {
                let target = member.descriptor();
                let op = join_row_upsert(
                    holder,
                    &self.collection,
                    target,
                    self.instance.ids(),
                    member.ids(),
                )?;
                engine.store.execute(&op)?;
            }
            CollectionKind::ScalarSet { .. } => {
                return Err(CoreError::Build(SqlBuildError::UnknownLinkTarget {
                    table: self.collection.backing_table().qualified(),
                }))
            }
        }
        Ok(())
    }

    /// Adds every member in the iterator.
    pub fn add_all<'a>(
        &self,
        members: impl IntoIterator<Item = &'a Arc<UniqueInstance>>,
    ) -> CoreResult<()> {
        for member in members {
            self.add(member)?;
        }
        Ok(())
    }

    /// Adds an element to a scalar set.
    pub fn add_value(&self, value: &Value) -> CoreResult<()> {
        self.instance.ensure_live()?;
        let engine = self.instance.engine()?;
        let CollectionKind::ScalarSet {
            table,
            links,
            element_column,
            ..
        } = &self.collection.kind
        else {
            return Err(CoreError::Build(SqlBuildError::UnknownLinkTarget {
                table: self.collection.backing_table().qualified(),
            }));
        };
        let mut key = self.child_link_values(links, Some(self.instance.ids()))?;
        key.push(ColumnValue::new(element_column.clone(), value.clone()));
        let op = DmlOp::Upsert {
            table: table.clone(),
            key,
            values: Vec::new(),
        };
        engine.store.execute(&op)?;
        Ok(())
    }

    /// Removes a member. Returns whether it was present.
    pub fn remove(&self, member: &Arc<UniqueInstance>) -> CoreResult<bool> {
        self.instance.ensure_live()?;
        let engine = self.instance.engine()?;
        let holder = self.instance.descriptor();

        let affected = match &self.collection.kind {
            CollectionKind::OneToMany { links, .. } => {
                let set = self.child_link_values(links, None)?;
                let child = member.descriptor();
                let op = liverow_sql::update_columns(child, set, member.ids())?;
                engine.store.execute(&op)?
            }
            CollectionKind::ManyToMany { .. } => {
                let op = join_row_delete(
                    holder,
                    &self.collection,
                    member.descriptor(),
                    self.instance.ids(),
                    member.ids(),
                )?;
                engine.store.execute(&op)?
            }
            CollectionKind::ScalarSet { .. } => {
                return Err(CoreError::Build(SqlBuildError::UnknownLinkTarget {
                    table: self.collection.backing_table().qualified(),
                }))
            }
        };
        Ok(affected > 0)
    }

    /// Removes an element from a scalar set. Returns whether it was present.
    pub fn remove_value(&self, value: &Value) -> CoreResult<bool> {
        self.instance.ensure_live()?;
        let engine = self.instance.engine()?;
        let CollectionKind::ScalarSet {
            table,
            links,
            element_column,
            ..
        } = &self.collection.kind
        else {
            return Err(CoreError::Build(SqlBuildError::UnknownLinkTarget {
                table: self.collection.backing_table().qualified(),
            }));
        };
        let mut filter: Vec<Eq> = self
            .child_link_values(links, Some(self.instance.ids()))?
            .into_iter()
            .map(|cv| Eq::base(cv.column, cv.value))
            .collect();
        filter.push(Eq::base(element_column.clone(), value.clone()));
        let op = DmlOp::Delete {
            table: table.clone(),
            filter,
            limit_one: true,
        };
        Ok(engine.store.execute(&op)? > 0)
    }

    /// Removes every member in the iterator.
    pub fn remove_all<'a>(
        &self,
        members: impl IntoIterator<Item = &'a Arc<UniqueInstance>>,
    ) -> CoreResult<()> {
        for member in members {
            self.remove(member)?;
        }
        Ok(())
    }

    /// Keeps only members the predicate accepts.
    pub fn retain(
        &self,
        mut keep: impl FnMut(&Arc<UniqueInstance>) -> bool,
    ) -> CoreResult<()> {
        for member in self.members()? {
            if !keep(&member) {
                self.remove(&member)?;
            }
        }
        Ok(())
    }

    /// Removes all members.
    pub fn clear(&self) -> CoreResult<()> {
        self.instance.ensure_live()?;
        let engine = self.instance.engine()?;
        let filter: Vec<Eq> = self
            .child_link_values(self.collection.holder_links(), Some(self.instance.ids()))?
            .into_iter()
            .map(|cv| Eq::base(cv.column, cv.value))
            .collect();

        let op = match &self.collection.kind {
            // Detaching children nulls their link columns.
            CollectionKind::OneToMany { child, links } => DmlOp::Update {
                table: child.clone(),
                set: links
                    .iter()
                    .map(|link| ColumnValue::new(link.local.clone(), Value::Null))
                    .collect(),
                filter,
            },
            CollectionKind::ManyToMany { join, .. } => DmlOp::Delete {
                table: join.clone(),
                filter,
                limit_one: false,
            },
            CollectionKind::ScalarSet { table, .. } => DmlOp::Delete {
                table: table.clone(),
                filter,
                limit_one: false,
            },
        };
        engine.store.execute(&op)?;
        Ok(())
    }

    /// Returns an iterator over current members that supports removal.
    pub fn iter(&self) -> CoreResult<CollectionIter> {
        let members = match &self.collection.kind {
            CollectionKind::ScalarSet { .. } => {
                self.values()?.into_iter().map(Member::Value).collect()
            }
            _ => self
                .members()?
                .into_iter()
                .map(Member::Instance)
                .collect(),
        };
        Ok(CollectionIter {
            collection: self.clone(),
            members,
            position: 0,
            current: None,
        })
    }

    /// Maps holder link columns to values (or NULL when detaching).
    fn child_link_values(
        &self,
        links: &[liverow_schema::Link],
        holder_ids: Option<&[Value]>,
    ) -> CoreResult<Vec<ColumnValue>> {
        let holder = self.instance.descriptor();
        let mut values = Vec::with_capacity(links.len());
        for link in links {
            let value = match holder_ids {
                None => Value::Null,
                Some(ids) => {
                    let position = holder
                        .id_columns
                        .iter()
                        .position(|id| id.column == link.remote)
                        .ok_or_else(|| {
                            CoreError::Build(SqlBuildError::UnknownLinkColumn {
                                table: holder.qualified_table(),
                                column: link.remote.clone(),
                            })
                        })?;
                    ids[position].clone()
                }
            };
            values.push(ColumnValue::new(link.local.clone(), value));
        }
        Ok(values)
    }

    fn member_id_set(&self) -> CoreResult<BTreeSet<String>> {
        let mut set = BTreeSet::new();
        for ids in self.member_rows()? {
            let mut encoded = Vec::with_capacity(ids.len());
            for value in &ids {
                encoded.push(liverow_codec::encode_text(value)?.unwrap_or_default());
            }
            set.insert(encoded.join(","));
        }
        Ok(set)
    }
}

impl PartialEq for Collection {
    /// One-to-many collections are canonically identified by their holder:
    /// equality is (type, holder, field), not contents. Many-to-many and
    /// scalar-set equality is the resolved member set.
    fn eq(&self, other: &Self) -> bool {
        let same_field = self.collection.field == other.collection.field;
        match (&self.collection.kind, &other.collection.kind) {
            (CollectionKind::OneToMany { .. }, CollectionKind::OneToMany { .. }) => {
                same_field && self.instance.row_key() == other.instance.row_key()
            }
            (CollectionKind::ManyToMany { .. }, CollectionKind::ManyToMany { .. })
            | (CollectionKind::ScalarSet { .. }, CollectionKind::ScalarSet { .. }) => {
                match (self.member_id_set(), other.member_id_set()) {
                    (Ok(a), Ok(b)) => a == b,
                    _ => false,
                }
            }
            _ => false,
        }
    }
}

/// Iterator over collection members with removal support.
pub struct CollectionIter {
    collection: Collection,
    members: Vec<Member>,
    position: usize,
    current: Option<Member>,
}

impl CollectionIter {
    /// Removes the member most recently returned by `next`.
    pub fn remove_current(&mut self) -> CoreResult<bool> {
        match self.current.take() {
            None => Ok(false),
            Some(Member::Instance(member)) => self.collection.remove(&member),
            Some(Member::Value(value)) => self.collection.remove_value(&value),
        }
    }
}

impl Iterator for CollectionIter {
    type Item = Member;

    fn next(&mut self) -> Option<Member> {
        let member = self.members.get(self.position)?.clone();
        self.position += 1;
        self.current = Some(member.clone());
        Some(member)
    }
}
