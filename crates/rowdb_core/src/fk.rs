//! Foreign-key traversal.
//!
//! Relations resolve lazily through [`Deferred`] and populate a
//! per-row relation cache on resolve, so the cached accessors
//! ([`Row::cached_one`], [`Row::cached_many`]) can read them without
//! further I/O. Resolving a relation on a whole [`RowSet`] batches the
//! lookup into one index query or one multi-get and fans the results
//! out to every member's cache.

use crate::deferred::Deferred;
use crate::error::{CoreError, CoreResult};
use crate::row::{FkCached, Row};
use crate::rowset::RowSet;
use crate::schema::{ColumnDef, ColumnKind, FkKind};
use rowdb_codec::Value;
use std::collections::HashMap;

fn remote_id_field(col: &ColumnDef) -> String {
    let prop = col
        .fk_remote_property
        .clone()
        .unwrap_or_else(|| col.name.clone());
    format!("{prop}_ID")
}

impl Row {
    fn relation(&self, name: &str) -> CoreResult<ColumnDef> {
        let col = self.def.column(name).ok_or_else(|| {
            CoreError::invalid_call(format!("{} has no column {name}", self.def.name))
        })?;
        if col.kind != ColumnKind::ForeignKey {
            return Err(CoreError::invalid_call(format!(
                "{}.{name} is not a relation",
                self.def.name
            )));
        }
        Ok(col.clone())
    }

    fn fk_kind(col: &ColumnDef) -> FkKind {
        // ForeignKey columns always carry a kind.
        col.fk_kind.unwrap_or(FkKind::Remote)
    }

    fn stored_fk_value(&self, col: &ColumnDef) -> CoreResult<Value> {
        let data = self.data_snapshot()?;
        Ok(data.get(&col.fk_id_field()).cloned().unwrap_or(Value::Null))
    }

    pub(crate) fn cache_relation(&self, name: &str, cached: FkCached) {
        self.inner
            .write()
            .fk_cache
            .insert(name.to_string(), cached);
    }

    fn set_field_tracked(&self, field: &str, value: Value) -> CoreResult<()> {
        let mut inner = self.inner.write();
        if inner.history {
            return Err(CoreError::invalid_call("history snapshots are read-only"));
        }
        if inner.archived {
            return Err(CoreError::invalid_call("archived rows are read-only"));
        }
        let data = inner.data.as_mut().ok_or_else(|| {
            CoreError::invalid_call(format!("row of {} has not been fetched", self.def.name))
        })?;
        let original = data.get(field).cloned().unwrap_or(Value::Null);
        data.insert(field.to_string(), value);
        inner.dirty.entry(field.to_string()).or_insert(original);
        Ok(())
    }

    /// Resolves a to-one relation (`remote` or `localSingle`), caching
    /// the result on this row.
    ///
    /// # Errors
    ///
    /// Fails on non-relations and on to-many relation kinds. Resolving
    /// a `localSingle` relation fails when several remote rows point
    /// here.
    pub fn relation_one(&self, name: &str) -> CoreResult<Deferred<Option<Row>>> {
        let col = self.relation(name)?;
        let target = col.fk_entity.clone().unwrap_or_default();
        let row = self.clone();
        let name = name.to_string();
        match Self::fk_kind(&col) {
            FkKind::Remote => {
                let id = self.stored_fk_value(&col)?;
                Ok(Deferred::new(move || {
                    let found = if id.is_null() {
                        None
                    } else {
                        row.db.table(&target)?.primary_key().get(id).resolve()?
                    };
                    row.cache_relation(&name, FkCached::One(found.clone()));
                    Ok(found)
                }))
            }
            FkKind::LocalSingle => {
                let pk = self.primary_key()?;
                let id_field = remote_id_field(&col);
                Ok(Deferred::new(move || {
                    let matches = row
                        .db
                        .table(&target)?
                        .key(&id_field)?
                        .find(pk)
                        .resolve()?;
                    if matches.len() > 1 {
                        return Err(CoreError::result_mismatch(format!(
                            "{} rows of {target} point at this row through {name}, expected at most one",
                            matches.len()
                        )));
                    }
                    let found = matches.get(0).cloned();
                    row.cache_relation(&name, FkCached::One(found.clone()));
                    Ok(found)
                }))
            }
            FkKind::Local | FkKind::RemoteMulti => Err(CoreError::invalid_call(format!(
                "{}.{name} resolves to many rows; use relation_many",
                self.def.name
            ))),
        }
    }

    /// Resolves a to-many relation (`local` or `remoteMulti`), caching
    /// the result on this row.
    ///
    /// # Errors
    ///
    /// Fails on non-relations and on to-one relation kinds.
    pub fn relation_many(&self, name: &str) -> CoreResult<Deferred<RowSet>> {
        let col = self.relation(name)?;
        let target = col.fk_entity.clone().unwrap_or_default();
        let row = self.clone();
        let name = name.to_string();
        match Self::fk_kind(&col) {
            FkKind::Local => {
                let pk = self.primary_key()?;
                let id_field = remote_id_field(&col);
                Ok(Deferred::new(move || {
                    let found = row
                        .db
                        .table(&target)?
                        .key(&id_field)?
                        .find(pk)
                        .resolve()?;
                    row.cache_relation(&name, FkCached::Many(found.clone()));
                    Ok(found)
                }))
            }
            FkKind::RemoteMulti => {
                let ids = match self.stored_fk_value(&col)? {
                    Value::Array(items) => items,
                    Value::Null => Vec::new(),
                    single => vec![single],
                };
                Ok(Deferred::new(move || {
                    let found = row
                        .db
                        .table(&target)?
                        .primary_key()
                        .get_many(ids)
                        .resolve()?;
                    row.cache_relation(&name, FkCached::Many(found.clone()));
                    Ok(found)
                }))
            }
            FkKind::Remote | FkKind::LocalSingle => Err(CoreError::invalid_call(format!(
                "{}.{name} resolves to one row; use relation_one",
                self.def.name
            ))),
        }
    }

    /// Reads a to-one relation out of the cache populated by an earlier
    /// resolve.
    ///
    /// # Errors
    ///
    /// Fails when the relation was never resolved on this row, or is
    /// to-many.
    pub fn cached_one(&self, name: &str) -> CoreResult<Option<Row>> {
        let inner = self.inner.read();
        match inner.fk_cache.get(name) {
            Some(FkCached::One(row)) => Ok(row.clone()),
            Some(FkCached::Many(_)) => Err(CoreError::invalid_call(format!(
                "{name} is a to-many relation; use cached_many"
            ))),
            None => Err(CoreError::invalid_call(format!(
                "relation {name} has not been resolved on this row"
            ))),
        }
    }

    /// Reads a to-many relation out of the cache populated by an
    /// earlier resolve.
    ///
    /// # Errors
    ///
    /// Fails when the relation was never resolved on this row, or is
    /// to-one.
    pub fn cached_many(&self, name: &str) -> CoreResult<RowSet> {
        let inner = self.inner.read();
        match inner.fk_cache.get(name) {
            Some(FkCached::Many(set)) => Ok(set.clone()),
            Some(FkCached::One(_)) => Err(CoreError::invalid_call(format!(
                "{name} is a to-one relation; use cached_one"
            ))),
            None => Err(CoreError::invalid_call(format!(
                "relation {name} has not been resolved on this row"
            ))),
        }
    }

    /// Points a `remote` relation at another row, or clears it.
    ///
    /// Only the id-holding side can be assigned; `local` and
    /// `localSingle` relations are changed from the remote side.
    ///
    /// # Errors
    ///
    /// Fails on other relation kinds and on read-only rows.
    pub fn set_relation(&self, name: &str, target: Option<&Row>) -> CoreResult<()> {
        let col = self.relation(name)?;
        if Self::fk_kind(&col) != FkKind::Remote {
            return Err(CoreError::invalid_call(format!(
                "{}.{name} does not store a single id; assign it from the owning side",
                self.def.name
            )));
        }
        let id = match target {
            Some(row) => row.primary_key()?,
            None => Value::Null,
        };
        self.set_field_tracked(&col.fk_id_field(), id)?;
        self.cache_relation(name, FkCached::One(target.cloned()));
        Ok(())
    }

    /// Adds a row to a `remoteMulti` relation's id set. Adding a row
    /// that is already linked is a no-op.
    ///
    /// # Errors
    ///
    /// Fails on other relation kinds and on read-only rows.
    pub fn link(&self, name: &str, target: &Row) -> CoreResult<()> {
        let col = self.relation(name)?;
        if Self::fk_kind(&col) != FkKind::RemoteMulti {
            return Err(CoreError::invalid_call(format!(
                "{}.{name} is not a multi-id relation",
                self.def.name
            )));
        }
        let id = target.primary_key()?;
        let mut ids = match self.stored_fk_value(&col)? {
            Value::Array(items) => items,
            Value::Null => Vec::new(),
            single => vec![single],
        };
        if !ids.contains(&id) {
            ids.push(id);
            self.set_field_tracked(&col.fk_id_field(), Value::Array(ids))?;
        }
        self.inner.write().fk_cache.remove(name);
        Ok(())
    }

    /// Removes a row from a `remoteMulti` relation's id set.
    ///
    /// # Errors
    ///
    /// Fails on other relation kinds and on read-only rows.
    pub fn unlink(&self, name: &str, target: &Row) -> CoreResult<()> {
        let col = self.relation(name)?;
        if Self::fk_kind(&col) != FkKind::RemoteMulti {
            return Err(CoreError::invalid_call(format!(
                "{}.{name} is not a multi-id relation",
                self.def.name
            )));
        }
        let id = target.primary_key()?;
        let ids = match self.stored_fk_value(&col)? {
            Value::Array(items) => items,
            Value::Null => Vec::new(),
            single => vec![single],
        };
        let remaining: Vec<Value> = ids.into_iter().filter(|v| *v != id).collect();
        self.set_field_tracked(&col.fk_id_field(), Value::Array(remaining))?;
        self.inner.write().fk_cache.remove(name);
        Ok(())
    }
}

impl RowSet {
    fn relation_meta(&self, name: &str) -> CoreResult<Option<(Row, ColumnDef, String)>> {
        let Some(first) = self.get(0) else {
            return Ok(None);
        };
        let col = first.relation(name)?;
        let target = col.fk_entity.clone().unwrap_or_default();
        Ok(Some((first.clone(), col, target)))
    }

    /// Resolves a to-one relation for every member with one batched
    /// lookup, filling each member's relation cache. Returns the
    /// distinct remote rows.
    ///
    /// # Errors
    ///
    /// Same conditions as [`Row::relation_one`], checked across the
    /// whole set.
    pub fn relation_one(&self, name: &str) -> CoreResult<Deferred<RowSet>> {
        let Some((first, col, target)) = self.relation_meta(name)? else {
            return Ok(Deferred::ready(RowSet::default()));
        };
        let members = self.clone();
        let name = name.to_string();
        match Row::fk_kind(&col) {
            FkKind::Remote => {
                let mut wanted: Vec<(Row, Value)> = Vec::new();
                for row in &members {
                    wanted.push((row.clone(), row.stored_fk_value(&col)?));
                }
                Ok(Deferred::new(move || {
                    let ids: Vec<Value> = wanted
                        .iter()
                        .filter(|(_, id)| !id.is_null())
                        .map(|(_, id)| id.clone())
                        .collect();
                    let remote = first
                        .db
                        .table(&target)?
                        .primary_key()
                        .get_many(ids)
                        .resolve()?;
                    let by_pk: HashMap<String, Row> = remote
                        .iter()
                        .map(|r| Ok((r.primary_key()?.to_string(), r.clone())))
                        .collect::<CoreResult<_>>()?;
                    for (row, id) in &wanted {
                        let found = if id.is_null() {
                            None
                        } else {
                            by_pk.get(&id.to_string()).cloned()
                        };
                        row.cache_relation(&name, FkCached::One(found));
                    }
                    Ok(remote)
                }))
            }
            FkKind::LocalSingle => {
                let id_field = remote_id_field(&col);
                Ok(Deferred::new(move || {
                    let pks = members.primary_keys()?;
                    let remote = first
                        .db
                        .table(&target)?
                        .key(&id_field)?
                        .find(Value::Array(pks))
                        .resolve()?;
                    let mut by_owner: HashMap<String, Vec<Row>> = HashMap::new();
                    for r in &remote {
                        let owner = r
                            .data_snapshot()?
                            .get(&id_field)
                            .cloned()
                            .unwrap_or(Value::Null)
                            .to_string();
                        by_owner.entry(owner).or_default().push(r.clone());
                    }
                    for row in &members {
                        let pk = row.primary_key()?.to_string();
                        let hits = by_owner.get(&pk).cloned().unwrap_or_default();
                        if hits.len() > 1 {
                            return Err(CoreError::result_mismatch(format!(
                                "{} rows of {target} point at one row through {name}, expected at most one",
                                hits.len()
                            )));
                        }
                        row.cache_relation(&name, FkCached::One(hits.first().cloned()));
                    }
                    Ok(remote)
                }))
            }
            FkKind::Local | FkKind::RemoteMulti => Err(CoreError::invalid_call(format!(
                "{name} resolves to many rows; use relation_many"
            ))),
        }
    }

    /// Resolves a to-many relation for every member with one batched
    /// lookup, filling each member's relation cache. Returns the
    /// distinct remote rows.
    ///
    /// # Errors
    ///
    /// Same conditions as [`Row::relation_many`], checked across the
    /// whole set.
    pub fn relation_many(&self, name: &str) -> CoreResult<Deferred<RowSet>> {
        let Some((first, col, target)) = self.relation_meta(name)? else {
            return Ok(Deferred::ready(RowSet::default()));
        };
        let members = self.clone();
        let name = name.to_string();
        match Row::fk_kind(&col) {
            FkKind::Local => {
                let id_field = remote_id_field(&col);
                Ok(Deferred::new(move || {
                    let pks = members.primary_keys()?;
                    let remote = first
                        .db
                        .table(&target)?
                        .key(&id_field)?
                        .find(Value::Array(pks))
                        .resolve()?;
                    let mut by_owner: HashMap<String, Vec<Row>> = HashMap::new();
                    for r in &remote {
                        let owner = r
                            .data_snapshot()?
                            .get(&id_field)
                            .cloned()
                            .unwrap_or(Value::Null)
                            .to_string();
                        by_owner.entry(owner).or_default().push(r.clone());
                    }
                    for row in &members {
                        let pk = row.primary_key()?.to_string();
                        let hits = by_owner.get(&pk).cloned().unwrap_or_default();
                        row.cache_relation(&name, FkCached::Many(RowSet::from(hits)));
                    }
                    Ok(remote)
                }))
            }
            FkKind::RemoteMulti => {
                let mut wanted: Vec<(Row, Vec<Value>)> = Vec::new();
                for row in &members {
                    let ids = match row.stored_fk_value(&col)? {
                        Value::Array(items) => items,
                        Value::Null => Vec::new(),
                        single => vec![single],
                    };
                    wanted.push((row.clone(), ids));
                }
                Ok(Deferred::new(move || {
                    let all_ids: Vec<Value> = wanted
                        .iter()
                        .flat_map(|(_, ids)| ids.iter().cloned())
                        .collect();
                    let remote = first
                        .db
                        .table(&target)?
                        .primary_key()
                        .get_many(all_ids)
                        .resolve()?;
                    let by_pk: HashMap<String, Row> = remote
                        .iter()
                        .map(|r| Ok((r.primary_key()?.to_string(), r.clone())))
                        .collect::<CoreResult<_>>()?;
                    for (row, ids) in &wanted {
                        let hits: Vec<Row> = ids
                            .iter()
                            .filter_map(|id| by_pk.get(&id.to_string()).cloned())
                            .collect();
                        row.cache_relation(&name, FkCached::Many(RowSet::from(hits)));
                    }
                    Ok(remote)
                }))
            }
            FkKind::Remote | FkKind::LocalSingle => Err(CoreError::invalid_call(format!(
                "{name} resolves to one row; use relation_one"
            ))),
        }
    }
}

impl Deferred<Row> {
    /// Chains a to-one relation lookup onto the row this query yields.
    #[must_use]
    pub fn relation_one(self, name: &str) -> Deferred<Option<Row>> {
        let name = name.to_string();
        self.and_then(move |row| row.relation_one(&name)?.resolve())
    }

    /// Chains a to-many relation lookup onto the row this query yields.
    #[must_use]
    pub fn relation_many(self, name: &str) -> Deferred<RowSet> {
        let name = name.to_string();
        self.and_then(move |row| row.relation_many(&name)?.resolve())
    }
}

impl Deferred<Option<Row>> {
    /// Chains a to-one relation lookup; an absent row yields `None`.
    #[must_use]
    pub fn relation_one(self, name: &str) -> Deferred<Option<Row>> {
        let name = name.to_string();
        self.and_then(move |row| match row {
            Some(row) => row.relation_one(&name)?.resolve(),
            None => Ok(None),
        })
    }

    /// Chains a to-many relation lookup; an absent row yields an empty
    /// set.
    #[must_use]
    pub fn relation_many(self, name: &str) -> Deferred<RowSet> {
        let name = name.to_string();
        self.and_then(move |row| match row {
            Some(row) => row.relation_many(&name)?.resolve(),
            None => Ok(RowSet::default()),
        })
    }
}

impl Deferred<RowSet> {
    /// Chains a batched to-one relation lookup onto this query's rows.
    #[must_use]
    pub fn relation_one(self, name: &str) -> Deferred<RowSet> {
        let name = name.to_string();
        self.and_then(move |set| set.relation_one(&name)?.resolve())
    }

    /// Chains a batched to-many relation lookup onto this query's rows.
    #[must_use]
    pub fn relation_many(self, name: &str) -> Deferred<RowSet> {
        let name = name.to_string();
        self.and_then(move |set| set.relation_many(&name)?.resolve())
    }
}
