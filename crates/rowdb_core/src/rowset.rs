//! Ordered collections of rows.

use crate::error::CoreResult;
use crate::row::Row;
use rowdb_codec::Value;

/// An ordered set of rows from one entity, as returned by multi-match
/// queries. Preserves the order the underlying lookup produced.
#[derive(Debug, Clone, Default)]
pub struct RowSet {
    rows: Vec<Row>,
}

impl RowSet {
    pub(crate) fn new(rows: Vec<Row>) -> Self {
        Self { rows }
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The row at `index`, if any.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Row> {
        self.rows.get(index)
    }

    /// Iterates over the rows.
    pub fn iter(&self) -> std::slice::Iter<'_, Row> {
        self.rows.iter()
    }

    /// Maps every row through a fallible function, collecting the
    /// results.
    ///
    /// # Errors
    ///
    /// Stops at and returns the first failure.
    pub fn try_map<T>(&self, mut f: impl FnMut(&Row) -> CoreResult<T>) -> CoreResult<Vec<T>> {
        self.rows.iter().map(|row| f(row)).collect()
    }

    /// Keeps the rows a fallible predicate accepts.
    ///
    /// # Errors
    ///
    /// Stops at and returns the first failure.
    pub fn try_filter(&self, mut f: impl FnMut(&Row) -> CoreResult<bool>) -> CoreResult<RowSet> {
        let mut rows = Vec::new();
        for row in &self.rows {
            if f(row)? {
                rows.push(row.clone());
            }
        }
        Ok(RowSet::new(rows))
    }

    /// Finds the first row a fallible predicate accepts.
    ///
    /// # Errors
    ///
    /// Stops at and returns the first failure.
    pub fn try_find(&self, mut f: impl FnMut(&Row) -> CoreResult<bool>) -> CoreResult<Option<Row>> {
        for row in &self.rows {
            if f(row)? {
                return Ok(Some(row.clone()));
            }
        }
        Ok(None)
    }

    /// Returns a copy sorted by a column's value.
    ///
    /// # Errors
    ///
    /// Fails when the column cannot be read on some row.
    pub fn sorted_by(&self, column: &str) -> CoreResult<RowSet> {
        let mut keyed: Vec<(Value, Row)> = self
            .rows
            .iter()
            .map(|row| Ok((row.get(column)?, row.clone())))
            .collect::<CoreResult<_>>()?;
        keyed.sort_by(|a, b| a.0.to_string().cmp(&b.0.to_string()));
        Ok(RowSet::new(keyed.into_iter().map(|(_, r)| r).collect()))
    }

    /// The primary keys of every row, in set order.
    ///
    /// # Errors
    ///
    /// Fails when some row has no key yet.
    pub fn primary_keys(&self) -> CoreResult<Vec<Value>> {
        self.try_map(Row::primary_key)
    }
}

impl std::ops::Index<usize> for RowSet {
    type Output = Row;

    fn index(&self, index: usize) -> &Row {
        &self.rows[index]
    }
}

impl IntoIterator for RowSet {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

impl<'a> IntoIterator for &'a RowSet {
    type Item = &'a Row;
    type IntoIter = std::slice::Iter<'a, Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

impl From<Vec<Row>> for RowSet {
    fn from(rows: Vec<Row>) -> Self {
        Self::new(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::KvBackend;
    use crate::registry::{Database, RegistryBuilder};
    use crate::schema::EntitySchema;
    use proptest::prelude::*;
    use rowdb_storage::MemoryStore;
    use std::sync::Arc;

    fn test_db() -> Database {
        RegistryBuilder::new()
            .declare(EntitySchema::new("T").primary_key("ID").column("name"))
            .attach_default(Arc::new(KvBackend::json(Arc::new(MemoryStore::new()))))
            .initialize()
            .unwrap()
    }

    fn rows(db: &Database, names: &[&str]) -> RowSet {
        let table = db.table("T").unwrap();
        RowSet::new(
            names
                .iter()
                .map(|name| {
                    let row = table.create().unwrap();
                    row.set("name", *name).unwrap();
                    row
                })
                .collect(),
        )
    }

    #[test]
    fn filter_find_and_map() {
        let db = test_db();
        let set = rows(&db, &["ann", "bob", "amy"]);
        let a_names = set
            .try_filter(|row| Ok(row.get("name")?.to_string().starts_with('a')))
            .unwrap();
        assert_eq!(a_names.len(), 2);
        let bob = set
            .try_find(|row| Ok(row.get("name")? == Value::from("bob")))
            .unwrap();
        assert!(bob.is_some());
        let names = set.try_map(|row| row.get("name")).unwrap();
        assert_eq!(names.len(), 3);
    }

    #[test]
    fn indexing_and_iteration() {
        let db = test_db();
        let set = rows(&db, &["x", "y"]);
        assert_eq!(set[1].get("name").unwrap(), Value::from("y"));
        assert_eq!(set.iter().count(), 2);
        assert_eq!(set.clone().into_iter().count(), 2);
    }

    proptest! {
        #[test]
        fn sorted_by_orders_lexicographically(
            mut names in prop::collection::vec("[a-z]{1,8}", 1..8)
        ) {
            let db = test_db();
            let refs: Vec<&str> = names.iter().map(String::as_str).collect();
            let sorted = rows(&db, &refs).sorted_by("name").unwrap();
            names.sort();
            let got = sorted.try_map(|row| Ok(row.get("name")?.to_string())).unwrap();
            prop_assert_eq!(got, names);
        }
    }
}
