use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Arc, RwLock};

use serde_json::{Map, Value};

use super::{Direction, Query, StoreError, Table};

type Rows = BTreeMap<String, Value>;

/// JSON rows per table behind a lock. Rows keep their `id` field inline.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<HashMap<Table, Rows>>>,
    unavailable: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every operation fails with [`StoreError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, AtomicOrdering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.unavailable.load(AtomicOrdering::SeqCst) {
            Err(StoreError::Unavailable)
        } else {
            Ok(())
        }
    }

    fn read<R>(&self, table: Table, f: impl FnOnce(Option<&Rows>) -> R) -> Result<R, StoreError> {
        self.check()?;
        let tables = self.tables.read().unwrap_or_else(|e| e.into_inner());
        Ok(f(tables.get(&table)))
    }

    fn write<R>(&self, table: Table, f: impl FnOnce(&mut Rows) -> R) -> Result<R, StoreError> {
        self.check()?;
        let mut tables = self.tables.write().unwrap_or_else(|e| e.into_inner());
        Ok(f(tables.entry(table).or_default()))
    }

    pub(crate) fn list(&self, table: Table, query: &Query) -> Result<Vec<Value>, StoreError> {
        self.read(table, |rows| {
            let mut matched: Vec<Value> = rows
                .into_iter()
                .flat_map(|rows| rows.values())
                .filter(|row| {
                    query
                        .filters()
                        .iter()
                        .all(|(field, expected)| row.get(field).unwrap_or(&Value::Null) == expected)
                })
                .cloned()
                .collect();

            if let Some((field, direction)) = query.order() {
                matched.sort_by(|a, b| {
                    let ord = compare_json(a.get(field), b.get(field));
                    match direction {
                        Direction::Asc => ord,
                        Direction::Desc => ord.reverse(),
                    }
                });
            }
            if let Some(limit) = query.max_rows() {
                matched.truncate(limit);
            }
            matched
        })
    }

    pub(crate) fn get(&self, table: Table, id: &str) -> Result<Option<Value>, StoreError> {
        self.read(table, |rows| rows.and_then(|r| r.get(id)).cloned())
    }

    pub(crate) fn insert(
        &self,
        table: Table,
        id: &str,
        mut row: Map<String, Value>,
    ) -> Result<(), StoreError> {
        row.insert("id".to_string(), Value::String(id.to_string()));
        self.write(table, |rows| {
            if rows.contains_key(id) {
                return Err(StoreError::Conflict(format!("{}:{id}", table.as_str())));
            }
            rows.insert(id.to_string(), Value::Object(row));
            Ok(())
        })?
    }

    pub(crate) fn update(
        &self,
        table: Table,
        id: &str,
        patch: Map<String, Value>,
    ) -> Result<Option<Value>, StoreError> {
        self.write(table, |rows| {
            let row = rows.get_mut(id)?;
            if let Value::Object(fields) = row {
                for (key, value) in patch {
                    fields.insert(key, value);
                }
            }
            Some(row.clone())
        })
    }

    pub(crate) fn delete(&self, table: Table, id: &str) -> Result<(), StoreError> {
        self.write(table, |rows| {
            rows.remove(id);
        })
    }

    pub(crate) fn count(&self, table: Table) -> Result<usize, StoreError> {
        self.read(table, |rows| rows.map_or(0, |r| r.len()))
    }

    pub(crate) fn healthcheck(&self) -> Result<bool, StoreError> {
        self.check().map(|_| true)
    }
}

// Missing and null sort after everything else, like SurrealDB's NONE.
fn compare_json(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            _ => unreachable!(),
        }
    }

    #[test]
    fn filters_orders_and_limits() {
        let store = MemoryStore::new();
        store
            .insert(Table::Members, "a", object(json!({"community_id": "c1", "child_name": "Zoe"})))
            .unwrap();
        store
            .insert(Table::Members, "b", object(json!({"community_id": "c1", "child_name": "Ana"})))
            .unwrap();
        store
            .insert(Table::Members, "c", object(json!({"community_id": "c2", "child_name": "Bruno"})))
            .unwrap();

        let query = Query::new()
            .eq("community_id", "c1")
            .order_by("child_name", Direction::Asc);
        let rows = store.list(Table::Members, &query).unwrap();
        let names: Vec<_> = rows.iter().map(|r| r["child_name"].as_str().unwrap()).collect();
        assert_eq!(names, ["Ana", "Zoe"]);

        let rows = store.list(Table::Members, &Query::new().limit(1)).unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn duplicate_insert_is_a_conflict() {
        let store = MemoryStore::new();
        store.insert(Table::Events, "e1", Map::new()).unwrap();
        assert!(matches!(
            store.insert(Table::Events, "e1", Map::new()),
            Err(StoreError::Conflict(_))
        ));
    }

    #[test]
    fn update_of_missing_row_creates_nothing() {
        let store = MemoryStore::new();
        let updated = store
            .update(Table::Events, "ghost", object(json!({"status": "active"})))
            .unwrap();
        assert!(updated.is_none());
        assert_eq!(store.count(Table::Events).unwrap(), 0);
    }

    #[test]
    fn unavailable_store_fails_every_call() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        assert!(matches!(store.count(Table::Members), Err(StoreError::Unavailable)));
        assert!(matches!(store.healthcheck(), Err(StoreError::Unavailable)));
        store.set_unavailable(false);
        assert!(store.healthcheck().unwrap());
    }
}
