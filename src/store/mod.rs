//! Table-scoped access to the hosted data service.
//!
//! Every read and write in the crate goes through [`Store`]. Production
//! talks to SurrealDB; the in-memory backend serves local development and
//! the test suites.

mod memory;
mod surreal;

pub use memory::MemoryStore;
pub use surreal::SurrealStore;

use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::config::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Table {
    Communities,
    Members,
    Events,
    ActiveEvents,
    Contributors,
}

impl Table {
    pub const ALL: [Table; 5] = [
        Table::Communities,
        Table::Members,
        Table::Events,
        Table::ActiveEvents,
        Table::Contributors,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Table::Communities => "communities",
            Table::Members => "members",
            Table::Events => "events",
            Table::ActiveEvents => "active_events",
            Table::Contributors => "contributors",
        }
    }
}

/// A row type bound to one table, keyed by a string id.
pub trait Record: Serialize + DeserializeOwned + Send + Sync + 'static {
    const TABLE: Table;

    fn id(&self) -> &str;
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("surrealdb: {0}")]
    Surreal(#[from] surrealdb::Error),

    #[error("data service unavailable")]
    Unavailable,

    #[error("invalid field name: {0:?}")]
    InvalidField(String),

    #[error("record {0} already exists")]
    Conflict(String),

    #[error("row is not a JSON object")]
    NotAnObject,

    #[error("serialization: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

/// Equality filters, one optional ordering and an optional limit.
#[derive(Debug, Clone, Default)]
pub struct Query {
    filters: Vec<(String, Value)>,
    order: Option<(String, Direction)>,
    limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filters.push((field.to_string(), value.into()));
        self
    }

    pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
        self.order = Some((field.to_string(), direction));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub(crate) fn filters(&self) -> &[(String, Value)] {
        &self.filters
    }

    pub(crate) fn order(&self) -> Option<&(String, Direction)> {
        self.order.as_ref()
    }

    pub(crate) fn max_rows(&self) -> Option<usize> {
        self.limit
    }

    // Field names end up inside SurrealQL text, so only plain identifiers pass.
    fn validate(&self) -> Result<(), StoreError> {
        let fields = self
            .filters
            .iter()
            .map(|(f, _)| f)
            .chain(self.order.iter().map(|(f, _)| f));
        for field in fields {
            let ok = !field.is_empty()
                && field
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
            if !ok {
                return Err(StoreError::InvalidField(field.clone()));
            }
        }
        Ok(())
    }
}

#[derive(Clone)]
pub enum Store {
    Surreal(SurrealStore),
    Memory(MemoryStore),
}

impl Store {
    pub async fn connect(cfg: &Config) -> anyhow::Result<Self> {
        if cfg.uses_memory_store() {
            tracing::warn!("using the in-memory store; nothing will be persisted");
            return Ok(Store::Memory(MemoryStore::new()));
        }
        Ok(Store::Surreal(SurrealStore::connect(cfg).await?))
    }

    pub fn memory() -> Self {
        Store::Memory(MemoryStore::new())
    }

    pub async fn list<T: Record>(&self, query: &Query) -> Result<Vec<T>, StoreError> {
        query.validate()?;
        match self {
            Store::Surreal(db) => db.list(T::TABLE, query).await,
            Store::Memory(mem) => mem
                .list(T::TABLE, query)?
                .into_iter()
                .map(|row| serde_json::from_value(row).map_err(StoreError::from))
                .collect(),
        }
    }

    pub async fn all<T: Record>(&self) -> Result<Vec<T>, StoreError> {
        self.list(&Query::new()).await
    }

    pub async fn get<T: Record>(&self, id: &str) -> Result<Option<T>, StoreError> {
        match self {
            Store::Surreal(db) => db.get(T::TABLE, id).await,
            Store::Memory(mem) => mem
                .get(T::TABLE, id)?
                .map(serde_json::from_value)
                .transpose()
                .map_err(StoreError::from),
        }
    }

    pub async fn insert<T: Record>(&self, record: &T) -> Result<(), StoreError> {
        let row = into_object(serde_json::to_value(record)?)?;
        match self {
            Store::Surreal(db) => db.insert(T::TABLE, record.id(), row).await,
            Store::Memory(mem) => mem.insert(T::TABLE, record.id(), row),
        }
    }

    /// Shallow-merges `patch` into the row. Returns `None` when the row
    /// does not exist; nothing is created in that case.
    pub async fn update<T: Record>(&self, id: &str, patch: Value) -> Result<Option<T>, StoreError> {
        let mut patch = into_object(patch)?;
        patch.remove("id");
        if patch.is_empty() {
            return self.get(id).await;
        }
        match self {
            Store::Surreal(db) => db.update(T::TABLE, id, patch).await,
            Store::Memory(mem) => mem
                .update(T::TABLE, id, patch)?
                .map(serde_json::from_value)
                .transpose()
                .map_err(StoreError::from),
        }
    }

    pub async fn delete<T: Record>(&self, id: &str) -> Result<(), StoreError> {
        match self {
            Store::Surreal(db) => db.delete(T::TABLE, id).await,
            Store::Memory(mem) => mem.delete(T::TABLE, id),
        }
    }

    pub async fn count(&self, table: Table) -> Result<usize, StoreError> {
        match self {
            Store::Surreal(db) => db.count(table).await,
            Store::Memory(mem) => mem.count(table),
        }
    }

    pub async fn healthcheck(&self) -> Result<bool, StoreError> {
        match self {
            Store::Surreal(db) => db.healthcheck().await,
            Store::Memory(mem) => mem.healthcheck(),
        }
    }
}

fn into_object(value: Value) -> Result<Map<String, Value>, StoreError> {
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(StoreError::NotAnObject),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_rejects_field_names_that_are_not_identifiers() {
        assert!(Query::new().eq("community_id", "x").validate().is_ok());
        assert!(matches!(
            Query::new().eq("id; DELETE members", "x").validate(),
            Err(StoreError::InvalidField(_))
        ));
        assert!(matches!(
            Query::new().order_by("Created", Direction::Asc).validate(),
            Err(StoreError::InvalidField(_))
        ));
    }
}
