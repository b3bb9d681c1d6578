use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use surrealdb::{
    Surreal,
    engine::remote::ws::{Client, Ws},
    opt::auth::Root,
};

use super::{Direction, Query, StoreError, Table};
use crate::config::Config;

// Rows come back with their record key as a plain string `id`.
const SELECT_ROWS: &str = "SELECT *, meta::id(id) AS id FROM";

#[derive(Clone)]
pub struct SurrealStore {
    db: Surreal<Client>,
}

impl SurrealStore {
    pub async fn connect(cfg: &Config) -> anyhow::Result<Self> {
        // Surreal expects host:port without scheme for Ws; strip ws:// or wss:// if present.
        let addr = cfg
            .db_url
            .trim_start_matches("ws://")
            .trim_start_matches("wss://")
            .to_string();

        let db = Surreal::new::<Ws>(&addr).await?;
        db.signin(Root {
            username: &cfg.db_user,
            password: &cfg.db_pass,
        })
        .await?;
        db.use_ns(&cfg.db_namespace).use_db(&cfg.db_name).await?;
        tracing::info!(addr = %addr, ns = %cfg.db_namespace, db = %cfg.db_name, "connected to SurrealDB");
        Ok(Self { db })
    }

    pub(crate) async fn list<T: DeserializeOwned>(
        &self,
        table: Table,
        query: &Query,
    ) -> Result<Vec<T>, StoreError> {
        let mut params = Map::new();
        params.insert("tb".into(), Value::from(table.as_str()));

        let mut sql = format!("{SELECT_ROWS} type::table($tb)");
        let clauses: Vec<String> = query
            .filters()
            .iter()
            .enumerate()
            .map(|(i, (field, value))| {
                params.insert(format!("p{i}"), value.clone());
                format!("{field} = $p{i}")
            })
            .collect();
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        if let Some((field, direction)) = query.order() {
            let keyword = match direction {
                Direction::Asc => "ASC",
                Direction::Desc => "DESC",
            };
            sql.push_str(&format!(" ORDER BY {field} {keyword}"));
        }
        if let Some(limit) = query.max_rows() {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        tracing::trace!(%sql, "surreal select");
        let mut res = self.db.query(sql).bind(params).await?;
        Ok(res.take(0)?)
    }

    pub(crate) async fn get<T: DeserializeOwned>(
        &self,
        table: Table,
        id: &str,
    ) -> Result<Option<T>, StoreError> {
        let mut res = self
            .db
            .query(format!("{SELECT_ROWS} type::thing($tb, $id)"))
            .bind(("tb", table.as_str()))
            .bind(("id", id.to_string()))
            .await?;
        let rows: Vec<T> = res.take(0)?;
        Ok(rows.into_iter().next())
    }

    pub(crate) async fn insert(
        &self,
        table: Table,
        id: &str,
        mut row: Map<String, Value>,
    ) -> Result<(), StoreError> {
        // The key lives in the record id; a second `id` field would be rejected.
        row.remove("id");
        let res = self
            .db
            .query("CREATE type::thing($tb, $id) CONTENT $data RETURN NONE")
            .bind(("tb", table.as_str()))
            .bind(("id", id.to_string()))
            .bind(("data", Value::Object(row)))
            .await?;
        res.check().map_err(|e| {
            if is_record_exists(&e) {
                StoreError::Conflict(format!("{}:{id}", table.as_str()))
            } else {
                StoreError::Surreal(e)
            }
        })?;
        Ok(())
    }

    pub(crate) async fn update<T: DeserializeOwned>(
        &self,
        table: Table,
        id: &str,
        patch: Map<String, Value>,
    ) -> Result<Option<T>, StoreError> {
        // UPDATE only touches existing records, so a missing id stays missing.
        self.db
            .query("UPDATE type::thing($tb, $id) MERGE $patch RETURN NONE")
            .bind(("tb", table.as_str()))
            .bind(("id", id.to_string()))
            .bind(("patch", Value::Object(patch)))
            .await?
            .check()?;
        self.get(table, id).await
    }

    pub(crate) async fn delete(&self, table: Table, id: &str) -> Result<(), StoreError> {
        self.db
            .query("DELETE type::thing($tb, $id)")
            .bind(("tb", table.as_str()))
            .bind(("id", id.to_string()))
            .await?
            .check()?;
        Ok(())
    }

    pub(crate) async fn count(&self, table: Table) -> Result<usize, StoreError> {
        let mut res = self
            .db
            .query("SELECT count() FROM type::table($tb) GROUP ALL")
            .bind(("tb", table.as_str()))
            .await?;
        let count: Option<i64> = res.take((0, "count"))?;
        Ok(count.unwrap_or(0).max(0) as usize)
    }

    pub(crate) async fn healthcheck(&self) -> Result<bool, StoreError> {
        // simple ping via info query
        let mut res = self.db.query("RETURN 1;").await?;
        let val: Option<i32> = res.take(0)?;
        Ok(val == Some(1))
    }
}

/// Embedded engines report a clash as `Db::RecordExists`; over WebSocket the
/// same failure arrives as `Api::Query` carrying the server's message.
fn is_record_exists(err: &surrealdb::Error) -> bool {
    match err {
        surrealdb::Error::Db(surrealdb::error::Db::RecordExists { .. }) => true,
        surrealdb::Error::Api(surrealdb::error::Api::Query(message)) => {
            message.contains("already exists") && message.contains("record")
        }
        _ => false,
    }
}
