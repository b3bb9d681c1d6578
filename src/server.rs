use crate::community::birthdays::upcoming_birthdays;
use crate::community::dashboard::{load_dashboard, members_of};
use crate::community::models::{Community, CommunityStatus};
use crate::community::sync::diagnose;
use crate::config::Config;
use crate::store::{Store, Table};
use anyhow::{Context, Result};
use chrono::Utc;
use rmcp::model::{CallToolRequestParam, CallToolResult};

#[derive(Clone)]
pub struct HeyJackServer {
    pub store: Store,
    pub cfg: Config,
}

fn string_arg(req: &CallToolRequestParam, key: &str) -> Option<String> {
    req.arguments
        .as_ref()
        .and_then(|args| args.get(key))
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

fn int_arg(req: &CallToolRequestParam, key: &str) -> Option<i64> {
    req.arguments
        .as_ref()
        .and_then(|args| args.get(key))
        .and_then(|v| v.as_i64())
}

impl HeyJackServer {
    pub async fn new(cfg: Config) -> Result<Self> {
        let store = Store::connect(&cfg).await?;
        Ok(Self { store, cfg })
    }

    /// Store connectivity plus the config surface.
    pub async fn handle_health(&self, _req: CallToolRequestParam) -> Result<CallToolResult> {
        let store_ok = self.store.healthcheck().await.unwrap_or(false);
        let body = serde_json::json!({
            "store": store_ok,
            "namespace": self.cfg.db_namespace,
            "database": self.cfg.db_name,
        });
        Ok(CallToolResult::structured(body))
    }

    /// Row counts per table (best effort, errors become 0).
    pub async fn handle_status(&self, _req: CallToolRequestParam) -> Result<CallToolResult> {
        let mut counts = serde_json::Map::new();
        for table in Table::ALL {
            let count = self.store.count(table).await.unwrap_or(0);
            counts.insert(table.as_str().to_string(), serde_json::json!(count));
        }
        Ok(CallToolResult::structured(serde_json::Value::Object(counts)))
    }

    pub async fn handle_dashboard(&self, req: CallToolRequestParam) -> Result<CallToolResult> {
        let community_id = string_arg(&req, "community_id").context("community_id is required")?;
        let view = load_dashboard(
            &self.store,
            &community_id,
            Utc::now().date_naive(),
            self.cfg.birthday_window_days,
        )
        .await?;
        Ok(CallToolResult::structured(serde_json::to_value(view)?))
    }

    /// Upcoming birthdays for one community, or for every active one.
    pub async fn handle_upcoming(&self, req: CallToolRequestParam) -> Result<CallToolResult> {
        let days = int_arg(&req, "days").unwrap_or(self.cfg.birthday_window_days);
        let communities: Vec<Community> = match string_arg(&req, "community_id") {
            Some(id) => self.store.get(&id).await?.into_iter().collect(),
            None => self.store.all().await?,
        };

        let today = Utc::now().date_naive();
        let mut out = serde_json::Map::new();
        for community in communities
            .iter()
            .filter(|c| c.status == CommunityStatus::Active)
        {
            let members = members_of(&self.store, &community.id).await?;
            let upcoming = upcoming_birthdays(&members, today, days);
            out.insert(community.id.clone(), serde_json::to_value(upcoming)?);
        }
        Ok(CallToolResult::structured(serde_json::Value::Object(out)))
    }

    pub async fn handle_diagnose(&self, _req: CallToolRequestParam) -> Result<CallToolResult> {
        let report = diagnose(&self.store).await?;
        Ok(CallToolResult::structured(serde_json::json!({
            "clean": report.is_clean(),
            "report": report,
        })))
    }
}
