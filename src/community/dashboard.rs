use chrono::NaiveDate;
use serde::Serialize;

use super::birthdays::{UpcomingBirthday, upcoming_birthdays};
use super::models::{ActiveEvent, Community, CommunityStatus, Contributor, Member, PaymentStatus};
use super::progress::ContributionSummary;
use crate::error::{AppError, Result};
use crate::store::{Direction, Query, Store, Table};

#[derive(Debug, Clone, Serialize)]
pub struct EventProgress {
    pub active_event: ActiveEvent,
    pub contributor_count: usize,
    pub summary: ContributionSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardView {
    pub community: Community,
    pub member_count: usize,
    pub upcoming_birthdays: Vec<UpcomingBirthday>,
    pub events: Vec<EventProgress>,
}

pub async fn members_of(store: &Store, community_id: &str) -> Result<Vec<Member>> {
    let query = Query::new()
        .eq("community_id", community_id)
        .order_by("child_name", Direction::Asc);
    Ok(store.list(&query).await?)
}

pub async fn active_events_of(store: &Store, community_id: &str) -> Result<Vec<ActiveEvent>> {
    let query = Query::new()
        .eq("community_id", community_id)
        .order_by("event_date", Direction::Asc);
    Ok(store.list(&query).await?)
}

pub async fn contributors_of(store: &Store, active_event_id: &str) -> Result<Vec<Contributor>> {
    let query = Query::new()
        .eq("active_event_id", active_event_id)
        .order_by("parent_name", Direction::Asc);
    Ok(store.list(&query).await?)
}

/// Community row, members, open events, then contributors per event; in that order.
pub async fn load_dashboard(
    store: &Store,
    community_id: &str,
    today: NaiveDate,
    window_days: i64,
) -> Result<DashboardView> {
    let community: Community = store
        .get(community_id)
        .await?
        .ok_or_else(|| AppError::not_found("community", community_id))?;

    let members = members_of(store, community_id).await?;
    let upcoming = upcoming_birthdays(&members, today, window_days);

    let mut events = Vec::new();
    for active_event in active_events_of(store, community_id).await? {
        if !active_event.status.is_open() {
            continue;
        }
        let contributors = contributors_of(store, &active_event.id).await?;
        let summary = ContributionSummary::from_contributors(&contributors, active_event.target_amount);
        events.push(EventProgress {
            contributor_count: contributors.len(),
            summary,
            active_event,
        });
    }

    Ok(DashboardView {
        community,
        member_count: members.len(),
        upcoming_birthdays: upcoming,
        events,
    })
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct AdminStats {
    pub communities: usize,
    pub active_communities: usize,
    pub members: usize,
    pub events: usize,
    pub open_active_events: usize,
    pub contributors: usize,
    pub total_raised: f64,
    pub total_pending: f64,
    pub emails_sent: usize,
    pub whatsapps_sent: usize,
}

/// Figures for the admin dashboard tab.
pub async fn admin_stats(store: &Store) -> Result<AdminStats> {
    let communities: Vec<Community> = store.all().await?;
    let active_events: Vec<ActiveEvent> = store.all().await?;
    let contributors: Vec<Contributor> = store.all().await?;

    let mut stats = AdminStats {
        communities: communities.len(),
        active_communities: communities
            .iter()
            .filter(|c| c.status == CommunityStatus::Active)
            .count(),
        members: store.count(Table::Members).await?,
        events: store.count(Table::Events).await?,
        open_active_events: active_events.iter().filter(|e| e.status.is_open()).count(),
        contributors: contributors.len(),
        ..AdminStats::default()
    };
    for c in &contributors {
        match c.payment_status {
            PaymentStatus::Paid => stats.total_raised += c.settled_amount(),
            PaymentStatus::Pending => stats.total_pending += c.amount,
        }
        stats.emails_sent += usize::from(c.email_notified);
        stats.whatsapps_sent += usize::from(c.whatsapp_notified);
    }
    Ok(stats)
}
