use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::birthdays::upcoming_birthdays;
use super::dashboard::{contributors_of, members_of};
use super::models::{
    ActiveEvent, ActiveEventStatus, Community, CommunityStatus, Contributor, Event, EventStatus,
    MemberStatus, NewEvent, PaymentStatus, Status,
};
use super::progress::ContributionSummary;
use super::sync::{SyncReport, sync_event};
use crate::error::{AppError, Result};
use crate::store::{Query, Store};

pub async fn create_event(store: &Store, new_event: &NewEvent, now: DateTime<Utc>) -> Result<Event> {
    if new_event.child_name.trim().is_empty() {
        return Err(AppError::Validation("child_name: required".into()));
    }
    let community: Option<Community> = store.get(&new_event.community_id).await?;
    if community.is_none() {
        return Err(AppError::not_found("community", &new_event.community_id));
    }

    let event = Event {
        id: Uuid::new_v4().to_string(),
        community_id: new_event.community_id.clone(),
        member_id: new_event.member_id.clone(),
        child_name: new_event.child_name.trim().to_string(),
        event_date: new_event.event_date,
        event_type: new_event.event_type.clone(),
        description: new_event.description.clone(),
        status: EventStatus::Pending,
        created_at: now,
    };
    store.insert(&event).await?;
    Ok(event)
}

#[derive(Debug, Clone, Serialize)]
pub struct ActivatedEvent {
    pub active_event: ActiveEvent,
    pub sync: SyncReport,
}

/// Opens a collection for `event_id`. Without an explicit target the
/// community's per-person amount is multiplied by its active members.
/// Activating twice returns the existing collection, re-synced.
pub async fn activate_event(
    store: &Store,
    event_id: &str,
    target_amount: Option<f64>,
    now: DateTime<Utc>,
) -> Result<ActivatedEvent> {
    let event: Event = store
        .get(event_id)
        .await?
        .ok_or_else(|| AppError::not_found("event", event_id))?;
    let community: Community = store
        .get(&event.community_id)
        .await?
        .ok_or_else(|| AppError::not_found("community", &event.community_id))?;
    let members = members_of(store, &community.id).await?;

    let existing: Vec<ActiveEvent> = store.list(&Query::new().eq("event_id", event_id)).await?;
    if let Some(active_event) = existing.into_iter().next() {
        let sync = sync_event(store, &community, &active_event, &members).await?;
        return Ok(ActivatedEvent { active_event, sync });
    }

    let status = event.status.transition(EventStatus::Active)?;

    let target_amount = match target_amount {
        Some(t) if t.is_finite() && t >= 0.0 => t,
        Some(t) => return Err(AppError::Validation(format!("target_amount: invalid value {t}"))),
        None => {
            let active = members.iter().filter(|m| m.status == MemberStatus::Active).count();
            community.contribution_amount * active as f64
        }
    };

    let active_event = ActiveEvent {
        id: Uuid::new_v4().to_string(),
        community_id: community.id.clone(),
        event_id: event.id.clone(),
        child_name: event.child_name.clone(),
        event_date: event.event_date,
        target_amount,
        amount_raised: 0.0,
        status: ActiveEventStatus::Active,
        created_at: now,
    };
    store.insert(&active_event).await?;
    store
        .update::<Event>(&event.id, serde_json::json!({ "status": status }))
        .await?;
    tracing::info!(
        event = %event.id,
        active_event = %active_event.id,
        target = target_amount,
        "event activated"
    );

    let sync = sync_event(store, &community, &active_event, &members).await?;
    Ok(ActivatedEvent { active_event, sync })
}

/// Creates and opens a birthday event for every upcoming birthday in every
/// active community that does not have one yet.
pub async fn activate_upcoming(
    store: &Store,
    today: NaiveDate,
    window_days: i64,
    now: DateTime<Utc>,
) -> Result<Vec<ActivatedEvent>> {
    let communities: Vec<Community> = store.list(&Query::new().eq("status", "active")).await?;
    let mut activated = Vec::new();

    for community in communities.iter().filter(|c| c.status == CommunityStatus::Active) {
        let members = members_of(store, &community.id).await?;
        for upcoming in upcoming_birthdays(&members, today, window_days) {
            let query = Query::new()
                .eq("member_id", upcoming.member_id.as_str())
                .eq("event_date", upcoming.next_birthday.to_string());
            let existing: Vec<Event> = store.list(&query).await?;

            let event = match existing.into_iter().next() {
                Some(event) if event.status != EventStatus::Pending => continue,
                Some(event) => event,
                None => {
                    let new_event = NewEvent {
                        community_id: community.id.clone(),
                        member_id: Some(upcoming.member_id.clone()),
                        child_name: upcoming.child_name.clone(),
                        event_date: upcoming.next_birthday,
                        event_type: "birthday".to_string(),
                        description: Some(format!(
                            "{} cumple {} años",
                            upcoming.child_name, upcoming.turning
                        )),
                    };
                    create_event(store, &new_event, now).await?
                }
            };
            activated.push(activate_event(store, &event.id, None, now).await?);
        }
    }
    Ok(activated)
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaymentInput {
    /// Defaults to the owed amount.
    pub amount: Option<f64>,
    pub method: Option<String>,
    pub reference: Option<String>,
    /// Defaults to now.
    pub date: Option<DateTime<Utc>>,
}

/// Marks a contributor as paid and recomputes the event's raised total.
pub async fn record_payment(
    store: &Store,
    contributor_id: &str,
    payment: &PaymentInput,
    now: DateTime<Utc>,
) -> Result<Contributor> {
    let contributor: Contributor = store
        .get(contributor_id)
        .await?
        .ok_or_else(|| AppError::not_found("contributor", contributor_id))?;
    if contributor.payment_status == PaymentStatus::Paid {
        return Err(AppError::InvalidTransition(format!(
            "contributor {contributor_id} has already paid"
        )));
    }
    let status = contributor.payment_status.transition(PaymentStatus::Paid)?;

    let amount = payment.amount.unwrap_or(contributor.amount);
    if !amount.is_finite() || amount <= 0.0 {
        return Err(AppError::Validation("amount: must be greater than zero".into()));
    }

    let patch = serde_json::json!({
        "payment_status": status,
        "paid_amount": amount,
        "payment_method": payment.method,
        "payment_reference": payment.reference,
        "payment_date": payment.date.unwrap_or(now),
    });
    let updated: Contributor = store
        .update(contributor_id, patch)
        .await?
        .ok_or_else(|| AppError::not_found("contributor", contributor_id))?;

    recompute_raised(store, &updated.active_event_id).await?;
    Ok(updated)
}

/// `amount_raised` is always derived from the contributor rows.
pub async fn recompute_raised(store: &Store, active_event_id: &str) -> Result<ContributionSummary> {
    let event: ActiveEvent = store
        .get(active_event_id)
        .await?
        .ok_or_else(|| AppError::not_found("active event", active_event_id))?;
    let contributors = contributors_of(store, active_event_id).await?;
    let summary = ContributionSummary::from_contributors(&contributors, event.target_amount);
    store
        .update::<ActiveEvent>(
            active_event_id,
            serde_json::json!({ "amount_raised": summary.total_raised }),
        )
        .await?;
    Ok(summary)
}
