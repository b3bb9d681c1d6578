//! Admin edits. Status changes are checked against the current row before
//! anything is written.

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::birthdays::parse_birthdate;
use super::models::{
    ActiveEvent, Community, CommunityUpdate, Contributor, Event, EventUpdate, Member, MemberUpdate,
    Status,
};
use super::onboarding::is_valid_email;
use super::sync::sync_contributors;
use crate::config::normalize_email;
use crate::error::{AppError, Result};
use crate::store::{Record, Store};

async fn require<T: Record>(store: &Store, what: &str, id: &str) -> Result<T> {
    store
        .get(id)
        .await?
        .ok_or_else(|| AppError::not_found(what, id))
}

fn patch_of<T: serde::Serialize>(update: &T) -> Result<serde_json::Map<String, Value>> {
    match serde_json::to_value(update).map_err(crate::store::StoreError::from)? {
        Value::Object(map) => Ok(map),
        _ => Err(AppError::Validation("update must be an object".into())),
    }
}

pub async fn update_community(
    store: &Store,
    id: &str,
    mut update: CommunityUpdate,
    now: DateTime<Utc>,
) -> Result<Community> {
    let current: Community = require(store, "community", id).await?;
    if let Some(next) = update.status {
        current.status.transition(next)?;
    }
    if let Some(email) = update.creator_email.as_deref() {
        if !is_valid_email(email) {
            return Err(AppError::Validation("creator_email: invalid email".into()));
        }
        update.creator_email = Some(normalize_email(email));
    }
    if let Some(amount) = update.contribution_amount {
        if !amount.is_finite() || amount <= 0.0 {
            return Err(AppError::Validation(
                "contribution_amount: must be greater than zero".into(),
            ));
        }
    }

    let mut patch = patch_of(&update)?;
    patch.insert("updated_at".into(), serde_json::to_value(now).map_err(crate::store::StoreError::from)?);
    store
        .update(id, Value::Object(patch))
        .await?
        .ok_or_else(|| AppError::not_found("community", id))
}

/// Contact changes are pushed to the member's contributor rows right away.
pub async fn update_member(store: &Store, id: &str, mut update: MemberUpdate) -> Result<Member> {
    let current: Member = require(store, "member", id).await?;
    if let Some(next) = update.status {
        current.status.transition(next)?;
    }
    // A blank email clears the field.
    let mut clear_email = false;
    if let Some(email) = update.parent_email.take() {
        if email.trim().is_empty() {
            clear_email = true;
        } else if !is_valid_email(&email) {
            return Err(AppError::Validation("parent_email: invalid email".into()));
        } else {
            update.parent_email = Some(normalize_email(&email));
        }
    }
    if let Some(birthdate) = update.child_birthdate.as_deref() {
        if parse_birthdate(birthdate).is_none() {
            return Err(AppError::Validation(
                "child_birthdate: use YYYY-MM-DD or DD/MM/YYYY".into(),
            ));
        }
    }

    let mut patch = patch_of(&update)?;
    if clear_email {
        patch.insert("parent_email".into(), Value::Null);
    }
    let updated: Member = store
        .update(id, Value::Object(patch))
        .await?
        .ok_or_else(|| AppError::not_found("member", id))?;
    sync_contributors(store, Some(&updated.community_id)).await?;
    Ok(updated)
}

pub async fn update_event(store: &Store, id: &str, update: EventUpdate) -> Result<Event> {
    let current: Event = require(store, "event", id).await?;
    if let Some(next) = update.status {
        current.status.transition(next)?;
    }
    if let Some(name) = update.child_name.as_deref() {
        if name.trim().is_empty() {
            return Err(AppError::Validation("child_name: required".into()));
        }
    }
    store
        .update(id, Value::Object(patch_of(&update)?))
        .await?
        .ok_or_else(|| AppError::not_found("event", id))
}

// Deletes do not cascade; dependent rows are left for `diagnose` to report.

pub async fn delete_community(store: &Store, id: &str) -> Result<()> {
    require::<Community>(store, "community", id).await?;
    store.delete::<Community>(id).await?;
    tracing::info!(community = %id, "community deleted");
    Ok(())
}

pub async fn delete_member(store: &Store, id: &str) -> Result<()> {
    require::<Member>(store, "member", id).await?;
    store.delete::<Member>(id).await?;
    tracing::info!(member = %id, "member deleted");
    Ok(())
}

pub async fn delete_event(store: &Store, id: &str) -> Result<()> {
    require::<Event>(store, "event", id).await?;
    store.delete::<Event>(id).await?;
    tracing::info!(event = %id, "event deleted");
    Ok(())
}

pub async fn get_community(store: &Store, id: &str) -> Result<Community> {
    require(store, "community", id).await
}

pub async fn get_active_event(store: &Store, id: &str) -> Result<ActiveEvent> {
    require(store, "active event", id).await
}

pub async fn get_contributor(store: &Store, id: &str) -> Result<Contributor> {
    require(store, "contributor", id).await
}
