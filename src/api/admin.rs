//! Admin panel API. Every route except `/login` needs an admin session.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, patch, post},
};
use chrono::Utc;
use serde::Deserialize;

use super::{AdminSession, AppState};
use crate::community::dashboard::{
    AdminStats, active_events_of, admin_stats, contributors_of, members_of,
};
use crate::community::events::{self, ActivatedEvent, PaymentInput};
use crate::community::import::{ImportReport, import_members_csv};
use crate::community::manage;
use crate::community::models::{
    ActiveEvent, Community, CommunityUpdate, Contributor, Event, EventUpdate, Member, MemberUpdate,
    NewEvent, NewMember,
};
use crate::community::onboarding;
use crate::community::sync::{
    DiagnosticReport, LinkReport, SyncReport, diagnose, repair_member_links, sync_contributors,
};
use crate::error::Result;
use crate::notify::{DispatchReport, WhatsAppLink};
use crate::session::{self, Session};
use crate::store::{Direction, Query};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/login", post(login))
        .route("/stats", get(stats))
        .route("/communities", get(list_communities))
        .route(
            "/communities/:id",
            get(get_community).patch(update_community).delete(delete_community),
        )
        .route(
            "/communities/:id/members",
            get(list_members).post(create_member),
        )
        .route("/communities/:id/members/import", post(import_members))
        .route("/communities/:id/events", get(list_events))
        .route("/communities/:id/active-events", get(list_active_events))
        .route("/members/:id", patch(update_member).delete(delete_member))
        .route("/events", post(create_event))
        .route("/events/activate-upcoming", post(activate_upcoming))
        .route("/events/:id", patch(update_event).delete(delete_event))
        .route("/events/:id/activate", post(activate_event))
        .route("/active-events/:id/contributors", get(list_contributors))
        .route("/active-events/:id/notify/email", post(notify_email))
        .route("/active-events/:id/notify/whatsapp", post(notify_whatsapp))
        .route("/contributors/:id/payment", post(record_payment))
        .route("/sync/contributors", post(sync))
        .route("/sync/member-links", post(repair_links))
        .route("/sync/diagnostics", get(diagnostics))
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    email: String,
    #[serde(default)]
    secret: Option<String>,
}

async fn login(State(state): State<AppState>, Json(req): Json<LoginRequest>) -> Result<Json<Session>> {
    let session = session::admin_login(
        &state.cfg,
        &state.sessions,
        &req.email,
        req.secret.as_deref(),
        Utc::now(),
    )?;
    Ok(Json(session))
}

async fn stats(_admin: AdminSession, State(state): State<AppState>) -> Result<Json<AdminStats>> {
    Ok(Json(admin_stats(&state.store).await?))
}

// Communities

async fn list_communities(
    _admin: AdminSession,
    State(state): State<AppState>,
) -> Result<Json<Vec<Community>>> {
    let query = Query::new().order_by("created_at", Direction::Desc);
    Ok(Json(state.store.list(&query).await?))
}

async fn get_community(
    _admin: AdminSession,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Community>> {
    Ok(Json(manage::get_community(&state.store, &id).await?))
}

async fn update_community(
    _admin: AdminSession,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(update): Json<CommunityUpdate>,
) -> Result<Json<Community>> {
    Ok(Json(manage::update_community(&state.store, &id, update, Utc::now()).await?))
}

async fn delete_community(
    _admin: AdminSession,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    manage::delete_community(&state.store, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// Members

async fn list_members(
    _admin: AdminSession,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Member>>> {
    Ok(Json(members_of(&state.store, &id).await?))
}

async fn create_member(
    _admin: AdminSession,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(new_member): Json<NewMember>,
) -> Result<(StatusCode, Json<Member>)> {
    let member = onboarding::join_community(&state.store, &id, &new_member, Utc::now()).await?;
    Ok((StatusCode::CREATED, Json(member)))
}

/// Body is the roster CSV itself.
async fn import_members(
    _admin: AdminSession,
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: String,
) -> Result<Json<ImportReport>> {
    let report = import_members_csv(&state.store, &id, body.as_bytes(), Utc::now()).await?;
    Ok(Json(report))
}

async fn update_member(
    _admin: AdminSession,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(update): Json<MemberUpdate>,
) -> Result<Json<Member>> {
    Ok(Json(manage::update_member(&state.store, &id, update).await?))
}

async fn delete_member(
    _admin: AdminSession,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    manage::delete_member(&state.store, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// Events

async fn list_events(
    _admin: AdminSession,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Event>>> {
    let query = Query::new()
        .eq("community_id", id.as_str())
        .order_by("event_date", Direction::Asc);
    Ok(Json(state.store.list(&query).await?))
}

async fn create_event(
    _admin: AdminSession,
    State(state): State<AppState>,
    Json(new_event): Json<NewEvent>,
) -> Result<(StatusCode, Json<Event>)> {
    let event = events::create_event(&state.store, &new_event, Utc::now()).await?;
    Ok((StatusCode::CREATED, Json(event)))
}

async fn update_event(
    _admin: AdminSession,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(update): Json<EventUpdate>,
) -> Result<Json<Event>> {
    Ok(Json(manage::update_event(&state.store, &id, update).await?))
}

async fn delete_event(
    _admin: AdminSession,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    manage::delete_event(&state.store, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Default, Deserialize)]
struct ActivateRequest {
    target_amount: Option<f64>,
}

async fn activate_event(
    _admin: AdminSession,
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Option<Json<ActivateRequest>>,
) -> Result<Json<ActivatedEvent>> {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let activated = events::activate_event(&state.store, &id, req.target_amount, Utc::now()).await?;
    Ok(Json(activated))
}

async fn activate_upcoming(
    _admin: AdminSession,
    State(state): State<AppState>,
) -> Result<Json<Vec<ActivatedEvent>>> {
    let now = Utc::now();
    let activated = events::activate_upcoming(
        &state.store,
        now.date_naive(),
        state.cfg.birthday_window_days,
        now,
    )
    .await?;
    Ok(Json(activated))
}

// Active events

async fn list_active_events(
    _admin: AdminSession,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<ActiveEvent>>> {
    Ok(Json(active_events_of(&state.store, &id).await?))
}

async fn list_contributors(
    _admin: AdminSession,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Contributor>>> {
    manage::get_active_event(&state.store, &id).await?;
    Ok(Json(contributors_of(&state.store, &id).await?))
}

async fn record_payment(
    _admin: AdminSession,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payment): Json<PaymentInput>,
) -> Result<Json<Contributor>> {
    Ok(Json(events::record_payment(&state.store, &id, &payment, Utc::now()).await?))
}

// Notifications

#[derive(Debug, Deserialize)]
struct EmailRequest {
    #[serde(default)]
    contributor_ids: Vec<String>,
    #[serde(default)]
    force: bool,
}

async fn notify_email(
    _admin: AdminSession,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<EmailRequest>,
) -> Result<Json<DispatchReport>> {
    let report = state
        .dispatcher
        .send_email_reminders(&id, &req.contributor_ids, req.force, Utc::now())
        .await?;
    Ok(Json(report))
}

#[derive(Debug, Deserialize)]
struct WhatsAppRequest {
    #[serde(default)]
    contributor_ids: Vec<String>,
    #[serde(default = "default_mark")]
    mark: bool,
}

fn default_mark() -> bool {
    true
}

async fn notify_whatsapp(
    _admin: AdminSession,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<WhatsAppRequest>,
) -> Result<Json<Vec<WhatsAppLink>>> {
    let links = state
        .dispatcher
        .whatsapp_links(&id, &req.contributor_ids, req.mark, Utc::now())
        .await?;
    Ok(Json(links))
}

// Sync tools

#[derive(Debug, Default, Deserialize)]
struct SyncRequest {
    community_id: Option<String>,
}

async fn sync(
    _admin: AdminSession,
    State(state): State<AppState>,
    body: Option<Json<SyncRequest>>,
) -> Result<Json<SyncReport>> {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    Ok(Json(sync_contributors(&state.store, req.community_id.as_deref()).await?))
}

async fn repair_links(_admin: AdminSession, State(state): State<AppState>) -> Result<Json<LinkReport>> {
    let report = repair_member_links(&state.store, state.cfg.name_match_threshold).await?;
    Ok(Json(report))
}

async fn diagnostics(
    _admin: AdminSession,
    State(state): State<AppState>,
) -> Result<Json<DiagnosticReport>> {
    Ok(Json(diagnose(&state.store).await?))
}
