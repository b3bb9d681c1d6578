use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::{AppState, MemberSession};
use crate::community::dashboard::{DashboardView, load_dashboard};
use crate::community::models::{Member, NewMember};
use crate::community::onboarding::{self, CommunityDraft, CreatedCommunity, FieldError, WizardStep};
use crate::error::{AppError, Result};
use crate::session::{self, Role, Session};

const INDEX_HTML: &str = include_str!("../../static/index.html");

pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let store_ok = match state.store.healthcheck().await {
        Ok(ok) => ok,
        Err(e) => {
            tracing::warn!(error = %e, "store healthcheck failed");
            false
        }
    };
    let status = if store_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(serde_json::json!({
            "status": if store_ok { "ok" } else { "degraded" },
            "store": store_ok,
        })),
    )
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<Session>> {
    let session = session::login(&state.store, &state.cfg, &state.sessions, &req.email, Utc::now()).await?;
    Ok(Json(session))
}

#[derive(Debug, Serialize)]
pub struct SessionInfo {
    pub email: String,
    pub community_id: Option<String>,
    pub role: Role,
    pub expires_at: Option<chrono::DateTime<Utc>>,
}

pub async fn session(MemberSession(claims): MemberSession) -> Json<SessionInfo> {
    Json(SessionInfo {
        expires_at: claims.expires_at(),
        email: claims.sub,
        community_id: claims.community_id,
        role: claims.role,
    })
}

#[derive(Debug, Deserialize)]
pub struct ValidateRequest {
    /// Validates every step when absent.
    pub step: Option<WizardStep>,
    pub draft: CommunityDraft,
}

#[derive(Debug, Serialize)]
pub struct ValidateResponse {
    pub valid: bool,
    pub errors: Vec<FieldError>,
}

pub async fn validate_draft(Json(req): Json<ValidateRequest>) -> Json<ValidateResponse> {
    let errors = match req.step {
        Some(step) => req.draft.validate_step(step),
        None => req.draft.validate(),
    };
    Json(ValidateResponse {
        valid: errors.is_empty(),
        errors,
    })
}

pub async fn create_community(
    State(state): State<AppState>,
    Json(draft): Json<CommunityDraft>,
) -> Result<(StatusCode, Json<CreatedCommunity>)> {
    let created = onboarding::create_community(&state.store, &draft, Utc::now()).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn join_community(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(new_member): Json<NewMember>,
) -> Result<(StatusCode, Json<Member>)> {
    let member = onboarding::join_community(&state.store, &id, &new_member, Utc::now()).await?;
    Ok((StatusCode::CREATED, Json(member)))
}

#[derive(Debug, Deserialize)]
pub struct DashboardParams {
    /// Admins may open any community's dashboard.
    pub community: Option<String>,
}

pub async fn dashboard(
    State(state): State<AppState>,
    MemberSession(claims): MemberSession,
    Query(params): Query<DashboardParams>,
) -> Result<Json<DashboardView>> {
    let community_id = match (claims.role, params.community) {
        (Role::Admin, Some(id)) => id,
        _ => claims
            .community_id
            .ok_or_else(|| AppError::NotFound("no community linked to this session".into()))?,
    };
    let today = Utc::now().date_naive();
    let view = load_dashboard(&state.store, &community_id, today, state.cfg.birthday_window_days).await?;
    Ok(Json(view))
}
