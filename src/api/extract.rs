use axum::extract::FromRequestParts;
use axum::http::{header, request::Parts};

use super::AppState;
use crate::error::AppError;
use crate::session::{Claims, Role};

fn bearer_token(parts: &Parts) -> Result<&str, AppError> {
    let value = parts
        .headers
        .get(header::AUTHORIZATION)
        .ok_or_else(|| AppError::Unauthorized("missing Authorization header".into()))?;
    value
        .to_str()
        .ok()
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::Unauthorized("expected a bearer token".into()))
}

/// Any verified session, member or admin.
pub struct MemberSession(pub Claims);

#[axum::async_trait]
impl FromRequestParts<AppState> for MemberSession {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?;
        let claims = state.sessions.verify(token, &state.cfg)?;
        Ok(MemberSession(claims))
    }
}

pub struct AdminSession(pub Claims);

#[axum::async_trait]
impl FromRequestParts<AppState> for AdminSession {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?;
        let claims = state.sessions.verify(token, &state.cfg)?;
        if claims.role != Role::Admin {
            return Err(AppError::Forbidden("admin session required".into()));
        }
        Ok(AdminSession(claims))
    }
}
