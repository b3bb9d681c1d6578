//! HTTP surface: the landing shell, the public JSON endpoints and the admin
//! panel API.

mod admin;
mod extract;
mod public;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    http::{Method, header},
    routing::{get, post},
};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::notify::Dispatcher;
use crate::session::SessionKeys;
use crate::store::Store;

pub use extract::{AdminSession, MemberSession};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub cfg: Arc<Config>,
    pub sessions: SessionKeys,
    pub dispatcher: Dispatcher,
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        .route("/", get(public::index))
        .route("/crear", get(public::index))
        .route("/unirse", get(public::index))
        .route("/dashboard", get(public::index))
        .route("/login", get(public::index))
        .route("/hey-jackadmin", get(public::index))
        .route("/health", get(public::health))
        .route("/api/login", post(public::login))
        .route("/api/session", get(public::session))
        .route("/api/communities/validate", post(public::validate_draft))
        .route("/api/communities", post(public::create_community))
        .route("/api/communities/:id/join", post(public::join_community))
        .route("/api/dashboard", get(public::dashboard))
        .nest("/api/admin", admin::routes())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
                .layer(cors),
        )
        .with_state(state)
}

/// Binds `cfg.http_addr` and serves until Ctrl-C.
pub async fn serve(state: AppState) -> anyhow::Result<()> {
    let addr = state.cfg.http_addr.clone();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "http server listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
            }
        })
        .await?;
    Ok(())
}
