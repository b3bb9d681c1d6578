use anyhow::Context;
use hey_jack::{config::Config, router::Router, server::HeyJackServer};
use rmcp::{ServiceExt, transport::stdio};
use tracing_subscriber::EnvFilter;

/// stdout carries the protocol, so every log line goes to stderr.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("hey_jack=warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let cfg = Config::load()?;
    let server = HeyJackServer::new(cfg)
        .await
        .context("cannot reach the data store")?;
    match server.store.healthcheck().await {
        Ok(true) => tracing::info!(ns = %server.cfg.db_namespace, db = %server.cfg.db_name, "tool server ready"),
        Ok(false) | Err(_) => tracing::warn!("store health check failed; tools will report errors"),
    }

    let running = Router(server).serve(stdio()).await?;
    let reason = running.waiting().await?;
    tracing::info!(?reason, "tool server stopped");
    Ok(())
}
