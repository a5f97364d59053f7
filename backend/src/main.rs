//! flaketrack server entry-point: configuration, database, HTTP wiring.
#![cfg_attr(not(any(test, doctest)), deny(clippy::unwrap_used))]
#![cfg_attr(not(any(test, doctest)), deny(clippy::expect_used))]

mod server;

use std::net::SocketAddr;

use actix_web::web;
use color_eyre::eyre::{Context, Result};
use ortho_config::OrthoConfig;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use flaketrack::config::AppSettings;
use flaketrack::inbound::http::health::HealthState;
use flaketrack::outbound::persistence::{DbPool, redact_url, run_pending_migrations};
use server::{ServerConfig, create_server};

#[actix_web::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    if let Err(error) = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .try_init()
    {
        warn!(%error, "tracing init failed");
    }

    let settings = AppSettings::load().context("load settings")?;
    let database_url = settings.database_url()?;
    let bind_addr: SocketAddr = settings
        .bind_addr()
        .parse()
        .with_context(|| format!("parse bind_addr `{}`", settings.bind_addr()))?;

    if settings.run_migrations {
        run_pending_migrations(database_url)
            .await
            .context("apply database migrations")?;
    }
    let pool = DbPool::new(settings.pool_config()?)
        .await
        .with_context(|| format!("create database pool for {}", redact_url(database_url)))?;

    let config = ServerConfig::new(bind_addr, settings.public_base_url()?)
        .with_db_pool(pool)
        .with_limits(settings.upload_limits(), settings.max_stored_file_bytes())
        .with_notification_timeout(settings.notification_timeout());

    let health_state = web::Data::new(HealthState::new());
    let server = create_server(health_state.clone(), config).context("start HTTP server")?;
    info!(%bind_addr, "flaketrack listening");

    let result = server.await;
    health_state.mark_unhealthy();
    result.context("HTTP server terminated")
}
