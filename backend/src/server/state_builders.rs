//! Wiring of adapters and domain services into the HTTP state.

use std::io;
use std::sync::Arc;

use actix_web::web;
use mockable::{Clock, DefaultClock};

use flaketrack::domain::{FlakeDetectionService, IngestionCommandService, NotificationDispatcher};
use flaketrack::inbound::http::state::HttpState;
use flaketrack::outbound::notification::WebhookFlakeNotifier;
use flaketrack::outbound::persistence::{
    DbPool, DieselCredentialResolver, DieselFlakeDetectionRepository, DieselIngestionRepository,
    DieselProjectDirectory,
};

use super::ServerConfig;

fn build_database_state(config: &ServerConfig, pool: &DbPool) -> io::Result<HttpState> {
    let notifier = WebhookFlakeNotifier::new(config.notification_timeout)
        .map_err(|error| io::Error::other(format!("build webhook client: {error}")))?;
    let dispatcher = NotificationDispatcher::new(
        Arc::new(notifier),
        config.notification_timeout,
        config.public_base_url.clone(),
    );
    let clock: Arc<dyn Clock> = Arc::new(DefaultClock);

    let detector = FlakeDetectionService::new(
        Arc::new(DieselFlakeDetectionRepository::new(pool.clone())),
        dispatcher,
        Arc::clone(&clock),
    );
    let ingestion = IngestionCommandService::new(
        Arc::new(DieselIngestionRepository::new(pool.clone())),
        Arc::new(DieselProjectDirectory::new(pool.clone())),
        Arc::new(detector),
        clock,
    )
    .with_limits(config.limits)
    .with_max_stored_file_bytes(config.max_stored_file_bytes);

    Ok(HttpState::new(
        Arc::new(ingestion),
        Arc::new(DieselCredentialResolver::new(pool.clone())),
    ))
}

/// Build handler state from the configured pool, or fixtures without one.
///
/// # Errors
///
/// Returns [`io::Error`] when the webhook client cannot be built.
pub(super) fn build_http_state(config: &ServerConfig) -> io::Result<web::Data<HttpState>> {
    let state = match &config.db_pool {
        Some(pool) => build_database_state(config, pool)?,
        None => HttpState::default(),
    };
    Ok(web::Data::new(state.with_limits(config.limits)))
}
