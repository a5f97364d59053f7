//! HTTP inbound adapter: the upload endpoint and health probes.

pub mod auth;
pub mod error;
pub mod health;
pub mod ingestions;
pub mod state;

pub use error::ApiResult;

use actix_web::web;

/// Register the versioned API routes.
///
/// # Examples
/// ```
/// use actix_web::{App, web};
/// use flaketrack::inbound::http::{configure_api, state::HttpState};
///
/// let _app = App::new()
///     .app_data(web::Data::new(HttpState::default()))
///     .configure(configure_api);
/// ```
pub fn configure_api(cfg: &mut web::ServiceConfig) {
    cfg.service(web::scope("/api/v1").service(ingestions::create_ingestion));
}
