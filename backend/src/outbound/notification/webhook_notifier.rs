//! Reqwest-backed webhook notifier.
//!
//! Posts the notification payload as JSON to the project's destination. The
//! adapter owns transport details only: client timeout, status mapping and
//! response previews for logs.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use url::Url;

use crate::domain::ports::{FlakeNotificationPayload, FlakeNotifier, FlakeNotifierError};

const DEFAULT_USER_AGENT: &str = concat!("flaketrack/", env!("CARGO_PKG_VERSION"));

/// Notifier that POSTs JSON to webhook URLs.
#[derive(Clone)]
pub struct WebhookFlakeNotifier {
    client: Client,
}

impl WebhookFlakeNotifier {
    /// Build a notifier whose requests give up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error when the reqwest client cannot be constructed.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(DEFAULT_USER_AGENT)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl FlakeNotifier for WebhookFlakeNotifier {
    async fn send(
        &self,
        destination: &Url,
        payload: &FlakeNotificationPayload,
    ) -> Result<(), FlakeNotifierError> {
        let response = self
            .client
            .post(destination.clone())
            .json(payload)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.bytes().await.unwrap_or_default();
        Err(map_status_error(status, &body))
    }
}

fn map_transport_error(error: reqwest::Error) -> FlakeNotifierError {
    if error.is_timeout() {
        FlakeNotifierError::timeout(error.to_string())
    } else {
        FlakeNotifierError::transport(error.to_string())
    }
}

fn map_status_error(status: StatusCode, body: &[u8]) -> FlakeNotifierError {
    match status {
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
            FlakeNotifierError::timeout(format!("status {}", status.as_u16()))
        }
        _ => FlakeNotifierError::status(status.as_u16(), body_preview(body)),
    }
}

fn body_preview(body: &[u8]) -> String {
    const PREVIEW_CHAR_LIMIT: usize = 160;

    let compact = String::from_utf8_lossy(body)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    let mut preview: String = compact.chars().take(PREVIEW_CHAR_LIMIT).collect();
    if compact.chars().count() > PREVIEW_CHAR_LIMIT {
        preview.push_str("...");
    }
    preview
}
