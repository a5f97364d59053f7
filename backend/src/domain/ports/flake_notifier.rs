//! Driven port for delivering flake notifications.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use super::define_port_error;

/// JSON body posted to a project's notification destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlakeNotificationPayload {
    /// Human-readable message.
    pub text: String,
    /// Repository full name.
    pub repository: String,
    /// Workflow name.
    pub workflow: String,
    /// Job name, with the matrix variant when present.
    pub job: String,
    /// `classname#name` of the flaky test.
    pub test_identifier: String,
    /// Attempt of the earliest failure.
    pub failed_attempt: i32,
    /// First passing attempt after it.
    pub passed_attempt: i32,
    /// Deep link to the test case detail view.
    pub detail_url: String,
}

define_port_error! {
    /// Errors raised while delivering a notification.
    pub enum FlakeNotifierError {
        /// The destination could not be reached.
        Transport { message: String } =>
            "notification transport failed: {message}",
        /// The destination did not answer in time.
        Timeout { message: String } =>
            "notification timed out: {message}",
        /// The destination answered with a non-success status.
        Status { status: u16, body: String } =>
            "notification rejected with status {status}: {body}",
    }
}

/// Port for posting one notification.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FlakeNotifier: Send + Sync {
    /// Post `payload` to `destination`.
    async fn send(
        &self,
        destination: &Url,
        payload: &FlakeNotificationPayload,
    ) -> Result<(), FlakeNotifierError>;
}

/// Fixture notifier that accepts and drops every payload.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixtureFlakeNotifier;

#[async_trait]
impl FlakeNotifier for FixtureFlakeNotifier {
    async fn send(
        &self,
        _destination: &Url,
        _payload: &FlakeNotificationPayload,
    ) -> Result<(), FlakeNotifierError> {
        Ok(())
    }
}
