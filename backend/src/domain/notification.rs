//! Flake notification contract and detached delivery.
//!
//! A notification is dispatched only after the detection transaction has
//! committed. Each dispatch runs on its own spawned task, so cancelling the
//! originating request never cancels delivery, and is bounded by the
//! configured timeout. Every failure is logged and swallowed.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;

use super::ports::{DetectedFlake, FlakeDetectionReport, FlakeNotificationPayload, FlakeNotifier};
use super::{Project, TraceId};

/// Default per-delivery timeout.
pub const DEFAULT_NOTIFICATION_TIMEOUT: Duration = Duration::from_secs(5);

/// Facts about one newly recorded flake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlakeNotification {
    /// Flaky test case.
    pub test_case_id: Uuid,
    /// Repository full name.
    pub repository: String,
    /// Workflow name.
    pub workflow: String,
    /// Job name.
    pub job_name: String,
    /// Matrix variant, possibly empty.
    pub job_variant: String,
    /// `classname#name`.
    pub test_identifier: String,
    /// Attempt of the earliest failure.
    pub failed_attempt: i32,
    /// First passing attempt after it.
    pub passed_attempt: i32,
}

impl FlakeNotification {
    /// Describe `flake` found while examining the run in `report`.
    pub fn from_detection(report: &FlakeDetectionReport, flake: &DetectedFlake) -> Self {
        Self {
            test_case_id: flake.test_case_id,
            repository: report.repository.clone(),
            workflow: report.workflow_name.clone(),
            job_name: flake.job_name.clone(),
            job_variant: flake.job_variant.clone(),
            test_identifier: flake.test_identifier.clone(),
            failed_attempt: flake.failed_attempt,
            passed_attempt: flake.passed_attempt,
        }
    }

    /// Job name with the variant in parentheses when present.
    pub fn job_label(&self) -> String {
        if self.job_variant.is_empty() {
            self.job_name.clone()
        } else {
            format!("{} ({})", self.job_name, self.job_variant)
        }
    }

    /// Build the posted payload with its fixed-format message.
    ///
    /// # Examples
    /// ```
    /// use flaketrack::domain::notification::FlakeNotification;
    /// use uuid::Uuid;
    ///
    /// let notification = FlakeNotification {
    ///     test_case_id: Uuid::nil(),
    ///     repository: "acme/payments".into(),
    ///     workflow: "CI".into(),
    ///     job_name: "test".into(),
    ///     job_variant: "linux".into(),
    ///     test_identifier: "calc#adds".into(),
    ///     failed_attempt: 1,
    ///     passed_attempt: 2,
    /// };
    /// let payload = notification.to_payload("https://flakes.example.com/t/1".into());
    /// assert_eq!(
    ///     payload.text,
    ///     "Flaky test detected in acme/payments\n\
    ///      Workflow: CI / Job: test (linux)\n\
    ///      Test: calc#adds\n\
    ///      Failed on attempt 1, passed on attempt 2\n\
    ///      Details: https://flakes.example.com/t/1"
    /// );
    /// ```
    pub fn to_payload(&self, detail_url: String) -> FlakeNotificationPayload {
        let job = self.job_label();
        let text = format!(
            "Flaky test detected in {repository}\n\
             Workflow: {workflow} / Job: {job}\n\
             Test: {test}\n\
             Failed on attempt {failed}, passed on attempt {passed}\n\
             Details: {detail_url}",
            repository = self.repository,
            workflow = self.workflow,
            test = self.test_identifier,
            failed = self.failed_attempt,
            passed = self.passed_attempt,
        );
        FlakeNotificationPayload {
            text,
            repository: self.repository.clone(),
            workflow: self.workflow.clone(),
            job,
            test_identifier: self.test_identifier.clone(),
            failed_attempt: self.failed_attempt,
            passed_attempt: self.passed_attempt,
            detail_url,
        }
    }
}

/// Deep link to a test case's detail view.
///
/// # Examples
/// ```
/// use flaketrack::domain::notification::detail_url;
/// use url::Url;
/// use uuid::Uuid;
///
/// let base = Url::parse("https://flakes.example.com/app/").expect("url");
/// assert_eq!(
///     detail_url(&base, "payments", Uuid::nil()),
///     "https://flakes.example.com/app/projects/payments/tests/00000000-0000-0000-0000-000000000000"
/// );
/// ```
///
/// The slug is percent-encoded as a single path segment. A base URL that
/// cannot carry a path (such as `mailto:`) is returned unchanged.
pub fn detail_url(public_base_url: &Url, project_slug: &str, test_case_id: Uuid) -> String {
    let mut link = public_base_url.clone();
    link.set_query(None);
    link.set_fragment(None);
    let test_case_id = test_case_id.to_string();
    if let Ok(mut segments) = link.path_segments_mut() {
        segments
            .pop_if_empty()
            .extend(["projects", project_slug, "tests", test_case_id.as_str()]);
    }
    link.into()
}

/// Spawns best-effort notification deliveries.
#[derive(Clone)]
pub struct NotificationDispatcher {
    notifier: Arc<dyn FlakeNotifier>,
    timeout: Duration,
    public_base_url: Url,
}

impl NotificationDispatcher {
    /// Create a dispatcher delivering through `notifier`.
    pub fn new(notifier: Arc<dyn FlakeNotifier>, timeout: Duration, public_base_url: Url) -> Self {
        Self {
            notifier,
            timeout,
            public_base_url,
        }
    }

    /// Spawn delivery of `notification` to `project`'s destination.
    ///
    /// Returns `None` without spawning when the project has notifications
    /// disabled or no destination. The returned handle may be dropped; the
    /// task keeps running detached.
    pub fn dispatch(&self, project: &Project, notification: FlakeNotification) -> Option<JoinHandle<()>> {
        let Some(destination) = project.notification_destination().cloned() else {
            debug!(
                project = %project.slug,
                test_identifier = %notification.test_identifier,
                "notifications not configured; skipping"
            );
            return None;
        };

        let link = detail_url(&self.public_base_url, &project.slug, notification.test_case_id);
        let payload = notification.to_payload(link);
        let notifier = Arc::clone(&self.notifier);
        let timeout = self.timeout;

        Some(tokio::spawn(TraceId::instrument(async move {
            match tokio::time::timeout(timeout, notifier.send(&destination, &payload)).await {
                Ok(Ok(())) => debug!(
                    destination = %destination,
                    test_identifier = %payload.test_identifier,
                    "flake notification delivered"
                ),
                Ok(Err(error)) => warn!(
                    destination = %destination,
                    test_identifier = %payload.test_identifier,
                    %error,
                    "flake notification failed"
                ),
                Err(_) => warn!(
                    destination = %destination,
                    test_identifier = %payload.test_identifier,
                    timeout_ms = timeout.as_millis(),
                    "flake notification timed out"
                ),
            }
        })))
    }
}
