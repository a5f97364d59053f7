//! Flake detection orchestration.
//!
//! Runs the detection transaction for one CI run and, once it has
//! committed, hands every newly recorded flake to the notification
//! dispatcher.

use std::sync::Arc;

use async_trait::async_trait;
use mockable::Clock;
use tracing::{error, info};
use uuid::Uuid;

use crate::domain::Error;
use crate::domain::notification::{FlakeNotification, NotificationDispatcher};
use crate::domain::ports::{
    FlakeDetectionCommand, FlakeDetectionRepository, FlakeDetectionRepositoryError,
};
use crate::domain::Project;

/// Domain service implementing [`FlakeDetectionCommand`].
#[derive(Clone)]
pub struct FlakeDetectionService<R> {
    repository: Arc<R>,
    dispatcher: NotificationDispatcher,
    clock: Arc<dyn Clock>,
}

impl<R> FlakeDetectionService<R> {
    /// Create a new detection service.
    pub fn new(repository: Arc<R>, dispatcher: NotificationDispatcher, clock: Arc<dyn Clock>) -> Self {
        Self {
            repository,
            dispatcher,
            clock,
        }
    }
}

#[async_trait]
impl<R> FlakeDetectionCommand for FlakeDetectionService<R>
where
    R: FlakeDetectionRepository,
{
    async fn detect_run(&self, project: &Project, ci_run_id: Uuid) -> Result<u64, Error> {
        let report = self
            .repository
            .record_flakes(project.id, ci_run_id, self.clock.utc())
            .await
            .map_err(map_detection_error)?;

        for flake in report.newly_recorded() {
            let notification = FlakeNotification::from_detection(&report, flake);
            // Detached: the handle is dropped and delivery outlives this call.
            drop(self.dispatcher.dispatch(project, notification));
        }

        let created = report.newly_recorded_count();
        info!(
            %ci_run_id,
            project = %project.slug,
            detected = report.flakes.len(),
            created,
            "flake detection completed"
        );
        Ok(created)
    }
}

fn map_detection_error(error: FlakeDetectionRepositoryError) -> Error {
    match error {
        FlakeDetectionRepositoryError::RunNotFound { ci_run_id } => {
            Error::not_found(format!("ci run {ci_run_id} not found"))
        }
        other => {
            error!(error = %other, "flake detection persistence failed");
            Error::service_unavailable("flake detection is temporarily unavailable")
        }
    }
}
