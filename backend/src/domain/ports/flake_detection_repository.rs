//! Driven port for the detection transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::define_port_error;
use crate::domain::flake_stats::FlakeStatistics;

/// One positive detection for a test case in the run.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedFlake {
    /// Test case the flake belongs to.
    pub test_case_id: Uuid,
    /// `classname#name` of the test case.
    pub test_identifier: String,
    /// Job the test case runs in.
    pub job_name: String,
    /// Matrix variant of the job, possibly empty.
    pub job_variant: String,
    /// Attempt of the earliest failure.
    pub failed_attempt: i32,
    /// First passing attempt after it.
    pub passed_attempt: i32,
    /// Message of the earliest failure.
    pub failure_message: Option<String>,
    /// `true` when this call created the flake event; `false` when the run
    /// already had one for this test case.
    pub newly_recorded: bool,
    /// Statistics after recomputation.
    pub statistics: FlakeStatistics,
}

/// Result of one committed detection pass over a CI run.
#[derive(Debug, Clone, PartialEq)]
pub struct FlakeDetectionReport {
    /// The run that was examined.
    pub ci_run_id: Uuid,
    /// Repository of the run.
    pub repository: String,
    /// Workflow of the run.
    pub workflow_name: String,
    /// Positive detections, newly recorded or not.
    pub flakes: Vec<DetectedFlake>,
}

impl FlakeDetectionReport {
    /// Flakes whose events were created by this pass.
    pub fn newly_recorded(&self) -> impl Iterator<Item = &DetectedFlake> {
        self.flakes.iter().filter(|flake| flake.newly_recorded)
    }

    /// Number of flake events created by this pass.
    pub fn newly_recorded_count(&self) -> u64 {
        self.newly_recorded().count() as u64
    }
}

define_port_error! {
    /// Errors raised while detecting and recording flakes.
    pub enum FlakeDetectionRepositoryError {
        /// Repository connection could not be established.
        Connection { message: String } =>
            "flake detection connection failed: {message}",
        /// Query or mutation failed during execution.
        Query { message: String } =>
            "flake detection query failed: {message}",
        /// The CI run does not exist for the project.
        RunNotFound { ci_run_id: Uuid } =>
            "ci run {ci_run_id} not found",
    }
}

/// Port for the detection transaction.
///
/// Implementations read every attempt recorded for the run, apply
/// [`detect_flake`](crate::domain::flake_detection::detect_flake) per test
/// case, insert flake events without duplicating existing ones and refresh
/// statistics for each positive detection before committing.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FlakeDetectionRepository: Send + Sync {
    /// Detect and record flakes for `ci_run_id`, which must belong to
    /// `project_id`; a run owned by another project is not found.
    async fn record_flakes(
        &self,
        project_id: Uuid,
        ci_run_id: Uuid,
        detected_at: DateTime<Utc>,
    ) -> Result<FlakeDetectionReport, FlakeDetectionRepositoryError>;
}

/// Fixture implementation reporting no flakes.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixtureFlakeDetectionRepository;

#[async_trait]
impl FlakeDetectionRepository for FixtureFlakeDetectionRepository {
    async fn record_flakes(
        &self,
        _project_id: Uuid,
        ci_run_id: Uuid,
        _detected_at: DateTime<Utc>,
    ) -> Result<FlakeDetectionReport, FlakeDetectionRepositoryError> {
        Ok(FlakeDetectionReport {
            ci_run_id,
            repository: String::new(),
            workflow_name: String::new(),
            flakes: Vec::new(),
        })
    }
}
