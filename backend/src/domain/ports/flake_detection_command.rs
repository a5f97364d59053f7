//! Driving port for flake detection over one CI run.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{Error, Project};

/// Driving port for detecting flakes in a committed CI run.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FlakeDetectionCommand: Send + Sync {
    /// Detect flakes for `ci_run_id`, notify `project` of new ones and return
    /// how many flake events were newly created.
    async fn detect_run(&self, project: &Project, ci_run_id: Uuid) -> Result<u64, Error>;
}

/// Fixture command that never finds flakes.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixtureFlakeDetectionCommand;

#[async_trait]
impl FlakeDetectionCommand for FixtureFlakeDetectionCommand {
    async fn detect_run(&self, _project: &Project, _ci_run_id: Uuid) -> Result<u64, Error> {
        Ok(0)
    }
}
