//! Driven port resolving projects by identifier.

use async_trait::async_trait;

use super::define_port_error;
use crate::domain::Project;

define_port_error! {
    /// Errors raised while resolving a project.
    pub enum ProjectDirectoryError {
        /// Repository connection could not be established.
        Connection { message: String } =>
            "project lookup connection failed: {message}",
        /// Query failed during execution.
        Query { message: String } =>
            "project lookup query failed: {message}",
    }
}

/// Port for looking up a project by slug or id.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProjectDirectory: Send + Sync {
    /// Resolve `identifier` (slug or UUID) to a project.
    async fn find_by_identifier(
        &self,
        identifier: &str,
    ) -> Result<Option<Project>, ProjectDirectoryError>;
}

/// Fixture directory that knows no projects.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixtureProjectDirectory;

#[async_trait]
impl ProjectDirectory for FixtureProjectDirectory {
    async fn find_by_identifier(
        &self,
        _identifier: &str,
    ) -> Result<Option<Project>, ProjectDirectoryError> {
        Ok(None)
    }
}
