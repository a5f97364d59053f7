//! PostgreSQL-backed project lookups.

use diesel::OptionalExtension;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use tracing::warn;
use url::Url;
use uuid::Uuid;

use crate::domain::Project;
use crate::domain::ports::{ProjectDirectory, ProjectDirectoryError};

use super::diesel_helpers::{is_connection_loss, map_diesel_error_message, map_pool_error_message};
use super::models::ProjectRow;
use super::pool::{DbPool, PoolError};
use super::schema::projects;

/// Diesel-backed implementation of [`ProjectDirectory`].
#[derive(Clone)]
pub struct DieselProjectDirectory {
    pool: DbPool,
}

impl DieselProjectDirectory {
    /// Create a new directory with the given connection pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn map_pool_error(error: PoolError) -> ProjectDirectoryError {
    ProjectDirectoryError::connection(map_pool_error_message(error))
}

fn map_diesel_error(error: diesel::result::Error) -> ProjectDirectoryError {
    let message = map_diesel_error_message(&error, "find project");
    if is_connection_loss(&error) {
        ProjectDirectoryError::connection(message)
    } else {
        ProjectDirectoryError::query(message)
    }
}

/// Convert a stored project, dropping a webhook URL that no longer parses.
pub(crate) fn project_from_row(row: ProjectRow) -> Project {
    let notification_url = row
        .notification_webhook_url
        .as_deref()
        .and_then(|raw| match Url::parse(raw) {
            Ok(url) => Some(url),
            Err(error) => {
                warn!(project = %row.slug, %error, "ignoring unparseable notification webhook");
                None
            }
        });
    Project {
        id: row.id,
        slug: row.slug,
        notifications_enabled: row.notifications_enabled,
        notification_url,
    }
}

#[async_trait::async_trait]
impl ProjectDirectory for DieselProjectDirectory {
    async fn find_by_identifier(
        &self,
        identifier: &str,
    ) -> Result<Option<Project>, ProjectDirectoryError> {
        let identifier = identifier.trim();
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let query = projects::table.select(ProjectRow::as_select()).into_boxed();
        let query = match Uuid::parse_str(identifier) {
            Ok(id) => query.filter(projects::id.eq(id).or(projects::slug.eq(identifier))),
            Err(_) => query.filter(projects::slug.eq(identifier)),
        };
        let row = query
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;
        Ok(row.map(project_from_row))
    }
}
