//! PostgreSQL-backed API key resolution.
//!
//! Keys are never stored; the table holds the lowercase hex SHA-256 of each
//! key and lookups compare fingerprints.

use diesel::OptionalExtension;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::domain::ApiKeyCredential;
use crate::domain::ports::{CredentialResolver, CredentialResolverError};

use super::diesel_helpers::{is_connection_loss, map_diesel_error_message, map_pool_error_message};
use super::diesel_project_directory::project_from_row;
use super::models::ProjectRow;
use super::pool::{DbPool, PoolError};
use super::schema::{api_keys, projects};

/// Fingerprint stored for an API key.
///
/// # Examples
/// ```
/// use flaketrack::outbound::persistence::api_key_fingerprint;
///
/// assert_eq!(
///     api_key_fingerprint("abc"),
///     "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
/// );
/// ```
pub fn api_key_fingerprint(presented_key: &str) -> String {
    hex::encode(Sha256::digest(presented_key.as_bytes()))
}

/// Diesel-backed implementation of [`CredentialResolver`].
#[derive(Clone)]
pub struct DieselCredentialResolver {
    pool: DbPool,
}

impl DieselCredentialResolver {
    /// Create a new resolver with the given connection pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn map_pool_error(error: PoolError) -> CredentialResolverError {
    CredentialResolverError::connection(map_pool_error_message(error))
}

fn map_diesel_error(error: diesel::result::Error) -> CredentialResolverError {
    let message = map_diesel_error_message(&error, "resolve api key");
    if is_connection_loss(&error) {
        CredentialResolverError::connection(message)
    } else {
        CredentialResolverError::query(message)
    }
}

#[async_trait::async_trait]
impl CredentialResolver for DieselCredentialResolver {
    async fn resolve(
        &self,
        presented_key: &str,
    ) -> Result<Option<ApiKeyCredential>, CredentialResolverError> {
        let fingerprint = api_key_fingerprint(presented_key);
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row = api_keys::table
            .inner_join(projects::table)
            .filter(api_keys::key_fingerprint.eq(&fingerprint))
            .filter(api_keys::revoked_at.is_null())
            .select((api_keys::id, ProjectRow::as_select()))
            .first::<(Uuid, ProjectRow)>(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;

        Ok(row.map(|(api_key_id, project)| ApiKeyCredential {
            api_key_id,
            project: project_from_row(project),
        }))
    }
}
