//! Service configuration loaded via OrthoConfig.
//!
//! Values come from CLI flags, `FLAKETRACK_*` environment variables and
//! configuration files. Optional fields fall back to the defaults below
//! through accessor methods.

use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use url::Url;

use crate::domain::upload::{
    DEFAULT_MAX_FILE_BYTES, DEFAULT_MAX_FILES, DEFAULT_MAX_STORED_FILE_BYTES,
    DEFAULT_MAX_TOTAL_BYTES, UploadLimits,
};
use crate::outbound::persistence::PoolConfig;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_NOTIFICATION_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_PUBLIC_BASE_URL: &str = "http://localhost:8080";

/// Invalid or missing settings.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettingsError {
    /// No database URL was supplied.
    #[error("database_url is required (set FLAKETRACK_DATABASE_URL)")]
    MissingDatabaseUrl,
    /// The public base URL does not parse.
    #[error("public_base_url `{value}` is not a valid URL: {message}")]
    InvalidPublicBaseUrl {
        /// Configured value.
        value: String,
        /// Parser error.
        message: String,
    },
}

/// Runtime settings for the server and the backfill CLI.
#[derive(Debug, Clone, Deserialize, OrthoConfig)]
#[ortho_config(prefix = "FLAKETRACK")]
pub struct AppSettings {
    /// PostgreSQL connection string.
    pub database_url: Option<String>,
    /// Socket address the HTTP server binds.
    pub bind_addr: Option<String>,
    /// Upper bound on pooled database connections.
    pub db_max_connections: Option<u32>,
    /// Maximum report files per upload.
    pub max_upload_files: Option<usize>,
    /// Maximum bytes per report file.
    pub max_file_bytes: Option<usize>,
    /// Maximum bytes across all report files of one upload.
    pub max_upload_bytes: Option<usize>,
    /// Bytes of each report file kept in storage.
    pub max_stored_file_bytes: Option<usize>,
    /// Webhook delivery timeout in milliseconds.
    pub notification_timeout_ms: Option<u64>,
    /// Base URL used for deep links in notifications.
    pub public_base_url: Option<String>,
    /// Apply embedded migrations on startup.
    #[ortho_config(default = true)]
    pub run_migrations: bool,
}

impl AppSettings {
    /// Database URL, required by both binaries.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::MissingDatabaseUrl`] when unset or blank.
    pub fn database_url(&self) -> Result<&str, SettingsError> {
        self.database_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .ok_or(SettingsError::MissingDatabaseUrl)
    }

    /// Listen address, `0.0.0.0:8080` unless configured.
    pub fn bind_addr(&self) -> &str {
        self.bind_addr.as_deref().unwrap_or(DEFAULT_BIND_ADDR)
    }

    /// Pool size, 10 unless configured.
    pub fn db_max_connections(&self) -> u32 {
        self.db_max_connections
            .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS)
    }

    /// Pool configuration built from the database settings.
    ///
    /// # Errors
    ///
    /// Propagates [`SettingsError::MissingDatabaseUrl`].
    pub fn pool_config(&self) -> Result<PoolConfig, SettingsError> {
        Ok(PoolConfig::new(self.database_url()?).with_max_size(self.db_max_connections()))
    }

    /// Upload limits enforced by the HTTP adapter and the service.
    pub fn upload_limits(&self) -> UploadLimits {
        UploadLimits::new(
            self.max_upload_files.unwrap_or(DEFAULT_MAX_FILES),
            self.max_file_bytes.unwrap_or(DEFAULT_MAX_FILE_BYTES),
            self.max_upload_bytes.unwrap_or(DEFAULT_MAX_TOTAL_BYTES),
        )
    }

    /// Per-file storage budget; longer content is truncated.
    pub fn max_stored_file_bytes(&self) -> usize {
        self.max_stored_file_bytes
            .unwrap_or(DEFAULT_MAX_STORED_FILE_BYTES)
    }

    /// Webhook delivery timeout, 5 s unless configured.
    pub fn notification_timeout(&self) -> Duration {
        Duration::from_millis(
            self.notification_timeout_ms
                .unwrap_or(DEFAULT_NOTIFICATION_TIMEOUT_MS),
        )
    }

    /// Parsed base URL for notification deep links.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::InvalidPublicBaseUrl`] when it does not parse.
    pub fn public_base_url(&self) -> Result<Url, SettingsError> {
        let value = self
            .public_base_url
            .as_deref()
            .unwrap_or(DEFAULT_PUBLIC_BASE_URL);
        Url::parse(value).map_err(|error| SettingsError::InvalidPublicBaseUrl {
            value: value.to_owned(),
            message: error.to_string(),
        })
    }
}
