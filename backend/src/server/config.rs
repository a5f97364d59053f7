//! HTTP server configuration object.

use std::net::SocketAddr;
use std::time::Duration;

use flaketrack::domain::upload::{DEFAULT_MAX_STORED_FILE_BYTES, UploadLimits};
use flaketrack::outbound::persistence::DbPool;
use url::Url;

/// Builder-style configuration for creating the HTTP server.
pub struct ServerConfig {
    pub(crate) bind_addr: SocketAddr,
    pub(crate) db_pool: Option<DbPool>,
    pub(crate) limits: UploadLimits,
    pub(crate) max_stored_file_bytes: usize,
    pub(crate) notification_timeout: Duration,
    pub(crate) public_base_url: Url,
}

impl ServerConfig {
    /// Configuration with default limits and no database.
    #[must_use]
    pub fn new(bind_addr: SocketAddr, public_base_url: Url) -> Self {
        Self {
            bind_addr,
            db_pool: None,
            limits: UploadLimits::default(),
            max_stored_file_bytes: DEFAULT_MAX_STORED_FILE_BYTES,
            notification_timeout: Duration::from_secs(5),
            public_base_url,
        }
    }

    /// Attach a database pool; without one the server runs on fixture ports.
    #[must_use]
    pub fn with_db_pool(mut self, pool: DbPool) -> Self {
        self.db_pool = Some(pool);
        self
    }

    #[must_use]
    pub fn with_limits(mut self, limits: UploadLimits, max_stored_file_bytes: usize) -> Self {
        self.limits = limits;
        self.max_stored_file_bytes = max_stored_file_bytes;
        self
    }

    #[must_use]
    pub fn with_notification_timeout(mut self, timeout: Duration) -> Self {
        self.notification_timeout = timeout;
        self
    }
}
