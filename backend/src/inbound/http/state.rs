//! Shared HTTP adapter state.
//!
//! Handlers receive this through `web::Data` and depend only on domain
//! ports, so they can be exercised with mocks and no I/O.

use std::sync::Arc;

use crate::domain::ports::{
    CredentialResolver, FixtureCredentialResolver, FixtureIngestionCommand, IngestionCommand,
};
use crate::domain::upload::UploadLimits;

/// Dependency bundle for HTTP handlers.
#[derive(Clone)]
pub struct HttpState {
    /// Ingestion use case behind `POST /ingestions`.
    pub ingestions: Arc<dyn IngestionCommand>,
    /// Resolves bearer API keys to their project.
    pub credentials: Arc<dyn CredentialResolver>,
    /// Limits enforced while the multipart body streams in.
    pub limits: UploadLimits,
}

impl HttpState {
    /// Build state with default upload limits.
    pub fn new(
        ingestions: Arc<dyn IngestionCommand>,
        credentials: Arc<dyn CredentialResolver>,
    ) -> Self {
        Self {
            ingestions,
            credentials,
            limits: UploadLimits::default(),
        }
    }

    /// Replace the upload limits.
    #[must_use]
    pub fn with_limits(mut self, limits: UploadLimits) -> Self {
        self.limits = limits;
        self
    }
}

impl Default for HttpState {
    /// Fixture ports: every key is rejected and every upload acknowledged.
    fn default() -> Self {
        Self::new(
            Arc::new(FixtureIngestionCommand),
            Arc::new(FixtureCredentialResolver),
        )
    }
}
