//! Driven port resolving presented API keys.

use async_trait::async_trait;

use super::define_port_error;
use crate::domain::ApiKeyCredential;

define_port_error! {
    /// Errors raised while resolving a credential.
    pub enum CredentialResolverError {
        /// Repository connection could not be established.
        Connection { message: String } =>
            "credential lookup connection failed: {message}",
        /// Query failed during execution.
        Query { message: String } =>
            "credential lookup query failed: {message}",
    }
}

/// Port for turning a bearer token into a project-bound credential.
///
/// Unknown and revoked keys both resolve to `None`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CredentialResolver: Send + Sync {
    /// Resolve the presented key.
    async fn resolve(
        &self,
        presented_key: &str,
    ) -> Result<Option<ApiKeyCredential>, CredentialResolverError>;
}

/// Fixture resolver rejecting every key.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixtureCredentialResolver;

#[async_trait]
impl CredentialResolver for FixtureCredentialResolver {
    async fn resolve(
        &self,
        _presented_key: &str,
    ) -> Result<Option<ApiKeyCredential>, CredentialResolverError> {
        Ok(None)
    }
}
