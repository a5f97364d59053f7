//! Bearer-token authentication for ingestion requests.
//!
//! The presented key lives in a [`Zeroizing`] buffer from the moment it is
//! copied out of the header until the resolver has fingerprinted it.

use actix_web::HttpRequest;
use actix_web::http::header::{AUTHORIZATION, HeaderMap};
use tracing::{error, warn};
use zeroize::Zeroizing;

use crate::domain::ports::CredentialResolver;
use crate::domain::{ApiKeyCredential, Error};

use super::ApiResult;

const BEARER_PREFIX: &str = "Bearer ";

/// Extract the bearer token from `Authorization`.
///
/// # Errors
///
/// Returns [`Error::unauthorized`] when the header is absent, not ASCII,
/// uses another scheme or carries an empty token.
pub fn bearer_token(headers: &HeaderMap) -> ApiResult<Zeroizing<String>> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or_else(|| Error::unauthorized("missing API key"))?;
    let value = value
        .to_str()
        .map_err(|_| Error::unauthorized("malformed Authorization header"))?;
    let scheme_len = BEARER_PREFIX.len();
    let token = match value.get(..scheme_len) {
        Some(scheme) if scheme.eq_ignore_ascii_case(BEARER_PREFIX) => {
            value.get(scheme_len..).unwrap_or_default().trim()
        }
        _ => return Err(Error::unauthorized("Authorization must use the Bearer scheme")),
    };
    if token.is_empty() {
        return Err(Error::unauthorized("missing API key"));
    }
    Ok(Zeroizing::new(token.to_owned()))
}

/// Resolve the request's API key to a project-bound credential.
///
/// # Errors
///
/// Unknown or revoked keys give [`Error::unauthorized`]; a resolver failure
/// gives [`Error::service_unavailable`].
pub async fn authenticate(
    request: &HttpRequest,
    resolver: &dyn CredentialResolver,
) -> ApiResult<ApiKeyCredential> {
    let token = bearer_token(request.headers())?;
    match resolver.resolve(token.as_str()).await {
        Ok(Some(credential)) => Ok(credential),
        Ok(None) => {
            warn!("rejected unknown or revoked API key");
            Err(Error::unauthorized("invalid API key"))
        }
        Err(resolver_error) => {
            error!(error = %resolver_error, "credential lookup failed");
            Err(Error::service_unavailable(
                "authentication is temporarily unavailable",
            ))
        }
    }
}
