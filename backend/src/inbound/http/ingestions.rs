//! Report upload endpoint.
//!
//! ```text
//! POST /api/v1/ingestions
//! Authorization: Bearer <api key>
//! Content-Type: multipart/form-data
//!
//!   metadata  JSON run/job description (exactly once)
//!   files     one report document per part (one or more)
//! ```
//!
//! File count, per-file size and total size are checked while parts stream
//! in, so an oversized upload is rejected without being buffered in full.

use actix_multipart::{Field, Multipart, MultipartError};
use actix_web::{HttpRequest, HttpResponse, post, web};
use futures_util::TryStreamExt as _;
use serde_json::json;
use tracing::info;

use crate::domain::ports::IngestionRequest;
use crate::domain::upload::{UploadLimitError, UploadLimits, UploadedReport};
use crate::domain::{Error, IngestionCaller};

use super::ApiResult;
use super::auth::authenticate;
use super::state::HttpState;

/// Multipart field carrying the metadata document.
pub const METADATA_FIELD: &str = "metadata";
/// Multipart field carrying report files.
pub const FILES_FIELD: &str = "files";
/// Upper bound for the metadata document.
pub const MAX_METADATA_BYTES: usize = 64 * 1024;

/// Decoded multipart body.
#[derive(Debug, Default)]
struct UploadParts {
    metadata_json: Option<Vec<u8>>,
    files: Vec<UploadedReport>,
}

fn map_multipart_error(error: MultipartError) -> Error {
    Error::invalid_request(format!("malformed multipart body: {error}"))
}

fn field_error(message: impl Into<String>, field: &str) -> Error {
    Error::invalid_request(message).with_details(json!({ "field": field }))
}

async fn read_metadata(field: &mut Field) -> ApiResult<Vec<u8>> {
    let mut content = Vec::new();
    while let Some(chunk) = field.try_next().await.map_err(map_multipart_error)? {
        content.extend_from_slice(&chunk);
        if content.len() > MAX_METADATA_BYTES {
            return Err(Error::payload_too_large(format!(
                "metadata exceeds the {MAX_METADATA_BYTES}-byte limit"
            )));
        }
    }
    Ok(content)
}

async fn read_report(
    field: &mut Field,
    filename: &str,
    limits: &UploadLimits,
    total_bytes: &mut usize,
) -> ApiResult<Vec<u8>> {
    let mut content = Vec::new();
    while let Some(chunk) = field.try_next().await.map_err(map_multipart_error)? {
        content.extend_from_slice(&chunk);
        limits.check_file_size(filename, content.len())?;
        *total_bytes = total_bytes.saturating_add(chunk.len());
        limits.check_total_size(*total_bytes)?;
    }
    Ok(content)
}

async fn read_upload(mut payload: Multipart, limits: &UploadLimits) -> ApiResult<UploadParts> {
    let mut parts = UploadParts::default();
    let mut total_bytes = 0_usize;

    while let Some(mut field) = payload.try_next().await.map_err(map_multipart_error)? {
        let name = field.name().unwrap_or_default().to_owned();
        match name.as_str() {
            METADATA_FIELD => {
                if parts.metadata_json.is_some() {
                    return Err(field_error(
                        "metadata must be sent exactly once",
                        METADATA_FIELD,
                    ));
                }
                parts.metadata_json = Some(read_metadata(&mut field).await?);
            }
            FILES_FIELD => {
                limits.check_file_count(parts.files.len() + 1)?;
                let filename = field
                    .content_disposition()
                    .and_then(|disposition| disposition.get_filename())
                    .filter(|filename| !filename.is_empty())
                    .map_or_else(|| format!("files[{}]", parts.files.len()), str::to_owned);
                let content = read_report(&mut field, &filename, limits, &mut total_bytes).await?;
                parts.files.push(UploadedReport::new(filename, content));
            }
            other => {
                return Err(field_error(
                    format!("unexpected multipart field `{other}`"),
                    other,
                ));
            }
        }
    }
    Ok(parts)
}

/// Accept one upload of CI test reports.
///
/// Responds `201 Created` with the ingestion receipt.
#[post("/ingestions")]
pub async fn create_ingestion(
    request: HttpRequest,
    state: web::Data<HttpState>,
    payload: Multipart,
) -> ApiResult<HttpResponse> {
    let credential = authenticate(&request, state.credentials.as_ref()).await?;
    let project = credential.project.slug.clone();

    let parts = read_upload(payload, &state.limits).await?;
    let metadata_json = parts
        .metadata_json
        .ok_or_else(|| field_error("metadata field is required", METADATA_FIELD))?;
    if parts.files.is_empty() {
        return Err(UploadLimitError::NoFiles.into());
    }

    let receipt = state
        .ingestions
        .ingest(IngestionRequest {
            caller: IngestionCaller::ApiKey(credential),
            metadata_json,
            files: parts.files,
        })
        .await?;

    info!(
        %project,
        ingestion_id = %receipt.ingestion_id,
        files_stored = receipt.files_stored,
        test_results_inserted = receipt.test_results_inserted,
        flake_events_created = receipt.flake_events_created,
        "upload accepted"
    );
    Ok(HttpResponse::Created().json(receipt))
}

#[cfg(test)]
#[path = "ingestions_tests.rs"]
mod tests;
