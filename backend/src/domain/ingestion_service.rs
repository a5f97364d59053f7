//! Report ingestion orchestration service.
//!
//! Everything that can reject an upload (limits, metadata, project
//! cross-check, report parsing) runs before the first write. Persistence is
//! one transaction; flake detection follows in its own transaction and is
//! best-effort: once the ingestion has committed, a detection failure is
//! logged and the upload still succeeds.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use mockable::Clock;
use serde_json::json;
use tracing::{error, info, warn};

use crate::domain::ingestion_metadata::{
    IngestionMetadata, MetadataValidationError, RawIngestionMetadata,
};
use crate::domain::ports::{
    FlakeDetectionCommand, IngestionBatch, IngestionCommand, IngestionReceipt,
    IngestionRepository, IngestionRepositoryError, IngestionRequest, ProjectDirectory,
    ProjectDirectoryError,
};
use crate::domain::report_parser::{ParsedTestResult, ReportParseError, parse_report};
use crate::domain::upload::{
    DEFAULT_MAX_STORED_FILE_BYTES, StoredReportFile, UploadLimits,
    UploadedReport,
};
use crate::domain::{Error, IngestionCaller, Project};

/// Domain service implementing [`IngestionCommand`].
#[derive(Clone)]
pub struct IngestionCommandService<R, P> {
    repository: Arc<R>,
    projects: Arc<P>,
    detector: Arc<dyn FlakeDetectionCommand>,
    clock: Arc<dyn Clock>,
    limits: UploadLimits,
    max_stored_file_bytes: usize,
}

impl<R, P> IngestionCommandService<R, P> {
    /// Create a new ingestion service with default limits.
    pub fn new(
        repository: Arc<R>,
        projects: Arc<P>,
        detector: Arc<dyn FlakeDetectionCommand>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repository,
            projects,
            detector,
            clock,
            limits: UploadLimits::default(),
            max_stored_file_bytes: DEFAULT_MAX_STORED_FILE_BYTES,
        }
    }

    /// Replace the upload limits.
    #[must_use]
    pub fn with_limits(mut self, limits: UploadLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Replace the per-file storage budget.
    #[must_use]
    pub fn with_max_stored_file_bytes(mut self, max_stored_file_bytes: usize) -> Self {
        self.max_stored_file_bytes = max_stored_file_bytes;
        self
    }
}

impl<R, P> IngestionCommandService<R, P>
where
    P: ProjectDirectory,
{
    async fn resolve_project(
        &self,
        caller: &IngestionCaller,
        metadata: &IngestionMetadata,
    ) -> Result<Project, Error> {
        match caller {
            IngestionCaller::ApiKey(credential) => {
                metadata
                    .ensure_project(&credential.project)
                    .map_err(map_metadata_error)?;
                Ok(credential.project.clone())
            }
            IngestionCaller::Operator => self
                .projects
                .find_by_identifier(metadata.project())
                .await
                .map_err(map_directory_error)?
                .ok_or_else(|| {
                    Error::invalid_request(format!("unknown project `{}`", metadata.project()))
                        .with_details(json!({ "field": "project" }))
                }),
        }
    }
}

#[async_trait]
impl<R, P> IngestionCommand for IngestionCommandService<R, P>
where
    R: IngestionRepository,
    P: ProjectDirectory,
{
    async fn ingest(&self, request: IngestionRequest) -> Result<IngestionReceipt, Error> {
        self.limits
            .check(&request.files)
            .map_err(Error::from)?;

        let raw: RawIngestionMetadata =
            serde_json::from_slice(&request.metadata_json).map_err(|error| {
                Error::invalid_request(format!("metadata is not a valid JSON object: {error}"))
                    .with_details(json!({ "field": "metadata" }))
            })?;
        let metadata = raw.validate().map_err(map_metadata_error)?;
        let project = self.resolve_project(&request.caller, &metadata).await?;
        let results = parse_uploads(&request.files)?;

        let batch = IngestionBatch {
            project_id: project.id,
            api_key_id: request.caller.api_key_id(),
            files: request
                .files
                .iter()
                .map(|file| StoredReportFile::from_upload(file, self.max_stored_file_bytes))
                .collect(),
            results,
            metadata,
            received_at: self.clock.utc(),
        };

        let persisted = self
            .repository
            .persist_ingestion(&batch)
            .await
            .map_err(map_repository_error)?;

        let flake_events_created = match self
            .detector
            .detect_run(&project, persisted.ci_run_id)
            .await
        {
            Ok(created) => created,
            Err(detection_error) => {
                warn!(
                    ingestion_id = %persisted.ingestion_id,
                    ci_run_id = %persisted.ci_run_id,
                    error = %detection_error,
                    "flake detection failed after ingestion committed"
                );
                0
            }
        };

        info!(
            ingestion_id = %persisted.ingestion_id,
            project = %project.slug,
            repository = batch.metadata.repository(),
            run_id = batch.metadata.run_id(),
            run_attempt = batch.metadata.run_attempt(),
            files_stored = persisted.files_stored,
            test_results_inserted = persisted.test_results_inserted,
            flake_events_created,
            "ingestion committed"
        );

        Ok(IngestionReceipt {
            ingestion_id: persisted.ingestion_id,
            files_stored: persisted.files_stored,
            test_results_inserted: persisted.test_results_inserted,
            flake_events_created,
        })
    }
}

/// Parse every upload, keeping the first result per test identifier.
fn parse_uploads(files: &[UploadedReport]) -> Result<Vec<ParsedTestResult>, Error> {
    let mut seen = HashSet::new();
    let mut results = Vec::new();
    for file in files {
        let parsed = parse_report(&file.filename, &file.content).map_err(map_parse_error)?;
        results.extend(
            parsed
                .into_iter()
                .filter(|result| seen.insert(result.test_identifier.clone())),
        );
    }
    Ok(results)
}

fn map_metadata_error(error: MetadataValidationError) -> Error {
    let field = error.field();
    Error::invalid_request(error.to_string()).with_details(json!({ "field": field }))
}

fn map_parse_error(error: ReportParseError) -> Error {
    let message = error.to_string();
    let details = json!({ "file": error.filename, "reason": error.reason });
    Error::invalid_request(message).with_details(details)
}

fn map_repository_error(repository_error: IngestionRepositoryError) -> Error {
    error!(error = %repository_error, "ingestion persistence failed");
    Error::service_unavailable("ingestion could not be stored; retry later")
}

fn map_directory_error(directory_error: ProjectDirectoryError) -> Error {
    error!(error = %directory_error, "project lookup failed");
    Error::service_unavailable("project lookup is temporarily unavailable")
}

#[cfg(test)]
#[path = "ingestion_service_tests.rs"]
mod tests;
