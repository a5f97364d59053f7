//! Driven port for the atomic ingestion write.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::define_port_error;
use crate::domain::ingestion_metadata::IngestionMetadata;
use crate::domain::report_parser::ParsedTestResult;
use crate::domain::upload::StoredReportFile;

/// Everything one upload writes, already validated and parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestionBatch {
    /// Owning project.
    pub project_id: Uuid,
    /// API key that submitted the upload, if any.
    pub api_key_id: Option<Uuid>,
    /// Validated run metadata.
    pub metadata: IngestionMetadata,
    /// Files prepared for storage.
    pub files: Vec<StoredReportFile>,
    /// Parsed results of every file, in upload order.
    pub results: Vec<ParsedTestResult>,
    /// Receipt timestamp, also used for first/last seen columns.
    pub received_at: DateTime<Utc>,
}

/// Outcome of a committed ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistedIngestion {
    /// Receipt row.
    pub ingestion_id: Uuid,
    /// CI run the batch was attached to.
    pub ci_run_id: Uuid,
    /// Report files stored.
    pub files_stored: u64,
    /// Test results inserted; duplicates of earlier uploads are not counted.
    pub test_results_inserted: u64,
}

define_port_error! {
    /// Errors raised while persisting an ingestion batch.
    pub enum IngestionRepositoryError {
        /// Repository connection could not be established.
        Connection { message: String } =>
            "ingestion persistence connection failed: {message}",
        /// Query or mutation failed during execution.
        Query { message: String } =>
            "ingestion persistence query failed: {message}",
    }
}

/// Port for writing one upload atomically.
///
/// Implementations upsert the run, attempt and job, store the files, upsert
/// test cases and insert results, ignoring results already recorded for the
/// same test case and job. Any failure rolls everything back.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IngestionRepository: Send + Sync {
    /// Persist `batch` in one transaction.
    async fn persist_ingestion(
        &self,
        batch: &IngestionBatch,
    ) -> Result<PersistedIngestion, IngestionRepositoryError>;
}

/// Fixture implementation for tests that do not exercise persistence.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixtureIngestionRepository;

#[async_trait]
impl IngestionRepository for FixtureIngestionRepository {
    async fn persist_ingestion(
        &self,
        batch: &IngestionBatch,
    ) -> Result<PersistedIngestion, IngestionRepositoryError> {
        Ok(PersistedIngestion {
            ingestion_id: Uuid::new_v4(),
            ci_run_id: Uuid::new_v4(),
            files_stored: batch.files.len() as u64,
            test_results_inserted: batch.results.len() as u64,
        })
    }
}
