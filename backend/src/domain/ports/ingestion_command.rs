//! Driving port for report ingestion.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::upload::UploadedReport;
use crate::domain::{Error, IngestionCaller};

/// One upload as received by an inbound adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestionRequest {
    /// Who submitted the upload.
    pub caller: IngestionCaller,
    /// Undecoded JSON metadata document.
    pub metadata_json: Vec<u8>,
    /// Report files in upload order.
    pub files: Vec<UploadedReport>,
}

/// Receipt returned for a committed upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionReceipt {
    /// Ingestion receipt identifier.
    pub ingestion_id: Uuid,
    /// Report files stored.
    pub files_stored: u64,
    /// Test results newly inserted.
    pub test_results_inserted: u64,
    /// Flake events newly created by this upload.
    pub flake_events_created: u64,
}

/// Driving port for ingesting one upload.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IngestionCommand: Send + Sync {
    /// Validate, parse, persist and run detection for one upload.
    async fn ingest(&self, request: IngestionRequest) -> Result<IngestionReceipt, Error>;
}

/// Fixture command acknowledging every upload without storing anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixtureIngestionCommand;

#[async_trait]
impl IngestionCommand for FixtureIngestionCommand {
    async fn ingest(&self, request: IngestionRequest) -> Result<IngestionReceipt, Error> {
        Ok(IngestionReceipt {
            ingestion_id: Uuid::nil(),
            files_stored: request.files.len() as u64,
            test_results_inserted: 0,
            flake_events_created: 0,
        })
    }
}
