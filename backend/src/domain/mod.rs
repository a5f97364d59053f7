//! Domain primitives, services and ports.
//!
//! Purpose: hold the transport- and storage-agnostic core of flaketrack:
//! report decoding, metadata validation, flake detection rules, statistics
//! and notification contracts, plus the services that orchestrate them over
//! the ports in [`ports`].
//!
//! Public surface:
//! - Error (alias to `error::Error`) and ErrorCode: failure payload.
//! - TraceId: request-scoped correlation identifier.
//! - Project, ApiKeyCredential, IngestionCaller: who an upload belongs to.
//! - IngestionCommandService, FlakeDetectionService: driving-port services.

pub mod error;
pub mod flake_detection;
pub mod flake_detection_service;
pub mod flake_stats;
pub mod ingestion_metadata;
pub mod ingestion_service;
pub mod notification;
pub mod ports;
pub mod project;
pub mod report_parser;
pub mod trace_id;
pub mod truncation;
pub mod upload;

pub use self::error::{Error, ErrorCode};
pub use self::flake_detection_service::FlakeDetectionService;
pub use self::ingestion_service::IngestionCommandService;
pub use self::notification::NotificationDispatcher;
pub use self::project::{ApiKeyCredential, IngestionCaller, Project};
pub use self::trace_id::TraceId;

/// Convenient domain result alias.
///
/// # Examples
/// ```
/// use flaketrack::domain::{DomainResult, Error};
///
/// fn reject() -> DomainResult<()> {
///     Err(Error::forbidden("nope"))
/// }
/// assert!(reject().is_err());
/// ```
pub type DomainResult<T> = Result<T, Error>;
