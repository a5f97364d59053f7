//! Domain ports and supporting types for the hexagonal boundary.
//!
//! Driving ports (`*Command`) are implemented by domain services and called
//! by inbound adapters. Driven ports are implemented by outbound adapters;
//! each declares its own error enum via [`define_port_error!`].

mod macros;
pub(crate) use macros::define_port_error;

mod credential_resolver;
mod flake_detection_command;
mod flake_detection_repository;
mod flake_notifier;
mod ingestion_command;
mod ingestion_repository;
mod project_directory;

#[cfg(test)]
pub use credential_resolver::MockCredentialResolver;
pub use credential_resolver::{
    CredentialResolver, CredentialResolverError, FixtureCredentialResolver,
};
#[cfg(test)]
pub use flake_detection_command::MockFlakeDetectionCommand;
pub use flake_detection_command::{FixtureFlakeDetectionCommand, FlakeDetectionCommand};
#[cfg(test)]
pub use flake_detection_repository::MockFlakeDetectionRepository;
pub use flake_detection_repository::{
    DetectedFlake, FixtureFlakeDetectionRepository, FlakeDetectionReport,
    FlakeDetectionRepository, FlakeDetectionRepositoryError,
};
#[cfg(test)]
pub use flake_notifier::MockFlakeNotifier;
pub use flake_notifier::{
    FixtureFlakeNotifier, FlakeNotificationPayload, FlakeNotifier, FlakeNotifierError,
};
#[cfg(test)]
pub use ingestion_command::MockIngestionCommand;
pub use ingestion_command::{
    FixtureIngestionCommand, IngestionCommand, IngestionReceipt, IngestionRequest,
};
#[cfg(test)]
pub use ingestion_repository::MockIngestionRepository;
pub use ingestion_repository::{
    FixtureIngestionRepository, IngestionBatch, IngestionRepository, IngestionRepositoryError,
    PersistedIngestion,
};
#[cfg(test)]
pub use project_directory::MockProjectDirectory;
pub use project_directory::{FixtureProjectDirectory, ProjectDirectory, ProjectDirectoryError};
