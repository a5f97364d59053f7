//! PostgreSQL persistence adapters using Diesel.
//!
//! Implements the ingestion, detection, project and credential ports over a
//! `diesel-async` + `bb8` pool. Row structs (`models.rs`) and table
//! definitions (`schema.rs`) stay private to this module; adapters translate
//! between them and domain types and map every failure onto the port's error
//! enum.
//!
//! # Example
//!
//! ```ignore
//! use flaketrack::outbound::persistence::{DbPool, DieselIngestionRepository, PoolConfig};
//!
//! let pool = DbPool::new(PoolConfig::new("postgres://localhost/flaketrack")).await?;
//! let repository = DieselIngestionRepository::new(pool);
//! ```

mod diesel_credential_resolver;
mod diesel_flake_detection_repository;
pub(crate) mod diesel_helpers;
mod diesel_ingestion_repository;
mod diesel_project_directory;
mod migrations;
mod models;
mod pool;
mod schema;

pub use diesel_credential_resolver::{DieselCredentialResolver, api_key_fingerprint};
pub use diesel_flake_detection_repository::DieselFlakeDetectionRepository;
pub use diesel_ingestion_repository::DieselIngestionRepository;
pub use diesel_project_directory::DieselProjectDirectory;
pub use migrations::{MIGRATIONS, MigrationError, run_pending_migrations};
pub use pool::{DbPool, PoolConfig, PoolError, redact_url};
