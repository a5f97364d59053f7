//! flaketrack: CI test-report ingestion, flaky test detection and scoring.
//!
//! Layout follows a hexagonal split: [`domain`] holds the rules and the
//! ports, [`outbound`] the PostgreSQL and webhook adapters, [`inbound`] the
//! HTTP surface, with [`middleware`] and [`config`] supporting both binaries.

pub mod config;
pub mod domain;
pub mod inbound;
pub mod middleware;
pub mod outbound;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use middleware::Trace;
