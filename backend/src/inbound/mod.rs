//! Inbound adapters translating external requests into domain calls.
//!
//! HTTP handlers live under [`http`]; the `ingest-reports` binary drives the
//! same domain service directly for operator backfills.

pub mod http;
