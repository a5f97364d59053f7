//! Shared helpers for flaketrack integration tests.
//!
//! Each file under `tests/` compiles as its own crate and uses a different
//! subset of these helpers.
#![allow(dead_code, reason = "each test crate uses a subset of the helpers")]

pub mod cluster_skip;
pub mod embedded_postgres;
pub mod in_memory;
pub mod pg_embed;

pub use cluster_skip::handle_cluster_setup_failure;

/// Render a `postgres` error with SQLSTATE and detail for CI logs.
pub fn format_postgres_error(error: &postgres::Error) -> String {
    let Some(db_error) = error.as_db_error() else {
        return error.to_string();
    };
    let mut summary = format!(
        "postgres error {:?}: {}",
        db_error.code(),
        db_error.message()
    );
    if let Some(detail) = db_error.detail() {
        summary.push_str("; detail: ");
        summary.push_str(detail);
    }
    if let Some(hint) = db_error.hint() {
        summary.push_str("; hint: ");
        summary.push_str(hint);
    }
    summary
}
