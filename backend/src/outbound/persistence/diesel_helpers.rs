//! Shared helpers for Diesel repository implementations.
//!
//! Repositories keep their own `map_pool_error`/`map_diesel_error` functions
//! so each port error stays explicit; these helpers only extract messages and
//! emit the debug context common to all of them.

use diesel::result::{DatabaseErrorKind, Error as DieselError};
use tracing::debug;

use super::pool::PoolError;

/// Rows per multi-row `INSERT`, keeping statements well below PostgreSQL's
/// bind parameter limit.
pub const INSERT_CHUNK_ROWS: usize = 500;

/// Extract a readable message from a pool error.
pub fn map_pool_error_message(error: PoolError) -> String {
    match error {
        PoolError::Checkout { message } | PoolError::Build { message } => message,
    }
}

/// Whether the failure means the connection itself was lost.
pub fn is_connection_loss(error: &DieselError) -> bool {
    matches!(
        error,
        DieselError::DatabaseError(DatabaseErrorKind::ClosedConnection, _)
            | DieselError::BrokenTransactionManager
    )
}

/// Extract a readable message from a Diesel error and emit debug context.
pub fn map_diesel_error_message(error: &DieselError, operation: &str) -> String {
    match error {
        DieselError::DatabaseError(kind, info) => debug!(
            ?kind,
            message = info.message(),
            constraint = info.constraint_name(),
            %operation,
            "diesel operation failed"
        ),
        _ => debug!(
            error_type = %std::any::type_name_of_val(error),
            %operation,
            "diesel operation failed"
        ),
    }
    format!("{operation}: {error}")
}

/// Convert a row count reported by Diesel into the domain's counter type.
pub fn row_count(rows: usize) -> u64 {
    u64::try_from(rows).unwrap_or(u64::MAX)
}
