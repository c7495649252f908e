//! Error type shared by the relational storage seams.

use sea_orm::DbErr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
    #[error("Storage error: {0}")]
    Other(String),
}

impl StoreError {
    /// Deadlocks and serialization failures are worth retrying; nothing else is
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Database(e) => is_transient_message(&e.to_string()),
            StoreError::Other(msg) => is_transient_message(msg),
        }
    }
}

/// PostgreSQL reports deadlocks as SQLSTATE 40P01 and serialization
/// failures as 40001; the driver surfaces both in the error text.
fn is_transient_message(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.contains("deadlock")
        || message.contains("40p01")
        || message.contains("40001")
        || message.contains("could not serialize access")
        || message.contains("lock wait timeout")
}
