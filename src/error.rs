//! Error taxonomy for the sale pipeline.
//!
//! The submission path distinguishes four terminal categories: validation
//! failures (rejected before any I/O), local storage failures, explicit
//! business rejections from the transaction service, and indeterminate
//! transport outcomes. Only the first three ever surface to the operator;
//! indeterminate outcomes are absorbed by the offline enqueue fallback.

use thiserror::Error;

/// Failure opening or writing the local durable store.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to open local store: {0}")]
    Open(String),

    #[error("local store operation failed: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("local store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    /// A persisted row that no longer deserializes to a valid snapshot.
    #[error("corrupt pending sale record {local_id}: {reason}")]
    Corrupt { local_id: i64, reason: String },
}

/// Transport-level failure talking to the remote transaction service: no
/// definitive accept or reject was received, so the outcome is unknown.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct TransportError(pub String);

/// Terminal result categories for a single submission attempt.
#[derive(Debug, Error)]
pub enum SubmitError {
    /// Cart/payment figures do not balance. Nothing was recorded or sent.
    #[error("sale validation failed: {0}")]
    Validation(String),

    /// The local queue could not be written. The sale is not recorded
    /// anywhere and must be surfaced to the operator.
    #[error("local storage unavailable: {0}")]
    Storage(#[from] StorageError),

    /// The transaction service explicitly refused the sale (e.g. stock
    /// depleted). Not retried, not enqueued.
    #[error("rejected by transaction service: {0}")]
    RemoteRejected(String),

    /// No definitive response before timeout or transport failure. The
    /// coordinator never returns this variant to callers — it falls back to
    /// the offline queue instead — but the sync engine branches on it.
    #[error("no definitive response from transaction service: {0}")]
    TransportIndeterminate(String),
}

/// Failures loading or refreshing the offline product cache.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("product fetch failed: {0}")]
    Fetch(#[from] TransportError),
}
