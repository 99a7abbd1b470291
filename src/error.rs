//! Error types for the decision core.
//!
//! Only storage failures (`Database`, `Decode`) are abnormal; everything else is a
//! well-defined outcome the caller is expected to branch on.

use thiserror::Error;

/// Errors surfaced by the engine, the stores and the ingestion codec.
#[derive(Debug, Error)]
pub enum EngineError {
    // ---
    /// A reading was malformed or missing a numeric field. Raised before any
    /// decision logic runs.
    #[error("invalid reading: {0}")]
    InvalidReading(String),

    /// A second system configuration was about to be created.
    #[error("system configuration already exists")]
    ConfigConflict,

    /// Insights were requested over a window with no readings.
    #[error("no readings in the requested window")]
    NoData,

    #[error("not found: {0}")]
    NotFound(String),

    /// Stored text that no longer maps onto a domain value.
    #[error("corrupt stored value: {0}")]
    Decode(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
