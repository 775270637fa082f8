//! Scheduling error types.
//!
//! Input errors are the caller's fault (malformed fields), overlap errors are
//! conflicts with the existing schedule (the fields were fine), and not-found
//! means the request was well-formed but stale. Keeping them distinct lets a
//! controller map them to 400 / 409 / 404 without string matching.

use thiserror::Error;

use tempo_store::StoreError;

#[derive(Debug, Error)]
pub enum ActivityError {
    #[error("invalid activity input: {0}")]
    Input(String),

    #[error("{0}")]
    Overlap(String),

    #[error("failed to find activity at: {0}")]
    NotFound(i64),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    // The write has already committed when this is raised.
    #[error("failed to publish notification: {0}")]
    Notify(String),
}

#[derive(Debug, Error)]
pub enum TimelineError {
    #[error("invalid timeline input: {0}")]
    Input(String),

    #[error("timeline '{name}' still has {count} activities, pass force to delete")]
    NotEmpty { name: String, count: u64 },

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("failed to publish notification: {0}")]
    Notify(String),
}
