//! Interval store error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("command error: {0}")]
    Command(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("store configuration error: {0}")]
    Config(String),
}
