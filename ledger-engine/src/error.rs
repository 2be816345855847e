//! Error types for the ledger engine

use thiserror::Error;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Engine errors
///
/// Every mutating operation either fully commits or fails with exactly one
/// of these kinds; there are no partial state changes to report.
#[derive(Error, Debug)]
pub enum Error {
    /// Caller lacks the required role or registration
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Operation not valid for the entity's current status
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Referenced id does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Zero amount, or amount exceeding a cap
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Address registered twice in the same registry
    #[error("Already registered: {0}")]
    AlreadyRegistered(String),

    /// Returns already claimed for this (pool, investor)
    #[error("Returns already claimed: {0}")]
    AlreadyClaimed(String),

    /// Invoice has not reached the withdrawal threshold
    #[error("Cannot withdraw yet: {0}")]
    CannotWithdrawYet(String),

    /// Profit distribution requires every pool invoice to be paid
    #[error("Not all invoices paid: {0}")]
    NotAllInvoicesPaid(String),

    /// Pool creation requires at least one invoice
    #[error("Pool must contain at least one invoice")]
    EmptyPool,

    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Concurrency error (actor mailbox closed, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}
