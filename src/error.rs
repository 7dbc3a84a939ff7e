//! Error handling for the ledger
//!
//! Defines the failure classes the pipeline distinguishes and establishes a
//! unified Result type using anyhow for context chaining and propagation.
//! Callers that need to tell a recoverable failure apart (a missing price only
//! skips one currency) use `downcast_ref::<LedgerError>()`.

use thiserror::Error;

/// Core error types for ledger operations
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("parse error: {0}")]
    Parse(String),

    #[error("invalid transaction: {0}")]
    InvalidTransaction(String),

    #[error("reconciliation failed: {0}")]
    Reconciliation(String),

    #[error("transfer received more than was sent: {0}")]
    TransferFee(String),

    #[error("tried to dispose with no open lots for {currency} (transaction {transaction_id}, {remaining} remaining): probably missing transactions")]
    NoOpenLots {
        currency: String,
        transaction_id: i64,
        remaining: rust_decimal::Decimal,
    },

    #[error("transaction {transaction_id} ({currency}, {timestamp}) is missing a USD price")]
    MissingPrice {
        currency: String,
        transaction_id: i64,
        timestamp: String,
    },

    #[error("disposal method configuration error for {year}: {reason}")]
    DisposalConfig { year: i32, reason: String },
}

impl LedgerError {
    /// Whether the failure only invalidates the current unit of work
    pub fn is_recoverable(&self) -> bool {
        matches!(self, LedgerError::MissingPrice { .. })
    }
}

/// Result type alias for ledger operations
pub type Result<T> = anyhow::Result<T>;
