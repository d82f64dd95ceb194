//! Hardware access error types.

use thiserror::Error;

use crate::types::{BankId, SlotIndex};

/// Error type for hardware access operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HalError {
    /// Register bus access failed.
    #[error("register bus failure: {0}")]
    Bus(String),

    /// Bank id outside the hardware range.
    #[error("invalid bank {0}")]
    InvalidBank(BankId),

    /// Slot index outside the bank's range.
    #[error("invalid index {index} in bank {bank}")]
    InvalidIndex { bank: BankId, index: SlotIndex },

    /// The ownership arbiter refused the requested transfer.
    #[error("bank {0} ownership transfer denied")]
    OwnershipDenied(BankId),
}

/// Result type for hardware access operations.
pub type HalResult<T> = std::result::Result<T, HalError>;
