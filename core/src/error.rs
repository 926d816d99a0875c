//! Engine error types
//!
//! Every rejection is synchronous and aborts the whole transaction. The
//! variants follow the rejection taxonomy callers match on.

use crate::ledger::TransferError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not authorized: {0}")]
    NotAuthorized(String),

    #[error("State conflict: {0}")]
    StateConflict(String),

    #[error("Transfer failed: {0}")]
    Transfer(#[from] TransferError),

    #[error("Arithmetic guard: {0}")]
    ArithmeticGuard(String),
}

/// Coarse classification of an [`EngineError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    InvalidInput,
    NotAuthorized,
    StateConflict,
    TransferFailure,
    ArithmeticGuard,
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::InvalidInput(_) => ErrorKind::InvalidInput,
            EngineError::NotAuthorized(_) => ErrorKind::NotAuthorized,
            EngineError::StateConflict(_) => ErrorKind::StateConflict,
            EngineError::Transfer(_) => ErrorKind::TransferFailure,
            EngineError::ArithmeticGuard(_) => ErrorKind::ArithmeticGuard,
        }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        EngineError::InvalidInput(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        EngineError::NotAuthorized(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        EngineError::StateConflict(msg.into())
    }

    pub fn arithmetic(msg: impl Into<String>) -> Self {
        EngineError::ArithmeticGuard(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Address;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(EngineError::invalid("x").kind(), ErrorKind::InvalidInput);
        assert_eq!(EngineError::unauthorized("x").kind(), ErrorKind::NotAuthorized);
        assert_eq!(EngineError::conflict("x").kind(), ErrorKind::StateConflict);
        assert_eq!(EngineError::arithmetic("x").kind(), ErrorKind::ArithmeticGuard);

        let transfer = EngineError::from(TransferError::Rejected {
            token: Address::repeat_byte(1),
            reason: "halted".to_string(),
        });
        assert_eq!(transfer.kind(), ErrorKind::TransferFailure);
    }

    #[test]
    fn test_display() {
        let err = EngineError::conflict("auction 3 already won");
        assert_eq!(err.to_string(), "State conflict: auction 3 already won");
    }
}
