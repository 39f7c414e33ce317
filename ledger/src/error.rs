// Copyright (c) James Kassemi, SC, US. All rights reserved.
use storage::StoreError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, LedgerError>;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("invalid counter id {value}; expected 1, 2, or 3")]
    InvalidCounter { value: i64 },
    #[error("invalid delta {value}; expected 1 or -1")]
    InvalidDelta { value: i64 },
    #[error("daily vote limit of {limit} reached")]
    QuotaExceeded { limit: u32 },
    #[error("store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),
}

impl LedgerError {
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            LedgerError::InvalidCounter { .. } | LedgerError::InvalidDelta { .. }
        )
    }

    /// Remaining votes to report alongside the error, if any.
    pub fn votes_remaining(&self) -> Option<u32> {
        match self {
            LedgerError::QuotaExceeded { .. } => Some(0),
            _ => None,
        }
    }
}
