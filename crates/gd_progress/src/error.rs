use gd_store::{EligibilityError, StoreError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProgressError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Progress data is not persistable: {0}")]
    NotPersistable(#[from] EligibilityError),

    #[error("Not enough coins: need {needed}, have {available}")]
    InsufficientCoins { needed: i32, available: i32 },

    #[error("Coin amount must not be negative: {amount}")]
    InvalidAmount { amount: i32 },

    #[error("Unknown character index: {index}")]
    UnknownCharacter { index: usize },

    #[error("Character {index} has not been purchased")]
    NotOwned { index: usize },

    #[error("Character database error: {0}")]
    Database(#[from] serde_json::Error),

    #[error("Invalid character {index}: {reason}")]
    InvalidCharacter { index: usize, reason: String },
}

impl ProgressError {
    pub fn is_recoverable(&self) -> bool {
        match self {
            ProgressError::Store(err) => err.is_recoverable(),
            ProgressError::InsufficientCoins { .. } => true,
            ProgressError::NotOwned { .. } => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, ProgressError>;
