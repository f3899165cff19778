use crate::store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("invalid day of week: {0} (expected 0-6, Sunday = 0)")]
    InvalidDay(u8),
}
