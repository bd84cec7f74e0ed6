//! Error types for se-sync

use se_core::DirectoryError;
use thiserror::Error;

/// Fatal failure of a reconciliation pass
#[derive(Error, Debug)]
pub enum SyncError {
    /// The user listing could not be fetched; nothing was written
    #[error("Remote directory unavailable: {0}")]
    Remote(#[from] DirectoryError),

    #[error("Store error: {0}")]
    Store(#[from] se_core::Error),

    #[error("Sample size must be positive")]
    InvalidSampleSize,
}

/// Result type alias for se-sync
pub type Result<T> = std::result::Result<T, SyncError>;
