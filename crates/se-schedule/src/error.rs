//! Error types for se-schedule

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScheduleError {
    #[error("Invalid cron expression for job {job}: {message}")]
    CronParse { job: String, message: String },

    #[error("Failed to load schedule: {0}")]
    ConfigLoad(String),

    #[error("Sync failed: {0}")]
    Sync(#[from] se_sync::SyncError),

    #[error("Store error: {0}")]
    Store(#[from] se_core::Error),
}

/// Result type alias for se-schedule
pub type Result<T> = std::result::Result<T, ScheduleError>;
