//! se-schedule: cron-driven job runner
//!
//! Runs the sync, metrics, volumetry and cleanup jobs on cron schedules
//! with a per-job retry budget.

mod config;
mod error;
mod scheduler;

pub use config::{JobKind, ScheduleConfig, ScheduleTask, parse_cron};
pub use error::{Result, ScheduleError};
pub use scheduler::{JobReport, JobRunner, Scheduler, SchedulerHandle, with_retry};
