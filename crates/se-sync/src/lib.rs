//! se-sync: reconciliation engine
//!
//! Pulls users and calendars from a [`se_core::RemoteDirectoryClient`] into
//! a [`se_core::LocalStore`], plus the read-only metrics pass and event
//! retention.

pub mod cancel;
pub mod error;
pub mod metrics;
pub mod reconciler;
pub mod retention;

#[cfg(test)]
mod testing;

pub use cancel::{CancelHandle, CancelSignal, cancel_pair};
pub use error::{Result, SyncError};
pub use metrics::{MetricsCollector, MetricsOptions};
pub use reconciler::{Reconciler, SyncOptions};
pub use retention::RetentionPruner;
