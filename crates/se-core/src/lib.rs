//! se-core: School Events core library
//!
//! Shared data models, configuration, the local store and the remote
//! directory contract used by the sync engine and the HTTP API.

pub mod config;
pub mod directory;
pub mod error;
pub mod models;
pub mod store;

pub use config::{
    ApiConfig, Config, DatabaseConfig, GraphConfig, MetricsConfig, RetentionConfig,
    SchedulerConfig, SyncConfig,
};
pub use directory::{DirectoryError, DirectoryResult, RemoteDirectoryClient};
pub use error::{Error, Result};
pub use models::{
    LocalEvent, LocalUser, Metrics, RemoteEvent, RemoteUser, SyncOutcome, VolumetryResult,
};
pub use store::{EventBatchOutcome, LocalStore, Page, SqliteStore, UserQuery};
