//! Remote directory client contract
//!
//! The sync engine and the metrics collector only talk to the remote
//! directory through [`RemoteDirectoryClient`]. Implementations must be
//! side-effect free on the remote system so callers can retry freely.

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{RemoteEvent, RemoteUser};

/// Failure talking to the remote directory service
#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("Directory unavailable: {0}")]
    Unavailable(String),

    #[error("Directory authentication failed: {0}")]
    Auth(String),

    #[error("Directory throttled the request: {0}")]
    Throttled(String),

    #[error("Directory API error {code}: {message}")]
    Api { code: String, message: String },

    #[error("Unexpected directory response: {0}")]
    Decode(String),

    #[error("Directory configuration error: {0}")]
    Config(String),
}

impl DirectoryError {
    /// Whether retrying the same call later may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Throttled(_))
    }
}

/// Result type alias for directory calls
pub type DirectoryResult<T> = std::result::Result<T, DirectoryError>;

/// Read-only access to remote users and their calendars
#[async_trait]
pub trait RemoteDirectoryClient: Send + Sync {
    /// Fetch up to `limit` users. Implementations may cap `limit` further.
    async fn fetch_users(&self, limit: usize) -> DirectoryResult<Vec<RemoteUser>>;

    /// Fetch up to `limit` events owned by `remote_user_id`.
    ///
    /// Events are usually ordered by start time but callers must not rely on it.
    async fn fetch_user_events(
        &self,
        remote_user_id: &str,
        limit: usize,
    ) -> DirectoryResult<Vec<RemoteEvent>>;

    /// Cheap count probe. May return 0 when the remote cannot tell.
    async fn count_users(&self) -> DirectoryResult<u64>;
}
