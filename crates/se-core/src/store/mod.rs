//! Local store of synchronized users and events
//!
//! [`LocalStore`] is the seam the reconciler writes through. The shipped
//! implementation is [`SqliteStore`]; every method is one short critical
//! section so callers never hold the store across an `.await`.

mod sqlite;

pub use sqlite::SqliteStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{LocalEvent, LocalUser, RemoteEvent, RemoteUser};
use crate::Result;

/// Largest page the listing endpoints will return
pub const MAX_PAGE_SIZE: i64 = 100;

/// Default page size for user listings
pub const DEFAULT_PAGE_SIZE: i64 = 10;

/// Counts produced by one event batch write
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventBatchOutcome {
    pub created: u64,
    pub updated: u64,
}

/// Paginated user listing parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserQuery {
    pub page: i64,
    pub page_size: i64,
    pub only_with_events: bool,
}

impl Default for UserQuery {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
            only_with_events: false,
        }
    }
}

impl UserQuery {
    /// Clamp page to at least 1 and page size to 1..=100
    pub fn normalized(&self) -> Self {
        Self {
            page: self.page.max(1),
            page_size: self.page_size.clamp(1, MAX_PAGE_SIZE),
            only_with_events: self.only_with_events,
        }
    }

    /// Saturates for pages past the end instead of overflowing
    pub fn offset(&self) -> i64 {
        self.page.saturating_sub(1).saturating_mul(self.page_size)
    }
}

/// One page of results
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total_count: u64,
    pub page_size: i64,
    pub current_page: i64,
    pub total_pages: u64,
    pub has_next: bool,
    pub has_previous: bool,
}

impl<T> Page<T> {
    /// Build a page from normalized query parameters
    pub fn new(items: Vec<T>, total_count: u64, query: &UserQuery) -> Self {
        let page_size = query.page_size.max(1) as u64;
        let total_pages = total_count.div_ceil(page_size);
        Self {
            items,
            total_count,
            page_size: query.page_size,
            current_page: query.page,
            total_pages,
            has_next: (query.page as u64) < total_pages,
            has_previous: query.page > 1,
        }
    }
}

/// Persistence operations used by the sync engine and the query surface
pub trait LocalStore: Send + Sync {
    /// Look up a user by its remote identifier
    fn find_user_by_remote_id(&self, remote_id: &str) -> Result<Option<LocalUser>>;

    /// Look up a user by its local identifier
    fn get_user(&self, id: &str) -> Result<Option<LocalUser>>;

    /// Insert a new user with a generated local id.
    ///
    /// Returns [`crate::Error::Conflict`] when a user with the same remote
    /// identifier already exists.
    fn insert_user(&self, user: &RemoteUser, synced_at: DateTime<Utc>) -> Result<LocalUser>;

    /// Overwrite the mutable fields of an existing user
    fn update_user(&self, id: &str, user: &RemoteUser, synced_at: DateTime<Utc>) -> Result<()>;

    /// Create or overwrite a user's events in a single transaction.
    ///
    /// Every event must carry a remote identifier. Matching is by
    /// `(user_id, remote_id)` only.
    fn upsert_events(
        &self,
        user_id: &str,
        events: &[RemoteEvent],
        synced_at: DateTime<Utc>,
    ) -> Result<EventBatchOutcome>;

    fn count_users(&self) -> Result<u64>;

    fn count_events(&self) -> Result<u64>;

    /// Most recent `last_synced` across all users
    fn last_synced(&self) -> Result<Option<DateTime<Utc>>>;

    /// Paginated users ordered by display name
    fn list_users(&self, query: &UserQuery) -> Result<Page<LocalUser>>;

    /// A user's events ordered by start time ascending
    fn list_user_events(&self, user_id: &str) -> Result<Vec<LocalEvent>>;

    /// Delete events starting before `cutoff`, returning how many were removed
    fn delete_events_before(&self, cutoff: DateTime<Utc>) -> Result<usize>;
}
