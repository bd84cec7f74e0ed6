//! In-process fakes shared by the engine tests

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use se_core::{
    DirectoryError, DirectoryResult, Error, EventBatchOutcome, LocalEvent, LocalStore, LocalUser,
    Page, RemoteDirectoryClient, RemoteEvent, RemoteUser, SqliteStore, UserQuery,
};

use crate::cancel::CancelHandle;

pub fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, day, hour, 0, 0).unwrap()
}

pub fn event(id: &str, owner: &str, subject: &str) -> RemoteEvent {
    RemoteEvent::new(id, owner, subject, at(10, 9), at(10, 10))
}

/// Scriptable directory
#[derive(Default)]
pub struct FakeDirectory {
    users: Mutex<Vec<RemoteUser>>,
    events: Mutex<HashMap<String, Vec<RemoteEvent>>>,
    failing_events: Mutex<HashSet<String>>,
    fail_users: AtomicBool,
    fail_count: AtomicBool,
    cancel_on: Mutex<Option<(String, CancelHandle)>>,
    pub event_calls: AtomicUsize,
}

impl FakeDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(self, user: RemoteUser) -> Self {
        self.set_user(user);
        self
    }

    pub fn with_events(self, owner: &str, events: Vec<RemoteEvent>) -> Self {
        self.events.lock().unwrap().insert(owner.to_string(), events);
        self
    }

    pub fn with_failing_events(self, owner: &str) -> Self {
        self.failing_events.lock().unwrap().insert(owner.to_string());
        self
    }

    pub fn with_failing_users(self) -> Self {
        self.fail_users.store(true, Ordering::SeqCst);
        self
    }

    pub fn with_failing_count(self) -> Self {
        self.fail_count.store(true, Ordering::SeqCst);
        self
    }

    /// Fire `handle` while fetching events for `owner`
    pub fn cancel_while_fetching(self, owner: &str, handle: CancelHandle) -> Self {
        *self.cancel_on.lock().unwrap() = Some((owner.to_string(), handle));
        self
    }

    /// Replace (or add) a user, keeping its position
    pub fn set_user(&self, user: RemoteUser) {
        let mut users = self.users.lock().unwrap();
        match users.iter_mut().find(|u| u.remote_id == user.remote_id && !user.remote_id.is_empty()) {
            Some(existing) => *existing = user,
            None => users.push(user),
        }
    }

    pub fn set_events(&self, owner: &str, events: Vec<RemoteEvent>) {
        self.events.lock().unwrap().insert(owner.to_string(), events);
    }
}

#[async_trait]
impl RemoteDirectoryClient for FakeDirectory {
    async fn fetch_users(&self, limit: usize) -> DirectoryResult<Vec<RemoteUser>> {
        if self.fail_users.load(Ordering::SeqCst) {
            return Err(DirectoryError::Unavailable("connection refused".to_string()));
        }
        Ok(self.users.lock().unwrap().iter().take(limit).cloned().collect())
    }

    async fn fetch_user_events(
        &self,
        remote_user_id: &str,
        limit: usize,
    ) -> DirectoryResult<Vec<RemoteEvent>> {
        self.event_calls.fetch_add(1, Ordering::SeqCst);
        if let Some((owner, handle)) = self.cancel_on.lock().unwrap().as_ref() {
            if owner == remote_user_id {
                handle.cancel();
            }
        }
        if self.failing_events.lock().unwrap().contains(remote_user_id) {
            return Err(DirectoryError::Api {
                code: "MailboxNotEnabledForRESTAPI".to_string(),
                message: format!("no mailbox for {}", remote_user_id),
            });
        }
        Ok(self
            .events
            .lock()
            .unwrap()
            .get(remote_user_id)
            .map(|events| events.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn count_users(&self) -> DirectoryResult<u64> {
        if self.fail_count.load(Ordering::SeqCst) {
            return Err(DirectoryError::Unavailable("timeout".to_string()));
        }
        Ok(self.users.lock().unwrap().len() as u64)
    }
}

/// Store wrapper with injectable failures
pub struct ScriptedStore {
    pub inner: SqliteStore,
    /// Next insert of this remote id loses a race against a concurrent pass
    race_insert: Mutex<Option<String>>,
    fail_user_writes: Mutex<HashSet<String>>,
    fail_event_batches: AtomicBool,
}

impl ScriptedStore {
    pub fn new() -> Self {
        Self {
            inner: SqliteStore::in_memory().unwrap(),
            race_insert: Mutex::new(None),
            fail_user_writes: Mutex::new(HashSet::new()),
            fail_event_batches: AtomicBool::new(false),
        }
    }

    pub fn race_next_insert(self, remote_id: &str) -> Self {
        *self.race_insert.lock().unwrap() = Some(remote_id.to_string());
        self
    }

    pub fn fail_user_write(self, remote_id: &str) -> Self {
        self.fail_user_writes.lock().unwrap().insert(remote_id.to_string());
        self
    }

    pub fn fail_event_batches(self) -> Self {
        self.fail_event_batches.store(true, Ordering::SeqCst);
        self
    }
}

impl LocalStore for ScriptedStore {
    fn find_user_by_remote_id(&self, remote_id: &str) -> se_core::Result<Option<LocalUser>> {
        self.inner.find_user_by_remote_id(remote_id)
    }

    fn get_user(&self, id: &str) -> se_core::Result<Option<LocalUser>> {
        self.inner.get_user(id)
    }

    fn insert_user(&self, user: &RemoteUser, synced_at: DateTime<Utc>) -> se_core::Result<LocalUser> {
        if self.fail_user_writes.lock().unwrap().contains(&user.remote_id) {
            return Err(Error::Other("disk I/O error".to_string()));
        }
        let raced = {
            let mut race = self.race_insert.lock().unwrap();
            if race.as_deref() == Some(user.remote_id.as_str()) {
                race.take()
            } else {
                None
            }
        };
        if raced.is_some() {
            // the other pass wins the insert
            self.inner.insert_user(user, synced_at)?;
            return Err(Error::Conflict(format!("user with remote id {}", user.remote_id)));
        }
        self.inner.insert_user(user, synced_at)
    }

    fn update_user(&self, id: &str, user: &RemoteUser, synced_at: DateTime<Utc>) -> se_core::Result<()> {
        if self.fail_user_writes.lock().unwrap().contains(&user.remote_id) {
            return Err(Error::Other("disk I/O error".to_string()));
        }
        self.inner.update_user(id, user, synced_at)
    }

    fn upsert_events(
        &self,
        user_id: &str,
        events: &[RemoteEvent],
        synced_at: DateTime<Utc>,
    ) -> se_core::Result<EventBatchOutcome> {
        if self.fail_event_batches.load(Ordering::SeqCst) {
            return Err(Error::Other("database is locked".to_string()));
        }
        self.inner.upsert_events(user_id, events, synced_at)
    }

    fn count_users(&self) -> se_core::Result<u64> {
        self.inner.count_users()
    }

    fn count_events(&self) -> se_core::Result<u64> {
        self.inner.count_events()
    }

    fn last_synced(&self) -> se_core::Result<Option<DateTime<Utc>>> {
        self.inner.last_synced()
    }

    fn list_users(&self, query: &UserQuery) -> se_core::Result<Page<LocalUser>> {
        self.inner.list_users(query)
    }

    fn list_user_events(&self, user_id: &str) -> se_core::Result<Vec<LocalEvent>> {
        self.inner.list_user_events(user_id)
    }

    fn delete_events_before(&self, cutoff: DateTime<Utc>) -> se_core::Result<usize> {
        self.inner.delete_events_before(cutoff)
    }
}
