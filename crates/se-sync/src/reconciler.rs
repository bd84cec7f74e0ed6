//! Directory → local store reconciliation
//!
//! One pass fetches a bounded sample of remote users, upserts each user,
//! then upserts that user's event window. Only the initial user fetch is
//! fatal; every per-user failure is logged, counted and skipped.

use std::sync::Arc;

use chrono::Utc;
use futures::StreamExt;
use futures::stream;
use tracing::{debug, info, instrument, warn};

use se_core::{
    LocalStore, LocalUser, RemoteDirectoryClient, RemoteEvent, RemoteUser, SyncConfig, SyncOutcome,
};

use crate::cancel::CancelSignal;
use crate::error::{Result, SyncError};

/// Per-pass tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    /// Events fetched per user
    pub event_window: usize,
    /// Users processed at once; 1 keeps the remote order
    pub concurrency: usize,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self::from(&SyncConfig::default())
    }
}

impl From<&SyncConfig> for SyncOptions {
    fn from(config: &SyncConfig) -> Self {
        Self {
            event_window: config.event_window,
            concurrency: config.concurrency.max(1),
        }
    }
}

enum UserWrite {
    Created,
    Updated,
}

/// Reconciles remote users and events into the local store
pub struct Reconciler {
    directory: Arc<dyn RemoteDirectoryClient>,
    store: Arc<dyn LocalStore>,
    options: SyncOptions,
}

impl Reconciler {
    pub fn new(
        directory: Arc<dyn RemoteDirectoryClient>,
        store: Arc<dyn LocalStore>,
        options: SyncOptions,
    ) -> Self {
        Self {
            directory,
            store,
            options,
        }
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// Run one full pass
    pub async fn run(&self, sample_size: usize) -> Result<SyncOutcome> {
        self.run_with_cancel(sample_size, &CancelSignal::never()).await
    }

    /// Run one pass, starting no new user once `cancel` fires
    #[instrument(skip(self, cancel))]
    pub async fn run_with_cancel(
        &self,
        sample_size: usize,
        cancel: &CancelSignal,
    ) -> Result<SyncOutcome> {
        if sample_size == 0 {
            return Err(SyncError::InvalidSampleSize);
        }

        info!("Starting sync pass (sample size {})", sample_size);
        let users = self.directory.fetch_users(sample_size).await?;
        info!("Fetched {} remote users", users.len());

        let mut outcome = SyncOutcome::default();
        let mut passes = stream::iter(users)
            .map(|user| async move {
                if cancel.is_cancelled() {
                    return None;
                }
                Some(self.sync_user(user).await)
            })
            .buffer_unordered(self.options.concurrency);

        while let Some(partial) = passes.next().await {
            match partial {
                Some(partial) => accumulate(&mut outcome, &partial),
                None => outcome.cancelled = true,
            }
        }

        if outcome.cancelled {
            warn!("Sync pass cancelled before all users were processed");
        }

        outcome.total_users_in_store = self.store.count_users()?;
        outcome.total_events_in_store = self.store.count_events()?;

        info!(
            users_created = outcome.users_created,
            users_updated = outcome.users_updated,
            users_skipped = outcome.users_skipped,
            users_failed = outcome.users_failed,
            events_synced = outcome.events_synced,
            events_updated = outcome.events_updated,
            event_fetch_failures = outcome.event_fetch_failures,
            "Sync pass finished: {} users, {} events in store",
            outcome.total_users_in_store,
            outcome.total_events_in_store
        );
        Ok(outcome)
    }

    /// Everything that happens for one remote user. Never fails.
    async fn sync_user(&self, user: RemoteUser) -> SyncOutcome {
        let mut outcome = SyncOutcome::default();

        if !user.has_remote_id() {
            warn!(display_name = %user.display_name, "Skipping remote user without id");
            outcome.users_skipped = 1;
            return outcome;
        }

        let local = match self.write_user(&user) {
            Ok((local, UserWrite::Created)) => {
                outcome.users_created = 1;
                local
            }
            Ok((local, UserWrite::Updated)) => {
                outcome.users_updated = 1;
                local
            }
            Err(e) => {
                warn!(remote_id = %user.remote_id, "Failed to store user: {}", e);
                outcome.users_failed = 1;
                return outcome;
            }
        };

        let events = match self
            .directory
            .fetch_user_events(&user.remote_id, self.options.event_window)
            .await
        {
            Ok(events) => events,
            Err(e) => {
                warn!(remote_id = %user.remote_id, "Failed to fetch events: {}", e);
                outcome.event_fetch_failures = 1;
                return outcome;
            }
        };

        let (valid, blank): (Vec<RemoteEvent>, Vec<RemoteEvent>) =
            events.into_iter().partition(RemoteEvent::has_remote_id);
        for event in &blank {
            warn!(remote_id = %user.remote_id, subject = %event.subject, "Skipping event without id");
        }
        outcome.events_skipped = blank.len() as u64;

        if valid.is_empty() {
            return outcome;
        }

        match self.store.upsert_events(&local.id, &valid, Utc::now()) {
            Ok(batch) => {
                debug!(
                    remote_id = %user.remote_id,
                    "Stored events: {} created, {} updated",
                    batch.created,
                    batch.updated
                );
                outcome.events_synced = batch.created;
                outcome.events_updated = batch.updated;
            }
            Err(e) => {
                warn!(remote_id = %user.remote_id, "Failed to store events: {}", e);
                outcome.event_fetch_failures = 1;
            }
        }

        outcome
    }

    /// Insert or update by remote id. A lost insert race becomes an update.
    fn write_user(&self, user: &RemoteUser) -> se_core::Result<(LocalUser, UserWrite)> {
        let now = Utc::now();

        if let Some(existing) = self.store.find_user_by_remote_id(&user.remote_id)? {
            self.store.update_user(&existing.id, user, now)?;
            return Ok((existing, UserWrite::Updated));
        }

        match self.store.insert_user(user, now) {
            Ok(created) => Ok((created, UserWrite::Created)),
            Err(e) if e.is_conflict() => {
                debug!(remote_id = %user.remote_id, "Insert raced with another pass, updating instead");
                let existing = self
                    .store
                    .find_user_by_remote_id(&user.remote_id)?
                    .ok_or(e)?;
                self.store.update_user(&existing.id, user, now)?;
                Ok((existing, UserWrite::Updated))
            }
            Err(e) => Err(e),
        }
    }
}

fn accumulate(total: &mut SyncOutcome, part: &SyncOutcome) {
    total.users_created += part.users_created;
    total.users_updated += part.users_updated;
    total.users_skipped += part.users_skipped;
    total.users_failed += part.users_failed;
    total.events_synced += part.events_synced;
    total.events_updated += part.events_updated;
    total.events_skipped += part.events_skipped;
    total.event_fetch_failures += part.event_fetch_failures;
}
