//! Event retention

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::info;

use se_core::LocalStore;

/// Deletes events whose start lies beyond the retention horizon
pub struct RetentionPruner {
    store: Arc<dyn LocalStore>,
    horizon: Duration,
}

impl RetentionPruner {
    pub fn new(store: Arc<dyn LocalStore>, horizon_days: u32) -> Self {
        Self {
            store,
            horizon: Duration::days(i64::from(horizon_days)),
        }
    }

    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.horizon
    }

    /// Delete events starting before `now - horizon`
    pub fn prune(&self, now: DateTime<Utc>) -> se_core::Result<usize> {
        let cutoff = self.cutoff(now);
        let removed = self.store.delete_events_before(cutoff)?;
        info!("Retention removed {} events starting before {}", removed, cutoff.to_rfc3339());
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::at;
    use se_core::{RemoteEvent, RemoteUser, SqliteStore};

    #[test]
    fn test_prune_respects_horizon() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let user = store.insert_user(&RemoteUser::new("u1", "Alice"), at(1, 8)).unwrap();
        let now = at(31, 12);
        let events = [
            RemoteEvent::new("old", "u1", "Term start", now - Duration::days(45), now - Duration::days(45)),
            RemoteEvent::new("edge", "u1", "Exactly 30 days", now - Duration::days(30), now - Duration::days(30)),
            RemoteEvent::new("recent", "u1", "Last week", now - Duration::days(7), now - Duration::days(7)),
            RemoteEvent::new("future", "u1", "Next week", now + Duration::days(7), now + Duration::days(7)),
        ];
        store.upsert_events(&user.id, &events, now).unwrap();

        let pruner = RetentionPruner::new(store.clone(), 30);
        assert_eq!(pruner.prune(now).unwrap(), 1);

        let left: Vec<_> = store
            .list_user_events(&user.id)
            .unwrap()
            .into_iter()
            .map(|e| e.remote_id)
            .collect();
        assert_eq!(left, vec!["edge", "recent", "future"]);
    }

    #[test]
    fn test_prune_empty_store() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let pruner = RetentionPruner::new(store, 30);
        assert_eq!(pruner.prune(Utc::now()).unwrap(), 0);
    }

    #[test]
    fn test_cutoff() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let pruner = RetentionPruner::new(store, 14);
        assert_eq!(pruner.cutoff(at(20, 0)), at(6, 0));
    }
}
