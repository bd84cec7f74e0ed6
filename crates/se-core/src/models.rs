//! Data models shared by the sync engine, the store and the API

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Snapshot of a directory user as returned by the remote service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteUser {
    /// Stable external key. May be blank when the remote omitted it.
    pub remote_id: String,
    pub display_name: String,
    pub email: String,
    #[serde(default)]
    pub job_title: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
}

impl RemoteUser {
    /// Create a remote user with just an id and a display name
    pub fn new(remote_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            remote_id: remote_id.into(),
            display_name: display_name.into(),
            email: String::new(),
            job_title: None,
            department: None,
        }
    }

    /// Set the email address
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = email.into();
        self
    }

    /// Set the job title
    pub fn with_job_title(mut self, job_title: impl Into<String>) -> Self {
        self.job_title = Some(job_title.into());
        self
    }

    /// Set the department
    pub fn with_department(mut self, department: impl Into<String>) -> Self {
        self.department = Some(department.into());
        self
    }

    /// A record without a usable remote identifier cannot be matched
    pub fn has_remote_id(&self) -> bool {
        !self.remote_id.trim().is_empty()
    }
}

/// Snapshot of a calendar event owned by a remote user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteEvent {
    pub remote_id: String,
    /// Remote identifier of the owning user
    pub owner_remote_id: String,
    pub subject: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub all_day: bool,
}

impl RemoteEvent {
    /// Create a new remote event
    pub fn new(
        remote_id: impl Into<String>,
        owner_remote_id: impl Into<String>,
        subject: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Self {
        Self {
            remote_id: remote_id.into(),
            owner_remote_id: owner_remote_id.into(),
            subject: subject.into(),
            start,
            end,
            location: None,
            all_day: false,
        }
    }

    /// Set the location
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Mark the event as all-day
    pub fn all_day(mut self) -> Self {
        self.all_day = true;
        self
    }

    pub fn has_remote_id(&self) -> bool {
        !self.remote_id.trim().is_empty()
    }
}

/// A user row in the local store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalUser {
    /// Generated local primary key
    pub id: String,
    /// `None` only for manually provisioned accounts
    pub remote_id: Option<String>,
    pub display_name: String,
    pub email: String,
    pub job_title: Option<String>,
    pub department: Option<String>,
    pub last_synced: DateTime<Utc>,
    pub active: bool,
}

/// An event row in the local store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalEvent {
    pub id: String,
    /// Unique per owning user, not globally
    pub remote_id: String,
    pub subject: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub location: Option<String>,
    pub all_day: bool,
    /// Owning local user id
    pub user_id: String,
    pub last_synced: DateTime<Utc>,
}

/// Aggregate result of one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOutcome {
    pub users_created: u64,
    pub users_updated: u64,
    /// Remote users without an identifier
    pub users_skipped: u64,
    /// Users whose store write failed
    pub users_failed: u64,
    /// Events created in this pass. Updates are counted separately.
    pub events_synced: u64,
    pub events_updated: u64,
    /// Remote events without an identifier
    pub events_skipped: u64,
    /// Users whose event window could not be fetched or written
    pub event_fetch_failures: u64,
    pub total_users_in_store: u64,
    pub total_events_in_store: u64,
    /// True when a cancellation signal stopped the pass early
    pub cancelled: bool,
}

/// Read-only sampling report for observability
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    pub total_users: u64,
    pub total_events: u64,
    pub sampled_users: u64,
    pub sampled_users_with_events: u64,
    pub error: Option<String>,
    pub duration_ms: u64,
}

/// Timed metrics report with a success flag
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumetryResult {
    #[serde(flatten)]
    pub metrics: Metrics,
    pub success: bool,
}

impl From<Metrics> for VolumetryResult {
    fn from(metrics: Metrics) -> Self {
        Self {
            success: metrics.error.is_none(),
            metrics,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_blank_remote_id_detected() {
        assert!(!RemoteUser::new("", "Ghost").has_remote_id());
        assert!(!RemoteUser::new("   ", "Ghost").has_remote_id());
        assert!(RemoteUser::new("u1", "Alice").has_remote_id());
    }

    #[test]
    fn test_sync_outcome_json_shape() {
        let outcome = SyncOutcome {
            users_created: 1,
            total_users_in_store: 1,
            ..Default::default()
        };
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["usersCreated"], 1);
        assert_eq!(value["usersUpdated"], 0);
        assert_eq!(value["eventsSynced"], 0);
        assert_eq!(value["totalUsersInStore"], 1);
        assert_eq!(value["totalEventsInStore"], 0);
    }

    #[test]
    fn test_volumetry_result_flattens_metrics() {
        let result = VolumetryResult::from(Metrics {
            total_users: 12,
            error: None,
            duration_ms: 40,
            ..Default::default()
        });
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["totalUsers"], 12);
        assert_eq!(value["durationMs"], 40);
        assert_eq!(value["error"], json!(null));
        assert_eq!(value["success"], true);
    }

    #[test]
    fn test_volumetry_result_fails_with_error() {
        let result = VolumetryResult::from(Metrics {
            error: Some("directory unreachable".into()),
            ..Default::default()
        });
        assert!(!result.success);
    }
}
