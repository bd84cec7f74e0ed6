//! HTTP API handlers

use axum::{
    Json,
    extract::{Path, Query, State},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use se_core::{
    LocalEvent, LocalUser, Metrics, Page, RemoteUser, SyncOutcome, UserQuery, VolumetryResult,
};

use crate::error::{ApiError, Result};
use crate::server::AppState;

// ============================================================================
// Request/Response types
// ============================================================================

/// Query string of the manual sync trigger
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncParams {
    pub sample_size: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DirectoryStatus {
    Connected,
    Unreachable,
}

/// Response of `GET /api/users/sync-status`
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub database_users: u64,
    pub database_events: u64,
    pub last_sync: Option<DateTime<Utc>>,
    pub directory_status: DirectoryStatus,
    pub timestamp: DateTime<Utc>,
}

/// Upper bound on `maxUsers` for the user sample
pub const MAX_SAMPLE_USERS: usize = 100;

/// Query string of `GET /api/volumetry/users/sample`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserSampleParams {
    pub max_users: usize,
}

impl Default for UserSampleParams {
    fn default() -> Self {
        Self { max_users: 20 }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserSample {
    pub count: usize,
    pub users: Vec<RemoteUser>,
}

// ============================================================================
// Handler functions
// ============================================================================

/// Health check endpoint
pub async fn health() -> &'static str {
    "OK"
}

/// Run one reconciliation pass now
pub async fn sync_users(
    State(state): State<AppState>,
    Query(params): Query<SyncParams>,
) -> Result<Json<SyncOutcome>> {
    let sample_size = params.sample_size.unwrap_or(state.default_sample_size);
    info!("Manual sync requested (sample size {})", sample_size);

    let outcome = state.reconciler.run(sample_size).await?;
    Ok(Json(outcome))
}

/// Store totals plus a cheap reachability probe of the directory
pub async fn sync_status(State(state): State<AppState>) -> Result<Json<SyncStatus>> {
    let directory_status = match state.directory.count_users().await {
        Ok(_) => DirectoryStatus::Connected,
        Err(e) => {
            warn!("Directory probe failed: {}", e);
            DirectoryStatus::Unreachable
        }
    };

    Ok(Json(SyncStatus {
        database_users: state.store.count_users()?,
        database_events: state.store.count_events()?,
        last_sync: state.store.last_synced()?,
        directory_status,
        timestamp: Utc::now(),
    }))
}

/// Paginated users ordered by display name
pub async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Result<Json<Page<LocalUser>>> {
    debug!("List users: {:?}", query);
    Ok(Json(state.store.list_users(&query)?))
}

/// A user's events ordered by start time
pub async fn user_events(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<LocalEvent>>> {
    if state.store.get_user(&id)?.is_none() {
        return Err(ApiError::NotFound(format!("user {}", id)));
    }
    Ok(Json(state.store.list_user_events(&id)?))
}

pub async fn volumetry_analyze(State(state): State<AppState>) -> Json<VolumetryResult> {
    Json(state.collector.analyze_volumetry().await)
}

pub async fn volumetry_metrics(State(state): State<AppState>) -> Json<Metrics> {
    Json(state.collector.collect_metrics().await)
}

/// Remote users as the directory returns them. Nothing is stored.
pub async fn volumetry_user_sample(
    State(state): State<AppState>,
    Query(params): Query<UserSampleParams>,
) -> Result<Json<UserSample>> {
    if params.max_users == 0 {
        return Err(ApiError::InvalidRequest("maxUsers must be positive".into()));
    }
    let limit = params.max_users.min(MAX_SAMPLE_USERS);
    let users = state.directory.fetch_users(limit).await?;
    Ok(Json(UserSample {
        count: users.len(),
        users,
    }))
}
