//! Read-only directory sampling for volumetry reports

use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use se_core::{Metrics, MetricsConfig, RemoteDirectoryClient, VolumetryResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsOptions {
    /// Users sampled per report
    pub sample_users: usize,
    /// Events fetched per sampled user
    pub sample_events: usize,
}

impl Default for MetricsOptions {
    fn default() -> Self {
        Self::from(&MetricsConfig::default())
    }
}

impl From<&MetricsConfig> for MetricsOptions {
    fn from(config: &MetricsConfig) -> Self {
        Self {
            sample_users: config.sample_users,
            sample_events: config.sample_events,
        }
    }
}

/// Samples the remote directory without writing anything
pub struct MetricsCollector {
    directory: Arc<dyn RemoteDirectoryClient>,
    options: MetricsOptions,
}

impl MetricsCollector {
    pub fn new(directory: Arc<dyn RemoteDirectoryClient>, options: MetricsOptions) -> Self {
        Self { directory, options }
    }

    /// Count users and sample a few calendars. Failures land in `error`.
    pub async fn collect_metrics(&self) -> Metrics {
        let started = Instant::now();
        let mut metrics = Metrics::default();

        if let Err(message) = self.sample(&mut metrics).await {
            warn!("Metrics collection incomplete: {}", message);
            metrics.error = Some(message);
        }

        metrics.duration_ms = started.elapsed().as_millis() as u64;
        metrics
    }

    async fn sample(&self, metrics: &mut Metrics) -> Result<(), String> {
        metrics.total_users = self
            .directory
            .count_users()
            .await
            .map_err(|e| format!("user count failed: {e}"))?;

        let users = self
            .directory
            .fetch_users(self.options.sample_users)
            .await
            .map_err(|e| format!("user sample failed: {e}"))?;

        for user in users.iter().filter(|u| u.has_remote_id()) {
            metrics.sampled_users += 1;
            match self
                .directory
                .fetch_user_events(&user.remote_id, self.options.sample_events)
                .await
            {
                Ok(events) => {
                    metrics.total_events += events.len() as u64;
                    if !events.is_empty() {
                        metrics.sampled_users_with_events += 1;
                    }
                }
                Err(e) => {
                    warn!(remote_id = %user.remote_id, "Skipping user in metrics sample: {}", e);
                }
            }
        }

        Ok(())
    }

    /// [`Self::collect_metrics`] with wall-clock timing and a success flag
    pub async fn analyze_volumetry(&self) -> VolumetryResult {
        let started = Instant::now();
        let metrics = self.collect_metrics().await;
        let mut result = VolumetryResult::from(metrics);
        result.metrics.duration_ms = started.elapsed().as_millis() as u64;

        info!(
            total_users = result.metrics.total_users,
            total_events = result.metrics.total_events,
            success = result.success,
            "Volumetry analysis finished in {}ms",
            result.metrics.duration_ms
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeDirectory, event};
    use se_core::RemoteUser;

    fn collector(directory: FakeDirectory) -> MetricsCollector {
        MetricsCollector::new(Arc::new(directory), MetricsOptions::default())
    }

    fn school() -> FakeDirectory {
        FakeDirectory::new()
            .with_user(RemoteUser::new("u1", "Alice"))
            .with_user(RemoteUser::new("u2", "Bob"))
            .with_user(RemoteUser::new("u3", "Carol"))
            .with_events("u1", vec![event("e1", "u1", "Math"), event("e2", "u1", "Art")])
            .with_events("u2", vec![event("e3", "u2", "Chess club")])
    }

    #[tokio::test]
    async fn test_collect_metrics() {
        let metrics = collector(school()).collect_metrics().await;
        assert_eq!(metrics.total_users, 3);
        assert_eq!(metrics.sampled_users, 3);
        assert_eq!(metrics.total_events, 3);
        assert_eq!(metrics.sampled_users_with_events, 2);
        assert!(metrics.error.is_none());
    }

    #[tokio::test]
    async fn test_failing_user_is_excluded() {
        let metrics = collector(school().with_failing_events("u1")).collect_metrics().await;
        assert_eq!(metrics.total_events, 1);
        assert_eq!(metrics.sampled_users_with_events, 1);
        assert!(metrics.error.is_none());
    }

    #[tokio::test]
    async fn test_sample_is_bounded() {
        let options = MetricsOptions {
            sample_users: 1,
            sample_events: 1,
        };
        let collector = MetricsCollector::new(Arc::new(school()), options);
        let metrics = collector.collect_metrics().await;
        assert_eq!(metrics.sampled_users, 1);
        assert_eq!(metrics.total_events, 1);
    }

    #[tokio::test]
    async fn test_blank_users_not_sampled() {
        let directory = FakeDirectory::new()
            .with_user(RemoteUser::new("", "Ghost"))
            .with_user(RemoteUser::new("u1", "Alice"));
        let dir = Arc::new(directory);
        let metrics = MetricsCollector::new(dir.clone(), MetricsOptions::default())
            .collect_metrics()
            .await;
        assert_eq!(metrics.sampled_users, 1);
        assert_eq!(dir.event_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_count_failure_recorded() {
        let result = collector(school().with_failing_count()).analyze_volumetry().await;
        assert!(!result.success);
        assert!(result.metrics.error.unwrap().contains("user count failed"));
        assert_eq!(result.metrics.sampled_users, 0);
    }

    #[tokio::test]
    async fn test_sample_failure_keeps_partial_counts() {
        let metrics = collector(school().with_failing_users()).collect_metrics().await;
        assert_eq!(metrics.total_users, 3);
        assert!(metrics.error.unwrap().contains("user sample failed"));
    }

    #[tokio::test]
    async fn test_volumetry_success() {
        let result = collector(school()).analyze_volumetry().await;
        assert!(result.success);
        assert_eq!(result.metrics.total_users, 3);
    }
}
