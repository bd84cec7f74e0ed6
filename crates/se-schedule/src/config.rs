//! Schedule configuration
//!
//! Jobs are read from a TOML file:
//!
//! ```toml
//! [[schedules]]
//! name = "nightly-sync"
//! cron = "0 0 2 * * *"
//! job = "sync"
//! sample_size = 200
//! ```

use cron::Schedule as CronSchedule;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, ScheduleError};

/// Work a scheduled task performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Sync,
    Metrics,
    Volumetry,
    Cleanup,
}

impl JobKind {
    /// Retries after a failed run when the task sets none
    pub fn default_retry_attempts(self) -> u32 {
        match self {
            JobKind::Cleanup => 3,
            _ => 2,
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            JobKind::Sync => "sync",
            JobKind::Metrics => "metrics",
            JobKind::Volumetry => "volumetry",
            JobKind::Cleanup => "cleanup",
        };
        f.write_str(name)
    }
}

/// Full schedule
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ScheduleConfig {
    #[serde(default)]
    pub schedules: Vec<ScheduleTask>,
}

/// One scheduled job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleTask {
    pub name: String,

    /// Six-field cron with seconds, e.g. `"0 0 * * * *"` = hourly
    pub cron: String,

    pub job: JobKind,

    /// Users per sync pass (sync only)
    #[serde(default)]
    pub sample_size: Option<usize>,

    #[serde(default)]
    pub retry_attempts: Option<u32>,

    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl ScheduleTask {
    pub fn new(name: impl Into<String>, cron: impl Into<String>, job: JobKind) -> Self {
        Self {
            name: name.into(),
            cron: cron.into(),
            job,
            sample_size: None,
            retry_attempts: None,
            enabled: true,
        }
    }

    pub fn schedule(&self) -> Result<CronSchedule> {
        parse_cron(&self.cron).map_err(|e| ScheduleError::CronParse {
            job: self.name.clone(),
            message: e.to_string(),
        })
    }
}

impl ScheduleConfig {
    /// Load from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: ScheduleConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Look in the usual places; an absent file means the built-in jobs
    pub fn load_default() -> anyhow::Result<Self> {
        let paths = ["schedule.toml", "config/schedule.toml"];

        for path in &paths {
            if Path::new(path).exists() {
                return Self::from_file(path);
            }
        }

        Ok(Self::builtin())
    }

    /// Hourly sync, volumetry twice a day, nightly cleanup
    pub fn builtin() -> Self {
        Self {
            schedules: vec![
                ScheduleTask::new("hourly-sync", "0 0 * * * *", JobKind::Sync),
                ScheduleTask::new("volumetry", "0 30 6,18 * * *", JobKind::Volumetry),
                ScheduleTask::new("nightly-cleanup", "0 0 3 * * *", JobKind::Cleanup),
            ],
        }
    }

    /// Every enabled job must have a valid cron expression
    pub fn validate(&self) -> Result<()> {
        for task in self.enabled_tasks() {
            task.schedule()?;
        }
        Ok(())
    }

    pub fn enabled_tasks(&self) -> Vec<&ScheduleTask> {
        self.schedules.iter().filter(|t| t.enabled).collect()
    }
}

/// Parse a cron expression ("sec min hour day month weekday")
pub fn parse_cron(cron_expr: &str) -> std::result::Result<CronSchedule, cron::error::Error> {
    cron_expr.parse::<CronSchedule>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_toml() {
        let toml = r#"
[[schedules]]
name = "nightly-sync"
cron = "0 0 2 * * *"
job = "sync"
sample_size = 50

[[schedules]]
name = "cleanup"
cron = "0 0 3 * * *"
job = "cleanup"
enabled = false
"#;
        let config: ScheduleConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.schedules.len(), 2);
        assert_eq!(config.schedules[0].job, JobKind::Sync);
        assert_eq!(config.schedules[0].sample_size, Some(50));
        assert!(config.schedules[0].enabled);
        assert_eq!(config.enabled_tasks().len(), 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_job_rejected() {
        let toml = r#"
[[schedules]]
name = "mystery"
cron = "0 0 2 * * *"
job = "reindex"
"#;
        assert!(toml::from_str::<ScheduleConfig>(toml).is_err());
    }

    #[test]
    fn test_invalid_cron_rejected() {
        let config = ScheduleConfig {
            schedules: vec![ScheduleTask::new("broken", "every day", JobKind::Metrics)],
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ScheduleError::CronParse { ref job, .. } if job == "broken"));
    }

    #[test]
    fn test_parse_cron() {
        assert!(parse_cron("0 0 9 * * *").is_ok());
        assert!(parse_cron("invalid").is_err());
    }

    #[test]
    fn test_builtin_jobs_are_valid() {
        let config = ScheduleConfig::builtin();
        assert!(config.validate().is_ok());
        assert!(config.schedules.iter().any(|t| t.job == JobKind::Cleanup));
    }

    #[test]
    fn test_default_retry_budget() {
        assert_eq!(JobKind::Sync.default_retry_attempts(), 2);
        assert_eq!(JobKind::Cleanup.default_retry_attempts(), 3);
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schedule.toml");
        std::fs::write(
            &path,
            "[[schedules]]\nname = \"metrics\"\ncron = \"0 */15 * * * *\"\njob = \"metrics\"\n",
        )
        .unwrap();

        let config = ScheduleConfig::from_file(&path).unwrap();
        assert_eq!(config.schedules[0].job, JobKind::Metrics);

        std::fs::write(&path, "[[schedules]]\nname = \"bad\"\ncron = \"nope\"\njob = \"sync\"\n")
            .unwrap();
        assert!(ScheduleConfig::from_file(&path).is_err());
    }
}
