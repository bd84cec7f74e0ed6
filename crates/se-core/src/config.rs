//! Configuration management
//!
//! Settings are resolved in this order:
//! 1. Environment variables
//! 2. `school-events.toml`
//! 3. Defaults
//!
//! `${VAR_NAME}` inside the config file is replaced with the environment value.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::Error;

/// Default config file looked up in the working directory
pub const CONFIG_FILE: &str = "school-events.toml";

/// Microsoft Graph connection settings
#[derive(Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    pub tenant_id: String,
    pub client_id: String,
    #[serde(skip_serializing)]
    pub client_secret: String,

    /// Graph API base, without version
    #[serde(default = "default_graph_endpoint")]
    pub graph_endpoint: String,

    /// Identity platform base used for token requests
    #[serde(default = "default_authority_endpoint")]
    pub authority_endpoint: String,

    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Retries for throttled or transient Graph responses
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl fmt::Debug for GraphConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphConfig")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("graph_endpoint", &self.graph_endpoint)
            .field("authority_endpoint", &self.authority_endpoint)
            .field("api_version", &self.api_version)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            tenant_id: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            graph_endpoint: default_graph_endpoint(),
            authority_endpoint: default_authority_endpoint(),
            api_version: default_api_version(),
            max_retries: default_max_retries(),
        }
    }
}

impl GraphConfig {
    /// True when tenant, client id and secret are all present
    pub fn is_complete(&self) -> bool {
        !self.tenant_id.is_empty() && !self.client_id.is_empty() && !self.client_secret.is_empty()
    }
}

/// Reconciliation pass settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Users fetched per pass
    #[serde(default = "default_sample_size")]
    pub sample_size: usize,

    /// Events fetched per user
    #[serde(default = "default_event_window")]
    pub event_window: usize,

    /// Users processed at once
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Whole-pass retries after a fatal error (scheduled runs only)
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            sample_size: default_sample_size(),
            event_window: default_event_window(),
            concurrency: default_concurrency(),
            retry_attempts: default_retry_attempts(),
            retry_delay_secs: default_retry_delay_secs(),
        }
    }
}

/// Metrics sampling settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_users")]
    pub sample_users: usize,

    #[serde(default = "default_metrics_events")]
    pub sample_events: usize,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            sample_users: default_metrics_users(),
            sample_events: default_metrics_events(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Events starting more than this many days ago are deleted by cleanup
    #[serde(default = "default_horizon_days")]
    pub horizon_days: u32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            horizon_days: default_horizon_days(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// API key for HTTP API authentication
    pub key: Option<String>,

    /// Port for HTTP API server
    #[serde(default = "default_api_port")]
    pub port: u16,

    /// Allowed CORS origins. Defaults to localhost only when unset.
    #[serde(default)]
    pub allowed_origins: Option<Vec<String>>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            key: None,
            port: default_api_port(),
            allowed_origins: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

/// Scheduler settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub enabled: bool,

    /// Path to the job list (TOML)
    pub config_path: Option<String>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            config_path: None,
        }
    }
}

/// Main configuration for school-events
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub graph: GraphConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

fn default_graph_endpoint() -> String {
    "https://graph.microsoft.com".to_string()
}

fn default_authority_endpoint() -> String {
    "https://login.microsoftonline.com".to_string()
}

fn default_api_version() -> String {
    "v1.0".to_string()
}

fn default_max_retries() -> u32 {
    3
}

fn default_sample_size() -> usize {
    200
}

fn default_event_window() -> usize {
    180
}

fn default_concurrency() -> usize {
    1
}

fn default_retry_attempts() -> u32 {
    2
}

fn default_retry_delay_secs() -> u64 {
    30
}

fn default_metrics_users() -> usize {
    5
}

fn default_metrics_events() -> usize {
    5
}

fn default_horizon_days() -> u32 {
    30
}

fn default_api_port() -> u16 {
    3000
}

fn default_db_path() -> String {
    "data/school-events.db".to_string()
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_flag(value: &str) -> bool {
    value.to_lowercase() != "false"
}

impl Config {
    /// Replace `${VAR_NAME}` with the environment value (empty when unset)
    fn expand_env_vars(value: &str) -> String {
        let mut result = String::new();
        let mut chars = value.chars().peekable();

        while let Some(c) = chars.next() {
            if c == '$' && chars.peek() == Some(&'{') {
                chars.next();

                let mut var_name = String::new();
                for c in chars.by_ref() {
                    if c == '}' {
                        break;
                    }
                    var_name.push(c);
                }

                if let Ok(env_value) = std::env::var(&var_name) {
                    result.push_str(&env_value);
                }
            } else {
                result.push(c);
            }
        }

        result
    }

    /// Load from a TOML file, then apply environment overrides
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref();

        let toml_content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;

        let mut cfg = Self::from_toml_str(&toml_content)?;
        cfg.apply_env_overrides();
        Ok(cfg)
    }

    fn from_toml_str(content: &str) -> crate::Result<Self> {
        let expanded = Self::expand_env_vars(content);
        let toml: TomlConfig = toml::from_str(&expanded)
            .map_err(|e| Error::Config(format!("Failed to parse TOML: {}", e)))?;
        Ok(Self::from_toml_config(toml))
    }

    /// Load `./school-events.toml` if present, otherwise the environment only
    pub fn load() -> crate::Result<Self> {
        if Path::new(CONFIG_FILE).exists() {
            return Self::from_toml_file(CONFIG_FILE);
        }

        Self::from_env()
    }

    fn from_toml_config(toml: TomlConfig) -> Self {
        let graph = toml.graph.unwrap_or_default();
        let graph_config = GraphConfig {
            tenant_id: graph.tenant_id.unwrap_or_default(),
            client_id: graph.client_id.unwrap_or_default(),
            client_secret: graph.client_secret.unwrap_or_default(),
            graph_endpoint: graph.graph_endpoint.unwrap_or_else(default_graph_endpoint),
            authority_endpoint: graph
                .authority_endpoint
                .unwrap_or_else(default_authority_endpoint),
            api_version: graph.api_version.unwrap_or_else(default_api_version),
            max_retries: graph.max_retries.unwrap_or_else(default_max_retries),
        };

        let sync = toml.sync.unwrap_or_default();
        let sync_config = SyncConfig {
            sample_size: sync.sample_size.unwrap_or_else(default_sample_size),
            event_window: sync.event_window.unwrap_or_else(default_event_window),
            concurrency: sync.concurrency.unwrap_or_else(default_concurrency),
            retry_attempts: sync.retry_attempts.unwrap_or_else(default_retry_attempts),
            retry_delay_secs: sync.retry_delay_secs.unwrap_or_else(default_retry_delay_secs),
        };

        let metrics = toml.metrics.unwrap_or_default();
        let metrics_config = MetricsConfig {
            sample_users: metrics.sample_users.unwrap_or_else(default_metrics_users),
            sample_events: metrics.sample_events.unwrap_or_else(default_metrics_events),
        };

        let retention = toml.retention.unwrap_or_default();
        let retention_config = RetentionConfig {
            horizon_days: retention.horizon_days.unwrap_or_else(default_horizon_days),
        };

        let api = toml.api.unwrap_or_default();
        let api_config = ApiConfig {
            key: api.key.filter(|k| !k.is_empty()),
            port: api.port.unwrap_or_else(default_api_port),
            allowed_origins: api.allowed_origins,
        };

        let database = toml.database.unwrap_or_default();
        let database_config = DatabaseConfig {
            db_path: database.db_path.unwrap_or_else(default_db_path),
        };

        let scheduler = toml.scheduler.unwrap_or_default();
        let scheduler_config = SchedulerConfig {
            enabled: scheduler.enabled.unwrap_or(true),
            config_path: scheduler.config_path,
        };

        Config {
            graph: graph_config,
            sync: sync_config,
            metrics: metrics_config,
            retention: retention_config,
            api: api_config,
            database: database_config,
            scheduler: scheduler_config,
        }
    }

    /// Environment variables win over the file
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("GRAPH_TENANT_ID") {
            self.graph.tenant_id = v;
        }
        if let Ok(v) = std::env::var("GRAPH_CLIENT_ID") {
            self.graph.client_id = v;
        }
        if let Ok(v) = std::env::var("GRAPH_CLIENT_SECRET") {
            self.graph.client_secret = v;
        }
        if let Ok(v) = std::env::var("GRAPH_ENDPOINT") {
            if !v.is_empty() {
                self.graph.graph_endpoint = v;
            }
        }
        if let Ok(v) = std::env::var("GRAPH_AUTHORITY") {
            if !v.is_empty() {
                self.graph.authority_endpoint = v;
            }
        }

        if let Some(n) = env_parse("SYNC_SAMPLE_SIZE") {
            self.sync.sample_size = n;
        }
        if let Some(n) = env_parse("SYNC_EVENT_WINDOW") {
            self.sync.event_window = n;
        }
        if let Some(n) = env_parse("SYNC_CONCURRENCY") {
            self.sync.concurrency = n;
        }
        if let Some(n) = env_parse("SYNC_RETRY_ATTEMPTS") {
            self.sync.retry_attempts = n;
        }

        if let Some(n) = env_parse("RETENTION_DAYS") {
            self.retention.horizon_days = n;
        }

        if let Ok(key) = std::env::var("API_KEY") {
            self.api.key = Some(key).filter(|k| !k.is_empty());
        }
        if let Some(port) = env_parse("API_PORT") {
            self.api.port = port;
        }
        if let Ok(origins) = std::env::var("API_ALLOWED_ORIGINS") {
            self.api.allowed_origins = Some(parse_list(&origins));
        }

        if let Ok(path) = std::env::var("DB_PATH") {
            self.database.db_path = path;
        }

        if let Ok(enabled) = std::env::var("SCHEDULE_ENABLED") {
            self.scheduler.enabled = parse_flag(&enabled);
        }
        if let Ok(path) = std::env::var("SCHEDULE_CONFIG_PATH") {
            self.scheduler.config_path = Some(path);
        }
    }

    /// Load configuration from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut cfg = Self::default();
        cfg.apply_env_overrides();
        Ok(cfg)
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> crate::Result<()> {
        if self.sync.sample_size == 0 {
            return Err(Error::Config("sync.sample_size must be positive".to_string()));
        }
        if self.sync.concurrency == 0 {
            return Err(Error::Config("sync.concurrency must be positive".to_string()));
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

// ============================================================================
// TOML file layout
// ============================================================================

#[derive(Debug, Deserialize)]
struct TomlConfig {
    graph: Option<TomlGraphConfig>,
    sync: Option<TomlSyncConfig>,
    metrics: Option<TomlMetricsConfig>,
    retention: Option<TomlRetentionConfig>,
    api: Option<TomlApiConfig>,
    database: Option<TomlDatabaseConfig>,
    scheduler: Option<TomlSchedulerConfig>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlGraphConfig {
    tenant_id: Option<String>,
    client_id: Option<String>,
    client_secret: Option<String>,
    graph_endpoint: Option<String>,
    authority_endpoint: Option<String>,
    api_version: Option<String>,
    max_retries: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlSyncConfig {
    sample_size: Option<usize>,
    event_window: Option<usize>,
    concurrency: Option<usize>,
    retry_attempts: Option<u32>,
    retry_delay_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlMetricsConfig {
    sample_users: Option<usize>,
    sample_events: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlRetentionConfig {
    horizon_days: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlApiConfig {
    key: Option<String>,
    port: Option<u16>,
    allowed_origins: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlDatabaseConfig {
    db_path: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlSchedulerConfig {
    enabled: Option<bool>,
    config_path: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.sync.sample_size, 200);
        assert_eq!(config.sync.event_window, 180);
        assert_eq!(config.sync.concurrency, 1);
        assert_eq!(config.sync.retry_attempts, 2);
        assert_eq!(config.metrics.sample_users, 5);
        assert_eq!(config.metrics.sample_events, 5);
        assert_eq!(config.retention.horizon_days, 30);
        assert_eq!(config.api.port, 3000);
        assert_eq!(config.database.db_path, "data/school-events.db");
        assert_eq!(config.graph.api_version, "v1.0");
        assert!(config.scheduler.enabled);
        assert!(!config.graph.is_complete());
    }

    #[test]
    fn test_expand_env_vars() {
        unsafe {
            std::env::set_var("SCHOOL_EVENTS_TEST_VAR", "test_value");
        }

        let result = Config::expand_env_vars("prefix_${SCHOOL_EVENTS_TEST_VAR}_suffix");
        assert_eq!(result, "prefix_test_value_suffix");

        let result = Config::expand_env_vars("prefix_${SCHOOL_EVENTS_NONEXISTENT}_suffix");
        assert_eq!(result, "prefix__suffix");

        unsafe {
            std::env::remove_var("SCHOOL_EVENTS_TEST_VAR");
        }
    }

    #[test]
    fn test_expand_env_vars_passthrough() {
        assert_eq!(Config::expand_env_vars("no_vars_here"), "no_vars_here");
        assert_eq!(Config::expand_env_vars("${}_content"), "_content");
        assert_eq!(Config::expand_env_vars("cost $5"), "cost $5");
    }

    #[test]
    fn test_toml_parsing() {
        let toml_content = r#"
[graph]
tenant_id = "tenant"
client_id = "client"
client_secret = "secret"
max_retries = 5

[sync]
sample_size = 50
event_window = 30
concurrency = 4

[metrics]
sample_users = 3

[retention]
horizon_days = 14

[api]
port = 8080
key = "api_key"
allowed_origins = ["https://school.example"]

[database]
db_path = "/var/lib/school-events.db"

[scheduler]
enabled = false
config_path = "schedule.toml"
"#;

        let config = Config::from_toml_str(toml_content).unwrap();
        assert!(config.graph.is_complete());
        assert_eq!(config.graph.max_retries, 5);
        assert_eq!(config.graph.graph_endpoint, "https://graph.microsoft.com");
        assert_eq!(config.sync.sample_size, 50);
        assert_eq!(config.sync.event_window, 30);
        assert_eq!(config.sync.concurrency, 4);
        assert_eq!(config.sync.retry_attempts, 2);
        assert_eq!(config.metrics.sample_users, 3);
        assert_eq!(config.metrics.sample_events, 5);
        assert_eq!(config.retention.horizon_days, 14);
        assert_eq!(config.api.port, 8080);
        assert_eq!(config.api.key.as_deref(), Some("api_key"));
        assert_eq!(
            config.api.allowed_origins,
            Some(vec!["https://school.example".to_string()])
        );
        assert_eq!(config.database.db_path, "/var/lib/school-events.db");
        assert!(!config.scheduler.enabled);
        assert_eq!(config.scheduler.config_path.as_deref(), Some("schedule.toml"));
    }

    #[test]
    fn test_toml_expands_secret_from_env() {
        unsafe {
            std::env::set_var("SCHOOL_EVENTS_TEST_SECRET", "s3cr3t");
        }

        let config = Config::from_toml_str(
            "[graph]\nclient_secret = \"${SCHOOL_EVENTS_TEST_SECRET}\"\n",
        )
        .unwrap();
        assert_eq!(config.graph.client_secret, "s3cr3t");

        unsafe {
            std::env::remove_var("SCHOOL_EVENTS_TEST_SECRET");
        }
    }

    #[test]
    fn test_empty_api_key_means_open() {
        let config = Config::from_toml_str("[api]\nkey = \"\"\n").unwrap();
        assert!(config.api.key.is_none());
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = Config::from_toml_str("[sync\nsample_size = 1").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_validate_rejects_zero_sample() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());
        config.sync.sample_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let graph = GraphConfig {
            client_secret: "hunter2".to_string(),
            ..Default::default()
        };
        let debug = format!("{:?}", graph);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_parse_list_and_flag() {
        assert_eq!(parse_list("a, b,,c "), vec!["a", "b", "c"]);
        assert!(parse_flag("true"));
        assert!(parse_flag("1"));
        assert!(!parse_flag("FALSE"));
    }
}
