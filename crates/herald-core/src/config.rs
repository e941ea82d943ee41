use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_TICK_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_MAX_CONCURRENT_POSTS: usize = 4;
/// Must stay above [`HeraldConfig::staged_publish_budget_secs`] (a carousel waits
/// out two readiness budgets back to back) or staged publishes hit the deadline
/// before the poller gives up.
pub const DEFAULT_TARGET_TIMEOUT_SECS: u64 = 900;
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_POLL_MAX_ATTEMPTS: u32 = 60; // ~5 minutes at the default interval
pub const DEFAULT_GRAPH_BASE_URL: &str = "https://graph.facebook.com/v19.0";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Top-level config (herald.toml + HERALD_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HeraldConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub readiness: ReadinessConfig,
    #[serde(default)]
    pub graph: GraphConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between ticks. Minute granularity is the norm.
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,
    /// Upper bound on posts published in parallel within one tick.
    #[serde(default = "default_max_concurrent_posts")]
    pub max_concurrent_posts: usize,
    /// Wall-clock deadline for a single target's publish attempt.
    #[serde(default = "default_target_timeout")]
    pub target_timeout_secs: u64,
}

impl SchedulerConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs.max(1))
    }

    pub fn target_timeout(&self) -> Duration {
        Duration::from_secs(self.target_timeout_secs)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: DEFAULT_TICK_INTERVAL_SECS,
            max_concurrent_posts: DEFAULT_MAX_CONCURRENT_POSTS,
            target_timeout_secs: DEFAULT_TARGET_TIMEOUT_SECS,
        }
    }
}

/// Container readiness polling (asynchronous media platforms).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessConfig {
    #[serde(default = "default_poll_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_poll_attempts")]
    pub max_attempts: u32,
}

impl ReadinessConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            max_attempts: DEFAULT_POLL_MAX_ATTEMPTS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    #[serde(default = "default_graph_base_url")]
    pub facebook_base_url: String,
    #[serde(default = "default_graph_base_url")]
    pub instagram_base_url: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            facebook_base_url: default_graph_base_url(),
            instagram_base_url: default_graph_base_url(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

fn default_tick_interval() -> u64 {
    DEFAULT_TICK_INTERVAL_SECS
}
fn default_max_concurrent_posts() -> usize {
    DEFAULT_MAX_CONCURRENT_POSTS
}
fn default_target_timeout() -> u64 {
    DEFAULT_TARGET_TIMEOUT_SECS
}
fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}
fn default_poll_attempts() -> u32 {
    DEFAULT_POLL_MAX_ATTEMPTS
}
fn default_graph_base_url() -> String {
    DEFAULT_GRAPH_BASE_URL.to_string()
}
fn default_request_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.herald/herald.db", home)
}

impl HeraldConfig {
    /// Load config from a TOML file with HERALD_* env var overrides.
    ///
    /// Nested keys use a double underscore: `HERALD_SCHEDULER__TICK_INTERVAL_SECS=30`.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        Self::extract(
            Figment::from(Serialized::defaults(HeraldConfig::default()))
                .merge(Toml::file(&path))
                .merge(Env::prefixed("HERALD_").split("__")),
        )
    }

    /// Parse an inline TOML document on top of the defaults.
    pub fn from_toml_str(toml: &str) -> crate::error::Result<Self> {
        Self::extract(
            Figment::from(Serialized::defaults(HeraldConfig::default())).merge(Toml::string(toml)),
        )
    }

    fn extract(figment: Figment) -> crate::error::Result<Self> {
        let config: HeraldConfig = figment
            .extract()
            .map_err(|e| crate::error::HeraldError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Worst-case wall time of a carousel publish: the children's readiness
    /// wait, then the parent's, plus request headroom for create and publish.
    pub fn staged_publish_budget_secs(&self) -> u64 {
        let wait = self
            .readiness
            .interval_secs
            .saturating_mul(u64::from(self.readiness.max_attempts));
        wait.saturating_mul(2)
            .saturating_add(self.graph.request_timeout_secs.saturating_mul(3))
    }

    /// `false` when an enabled target deadline would cut a staged publish short.
    pub fn deadline_covers_readiness(&self) -> bool {
        let deadline = self.scheduler.target_timeout_secs;
        deadline == 0 || deadline > self.staged_publish_budget_secs()
    }

    fn validate(&self) -> crate::error::Result<()> {
        if self.scheduler.max_concurrent_posts == 0 {
            return Err(crate::error::HeraldError::Config(
                "scheduler.max_concurrent_posts must be at least 1".to_string(),
            ));
        }
        if self.readiness.max_attempts == 0 {
            return Err(crate::error::HeraldError::Config(
                "readiness.max_attempts must be at least 1".to_string(),
            ));
        }
        if !self.deadline_covers_readiness() {
            tracing::warn!(
                target_timeout_secs = self.scheduler.target_timeout_secs,
                readiness_budget_secs = self.staged_publish_budget_secs(),
                "target deadline is shorter than the readiness budget; staged publishes may time out early"
            );
        }
        Ok(())
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.herald/herald.toml", home)
}
