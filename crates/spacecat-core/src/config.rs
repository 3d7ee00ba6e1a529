use std::time::Duration;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, SpacecatError};

pub const DEFAULT_CACHE_RELEASE_SECS: i64 = 90_000; // 25 h, one sweep plus slack
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 86_400;
pub const DEFAULT_STALE_AFTER_SECS: i64 = 300;
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 5;
pub const DEFAULT_NOTIFICATION_BUFFER: usize = 256;

/// Top-level config (spacecat.toml + SPACECAT_* env overrides).
///
/// Nested keys are separated by a double underscore in the environment,
/// e.g. `SPACECAT_AUTOMATION__CACHE_RELEASE_SECS=3600`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpacecatConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub automation: AutomationConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
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

/// Scheduler tuning shared by the reminder and event schedulers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationConfig {
    /// Look-ahead horizon in seconds. Items due further out than this are not
    /// held in memory until a later sweep. Negative means unbounded.
    #[serde(default = "default_cache_release_secs")]
    pub cache_release_secs: i64,
    /// How often the schedulers re-read the store for newly-due items.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// One-shot items more than this many seconds overdue are dropped instead
    /// of fired late. Negative fires them regardless of lateness.
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: i64,
    /// Delay before a wait-task retries a failed dispatch.
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
    /// Capacity of the notification channel between the core and the bot layer.
    #[serde(default = "default_notification_buffer")]
    pub notification_buffer: usize,
}

impl AutomationConfig {
    /// The cache window, or `None` when unbounded.
    pub fn cache_window(&self) -> Option<i64> {
        (self.cache_release_secs >= 0).then_some(self.cache_release_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    /// The stale-drop threshold, or `None` when late items always fire.
    pub fn stale_after(&self) -> Option<i64> {
        (self.stale_after_secs >= 0).then_some(self.stale_after_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            cache_release_secs: DEFAULT_CACHE_RELEASE_SECS,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            stale_after_secs: default_stale_after_secs(),
            retry_delay_secs: DEFAULT_RETRY_DELAY_SECS,
            notification_buffer: DEFAULT_NOTIFICATION_BUFFER,
        }
    }
}

/// Per-user / per-guild quotas. Enforced by the command layer before it
/// creates records; the repositories themselves never check them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_max_reminders_per_user")]
    pub max_reminders_per_user: usize,
    #[serde(default = "default_max_events_per_guild")]
    pub max_events_per_guild: usize,
    #[serde(default = "default_max_actions_per_event")]
    pub max_actions_per_event: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_reminders_per_user: default_max_reminders_per_user(),
            max_events_per_guild: default_max_events_per_guild(),
            max_actions_per_event: default_max_actions_per_event(),
        }
    }
}

fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.spacecat/spacecat.db", home)
}
fn default_cache_release_secs() -> i64 {
    DEFAULT_CACHE_RELEASE_SECS
}
fn default_sweep_interval_secs() -> u64 {
    DEFAULT_SWEEP_INTERVAL_SECS
}
fn default_stale_after_secs() -> i64 {
    DEFAULT_STALE_AFTER_SECS
}
fn default_retry_delay_secs() -> u64 {
    DEFAULT_RETRY_DELAY_SECS
}
fn default_notification_buffer() -> usize {
    DEFAULT_NOTIFICATION_BUFFER
}
fn default_max_reminders_per_user() -> usize {
    5
}
fn default_max_events_per_guild() -> usize {
    10
}
fn default_max_actions_per_event() -> usize {
    15
}

impl SpacecatConfig {
    /// Load config from a TOML file with SPACECAT_* env var overrides.
    ///
    /// Falls back to `~/.spacecat/spacecat.toml` when no path is given. A
    /// missing file is not an error; every key has a default.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);
        debug!(path = %path, "loading config");

        Self::figment(&path)
            .extract()
            .map_err(|e| SpacecatError::Config(e.to_string()))
    }

    fn figment(path: &str) -> Figment {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("SPACECAT_").split("__"))
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.spacecat/spacecat.toml", home)
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn missing_file_yields_defaults() {
        Jail::expect_with(|jail| {
            let path = jail.directory().join("absent.toml");
            let config = SpacecatConfig::load(path.to_str()).expect("load");
            assert_eq!(config.automation.cache_window(), Some(DEFAULT_CACHE_RELEASE_SECS));
            assert_eq!(config.automation.stale_after(), Some(300));
            assert_eq!(config.limits.max_actions_per_event, 15);
            Ok(())
        });
    }

    #[test]
    fn toml_and_env_are_merged() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "spacecat.toml",
                r#"
                [database]
                path = "/tmp/bot.db"

                [automation]
                cache_release_secs = -1
                retry_delay_secs = 2
                stale_after_secs = -1

                [limits]
                max_events_per_guild = 3
                "#,
            )?;
            jail.set_env("SPACECAT_LIMITS__MAX_REMINDERS_PER_USER", "9");

            let config = SpacecatConfig::load(Some("spacecat.toml")).expect("load");
            assert_eq!(config.database.path, "/tmp/bot.db");
            assert_eq!(config.automation.cache_window(), None);
            assert_eq!(config.automation.retry_delay(), Duration::from_secs(2));
            assert_eq!(config.automation.stale_after(), None);
            assert_eq!(config.limits.max_events_per_guild, 3);
            assert_eq!(config.limits.max_reminders_per_user, 9);
            Ok(())
        });
    }
}
