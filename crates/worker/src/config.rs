use std::time::Duration;

use repoupdater_db::config::{parse_var, ConfigError};
use repoupdater_db::DbConfig;

/// Worker configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3182`).
    pub port: u16,
    /// Seconds between enqueuer runs (default: `10`).
    pub sync_enqueue_interval_secs: u64,
    /// Also enqueue services owned by no user (default: `false`).
    pub sync_ignore_site_admin: bool,
    pub db: DbConfig,
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                      | Default   |
    /// |------------------------------|-----------|
    /// | `HOST`                       | `0.0.0.0` |
    /// | `PORT`                       | `3182`    |
    /// | `SYNC_ENQUEUE_INTERVAL_SECS` | `10`      |
    /// | `SYNC_IGNORE_SITE_ADMIN`     | `false`   |
    ///
    /// Database settings come from [`DbConfig::from_env`].
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port = parse_var("PORT", 3182)?;
        let sync_enqueue_interval_secs: u64 = parse_var("SYNC_ENQUEUE_INTERVAL_SECS", 10)?;
        let sync_ignore_site_admin = parse_var("SYNC_IGNORE_SITE_ADMIN", false)?;

        if sync_enqueue_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                name: "SYNC_ENQUEUE_INTERVAL_SECS",
                expected: "positive number of seconds",
                value: "0".to_string(),
            });
        }

        Ok(Self {
            host,
            port,
            sync_enqueue_interval_secs,
            sync_ignore_site_admin,
            db: DbConfig::from_env()?,
        })
    }

    pub fn sync_enqueue_interval(&self) -> Duration {
        Duration::from_secs(self.sync_enqueue_interval_secs)
    }
}
