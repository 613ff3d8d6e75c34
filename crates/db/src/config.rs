/// Database configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Postgres connection string.
    pub database_url: String,
    /// Pool size (default: `20`).
    pub max_connections: u32,
    /// Per-statement timeout in seconds, `0` disables it (default: `0`).
    pub statement_timeout_secs: u64,
}

impl DbConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                           | Default    |
    /// |-----------------------------------|------------|
    /// | `DATABASE_URL`                    | (required) |
    /// | `DATABASE_MAX_CONNECTIONS`        | `20`       |
    /// | `DATABASE_STATEMENT_TIMEOUT_SECS` | `0`        |
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url =
            std::env::var("DATABASE_URL").map_err(|_| ConfigError::Missing("DATABASE_URL"))?;

        let max_connections = parse_var("DATABASE_MAX_CONNECTIONS", 20)?;
        let statement_timeout_secs = parse_var("DATABASE_STATEMENT_TIMEOUT_SECS", 0)?;

        Ok(Self {
            database_url,
            max_connections,
            statement_timeout_secs,
        })
    }
}

/// Errors raised while reading configuration from the environment.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} must be a valid {expected}, got {value:?}")]
    Invalid {
        name: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// Parse an optional environment variable, falling back to `default`.
pub fn parse_var<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
            name,
            expected: std::any::type_name::<T>(),
            value,
        }),
        Err(_) => Ok(default),
    }
}
