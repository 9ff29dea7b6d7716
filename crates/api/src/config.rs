use std::str::FromStr;
use std::time::Duration;

use imgstudio_core::polling::{
    PollConfig, DEFAULT_BACKOFF_FACTOR, DEFAULT_INITIAL_INTERVAL_MS, DEFAULT_JITTER_FACTOR,
    DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_INTERVAL_MS,
};

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Time allowed for in-flight requests after a shutdown signal (default: `30`).
    pub shutdown_timeout_secs: u64,
    /// How long finished or cancelled video jobs stay queryable (default: `3600`).
    pub job_retention_secs: u64,
    /// Schedule used for every tracked video operation.
    pub poll: PollConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                    | Default                 |
    /// |----------------------------|-------------------------|
    /// | `HOST`                     | `0.0.0.0`               |
    /// | `PORT`                     | `3000`                  |
    /// | `CORS_ORIGINS`             | `http://localhost:5173` |
    /// | `REQUEST_TIMEOUT_SECS`     | `30`                    |
    /// | `SHUTDOWN_TIMEOUT_SECS`    | `30`                    |
    /// | `JOB_RETENTION_SECS`       | `3600`                  |
    /// | `POLL_INITIAL_INTERVAL_MS` | `6000`                  |
    /// | `POLL_MAX_INTERVAL_MS`     | `60000`                 |
    /// | `POLL_BACKOFF_FACTOR`      | `1.2`                   |
    /// | `POLL_MAX_ATTEMPTS`        | `30`                    |
    /// | `POLL_JITTER_FACTOR`       | `0.2`                   |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = env_or("PORT", 3000);

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = env_or("REQUEST_TIMEOUT_SECS", 30);
        let shutdown_timeout_secs: u64 = env_or("SHUTDOWN_TIMEOUT_SECS", 30);
        let job_retention_secs: u64 = env_or("JOB_RETENTION_SECS", 3600);

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            shutdown_timeout_secs,
            job_retention_secs,
            poll: poll_config_from_env(),
        }
    }
}

/// Build the polling schedule from `POLL_*` variables.
///
/// Panics at startup on an unparsable or inconsistent schedule.
pub fn poll_config_from_env() -> PollConfig {
    let config = PollConfig::default()
        .with_initial_interval(Duration::from_millis(env_or(
            "POLL_INITIAL_INTERVAL_MS",
            DEFAULT_INITIAL_INTERVAL_MS,
        )))
        .with_max_interval(Duration::from_millis(env_or(
            "POLL_MAX_INTERVAL_MS",
            DEFAULT_MAX_INTERVAL_MS,
        )))
        .with_backoff_factor(env_or("POLL_BACKOFF_FACTOR", DEFAULT_BACKOFF_FACTOR))
        .with_max_attempts(env_or("POLL_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS))
        .with_jitter_factor(env_or("POLL_JITTER_FACTOR", DEFAULT_JITTER_FACTOR));

    config
        .validate()
        .unwrap_or_else(|e| panic!("Invalid polling configuration: {e}"));
    config
}

fn env_or<T>(name: &str, default: T) -> T
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .unwrap_or_else(|e| panic!("{name} has an invalid value '{raw}': {e}")),
        Err(_) => default,
    }
}
