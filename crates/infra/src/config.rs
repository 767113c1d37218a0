//! Environment-driven service configuration.

use std::path::PathBuf;
use std::time::Duration;

use smsreport_core::RetryPolicy;
use smsreport_observability::LogFormat;

use crate::jobs::WorkerConfig;

/// Invalid configuration value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: '{value}' ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Service configuration, read once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    /// Postgres URL; `None` runs on in-memory stores
    pub database_url: Option<String>,
    pub bind_addr: String,
    /// Flat directory for CSV artifacts
    pub reports_dir: PathBuf,
    pub max_concurrent_workers: usize,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub lease_duration: Duration,
    pub heartbeat_interval: Duration,
    pub sweep_interval: Duration,
    pub log_format: LogFormat,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            bind_addr: "0.0.0.0:8080".to_string(),
            reports_dir: PathBuf::from("reports"),
            max_concurrent_workers: 8,
            max_retries: 3,
            retry_base_delay: Duration::from_millis(500),
            lease_duration: Duration::from_secs(60),
            heartbeat_interval: Duration::from_secs(20),
            sweep_interval: Duration::from_secs(30),
            log_format: LogFormat::Json,
        }
    }
}

const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

impl ServiceConfig {
    /// Read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from an arbitrary variable lookup; unset or empty variables
    /// keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let config = Self {
            database_url: get("DATABASE_URL"),
            bind_addr: get("BIND_ADDR").unwrap_or(defaults.bind_addr),
            reports_dir: get("REPORTS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.reports_dir),
            max_concurrent_workers: parse_number(
                "MAX_CONCURRENT_WORKERS",
                get("MAX_CONCURRENT_WORKERS"),
                defaults.max_concurrent_workers,
            )?,
            max_retries: parse_number("MAX_RETRIES", get("MAX_RETRIES"), defaults.max_retries)?,
            retry_base_delay: Duration::from_millis(parse_number(
                "RETRY_BASE_DELAY_MS",
                get("RETRY_BASE_DELAY_MS"),
                defaults.retry_base_delay.as_millis() as u64,
            )?),
            lease_duration: Duration::from_secs(parse_number(
                "LEASE_SECS",
                get("LEASE_SECS"),
                defaults.lease_duration.as_secs(),
            )?),
            heartbeat_interval: Duration::from_secs(parse_number(
                "HEARTBEAT_SECS",
                get("HEARTBEAT_SECS"),
                defaults.heartbeat_interval.as_secs(),
            )?),
            sweep_interval: Duration::from_secs(parse_number(
                "SWEEP_INTERVAL_SECS",
                get("SWEEP_INTERVAL_SECS"),
                defaults.sweep_interval.as_secs(),
            )?),
            log_format: parse_log_format(get("LOG_FORMAT"), defaults.log_format)?,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_workers == 0 {
            return Err(invalid("MAX_CONCURRENT_WORKERS", "0", "must be at least 1"));
        }
        if self.heartbeat_interval.is_zero() || self.sweep_interval.is_zero() {
            return Err(invalid(
                "HEARTBEAT_SECS/SWEEP_INTERVAL_SECS",
                "0",
                "intervals must be positive",
            ));
        }
        if self.heartbeat_interval >= self.lease_duration {
            return Err(invalid(
                "HEARTBEAT_SECS",
                &self.heartbeat_interval.as_secs().to_string(),
                "must be shorter than LEASE_SECS",
            ));
        }
        Ok(())
    }

    pub fn with_reports_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.reports_dir = dir.into();
        self
    }

    pub fn with_max_concurrent_workers(mut self, max: usize) -> Self {
        self.max_concurrent_workers = max;
        self
    }

    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::exponential(
            self.max_retries,
            self.retry_base_delay,
            MAX_RETRY_DELAY.max(self.retry_base_delay),
        )
    }

    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig::default()
            .with_retry_policy(self.retry_policy())
            .with_lease_duration(self.lease_duration)
            .with_heartbeat_interval(self.heartbeat_interval)
    }
}

fn invalid(var: &'static str, value: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_log_format(raw: Option<String>, default: LogFormat) -> Result<LogFormat, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => value
            .parse()
            .map_err(|_| invalid("LOG_FORMAT", &value, "expected json or pretty")),
    }
}

fn parse_number<T>(var: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|e: T::Err| invalid(var, &value, &e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k: &str| map.get(k).cloned()
    }

    #[test]
    fn empty_environment_gives_defaults() {
        let config = ServiceConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ServiceConfig::default());
        assert_eq!(config.database_url, None);
        assert_eq!(config.retry_policy().max_retries, 3);
    }

    #[test]
    fn variables_override_defaults() {
        let config = ServiceConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/sms"),
            ("MAX_CONCURRENT_WORKERS", "2"),
            ("MAX_RETRIES", "0"),
            ("LEASE_SECS", "10"),
            ("HEARTBEAT_SECS", "3"),
            ("LOG_FORMAT", "Pretty"),
        ]))
        .unwrap();

        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/sms"));
        assert_eq!(config.max_concurrent_workers, 2);
        assert_eq!(config.worker_config().retry_policy.max_retries, 0);
        assert_eq!(config.worker_config().lease_duration, Duration::from_secs(10));
        assert_eq!(config.log_format, LogFormat::Pretty);
    }

    #[test]
    fn unparseable_numbers_are_rejected() {
        let err = ServiceConfig::from_lookup(lookup(&[("MAX_RETRIES", "three")])).unwrap_err();
        let ConfigError::Invalid { var, value, .. } = err;
        assert_eq!(var, "MAX_RETRIES");
        assert_eq!(value, "three");
    }

    #[test]
    fn heartbeat_must_be_shorter_than_lease() {
        let err = ServiceConfig::from_lookup(lookup(&[
            ("LEASE_SECS", "5"),
            ("HEARTBEAT_SECS", "5"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("LEASE_SECS"));
    }

    #[test]
    fn unknown_log_format_is_rejected() {
        let err = ServiceConfig::from_lookup(lookup(&[("LOG_FORMAT", "xml")])).unwrap_err();
        let ConfigError::Invalid { var, value, .. } = err;
        assert_eq!(var, "LOG_FORMAT");
        assert_eq!(value, "xml");
    }
}
