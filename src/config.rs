use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{DbRetryError, Result};

pub const ENV_RETRY_ATTEMPT: &str = "DB_RETRY_ATTEMPT";
pub const ENV_RETRY_DELAY: &str = "DB_RETRY_DELAY";

/// Main configuration structure for db-retry
#[derive(Debug, Clone)]
pub struct Config {
    pub retry: RetryConfig,
    pub database: DatabaseConfig,
}

/// Attempt count and delay applied to every transient error signature
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    pub attempt: u32,
    pub delay: Duration,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub pool: PoolConfig,
}

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_size: usize,
    pub timeout_seconds: u64,
    pub create_timeout_seconds: u64,
    pub recycle_timeout_seconds: u64,
}

impl Config {
    /// Load configuration from `.env` and the process environment.
    ///
    /// Retry settings have no defaults; a missing or malformed value is an
    /// error the caller should treat as fatal.
    pub fn load() -> Result<Self> {
        load_dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let retry = RetryConfig::from_lookup(&lookup)?;
        let mut database = DatabaseConfig::default();
        database.apply_overrides(&lookup);
        Ok(Self { retry, database })
    }
}

impl RetryConfig {
    /// Read `DB_RETRY_ATTEMPT` and `DB_RETRY_DELAY` from `.env` and the
    /// process environment
    pub fn from_env() -> Result<Self> {
        load_dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let attempt = required(&lookup, ENV_RETRY_ATTEMPT)?;
        let attempt = attempt.trim().parse::<u32>().map_err(|e| {
            DbRetryError::Config(format!("{ENV_RETRY_ATTEMPT}={attempt:?} is not a valid count: {e}"))
        })?;

        let delay = required(&lookup, ENV_RETRY_DELAY)?;
        let delay = parse_duration(&delay).map_err(|e| {
            DbRetryError::Config(format!("{ENV_RETRY_DELAY}={delay:?} is not a valid duration: {e}"))
        })?;

        Ok(Self { attempt, delay })
    }
}

impl DatabaseConfig {
    fn apply_overrides<F>(&mut self, lookup: &F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("DB_PATH") {
            self.path = PathBuf::from(path);
        }
        if let Some(size) = lookup("DB_POOL_SIZE") {
            match size.parse() {
                Ok(size) => self.pool.max_size = size,
                Err(_) => tracing::warn!("Ignoring invalid DB_POOL_SIZE: {}", size),
            }
        }
        if let Some(timeout) = lookup("DB_POOL_TIMEOUT_SECONDS") {
            match timeout.parse() {
                Ok(secs) => self.pool.timeout_seconds = secs,
                Err(_) => tracing::warn!("Ignoring invalid DB_POOL_TIMEOUT_SECONDS: {}", timeout),
            }
        }
    }

    /// Get pool wait timeout as Duration
    pub fn pool_timeout(&self) -> Duration {
        Duration::from_secs(self.pool.timeout_seconds)
    }

    /// Get pool create timeout as Duration
    pub fn pool_create_timeout(&self) -> Duration {
        Duration::from_secs(self.pool.create_timeout_seconds)
    }

    /// Get pool recycle timeout as Duration
    pub fn pool_recycle_timeout(&self) -> Duration {
        Duration::from_secs(self.pool.recycle_timeout_seconds)
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("db-retry.sqlite3"),
            pool: PoolConfig {
                max_size: 8,
                timeout_seconds: 5,
                create_timeout_seconds: 5,
                recycle_timeout_seconds: 5,
            },
        }
    }
}

fn load_dotenv() {
    match dotenvy::dotenv() {
        Ok(path) => tracing::info!("Loaded .env from: {}", path.display()),
        Err(e) if e.not_found() => tracing::debug!("No .env file found, using process environment"),
        Err(e) => tracing::warn!("Failed to load .env: {}", e),
    }
}

fn required<F>(lookup: &F, key: &str) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(DbRetryError::Config(format!(
            "required environment variable {key} is not set"
        ))),
    }
}

/// Parse a duration such as `300ms`, `1s`, `1.5s` or `1m30s`.
///
/// Units: `ns`, `us` (`µs`), `ms`, `s`, `m`, `h`. A bare `0` is allowed.
pub fn parse_duration(raw: &str) -> std::result::Result<Duration, String> {
    let s = raw.trim();
    if s == "0" {
        return Ok(Duration::ZERO);
    }
    if s.is_empty() {
        return Err("empty duration".to_string());
    }

    let mut nanos = 0f64;
    let mut rest = s;
    while !rest.is_empty() {
        let num_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let (number, tail) = rest.split_at(num_end);
        if number.is_empty() || number == "." {
            return Err(format!("expected a number in {s:?}"));
        }
        let value: f64 = number
            .parse()
            .map_err(|_| format!("invalid number {number:?} in {s:?}"))?;

        let unit_end = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, next) = tail.split_at(unit_end);
        let scale = match unit {
            "ns" => 1.0,
            "us" | "µs" | "μs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            "" => return Err(format!("missing unit in {s:?}")),
            other => return Err(format!("unknown unit {other:?} in {s:?}")),
        };
        nanos += value * scale;
        rest = next;
    }

    let nanos = nanos.round();
    if !nanos.is_finite() || nanos >= u64::MAX as f64 {
        return Err(format!("duration {s:?} is out of range"));
    }
    Ok(Duration::from_nanos(nanos as u64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn parses_durations() {
        assert_eq!(parse_duration("1s").unwrap(), Duration::from_secs(1));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("1m30s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("1.5s").unwrap(), Duration::from_millis(1500));
        assert_eq!(parse_duration("2h").unwrap(), Duration::from_secs(7200));
        assert_eq!(parse_duration("10us").unwrap(), Duration::from_micros(10));
        assert_eq!(parse_duration("0").unwrap(), Duration::ZERO);
    }

    #[test]
    fn rejects_bad_durations() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("5").is_err());
        assert!(parse_duration("5 seconds").is_err());
        assert!(parse_duration("s").is_err());
        assert!(parse_duration("-1s").is_err());
    }

    #[test]
    fn rejects_overflowing_durations() {
        let err = parse_duration("9999999999999h").unwrap_err();
        assert!(err.contains("out of range"));

        let err = RetryConfig::from_lookup(lookup_from(&[
            ("DB_RETRY_ATTEMPT", "3"),
            ("DB_RETRY_DELAY", "9999999999999h"),
        ]))
        .unwrap_err();
        assert!(matches!(err, DbRetryError::Config(_)));
    }

    #[test]
    fn retry_config_from_lookup() {
        let cfg = RetryConfig::from_lookup(lookup_from(&[
            ("DB_RETRY_ATTEMPT", "3"),
            ("DB_RETRY_DELAY", "1s"),
        ]))
        .unwrap();
        assert_eq!(cfg.attempt, 3);
        assert_eq!(cfg.delay, Duration::from_secs(1));
    }

    #[test]
    fn retry_config_requires_both_values() {
        let err = RetryConfig::from_lookup(lookup_from(&[("DB_RETRY_DELAY", "1s")])).unwrap_err();
        assert!(err.to_string().contains("DB_RETRY_ATTEMPT"));

        let err = RetryConfig::from_lookup(lookup_from(&[("DB_RETRY_ATTEMPT", "3")])).unwrap_err();
        assert!(err.to_string().contains("DB_RETRY_DELAY"));
    }

    #[test]
    fn retry_config_rejects_malformed_values() {
        let err = RetryConfig::from_lookup(lookup_from(&[
            ("DB_RETRY_ATTEMPT", "three"),
            ("DB_RETRY_DELAY", "1s"),
        ]))
        .unwrap_err();
        assert!(matches!(err, DbRetryError::Config(_)));

        let err = RetryConfig::from_lookup(lookup_from(&[
            ("DB_RETRY_ATTEMPT", "3"),
            ("DB_RETRY_DELAY", "soon"),
        ]))
        .unwrap_err();
        assert!(matches!(err, DbRetryError::Config(_)));
    }

    #[test]
    fn database_overrides_apply() {
        let cfg = Config::from_lookup(lookup_from(&[
            ("DB_RETRY_ATTEMPT", "2"),
            ("DB_RETRY_DELAY", "100ms"),
            ("DB_PATH", "/tmp/app.db"),
            ("DB_POOL_SIZE", "not-a-number"),
            ("DB_POOL_TIMEOUT_SECONDS", "9"),
        ]))
        .unwrap();
        assert_eq!(cfg.database.path, PathBuf::from("/tmp/app.db"));
        assert_eq!(cfg.database.pool.max_size, 8);
        assert_eq!(cfg.database.pool_timeout(), Duration::from_secs(9));
    }
}
