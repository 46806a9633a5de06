//! Runtime configuration
//!
//! Values resolve in priority order: explicit override (CLI flag), then the
//! environment (a `.env` file is loaded by the binary), then compiled defaults.

use crate::error::{RetailError, Result};
use std::path::PathBuf;
use std::time::Duration;

pub const SOURCE_PATH_VAR: &str = "RETAIL_SOURCE_PATH";
pub const WAREHOUSE_PATH_VAR: &str = "RETAIL_WAREHOUSE_PATH";
pub const CACHE_TTL_VAR: &str = "RETAIL_CACHE_TTL_SECS";
pub const FORECAST_PERIODS_VAR: &str = "RETAIL_FORECAST_PERIODS";

const DEFAULT_SOURCE_PATH: &str = "data/Global-Superstore.csv";
const DEFAULT_WAREHOUSE_PATH: &str = "data/retail_warehouse.db";
const DEFAULT_CACHE_TTL_SECS: u64 = 3600;
const DEFAULT_FORECAST_PERIODS: usize = 3;

#[derive(Debug, Clone)]
pub struct DashboardConfig {
    /// Flat transactional dataset (CSV with header row)
    pub source_path: PathBuf,

    /// SQLite file holding the star schema
    pub warehouse_path: PathBuf,

    /// Query cache expiry; zero disables caching
    pub cache_ttl: Duration,

    /// Months projected by the forecast view
    pub forecast_periods: usize,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            source_path: PathBuf::from(DEFAULT_SOURCE_PATH),
            warehouse_path: PathBuf::from(DEFAULT_WAREHOUSE_PATH),
            cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            forecast_periods: DEFAULT_FORECAST_PERIODS,
        }
    }
}

impl DashboardConfig {
    /// Build a configuration from the process environment, falling back to defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`DashboardConfig::from_env`] but reads variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(path) = lookup(SOURCE_PATH_VAR) {
            config.source_path = PathBuf::from(path);
        }
        if let Some(path) = lookup(WAREHOUSE_PATH_VAR) {
            config.warehouse_path = PathBuf::from(path);
        }
        if let Some(raw) = lookup(CACHE_TTL_VAR) {
            let secs = parse_number::<u64>(CACHE_TTL_VAR, &raw)?;
            config.cache_ttl = Duration::from_secs(secs);
        }
        if let Some(raw) = lookup(FORECAST_PERIODS_VAR) {
            config.forecast_periods = parse_number::<usize>(FORECAST_PERIODS_VAR, &raw)?;
        }

        Ok(config)
    }

    pub fn with_source_path(mut self, path: Option<PathBuf>) -> Self {
        if let Some(path) = path {
            self.source_path = path;
        }
        self
    }

    pub fn with_warehouse_path(mut self, path: Option<PathBuf>) -> Self {
        if let Some(path) = path {
            self.warehouse_path = path;
        }
        self
    }

    pub fn with_cache_ttl_secs(mut self, secs: Option<u64>) -> Self {
        if let Some(secs) = secs {
            self.cache_ttl = Duration::from_secs(secs);
        }
        self
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| RetailError::Config(format!("{} must be a non-negative integer, got {:?}", key, raw)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_when_environment_is_empty() {
        let config = DashboardConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.source_path, PathBuf::from(DEFAULT_SOURCE_PATH));
        assert_eq!(config.warehouse_path, PathBuf::from(DEFAULT_WAREHOUSE_PATH));
        assert_eq!(config.cache_ttl, Duration::from_secs(3600));
        assert_eq!(config.forecast_periods, 3);
    }

    #[test]
    fn test_environment_overrides_and_cli_wins() {
        let env: HashMap<&str, &str> = [
            (WAREHOUSE_PATH_VAR, "/tmp/env.db"),
            (CACHE_TTL_VAR, "0"),
        ]
        .into_iter()
        .collect();

        let config = DashboardConfig::from_lookup(|k| env.get(k).map(|v| v.to_string()))
            .unwrap()
            .with_warehouse_path(Some(PathBuf::from("/tmp/cli.db")));

        assert_eq!(config.warehouse_path, PathBuf::from("/tmp/cli.db"));
        assert_eq!(config.cache_ttl, Duration::ZERO);
    }

    #[test]
    fn test_invalid_ttl_is_rejected() {
        let result = DashboardConfig::from_lookup(|k| {
            (k == CACHE_TTL_VAR).then(|| "an hour".to_string())
        });
        assert!(matches!(result, Err(RetailError::Config(_))));
    }
}
