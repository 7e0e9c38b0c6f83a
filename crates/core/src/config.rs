//! Configuration for the tick-to-minute pipeline.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

/// Environment variable for the tick file directory.
pub const ENV_TICK_CSV_PATH: &str = "TICK_CSV_PATH";
/// Environment variable for the store location.
pub const ENV_DATABASE_URL: &str = "TICKMIN_DATABASE_URL";
/// Environment variable for the trading calendar file.
pub const ENV_CALENDAR: &str = "TICKMIN_CALENDAR";
/// Environment variable for the trading-time-section file.
pub const ENV_TRADING_TIME: &str = "TICKMIN_TRADING_TIME";
/// Environment variable for the live-tail retry interval.
pub const ENV_RETRY_INTERVAL_MS: &str = "TICKMIN_RETRY_INTERVAL_MS";
/// Environment variable for backfill concurrency.
pub const ENV_WORKERS: &str = "TICKMIN_WORKERS";

/// Main configuration for the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding one `<YYYYMMDD>.csv.gz` tick file per trading day.
    pub tick_csv_path: PathBuf,
    /// SQLite database file for minute bars.
    pub database_url: String,
    /// Trading calendar CSV (`date,isTradingDay`).
    pub calendar_path: PathBuf,
    /// Trading-time-section CSV (`instrumentClass,effectiveDate,sectionsJSON`).
    pub trading_time_path: PathBuf,
    /// Wait before retrying a day whose tick file is not there yet.
    pub retry_interval_ms: u64,
    /// Number of parallel backfill workers (0 = auto).
    pub workers: u32,
    /// How long a writer waits on a locked database.
    pub busy_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tick_csv_path: PathBuf::from("/csv"),
            database_url: "tickmin.db".to_string(),
            calendar_path: PathBuf::from("calendar.csv"),
            trading_time_path: PathBuf::from("tradingtime.csv"),
            retry_interval_ms: 10 * 60 * 1000, // 10 minutes
            workers: 0,
            busy_timeout_ms: 30_000,
        }
    }
}

impl Config {
    /// Defaults overlaid with whatever is set in the environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Defaults overlaid with values from `lookup`; empty values are ignored.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(v) = get(ENV_TICK_CSV_PATH) {
            config.tick_csv_path = PathBuf::from(v);
        }
        if let Some(v) = get(ENV_DATABASE_URL) {
            config.database_url = v;
        }
        if let Some(v) = get(ENV_CALENDAR) {
            config.calendar_path = PathBuf::from(v);
        }
        if let Some(v) = get(ENV_TRADING_TIME) {
            config.trading_time_path = PathBuf::from(v);
        }
        if let Some(v) = get(ENV_RETRY_INTERVAL_MS) {
            config.retry_interval_ms = parse_number(ENV_RETRY_INTERVAL_MS, &v)?;
        }
        if let Some(v) = get(ENV_WORKERS) {
            config.workers = parse_number(ENV_WORKERS, &v)?;
        }

        Ok(config)
    }

    /// Retry interval as a duration.
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    /// Busy timeout as a duration.
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    /// Effective backfill concurrency, resolving 0 to the CPU count.
    pub fn effective_workers(&self) -> usize {
        match self.workers {
            0 => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            n => n as usize,
        }
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::config(format!("{key} must be a non-negative integer, got {value:?}")))
}
