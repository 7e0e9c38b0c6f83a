//! Core data types for the tick-to-minute pipeline.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Compact day format used in file names, bucket keys and the store.
pub const DAY_FORMAT: &str = "%Y%m%d";

/// Time-of-day format used by tick rows and session sections.
pub const TIME_FORMAT: &str = "%H:%M:%S";

/// Canonical timestamp format written to the store.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A calendar date on which the market is open.
///
/// Displays as `YYYYMMDD` so that string order equals chronological order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TradingDay(NaiveDate);

impl TradingDay {
    /// Wrap a date.
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    /// Underlying calendar date.
    pub fn date(&self) -> NaiveDate {
        self.0
    }

    /// File name of this day's tick source.
    pub fn tick_file_name(&self) -> String {
        format!("{}.csv.gz", self)
    }
}

impl fmt::Display for TradingDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(DAY_FORMAT))
    }
}

impl FromStr for TradingDay {
    type Err = Error;

    /// Accepts `YYYYMMDD` and `YYYY-MM-DD`.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        NaiveDate::parse_from_str(s, DAY_FORMAT)
            .or_else(|_| NaiveDate::parse_from_str(s, "%Y-%m-%d"))
            .map(TradingDay)
            .map_err(|e| Error::calendar(format!("invalid trading day {s:?}: {e}")))
    }
}

/// Minute-bucket key: action day followed by the minute, e.g. `2024010309:01:00`.
///
/// Keys of one trading day sort chronologically as plain strings.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MinuteKey(String);

impl MinuteKey {
    /// Build a key from an action day and an `HH:MM:SS` update time.
    ///
    /// Seconds are truncated to zero. Returns `None` when the update time is
    /// too short to carry an `HH:MM:` prefix.
    pub fn from_update_time(action_day: &str, update_time: &str) -> Option<Self> {
        let minute = update_time.get(0..6)?;
        Some(Self(format!("{action_day}{minute}00")))
    }

    /// Raw key text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Bucket time of day, if the key carries a parseable one.
    pub fn time_of_day(&self) -> Option<NaiveTime> {
        let len = self.0.len();
        let tail = self.0.get(len.checked_sub(8)?..)?;
        NaiveTime::parse_from_str(tail, TIME_FORMAT).ok()
    }

    /// Convert to a timestamp; the key must be `YYYYMMDDHH:MM:SS`.
    pub fn to_datetime(&self) -> Result<NaiveDateTime> {
        NaiveDateTime::parse_from_str(&self.0, "%Y%m%d%H:%M:%S")
            .map_err(|e| Error::timestamp(format!("{:?}: {e}", self.0)))
    }
}

impl From<&str> for MinuteKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for MinuteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single tick row from the exchange feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tick {
    /// Instrument id (e.g. "rb2405").
    pub instrument: String,
    /// Trading day as reported in the row.
    pub trading_day: String,
    /// Action day the tick is attributed to.
    pub action_day: String,
    /// Update time, `HH:MM:SS`.
    pub update_time: String,
    /// Millisecond part of the update time.
    pub update_millis: u32,
    /// Last traded price.
    pub last_price: f64,
    /// Cumulative volume for the day.
    pub volume: i64,
    /// Open interest.
    pub open_interest: f64,
}

/// 1-minute bar as built from ticks, volume still cumulative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinuteBar {
    /// Minute bucket.
    pub key: MinuteKey,
    /// Open price.
    pub open: f64,
    /// High price.
    pub high: f64,
    /// Low price.
    pub low: f64,
    /// Close price.
    pub close: f64,
    /// Cumulative day volume last observed in this minute.
    pub volume: i64,
    /// Open interest last observed in this minute.
    pub open_interest: f64,
}

impl MinuteBar {
    /// Start a bar from the first tick of its minute.
    pub fn open_with(key: MinuteKey, tick: &Tick) -> Self {
        Self {
            key,
            open: tick.last_price,
            high: tick.last_price,
            low: tick.last_price,
            close: tick.last_price,
            volume: tick.volume,
            open_interest: tick.open_interest,
        }
    }

    /// Fold a later tick of the same minute into the bar.
    pub fn update(&mut self, tick: &Tick) {
        self.high = self.high.max(tick.last_price);
        self.low = self.low.min(tick.last_price);
        self.close = tick.last_price;
        self.volume = tick.volume;
        self.open_interest = tick.open_interest;
    }

    /// Merge a later bar with the same key into this one.
    pub fn absorb(&mut self, later: &MinuteBar) {
        self.high = self.high.max(later.high);
        self.low = self.low.min(later.low);
        self.close = later.close;
        self.volume = self.volume.max(later.volume);
        self.open_interest = later.open_interest;
    }

    /// No price movement inside the minute.
    #[inline]
    pub fn is_flat(&self) -> bool {
        self.high == self.low
    }
}

/// Minute bar ready for persistence; volume is traded during this minute only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedBar {
    /// Minute bucket.
    pub key: MinuteKey,
    /// Open price.
    pub open: f64,
    /// High price.
    pub high: f64,
    /// Low price.
    pub low: f64,
    /// Close price.
    pub close: f64,
    /// Volume traded in this minute (always positive).
    pub volume: i64,
    /// Open interest at the end of the minute.
    pub open_interest: f64,
}

impl NormalizedBar {
    /// Build from an aggregated bar and its volume delta.
    pub fn from_bar(bar: &MinuteBar, volume: i64) -> Self {
        Self {
            key: bar.key.clone(),
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume,
            open_interest: bar.open_interest,
        }
    }
}

/// All normalized bars of one trading day, per instrument.
#[derive(Debug, Clone, PartialEq)]
pub struct DayResult {
    /// Trading day the bars belong to.
    pub trading_day: TradingDay,
    /// Bars per instrument, each sequence strictly increasing by key.
    pub bars: BTreeMap<String, Vec<NormalizedBar>>,
}

impl DayResult {
    /// Create an empty result for a day.
    pub fn new(trading_day: TradingDay) -> Self {
        Self {
            trading_day,
            bars: BTreeMap::new(),
        }
    }

    /// Total number of bars across instruments.
    pub fn bar_count(&self) -> usize {
        self.bars.values().map(Vec::len).sum()
    }

    /// Number of instruments with at least one bar.
    pub fn instrument_count(&self) -> usize {
        self.bars.values().filter(|b| !b.is_empty()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tick(price: f64, volume: i64) -> Tick {
        Tick {
            instrument: "rb2405".to_string(),
            trading_day: "20240103".to_string(),
            action_day: "20240103".to_string(),
            update_time: "09:00:01".to_string(),
            update_millis: 500,
            last_price: price,
            volume,
            open_interest: 1000.0,
        }
    }

    #[test]
    fn test_trading_day_formats() {
        let a: TradingDay = "20240103".parse().unwrap();
        let b: TradingDay = "2024-01-03".parse().unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "20240103");
        assert_eq!(a.tick_file_name(), "20240103.csv.gz");
        assert!("20241301".parse::<TradingDay>().is_err());
        assert!("0103".parse::<TradingDay>().is_err());
    }

    #[test]
    fn test_minute_key_truncates_seconds() {
        let key = MinuteKey::from_update_time("20240103", "09:01:59").unwrap();
        assert_eq!(key.as_str(), "2024010309:01:00");
        assert_eq!(
            key.time_of_day(),
            Some(NaiveTime::from_hms_opt(9, 1, 0).unwrap())
        );
        assert_eq!(
            key.to_datetime().unwrap().format(DATETIME_FORMAT).to_string(),
            "2024-01-03 09:01:00"
        );
    }

    #[test]
    fn test_minute_key_rejects_short_time() {
        assert!(MinuteKey::from_update_time("20240103", "9:1").is_none());
    }

    #[test]
    fn test_minute_key_bad_day_is_malformed() {
        let key = MinuteKey::from_update_time("2024x103", "09:01:00").unwrap();
        assert!(matches!(
            key.to_datetime(),
            Err(Error::TimestampMalformed(_))
        ));
    }

    #[test]
    fn test_bar_update_keeps_range() {
        let key = MinuteKey::from("2024010309:00:00");
        let mut bar = MinuteBar::open_with(key, &tick(100.0, 10));
        bar.update(&tick(102.0, 15));
        bar.update(&tick(99.0, 18));
        assert_eq!(bar.open, 100.0);
        assert_eq!(bar.high, 102.0);
        assert_eq!(bar.low, 99.0);
        assert_eq!(bar.close, 99.0);
        assert_eq!(bar.volume, 18);
        assert!(!bar.is_flat());
    }
}
