//! Tick row decoding.
//!
//! Turns CSV rows of a tick file into [`Tick`]s keyed by minute bucket.
//! Numeric fields are parsed leniently: a malformed value becomes zero and is
//! counted in [`ReadStats::defaulted_fields`].

use std::io::Read;

use csv::StringRecord;
use tickmin_core::{Error, MinuteKey, Result, Tick};
use tracing::warn;

/// Column positions in a tick file row.
pub mod columns {
    pub const TRADING_DAY: usize = 0;
    pub const INSTRUMENT_ID: usize = 1;
    pub const UPDATE_TIME: usize = 2;
    pub const UPDATE_MILLISEC: usize = 3;
    pub const ACTION_DAY: usize = 4;
    pub const LAST_PRICE: usize = 11;
    pub const VOLUME: usize = 12;
    pub const OPEN_INTEREST: usize = 13;

    /// Fewest fields a usable row can have.
    pub const MIN_FIELDS: usize = OPEN_INTEREST + 1;
}

/// A decoded tick and its minute bucket.
#[derive(Debug, Clone)]
pub struct TickRow {
    /// Minute bucket of the tick.
    pub key: MinuteKey,
    /// The tick itself.
    pub tick: Tick,
}

/// Statistics about row decoding.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadStats {
    /// Data rows seen (header excluded).
    pub rows: u64,
    /// Rows that were skipped.
    pub skipped_rows: u64,
    /// Numeric fields that failed to parse and were read as zero.
    pub defaulted_fields: u64,
}

/// Why a row was skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowRejection {
    /// Fewer fields than the consumed columns need.
    TooShort(usize),
    /// Update time lacks an `HH:MM:` prefix.
    BadUpdateTime(String),
}

/// Decode one row into a keyed tick.
pub fn normalize_row(
    record: &StringRecord,
    stats: &mut ReadStats,
) -> std::result::Result<TickRow, RowRejection> {
    use columns::*;

    if record.len() < MIN_FIELDS {
        return Err(RowRejection::TooShort(record.len()));
    }
    let field = |i: usize| record.get(i).unwrap_or_default().trim();

    let update_time = field(UPDATE_TIME);
    let action_day = field(ACTION_DAY);
    let key = MinuteKey::from_update_time(action_day, update_time)
        .ok_or_else(|| RowRejection::BadUpdateTime(update_time.to_string()))?;

    let tick = Tick {
        instrument: field(INSTRUMENT_ID).to_string(),
        trading_day: field(TRADING_DAY).to_string(),
        action_day: action_day.to_string(),
        update_time: update_time.to_string(),
        update_millis: lenient(field(UPDATE_MILLISEC), stats),
        last_price: lenient(field(LAST_PRICE), stats),
        volume: lenient_volume(field(VOLUME), stats),
        open_interest: lenient(field(OPEN_INTEREST), stats),
    };
    Ok(TickRow { key, tick })
}

fn lenient<T: std::str::FromStr + Default>(s: &str, stats: &mut ReadStats) -> T {
    s.parse().unwrap_or_else(|_| {
        stats.defaulted_fields += 1;
        T::default()
    })
}

/// Cumulative volume; some feeds write it as a float (`1234.0`).
fn lenient_volume(s: &str, stats: &mut ReadStats) -> i64 {
    s.parse::<i64>()
        .ok()
        .or_else(|| s.parse::<f64>().ok().filter(|v| v.is_finite()).map(|v| v as i64))
        .unwrap_or_else(|| {
            stats.defaulted_fields += 1;
            0
        })
}

/// Streams keyed ticks out of a CSV tick file, skipping its header line.
///
/// Row-level problems are logged and skipped; an I/O failure of the
/// underlying stream (e.g. a corrupt gzip member) ends iteration with an error.
pub struct TickReader<R: Read> {
    records: csv::StringRecordsIntoIter<R>,
    stats: ReadStats,
    failed: bool,
}

impl<R: Read> TickReader<R> {
    /// Wrap a decompressed CSV stream.
    pub fn new(reader: R) -> Self {
        let csv = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);
        Self {
            records: csv.into_records(),
            stats: ReadStats::default(),
            failed: false,
        }
    }

    /// Decoding statistics so far.
    pub fn stats(&self) -> &ReadStats {
        &self.stats
    }
}

impl<R: Read> Iterator for TickReader<R> {
    type Item = Result<TickRow>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        loop {
            let record = match self.records.next()? {
                Ok(record) => record,
                Err(e) if matches!(e.kind(), csv::ErrorKind::Io(_)) => {
                    self.failed = true;
                    return Some(Err(Error::source_read(e.to_string())));
                }
                Err(e) => {
                    self.stats.rows += 1;
                    self.stats.skipped_rows += 1;
                    warn!(error = %e, "can not read tick row");
                    continue;
                }
            };

            self.stats.rows += 1;
            match normalize_row(&record, &mut self.stats) {
                Ok(row) => return Some(Ok(row)),
                Err(reason) => {
                    self.stats.skipped_rows += 1;
                    warn!(
                        line = record.position().map(|p| p.line()).unwrap_or_default(),
                        ?reason,
                        "skipping tick row"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const HEADER: &str = "TradingDay,InstrumentID,UpdateTime,UpdateMillisec,ActionDay,\
LowerLimitPrice,UpperLimitPrice,BidPrice1,AskPrice1,AskVolume1,BidVolume1,\
LastPrice,Volume,OpenInterest,Turnover,AveragePrice\n";

    fn row(inst: &str, time: &str, last: &str, vol: &str, oi: &str) -> String {
        format!(
            "20240103,{inst},{time},500,20240103,3500,3900,3700,3701,5,6,{last},{vol},{oi},1000000,3700.5\n"
        )
    }

    #[test]
    fn test_row_to_keyed_tick() {
        let data = format!("{HEADER}{}", row("rb2405", "09:01:59", "3700.5", "120", "45000"));
        let mut reader = TickReader::new(data.as_bytes());

        let tick_row = reader.next().unwrap().unwrap();
        assert_eq!(tick_row.key.as_str(), "2024010309:01:00");
        assert_eq!(tick_row.tick.instrument, "rb2405");
        assert_eq!(tick_row.tick.update_millis, 500);
        assert_relative_eq!(tick_row.tick.last_price, 3700.5);
        assert_eq!(tick_row.tick.volume, 120);
        assert_relative_eq!(tick_row.tick.open_interest, 45000.0);

        assert!(reader.next().is_none());
        assert_eq!(reader.stats().rows, 1);
        assert_eq!(reader.stats().skipped_rows, 0);
    }

    #[test]
    fn test_malformed_numbers_default_to_zero() {
        let data = format!("{HEADER}{}", row("rb2405", "09:00:01", "n/a", "", "45000"));
        let mut reader = TickReader::new(data.as_bytes());

        let tick_row = reader.next().unwrap().unwrap();
        assert_eq!(tick_row.tick.last_price, 0.0);
        assert_eq!(tick_row.tick.volume, 0);
        assert_eq!(reader.stats().defaulted_fields, 2);
    }

    #[test]
    fn test_float_volume_is_accepted() {
        let data = format!("{HEADER}{}", row("rb2405", "09:00:01", "3700", "120.0", "1"));
        let tick_row = TickReader::new(data.as_bytes()).next().unwrap().unwrap();
        assert_eq!(tick_row.tick.volume, 120);
    }

    #[test]
    fn test_bad_rows_are_skipped() {
        let data = format!(
            "{HEADER}20240103,rb2405,09:00:01\n{}{}",
            row("rb2405", "9:1", "3700", "10", "1"),
            row("rb2405", "09:02:00", "3701", "11", "1"),
        );
        let mut reader = TickReader::new(data.as_bytes());
        let rows: Vec<TickRow> = reader.by_ref().collect::<Result<_>>().unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].key.as_str(), "2024010309:02:00");
        assert_eq!(reader.stats().rows, 3);
        assert_eq!(reader.stats().skipped_rows, 2);
    }
}
