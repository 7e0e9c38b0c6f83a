//! Minute bar store.
//!
//! SQLite table `future_min` holding one row per instrument and minute.
//! A trading day is always written as a whole: delete the day's rows, insert
//! the new ones, commit. Reprocessing a day therefore never duplicates rows.

use std::path::Path;
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use tickmin_core::{DayResult, Error, Result, TradingDay, DATETIME_FORMAT};
use tracing::{debug, info};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS future_min (
    "DateTime"     TEXT    NOT NULL,
    "Instrument"   TEXT    NOT NULL,
    "Open"         REAL    NOT NULL,
    "High"         REAL    NOT NULL,
    "Low"          REAL    NOT NULL,
    "Close"        REAL    NOT NULL,
    "Volume"       INTEGER NOT NULL,
    "OpenInterest" REAL    NOT NULL,
    "TradingDay"   TEXT    NOT NULL,
    PRIMARY KEY ("DateTime", "Instrument")
);
CREATE INDEX IF NOT EXISTS idx_future_min_trading_day ON future_min ("TradingDay");
"#;

const INSERT_BAR: &str = r#"INSERT INTO future_min
    ("DateTime", "Instrument", "Open", "High", "Low", "Close", "Volume", "OpenInterest", "TradingDay")
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"#;

/// A persisted minute bar row.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredBar {
    /// `YYYY-MM-DD HH:MM:SS`.
    pub date_time: String,
    /// Instrument id.
    pub instrument: String,
    /// Open price.
    pub open: f64,
    /// High price.
    pub high: f64,
    /// Low price.
    pub low: f64,
    /// Close price.
    pub close: f64,
    /// Volume traded in the minute.
    pub volume: i64,
    /// Open interest at the end of the minute.
    pub open_interest: f64,
    /// `YYYYMMDD`.
    pub trading_day: String,
}

/// Outcome of replacing a day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaceReport {
    /// Rows of the day that existed before.
    pub deleted: usize,
    /// Rows written.
    pub inserted: usize,
}

/// Connection to the minute bar table.
pub struct MinuteStore {
    conn: Connection,
}

impl MinuteStore {
    /// Open (and create if needed) the store at `url`, a SQLite file path.
    pub fn open(url: &str, busy_timeout: Duration) -> Result<Self> {
        let conn = Connection::open(Path::new(url))
            .map_err(|e| Error::store(format!("{url}: {e}")))?;
        conn.busy_timeout(busy_timeout)
            .map_err(|e| Error::store(e.to_string()))?;
        Self::with_connection(conn)
    }

    /// Open a private in-memory store.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| Error::store(e.to_string()))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)
            .map_err(|e| Error::store(format!("schema: {e}")))?;
        Ok(Self { conn })
    }

    /// Latest trading day with persisted rows.
    pub fn max_trading_day(&self) -> Result<Option<TradingDay>> {
        let max: Option<String> = self
            .conn
            .query_row(r#"SELECT MAX("TradingDay") FROM future_min"#, [], |row| row.get(0))
            .map_err(|e| Error::store(e.to_string()))?;
        max.map(|s| {
            s.parse::<TradingDay>()
                .map_err(|e| Error::store(format!("stored trading day {s:?}: {e}")))
        })
        .transpose()
    }

    /// Replace every row of the result's trading day with its bars, atomically.
    ///
    /// The write lock is taken up front so concurrent writers queue on the busy
    /// timeout. Any failure rolls the transaction back and leaves the previous
    /// rows in place.
    pub fn replace_day(&mut self, result: &DayResult) -> Result<ReplaceReport> {
        let day = result.trading_day.to_string();
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| Error::store(e.to_string()))?;

        let deleted = tx
            .execute(r#"DELETE FROM future_min WHERE "TradingDay" = ?1"#, params![day])
            .map_err(|e| Error::transaction(format!("delete {day}: {e}")))?;
        if deleted > 0 {
            info!(%day, rows = deleted, "deleted previous rows of day");
        }

        let mut inserted = 0;
        {
            let mut stmt = tx
                .prepare(INSERT_BAR)
                .map_err(|e| Error::transaction(e.to_string()))?;
            for (instrument, bars) in &result.bars {
                for bar in bars {
                    let date_time = bar.key.to_datetime()?.format(DATETIME_FORMAT).to_string();
                    stmt.execute(params![
                        date_time,
                        instrument,
                        bar.open,
                        bar.high,
                        bar.low,
                        bar.close,
                        bar.volume,
                        bar.open_interest,
                        day,
                    ])
                    .map_err(|e| {
                        Error::transaction(format!("insert {instrument} {}: {e}", bar.key))
                    })?;
                    inserted += 1;
                }
            }
        }

        tx.commit()
            .map_err(|e| Error::transaction(format!("commit {day}: {e}")))?;
        debug!(%day, inserted, "day committed");
        Ok(ReplaceReport { deleted, inserted })
    }

    /// Number of rows stored for a day.
    pub fn count_day(&self, day: TradingDay) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row(
                r#"SELECT COUNT(*) FROM future_min WHERE "TradingDay" = ?1"#,
                params![day.to_string()],
                |row| row.get(0),
            )
            .map_err(|e| Error::store(e.to_string()))?;
        Ok(count as usize)
    }

    /// Rows of a day ordered by instrument, then time.
    pub fn load_day(&self, day: TradingDay) -> Result<Vec<StoredBar>> {
        let mut stmt = self
            .conn
            .prepare(
                r#"SELECT "DateTime", "Instrument", "Open", "High", "Low", "Close",
                          "Volume", "OpenInterest", "TradingDay"
                   FROM future_min
                   WHERE "TradingDay" = ?1
                   ORDER BY "Instrument", "DateTime""#,
            )
            .map_err(|e| Error::store(e.to_string()))?;

        let rows = stmt
            .query_map(params![day.to_string()], stored_bar)
            .map_err(|e| Error::store(e.to_string()))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::store(e.to_string()))?;
        Ok(rows)
    }

    /// Look up a single bar.
    pub fn find_bar(&self, instrument: &str, date_time: &str) -> Result<Option<StoredBar>> {
        self.conn
            .query_row(
                r#"SELECT "DateTime", "Instrument", "Open", "High", "Low", "Close",
                          "Volume", "OpenInterest", "TradingDay"
                   FROM future_min WHERE "Instrument" = ?1 AND "DateTime" = ?2"#,
                params![instrument, date_time],
                stored_bar,
            )
            .optional()
            .map_err(|e| Error::store(e.to_string()))
    }
}

fn stored_bar(row: &Row<'_>) -> rusqlite::Result<StoredBar> {
    Ok(StoredBar {
        date_time: row.get(0)?,
        instrument: row.get(1)?,
        open: row.get(2)?,
        high: row.get(3)?,
        low: row.get(4)?,
        close: row.get(5)?,
        volume: row.get(6)?,
        open_interest: row.get(7)?,
        trading_day: row.get(8)?,
    })
}
