//! Trading calendar.

use std::io::Read;
use std::path::Path;

use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::types::TradingDay;

/// Ascending, de-duplicated list of trading days. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TradingCalendar {
    days: Vec<TradingDay>,
}

impl TradingCalendar {
    /// Build from any collection of days.
    pub fn from_days(days: impl IntoIterator<Item = TradingDay>) -> Self {
        let mut days: Vec<TradingDay> = days.into_iter().collect();
        days.sort();
        days.dedup();
        Self { days }
    }

    /// Load a `date,isTradingDay` CSV file.
    pub fn load(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .map_err(|e| Error::calendar(format!("{}: {e}", path.display())))?;
        let calendar = Self::from_reader(file)?;
        info!(
            path = %path.display(),
            days = calendar.len(),
            "trading calendar loaded"
        );
        Ok(calendar)
    }

    /// Parse calendar rows; only rows flagged `true` are trading days.
    ///
    /// A header line is skipped naturally since its flag column is not `true`.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);

        let mut days = Vec::new();
        for (line, record) in csv.records().enumerate() {
            let record = match record {
                Ok(r) => r,
                Err(e) => {
                    warn!(line = line + 1, error = %e, "skipping unreadable calendar row");
                    continue;
                }
            };
            if record.get(1).map(str::trim) != Some("true") {
                continue;
            }
            match record.get(0).unwrap_or_default().parse::<TradingDay>() {
                Ok(day) => days.push(day),
                Err(e) => warn!(line = line + 1, error = %e, "skipping calendar row"),
            }
        }
        Ok(Self::from_days(days))
    }

    /// Days strictly after `day`, or every day when `day` is `None`.
    pub fn days_after(&self, day: Option<TradingDay>) -> &[TradingDay] {
        match day {
            Some(day) => {
                let idx = self.days.partition_point(|d| *d <= day);
                &self.days[idx..]
            }
            None => &self.days,
        }
    }

    /// Days at or after `day`.
    pub fn days_from(&self, day: TradingDay) -> &[TradingDay] {
        let idx = self.days.partition_point(|d| *d < day);
        &self.days[idx..]
    }

    /// Number of trading days.
    pub fn len(&self) -> usize {
        self.days.len()
    }

    /// True when no trading days are known.
    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }
}
