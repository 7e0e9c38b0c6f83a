//! Trading session schedule.
//!
//! Turns per-instrument-class trading-time sections into the minute sets used
//! to spot session-boundary artifacts:
//! - guard minutes: the minute before each section opens
//! - close minutes: each section's end minute
//! - tradable minutes: every minute inside any section
//!
//! The sets are global across instrument classes.

use chrono::{Duration, NaiveDate, NaiveTime};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::Read;
use std::path::Path;

use tracing::{error, info, warn};

use crate::error::{Error, Result};
use crate::types::TIME_FORMAT;

const MINUTES_PER_DAY: i64 = 24 * 60;

/// One trading window of an instrument class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeSection {
    /// Section start.
    pub begin: NaiveTime,
    /// Section end; earlier than `begin` for a night session crossing midnight.
    pub end: NaiveTime,
    /// Opening section of the day.
    pub is_open: bool,
    /// Night session.
    pub is_night: bool,
    /// Closing section of the day.
    pub is_close: bool,
}

/// Section as it appears in the JSON payload.
#[derive(Debug, Deserialize)]
struct RawSection {
    #[serde(rename = "Begin")]
    begin: String,
    #[serde(rename = "End")]
    end: String,
    #[serde(rename = "IsOpen", default)]
    is_open: bool,
    #[serde(rename = "IsNight", default)]
    is_night: bool,
    #[serde(rename = "IsClose", default)]
    is_close: bool,
}

impl TimeSection {
    /// Parse a JSON list of `{Begin, End, IsOpen, IsNight, IsClose}`.
    pub fn parse_list(json: &str) -> Result<Vec<TimeSection>> {
        let raw: Vec<RawSection> = serde_json::from_str(json)?;
        raw.into_iter()
            .map(|s| {
                Ok(TimeSection {
                    begin: parse_time(&s.begin)?,
                    end: parse_time(&s.end)?,
                    is_open: s.is_open,
                    is_night: s.is_night,
                    is_close: s.is_close,
                })
            })
            .collect()
    }

    /// Section runs past midnight into the next calendar day.
    pub fn crosses_midnight(&self) -> bool {
        self.end < self.begin
    }

    /// The minute immediately before the section opens.
    pub fn guard_minute(&self) -> NaiveTime {
        self.begin.overflowing_sub_signed(Duration::minutes(1)).0
    }

    /// Every minute from `begin` up to, not including, `end`.
    pub fn minutes(&self) -> Vec<NaiveTime> {
        let span = (self.end - self.begin).num_minutes().rem_euclid(MINUTES_PER_DAY);
        (0..span)
            .map(|i| self.begin.overflowing_add_signed(Duration::minutes(i)).0)
            .collect()
    }
}

fn parse_time(s: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), TIME_FORMAT)
        .map_err(|e| Error::schedule(format!("invalid section time {s:?}: {e}")))
}

/// One row of the trading-time source.
#[derive(Debug, Clone)]
pub struct SectionRecord {
    /// Instrument class, e.g. "rb".
    pub instrument_class: String,
    /// Date from which the sections apply.
    pub effective_date: NaiveDate,
    /// JSON list of sections.
    pub sections_json: String,
}

/// Global minute sets derived from all sections.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MinuteSets {
    guard: HashSet<NaiveTime>,
    close: HashSet<NaiveTime>,
    tradable: HashSet<NaiveTime>,
}

impl MinuteSets {
    /// Add one section's minutes.
    pub fn add_section(&mut self, section: &TimeSection) {
        self.guard.insert(section.guard_minute());
        self.close.insert(section.end);
        self.tradable.extend(section.minutes());
    }

    /// Minute right before a section opens.
    pub fn is_guard(&self, t: NaiveTime) -> bool {
        self.guard.contains(&t)
    }

    /// A section's end minute.
    pub fn is_close(&self, t: NaiveTime) -> bool {
        self.close.contains(&t)
    }

    /// Inside some trading section.
    pub fn is_tradable(&self, t: NaiveTime) -> bool {
        self.tradable.contains(&t)
    }

    /// A flat bar at this time is a session-boundary artifact.
    ///
    /// `None` means the bucket time could not be read, which is never tradable.
    pub fn is_boundary(&self, t: Option<NaiveTime>) -> bool {
        match t {
            Some(t) => self.is_guard(t) || self.is_close(t) || !self.is_tradable(t),
            None => true,
        }
    }

    /// Number of tradable minutes.
    pub fn tradable_len(&self) -> usize {
        self.tradable.len()
    }
}

/// Sections per instrument class plus the derived minute sets.
#[derive(Debug, Clone, Default)]
pub struct SessionSchedule {
    sections: BTreeMap<String, Vec<TimeSection>>,
    minutes: MinuteSets,
}

impl SessionSchedule {
    /// Build from records, keeping per class the latest one effective on `as_of`.
    ///
    /// A class whose payload cannot be parsed is logged and left out.
    pub fn from_records(records: impl IntoIterator<Item = SectionRecord>, as_of: NaiveDate) -> Self {
        let mut latest: HashMap<String, SectionRecord> = HashMap::new();
        for record in records {
            if record.effective_date > as_of {
                continue;
            }
            match latest.get(&record.instrument_class) {
                Some(prev) if prev.effective_date > record.effective_date => {}
                _ => {
                    latest.insert(record.instrument_class.clone(), record);
                }
            }
        }

        let mut schedule = Self::default();
        for (class, record) in latest {
            match TimeSection::parse_list(&record.sections_json) {
                Ok(sections) => schedule.insert(class, sections),
                Err(e) => error!(
                    instrument_class = %class,
                    effective_date = %record.effective_date,
                    error = %e,
                    "skipping malformed trading sections"
                ),
            }
        }
        schedule
    }

    /// Load an `instrumentClass,effectiveDate,sectionsJSON` CSV file with a header line.
    pub fn load(path: &Path, as_of: NaiveDate) -> Result<Self> {
        let file = std::fs::File::open(path)
            .map_err(|e| Error::schedule(format!("{}: {e}", path.display())))?;
        let schedule = Self::from_reader(file, as_of)?;
        info!(
            path = %path.display(),
            classes = schedule.class_count(),
            tradable_minutes = schedule.minutes.tradable_len(),
            "trading sections loaded"
        );
        Ok(schedule)
    }

    /// Parse trading-time rows from CSV.
    pub fn from_reader<R: Read>(reader: R, as_of: NaiveDate) -> Result<Self> {
        let mut csv = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let mut records = Vec::new();
        for (line, row) in csv.records().enumerate() {
            let row = match row {
                Ok(r) => r,
                Err(e) => {
                    warn!(line = line + 2, error = %e, "skipping unreadable trading-time row");
                    continue;
                }
            };
            let (Some(class), Some(date), Some(json)) = (row.get(0), row.get(1), row.get(2))
            else {
                warn!(line = line + 2, "skipping short trading-time row");
                continue;
            };
            let Some(effective_date) = parse_effective_date(date) else {
                warn!(line = line + 2, date, "skipping trading-time row with bad date");
                continue;
            };
            records.push(SectionRecord {
                instrument_class: class.trim().to_string(),
                effective_date,
                sections_json: json.to_string(),
            });
        }
        Ok(Self::from_records(records, as_of))
    }

    /// Add sections for a class and fold them into the global minute sets.
    pub fn insert(&mut self, class: impl Into<String>, sections: Vec<TimeSection>) {
        for section in &sections {
            self.minutes.add_section(section);
        }
        self.sections.insert(class.into(), sections);
    }

    /// Sections of one instrument class.
    pub fn sections(&self, class: &str) -> Option<&[TimeSection]> {
        self.sections.get(class).map(Vec::as_slice)
    }

    /// Global minute sets.
    pub fn minutes(&self) -> &MinuteSets {
        &self.minutes
    }

    /// Number of instrument classes with a schedule.
    pub fn class_count(&self) -> usize {
        self.sections.len()
    }
}

fn parse_effective_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(s, "%Y%m%d"))
        .ok()
}
