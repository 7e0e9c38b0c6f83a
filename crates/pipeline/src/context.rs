//! Process-wide, read-only state built once at startup.

use chrono::NaiveDate;
use tickmin_core::{Config, Result, SessionSchedule, TradingCalendar};

/// Configuration, trading calendar and session schedule.
///
/// Never mutated after construction; shared by every worker behind an `Arc`.
#[derive(Debug, Clone)]
pub struct PipelineContext {
    /// Runtime configuration.
    pub config: Config,
    /// Trading days, ascending.
    pub calendar: TradingCalendar,
    /// Trading sections and boundary minute sets.
    pub schedule: SessionSchedule,
}

impl PipelineContext {
    /// Assemble from already built parts.
    pub fn new(config: Config, calendar: TradingCalendar, schedule: SessionSchedule) -> Self {
        Self {
            config,
            calendar,
            schedule,
        }
    }

    /// Load the calendar and the sections effective on `as_of` from the configured files.
    pub fn load(config: Config, as_of: NaiveDate) -> Result<Self> {
        let calendar = TradingCalendar::load(&config.calendar_path)?;
        let schedule = SessionSchedule::load(&config.trading_time_path, as_of)?;
        Ok(Self::new(config, calendar, schedule))
    }
}
