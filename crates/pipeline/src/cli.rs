//! Command-line arguments.

use clap::Parser;
use tickmin_core::TradingDay;

/// Aggregate futures tick files into minute bars.
///
/// Without flags the pipeline resumes after the latest trading day in the
/// store and keeps waiting for new tick files until the calendar ends.
#[derive(Debug, Parser)]
#[command(name = "tickmin", version, about)]
pub struct Cli {
    /// Process only this trading day (YYYYMMDD).
    #[arg(short = 's', long, value_name = "DAY", conflicts_with = "start_day")]
    pub single_day: Option<TradingDay>,

    /// Backfill every tick file from this day on (YYYYMMDD), then keep going.
    #[arg(short = 'm', long, value_name = "DAY")]
    pub start_day: Option<TradingDay>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_flags_is_continuous() {
        let cli = Cli::try_parse_from(["tickmin"]).unwrap();
        assert!(cli.single_day.is_none());
        assert!(cli.start_day.is_none());
    }

    #[test]
    fn test_single_day_flag() {
        let cli = Cli::try_parse_from(["tickmin", "-s", "20240103"]).unwrap();
        assert_eq!(cli.single_day, Some("20240103".parse().unwrap()));
    }

    #[test]
    fn test_start_day_long_flag() {
        let cli = Cli::try_parse_from(["tickmin", "--start-day", "2024-01-03"]).unwrap();
        assert_eq!(cli.start_day, Some("20240103".parse().unwrap()));
    }

    #[test]
    fn test_flags_conflict_and_validate() {
        assert!(Cli::try_parse_from(["tickmin", "-s", "20240103", "-m", "20240102"]).is_err());
        assert!(Cli::try_parse_from(["tickmin", "-s", "tomorrow"]).is_err());
    }
}
