//! Session-boundary filtering and volume normalization.
//!
//! Walks an instrument's sorted minute bars once:
//! - a flat bar (`high == low`) in a guard minute, a close minute or outside
//!   every trading section is dropped without touching the volume baseline
//! - the remaining bars get `volume = cumulative - previous cumulative`
//! - bars whose delta is zero or negative are dropped, but the baseline still
//!   moves to the observed cumulative volume

use std::collections::BTreeMap;

use tickmin_core::{DayResult, MinuteBar, MinuteSets, NormalizedBar, TradingDay};
use tracing::{debug, warn};

/// Statistics about filtered bars.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterStats {
    /// Bars looked at.
    pub bars_in: u64,
    /// Bars emitted.
    pub bars_out: u64,
    /// Flat bars dropped at a session boundary.
    pub boundary_dropped: u64,
    /// Bars dropped because nothing traded in the minute.
    pub zero_volume_dropped: u64,
    /// Bars dropped because the cumulative volume went backwards.
    pub negative_volume_dropped: u64,
}

impl FilterStats {
    /// Add another instrument's statistics.
    pub fn merge(&mut self, other: &FilterStats) {
        self.bars_in += other.bars_in;
        self.bars_out += other.bars_out;
        self.boundary_dropped += other.boundary_dropped;
        self.zero_volume_dropped += other.zero_volume_dropped;
        self.negative_volume_dropped += other.negative_volume_dropped;
    }
}

/// Turns aggregated minute bars into persisted bars.
pub struct BarNormalizer<'a> {
    minutes: &'a MinuteSets,
}

impl<'a> BarNormalizer<'a> {
    /// Create a normalizer over the global session minute sets.
    pub fn new(minutes: &'a MinuteSets) -> Self {
        Self { minutes }
    }

    /// Whether a bar is a session-boundary artifact.
    pub fn is_boundary_artifact(&self, bar: &MinuteBar) -> bool {
        bar.is_flat() && self.minutes.is_boundary(bar.key.time_of_day())
    }

    /// Normalize one instrument's bars; `bars` must be sorted by key.
    pub fn normalize(&self, bars: &[MinuteBar], stats: &mut FilterStats) -> Vec<NormalizedBar> {
        let mut out = Vec::with_capacity(bars.len());
        let mut prev_volume = 0i64;

        for bar in bars {
            stats.bars_in += 1;
            if self.is_boundary_artifact(bar) {
                stats.boundary_dropped += 1;
                continue;
            }

            let delta = bar.volume - prev_volume;
            prev_volume = bar.volume;
            match delta {
                0 => stats.zero_volume_dropped += 1,
                d if d < 0 => {
                    stats.negative_volume_dropped += 1;
                    warn!(bar = %bar.key, delta = d, "cumulative volume went backwards");
                }
                d => {
                    stats.bars_out += 1;
                    out.push(NormalizedBar::from_bar(bar, d));
                }
            }
        }
        out
    }

    /// Normalize every instrument of a day.
    pub fn normalize_day(
        &self,
        trading_day: TradingDay,
        bars: &BTreeMap<String, Vec<MinuteBar>>,
    ) -> (DayResult, FilterStats) {
        let mut result = DayResult::new(trading_day);
        let mut total = FilterStats::default();

        for (instrument, instrument_bars) in bars {
            let mut stats = FilterStats::default();
            let normalized = self.normalize(instrument_bars, &mut stats);
            debug!(
                %instrument,
                bars_in = stats.bars_in,
                bars_out = stats.bars_out,
                boundary_dropped = stats.boundary_dropped,
                "instrument normalized"
            );
            total.merge(&stats);
            if !normalized.is_empty() {
                result.bars.insert(instrument.clone(), normalized);
            }
        }
        (result, total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tickmin_core::{MinuteKey, SessionSchedule, TimeSection};

    fn schedule() -> SessionSchedule {
        let mut schedule = SessionSchedule::default();
        let sections = TimeSection::parse_list(
            r#"[{"Begin":"09:00:00","End":"10:15:00","IsOpen":true},
                {"Begin":"21:00:00","End":"02:30:00","IsNight":true}]"#,
        )
        .unwrap();
        schedule.insert("rb", sections);
        schedule
    }

    fn bar(time: &str, o: f64, h: f64, l: f64, c: f64, volume: i64) -> MinuteBar {
        MinuteBar {
            key: MinuteKey::from(format!("20240103{time}").as_str()),
            open: o,
            high: h,
            low: l,
            close: c,
            volume,
            open_interest: 1.0,
        }
    }

    fn flat(time: &str, price: f64, volume: i64) -> MinuteBar {
        bar(time, price, price, price, price, volume)
    }

    #[test]
    fn test_volume_becomes_delta() {
        let schedule = schedule();
        let normalizer = BarNormalizer::new(schedule.minutes());
        let mut stats = FilterStats::default();

        let out = normalizer.normalize(
            &[
                bar("09:00:00", 100.0, 102.0, 100.0, 102.0, 15),
                flat("09:01:00", 101.0, 20),
            ],
            &mut stats,
        );

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].volume, 15);
        assert_eq!(out[1].volume, 5);
        assert_eq!(out[1].high, 101.0);
        assert_eq!(stats.bars_out, 2);
    }

    #[test]
    fn test_flat_boundary_bars_are_dropped() {
        let schedule = schedule();
        let normalizer = BarNormalizer::new(schedule.minutes());
        let mut stats = FilterStats::default();

        let out = normalizer.normalize(
            &[
                flat("08:59:00", 100.0, 5),  // guard
                flat("10:15:00", 100.0, 10), // close
                flat("12:00:00", 100.0, 15), // not tradable
                flat("20:59:00", 100.0, 20), // guard of the night session
            ],
            &mut stats,
        );

        assert!(out.is_empty());
        assert_eq!(stats.boundary_dropped, 4);
    }

    #[test]
    fn test_moving_bar_at_boundary_is_kept() {
        let schedule = schedule();
        let normalizer = BarNormalizer::new(schedule.minutes());
        let mut stats = FilterStats::default();

        let out = normalizer.normalize(&[bar("08:59:00", 100.0, 101.0, 100.0, 101.0, 5)], &mut stats);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].volume, 5);
    }

    #[test]
    fn test_dropped_boundary_bar_keeps_baseline() {
        let schedule = schedule();
        let normalizer = BarNormalizer::new(schedule.minutes());
        let mut stats = FilterStats::default();

        let out = normalizer.normalize(
            &[flat("08:59:00", 100.0, 8), flat("09:00:00", 100.0, 10)],
            &mut stats,
        );
        // Guard bar did not move the baseline, so 09:00 carries all 10
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].volume, 10);
    }

    #[test]
    fn test_zero_and_negative_deltas_are_dropped() {
        let schedule = schedule();
        let normalizer = BarNormalizer::new(schedule.minutes());
        let mut stats = FilterStats::default();

        let out = normalizer.normalize(
            &[
                flat("09:00:00", 100.0, 10),
                bar("09:01:00", 100.0, 101.0, 100.0, 101.0, 10), // no trades
                flat("09:02:00", 101.0, 4),                      // counter reset
                flat("09:03:00", 101.0, 9),
            ],
            &mut stats,
        );

        let volumes: Vec<i64> = out.iter().map(|b| b.volume).collect();
        assert_eq!(volumes, vec![10, 5]);
        assert_eq!(stats.zero_volume_dropped, 1);
        assert_eq!(stats.negative_volume_dropped, 1);
        assert!(out.iter().all(|b| b.volume > 0));
    }

    #[test]
    fn test_night_minutes_after_midnight_are_tradable() {
        let schedule = schedule();
        let normalizer = BarNormalizer::new(schedule.minutes());
        let mut stats = FilterStats::default();

        let out = normalizer.normalize(
            &[flat("00:30:00", 100.0, 3), flat("02:29:00", 100.0, 7), flat("02:30:00", 100.0, 9)],
            &mut stats,
        );
        assert_eq!(out.len(), 2);
        assert_eq!(stats.boundary_dropped, 1);
    }

    #[test]
    fn test_normalize_day_skips_empty_instruments() {
        let schedule = schedule();
        let normalizer = BarNormalizer::new(schedule.minutes());
        let mut bars = BTreeMap::new();
        bars.insert("rb2405".to_string(), vec![flat("09:00:00", 100.0, 10)]);
        bars.insert("rb2410".to_string(), vec![flat("12:00:00", 100.0, 10)]);

        let day: TradingDay = "20240103".parse().unwrap();
        let (result, stats) = normalizer.normalize_day(day, &bars);
        assert_eq!(result.instrument_count(), 1);
        assert_eq!(result.bar_count(), 1);
        assert_eq!(stats.bars_in, 2);
    }
}
