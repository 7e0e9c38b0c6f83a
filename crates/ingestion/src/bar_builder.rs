//! Minute bar building from ticks.
//!
//! Builds 1-minute OHLC bars per instrument. Volume on a built bar is still the
//! cumulative day volume last seen in that minute; [`crate::BarNormalizer`]
//! turns it into a per-minute delta.

use std::collections::{BTreeMap, HashMap};

use tickmin_core::{MinuteBar, MinuteKey, Tick};

use crate::normalizer::TickRow;

/// Builder for 1-minute bars from a day's ticks.
pub struct BarBuilder {
    /// Bars per instrument in the order they were opened; the last one is live.
    bars: HashMap<String, Vec<MinuteBar>>,
    /// Ticks folded so far.
    tick_count: u64,
}

impl BarBuilder {
    /// Create a new bar builder.
    pub fn new() -> Self {
        Self {
            bars: HashMap::new(),
            tick_count: 0,
        }
    }

    /// Fold one keyed tick into its instrument's live bar.
    pub fn add_row(&mut self, row: TickRow) {
        self.add_tick(row.key, &row.tick);
    }

    /// Fold a tick into the live bar, or open a new bar when the minute changed.
    pub fn add_tick(&mut self, key: MinuteKey, tick: &Tick) {
        self.tick_count += 1;
        let bars = self.bars.entry(tick.instrument.clone()).or_default();
        match bars.last_mut() {
            Some(live) if live.key == key => live.update(tick),
            _ => bars.push(MinuteBar::open_with(key, tick)),
        }
    }

    /// Number of ticks folded.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Number of instruments seen.
    pub fn instrument_count(&self) -> usize {
        self.bars.len()
    }

    /// Finish the day: per instrument, bars sorted by minute.
    ///
    /// Ticks that arrived out of order may have re-opened a minute that
    /// already had a bar; such bars are merged so each minute appears once.
    pub fn finish(self) -> BTreeMap<String, Vec<MinuteBar>> {
        self.bars
            .into_iter()
            .map(|(instrument, mut bars)| {
                bars.sort_by(|a, b| a.key.cmp(&b.key));
                (instrument, coalesce(bars))
            })
            .collect()
    }
}

impl Default for BarBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Merge adjacent bars sharing a key; input must be sorted (stable) by key.
fn coalesce(bars: Vec<MinuteBar>) -> Vec<MinuteBar> {
    let mut merged: Vec<MinuteBar> = Vec::with_capacity(bars.len());
    for bar in bars {
        match merged.last_mut() {
            Some(prev) if prev.key == bar.key => prev.absorb(&bar),
            _ => merged.push(bar),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_tick(inst: &str, time: &str, price: f64, volume: i64) -> (MinuteKey, Tick) {
        let tick = Tick {
            instrument: inst.to_string(),
            trading_day: "20240103".to_string(),
            action_day: "20240103".to_string(),
            update_time: time.to_string(),
            update_millis: 0,
            last_price: price,
            volume,
            open_interest: 100.0,
        };
        let key = MinuteKey::from_update_time(&tick.action_day, time).unwrap();
        (key, tick)
    }

    fn build(ticks: &[(&str, &str, f64, i64)]) -> BTreeMap<String, Vec<MinuteBar>> {
        let mut builder = BarBuilder::new();
        for &(inst, time, price, volume) in ticks {
            let (key, tick) = make_tick(inst, time, price, volume);
            builder.add_tick(key, &tick);
        }
        builder.finish()
    }

    #[test]
    fn test_multiple_ticks_same_minute() {
        let bars = build(&[
            ("rb2405", "09:00:01", 100.0, 10), // Open
            ("rb2405", "09:00:20", 105.0, 12), // High
            ("rb2405", "09:00:30", 95.0, 13),  // Low
            ("rb2405", "09:00:50", 101.0, 15), // Close
        ]);
        let bars = &bars["rb2405"];

        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].key.as_str(), "2024010309:00:00");
        assert_eq!(bars[0].open, 100.0);
        assert_eq!(bars[0].high, 105.0);
        assert_eq!(bars[0].low, 95.0);
        assert_eq!(bars[0].close, 101.0);
        // Cumulative, not summed
        assert_eq!(bars[0].volume, 15);
    }

    #[test]
    fn test_multiple_minutes_and_instruments() {
        let bars = build(&[
            ("rb2405", "09:00:01", 100.0, 10),
            ("cu2402", "09:00:02", 68000.0, 3),
            ("rb2405", "09:01:05", 101.0, 20),
        ]);

        assert_eq!(bars.len(), 2);
        assert_eq!(bars["rb2405"].len(), 2);
        assert_eq!(bars["cu2402"].len(), 1);
        assert_eq!(bars["rb2405"][1].key.as_str(), "2024010309:01:00");
    }

    #[test]
    fn test_out_of_order_minutes_are_sorted() {
        let bars = build(&[
            ("rb2405", "09:02:00", 103.0, 30),
            ("rb2405", "09:00:01", 100.0, 10),
            ("rb2405", "09:01:00", 101.0, 20),
        ]);
        let keys: Vec<&str> = bars["rb2405"].iter().map(|b| b.key.as_str()).collect();
        assert_eq!(
            keys,
            vec!["2024010309:00:00", "2024010309:01:00", "2024010309:02:00"]
        );
    }

    #[test]
    fn test_reopened_minute_is_merged() {
        let bars = build(&[
            ("rb2405", "09:00:01", 100.0, 10),
            ("rb2405", "09:01:00", 101.0, 20),
            ("rb2405", "09:00:59", 98.0, 19), // late tick for 09:00
        ]);
        let bars = &bars["rb2405"];

        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].open, 100.0);
        assert_eq!(bars[0].low, 98.0);
        assert_eq!(bars[0].close, 98.0);
        assert_eq!(bars[0].volume, 19);
        assert!(bars.windows(2).all(|w| w[0].key < w[1].key));
    }

    #[test]
    fn test_counts() {
        let mut builder = BarBuilder::new();
        let (key, tick) = make_tick("rb2405", "09:00:01", 100.0, 10);
        builder.add_tick(key.clone(), &tick);
        builder.add_tick(key, &tick);
        assert_eq!(builder.tick_count(), 2);
        assert_eq!(builder.instrument_count(), 1);
        assert_eq!(builder.finish()["rb2405"].len(), 1);
    }
}
