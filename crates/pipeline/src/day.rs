//! Processing of a single trading day.
//!
//! Reads the day's tick file, builds minute bars per instrument, drops
//! session-boundary artifacts, converts cumulative volume to per-minute volume
//! and replaces the day in the store.

use std::sync::Arc;

use tickmin_core::{DayResult, Result, TradingDay};
use tickmin_ingestion::{BarBuilder, BarNormalizer, FilterStats, ReadStats, TickFileSource};
use tickmin_store::MinuteStore;
use tracing::{info, warn};

use crate::context::PipelineContext;

/// Bars of a day, ready to be persisted.
#[derive(Debug, Clone)]
pub struct BuiltDay {
    /// Normalized bars per instrument.
    pub result: DayResult,
    /// Row decoding statistics.
    pub read: ReadStats,
    /// Boundary/volume filter statistics.
    pub filter: FilterStats,
    /// Instruments seen in the tick file.
    pub instruments: usize,
    /// Ticks folded into bars.
    pub ticks: u64,
}

/// Outcome of processing one day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayReport {
    /// The day processed.
    pub trading_day: TradingDay,
    /// Tick rows read.
    pub rows_read: u64,
    /// Tick rows skipped as undecodable.
    pub rows_skipped: u64,
    /// Instruments seen in the tick file.
    pub instruments: usize,
    /// Ticks folded into bars.
    pub ticks: u64,
    /// Minute bars built before filtering.
    pub bars_built: u64,
    /// Bars written to the store.
    pub bars_written: usize,
    /// Rows of an earlier run that were replaced.
    pub rows_replaced: usize,
}

/// Runs one trading day end to end.
#[derive(Debug, Clone)]
pub struct DayProcessor {
    ctx: Arc<PipelineContext>,
    source: TickFileSource,
}

impl DayProcessor {
    /// Create a processor reading from the configured tick directory.
    pub fn new(ctx: Arc<PipelineContext>) -> Self {
        let source = TickFileSource::new(ctx.config.tick_csv_path.clone());
        Self { ctx, source }
    }

    /// The tick file source.
    pub fn source(&self) -> &TickFileSource {
        &self.source
    }

    /// Read and aggregate a day without touching the store.
    ///
    /// Fails with `SourceNotReady` when the day's tick file does not exist.
    pub fn build(&self, day: TradingDay) -> Result<BuiltDay> {
        let mut reader = self.source.open(day)?;
        let mut builder = BarBuilder::new();
        for row in reader.by_ref() {
            builder.add_row(row?);
        }

        let read = reader.stats().clone();
        if read.defaulted_fields > 0 {
            warn!(
                %day,
                fields = read.defaulted_fields,
                "malformed numeric fields were read as zero"
            );
        }

        let instruments = builder.instrument_count();
        let ticks = builder.tick_count();
        let bars = builder.finish();
        let normalizer = BarNormalizer::new(self.ctx.schedule.minutes());
        let (result, filter) = normalizer.normalize_day(day, &bars);

        Ok(BuiltDay {
            result,
            read,
            filter,
            instruments,
            ticks,
        })
    }

    /// Build a day and replace its rows in the store.
    pub fn process(&self, day: TradingDay) -> Result<DayReport> {
        info!(%day, "starting");
        let built = self.build(day)?;

        let config = &self.ctx.config;
        let mut store = MinuteStore::open(&config.database_url, config.busy_timeout())?;
        let replaced = store.replace_day(&built.result)?;

        let report = DayReport {
            trading_day: day,
            rows_read: built.read.rows,
            rows_skipped: built.read.skipped_rows,
            instruments: built.instruments,
            ticks: built.ticks,
            bars_built: built.filter.bars_in,
            bars_written: replaced.inserted,
            rows_replaced: replaced.deleted,
        };
        info!(
            %day,
            rows = report.rows_read,
            skipped = report.rows_skipped,
            instruments = report.instruments,
            ticks = report.ticks,
            bars = report.bars_written,
            boundary_dropped = built.filter.boundary_dropped,
            "finished"
        );
        Ok(report)
    }
}
