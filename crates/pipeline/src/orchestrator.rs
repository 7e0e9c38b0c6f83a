//! Pipeline orchestration.
//!
//! Two modes:
//! - single day: process one given day and report
//! - continuous: optionally backfill every tick file from a start day with
//!   bounded concurrency, then walk the trading calendar forward one day at a
//!   time, waiting for each day's tick file to appear

use std::sync::Arc;

use tickmin_core::{Error, Result, TradingDay};
use tickmin_store::MinuteStore;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::context::PipelineContext;
use crate::day::{DayProcessor, DayReport};

/// Where the live tail picks up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumePoint {
    /// Calendar days strictly after the given day; every day when `None`.
    After(Option<TradingDay>),
    /// Calendar days from the given day on, inclusive.
    From(TradingDay),
}

impl ResumePoint {
    /// Calendar days still to process.
    pub fn pending<'a>(&self, ctx: &'a PipelineContext) -> &'a [TradingDay] {
        match *self {
            ResumePoint::After(day) => ctx.calendar.days_after(day),
            ResumePoint::From(day) => ctx.calendar.days_from(day),
        }
    }
}

/// What a continuous run got through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Days processed by the backfill phase.
    pub backfilled: usize,
    /// Days processed by the live tail.
    pub tailed: usize,
    /// Where the live tail started.
    pub resume: ResumePoint,
}

/// Drives the day processor over the trading calendar.
#[derive(Debug, Clone)]
pub struct Pipeline {
    ctx: Arc<PipelineContext>,
    processor: DayProcessor,
}

impl Pipeline {
    /// Create a pipeline over a loaded context.
    pub fn new(ctx: PipelineContext) -> Self {
        let ctx = Arc::new(ctx);
        let processor = DayProcessor::new(Arc::clone(&ctx));
        Self { ctx, processor }
    }

    /// Process exactly one day.
    pub async fn run_once(&self, day: TradingDay) -> Result<DayReport> {
        let processor = self.processor.clone();
        blocking(move || processor.process(day)).await
    }

    /// Continuous mode.
    ///
    /// With a start day, every tick file at or after it is backfilled first.
    /// Without one, processing resumes after the latest day in the store.
    /// Returns once the trading calendar is exhausted; stops at the first
    /// failure other than a missing tick file.
    pub async fn run(&self, start: Option<TradingDay>) -> Result<RunSummary> {
        let (backfilled, resume) = match start {
            Some(start) => {
                let source = self.processor.source().clone();
                let days = blocking(move || source.available_days(start)).await?;
                info!(%start, days = days.len(), "backfilling tick files");
                let backfilled = self.backfill(&days).await?;
                let resume = match days.last() {
                    Some(&last) => ResumePoint::After(Some(last)),
                    None => ResumePoint::From(start),
                };
                (backfilled, resume)
            }
            None => (0, ResumePoint::After(self.high_water_mark().await?)),
        };

        let tailed = self.live_tail(resume).await?;
        Ok(RunSummary {
            backfilled,
            tailed,
            resume,
        })
    }

    /// Latest trading day already in the store.
    pub async fn high_water_mark(&self) -> Result<Option<TradingDay>> {
        let config = self.ctx.config.clone();
        let latest = blocking(move || {
            MinuteStore::open(&config.database_url, config.busy_timeout())?.max_trading_day()
        })
        .await?;
        match latest {
            Some(day) => info!(%day, "resuming after latest stored day"),
            None => info!("store is empty, starting from the first calendar day"),
        }
        Ok(latest)
    }

    /// Process `days` concurrently, at most `workers` at a time.
    ///
    /// Days are admitted in order. A failing day closes the admission gate
    /// before releasing its permit, so days not yet admitted never start;
    /// days already running are allowed to finish. The failure is returned as
    /// [`Error::Backfill`].
    pub async fn backfill(&self, days: &[TradingDay]) -> Result<usize> {
        if days.is_empty() {
            return Ok(0);
        }
        let workers = self.ctx.config.effective_workers();
        let gate = Arc::new(Semaphore::new(workers));
        let mut tasks = JoinSet::new();

        for &day in days {
            // A closed gate means an admitted day failed.
            let Ok(permit) = Arc::clone(&gate).acquire_owned().await else {
                break;
            };
            let gate = Arc::clone(&gate);
            let processor = self.processor.clone();
            tasks.spawn(async move {
                let result = blocking(move || processor.process(day)).await;
                if result.is_err() {
                    gate.close();
                }
                drop(permit);
                (day, result)
            });
        }
        let cancelled = days.len() - tasks.len();

        let mut done = 0;
        let mut failure: Option<Error> = None;
        while let Some(joined) = tasks.join_next().await {
            let (day, result) = joined.map_err(|e| Error::Other(format!("backfill task: {e}")))?;
            match result {
                Ok(_) => done += 1,
                Err(e) => {
                    error!(%day, error = %e, "backfill failed, cancelling remaining days");
                    if failure.is_none() {
                        failure = Some(Error::backfill(day, e));
                    }
                }
            }
        }

        match failure {
            Some(e) => {
                warn!(done, cancelled, "backfill aborted");
                Err(e)
            }
            None => {
                info!(days = done, workers, "backfill complete");
                Ok(done)
            }
        }
    }

    /// Process remaining calendar days in order, waiting for late tick files.
    pub async fn live_tail(&self, resume: ResumePoint) -> Result<usize> {
        let interval = self.ctx.config.retry_interval();
        let mut tailed = 0;

        for &day in resume.pending(&self.ctx) {
            loop {
                match self.run_once(day).await {
                    Ok(_) => {
                        tailed += 1;
                        break;
                    }
                    Err(e) if e.is_retryable() => {
                        info!(%day, retry_in = ?interval, "tick file not ready");
                        tokio::time::sleep(interval).await;
                    }
                    Err(e) => {
                        error!(%day, error = %e, "stopping");
                        return Err(e);
                    }
                }
            }
        }
        info!(days = tailed, "trading calendar exhausted");
        Ok(tailed)
    }
}

/// Run blocking file and database work off the async workers.
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Other(format!("worker task: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use tickmin_core::{Config, SessionSchedule, TradingCalendar};

    fn day(s: &str) -> TradingDay {
        s.parse().unwrap()
    }

    fn ctx() -> PipelineContext {
        let calendar = TradingCalendar::from_days(
            ["20240102", "20240103", "20240104"].iter().map(|s| day(s)),
        );
        PipelineContext::new(Config::default(), calendar, SessionSchedule::default())
    }

    #[test]
    fn test_resume_after_is_exclusive() {
        let ctx = ctx();
        assert_eq!(
            ResumePoint::After(Some(day("20240102"))).pending(&ctx),
            &[day("20240103"), day("20240104")]
        );
        assert_eq!(ResumePoint::After(None).pending(&ctx).len(), 3);
    }

    #[test]
    fn test_resume_from_is_inclusive() {
        let ctx = ctx();
        assert_eq!(
            ResumePoint::From(day("20240103")).pending(&ctx),
            &[day("20240103"), day("20240104")]
        );
    }

    #[tokio::test]
    async fn test_empty_backfill_is_noop() {
        let pipeline = Pipeline::new(ctx());
        assert_eq!(pipeline.backfill(&[]).await.unwrap(), 0);
    }
}
