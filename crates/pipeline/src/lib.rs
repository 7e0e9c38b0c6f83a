//! Tick-to-minute ETL pipeline.
//!
//! This crate provides:
//! - Startup context (config, trading calendar, session schedule)
//! - Single-day processing with replace-day persistence
//! - Concurrent backfill and the live-tail polling loop
//! - Command-line arguments for the `tickmin` binary

pub mod cli;
pub mod context;
pub mod day;
pub mod orchestrator;

pub use cli::Cli;
pub use context::PipelineContext;
pub use day::{BuiltDay, DayProcessor, DayReport};
pub use orchestrator::{Pipeline, ResumePoint, RunSummary};
