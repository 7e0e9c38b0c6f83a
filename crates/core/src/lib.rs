//! Core types and configuration for the tick-to-minute pipeline.
//!
//! This crate provides shared types used across all other crates:
//! - Tick and minute bar types
//! - Trading calendar and session schedule
//! - Configuration structures
//! - Common error types

pub mod calendar;
pub mod config;
pub mod error;
pub mod session;
pub mod types;

pub use calendar::TradingCalendar;
pub use config::Config;
pub use error::{Error, Result};
pub use session::{MinuteSets, SectionRecord, SessionSchedule, TimeSection};
pub use types::*;
