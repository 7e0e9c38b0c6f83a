//! Data ingestion and normalization for the tick-to-minute pipeline.
//!
//! This crate handles:
//! - Locating and decompressing daily tick files
//! - Tick row decoding and minute bucketing
//! - Minute bar building
//! - Session-boundary filtering and volume normalization

pub mod bar_builder;
pub mod normalizer;
pub mod source;
pub mod volume;

pub use bar_builder::BarBuilder;
pub use normalizer::{ReadStats, TickReader, TickRow};
pub use source::{TickFileReader, TickFileSource};
pub use volume::{BarNormalizer, FilterStats};
