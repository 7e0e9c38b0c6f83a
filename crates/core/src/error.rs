//! Error types for the tick-to-minute pipeline.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the tick-to-minute pipeline.
#[derive(Error, Debug)]
pub enum Error {
    /// The tick file for a trading day does not exist yet.
    #[error("Tick source not ready for {day}")]
    SourceNotReady { day: String },

    /// The tick file exists but could not be opened, decompressed or decoded.
    #[error("Tick source read error: {0}")]
    SourceRead(String),

    /// A trading-time-section record could not be parsed.
    #[error("Malformed trading sections: {0}")]
    ScheduleMalformed(String),

    /// The trading calendar could not be loaded.
    #[error("Calendar error: {0}")]
    Calendar(String),

    /// The relational store could not be opened or queried.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// A replace-day transaction failed and was rolled back.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// A minute-bucket key could not be turned into a timestamp.
    #[error("Malformed timestamp: {0}")]
    TimestampMalformed(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A backfill worker failed; the remaining workers were cancelled.
    #[error("Backfill of {day} failed: {source}")]
    Backfill {
        day: String,
        #[source]
        source: Box<Error>,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with message.
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a source-not-ready error.
    pub fn source_not_ready(day: impl ToString) -> Self {
        Error::SourceNotReady {
            day: day.to_string(),
        }
    }

    /// Create a source read error.
    pub fn source_read(msg: impl Into<String>) -> Self {
        Error::SourceRead(msg.into())
    }

    /// Create a malformed schedule error.
    pub fn schedule(msg: impl Into<String>) -> Self {
        Error::ScheduleMalformed(msg.into())
    }

    /// Create a calendar error.
    pub fn calendar(msg: impl Into<String>) -> Self {
        Error::Calendar(msg.into())
    }

    /// Create a store error.
    pub fn store(msg: impl Into<String>) -> Self {
        Error::StoreUnavailable(msg.into())
    }

    /// Create a transaction error.
    pub fn transaction(msg: impl Into<String>) -> Self {
        Error::Transaction(msg.into())
    }

    /// Create a malformed timestamp error.
    pub fn timestamp(msg: impl Into<String>) -> Self {
        Error::TimestampMalformed(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Wrap a failure of one backfill day.
    pub fn backfill(day: impl ToString, source: Error) -> Self {
        Error::Backfill {
            day: day.to_string(),
            source: Box::new(source),
        }
    }

    /// Whether the pipeline should wait and retry the same day.
    ///
    /// Only a missing tick file is retryable; everything else stops the run.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::SourceNotReady { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_missing_source_is_retryable() {
        assert!(Error::source_not_ready("20240103").is_retryable());
        assert!(!Error::source_read("bad gzip header").is_retryable());
        assert!(!Error::transaction("commit failed").is_retryable());
        assert!(!Error::backfill("20240103", Error::source_not_ready("20240103")).is_retryable());
    }

    #[test]
    fn test_backfill_message_names_day() {
        let err = Error::backfill("20240103", Error::store("locked"));
        assert_eq!(
            err.to_string(),
            "Backfill of 20240103 failed: Store unavailable: locked"
        );
    }
}
