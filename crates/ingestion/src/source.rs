//! Daily tick files.
//!
//! One gzip-compressed CSV per trading day, named `<YYYYMMDD>.csv.gz`, under a
//! base directory.

use std::fs::File;
use std::io::{BufReader, ErrorKind};
use std::path::PathBuf;

use flate2::read::MultiGzDecoder;
use tickmin_core::{Error, Result, TradingDay};
use tracing::debug;

use crate::normalizer::TickReader;

const TICK_FILE_SUFFIX: &str = ".csv.gz";

/// Decompressed stream of one tick file.
pub type TickFileReader = TickReader<MultiGzDecoder<BufReader<File>>>;

/// Locates and opens daily tick files.
#[derive(Debug, Clone)]
pub struct TickFileSource {
    base_path: PathBuf,
}

impl TickFileSource {
    /// Create a source rooted at `base_path`.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Path of a day's tick file.
    pub fn path_for(&self, day: TradingDay) -> PathBuf {
        self.base_path.join(day.tick_file_name())
    }

    /// Open a day's tick file.
    ///
    /// A missing file is [`Error::SourceNotReady`]; any other failure is a
    /// [`Error::SourceRead`].
    pub fn open(&self, day: TradingDay) -> Result<TickFileReader> {
        let path = self.path_for(day);
        let file = File::open(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => Error::source_not_ready(day),
            _ => Error::source_read(format!("{}: {e}", path.display())),
        })?;
        debug!(path = %path.display(), "tick file opened");
        Ok(TickReader::new(MultiGzDecoder::new(BufReader::new(file))))
    }

    /// Trading days with a tick file at or after `from`, ascending.
    ///
    /// Entries whose name is not `<YYYYMMDD>.csv.gz` are ignored.
    pub fn available_days(&self, from: TradingDay) -> Result<Vec<TradingDay>> {
        let entries = std::fs::read_dir(&self.base_path)
            .map_err(|e| Error::source_read(format!("{}: {e}", self.base_path.display())))?;

        let mut days = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            let Some(day) = name
                .to_str()
                .and_then(|n| n.strip_suffix(TICK_FILE_SUFFIX))
                .and_then(|stem| stem.parse::<TradingDay>().ok())
            else {
                continue;
            };
            if day >= from {
                days.push(day);
            }
        }
        days.sort();
        days.dedup();
        Ok(days)
    }
}
