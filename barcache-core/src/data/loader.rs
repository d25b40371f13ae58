//! Ensure-and-load: make sure every (instrument, year) cache file exists,
//! downloading the missing ones, then load them all into a bar feed.
//!
//! Pairs are processed strictly sequentially, year-major then instrument, so
//! a feed's series are appended in year order. A pair whose download fails is
//! either skipped (`skip_errors`) or aborts the whole load. A skipped pair
//! leaves no file behind and is retried on the next load.

use super::cache::CsvCache;
use super::normalize::{download_daily_bars, year_bounds};
use super::provider::{DataError, HistorySource};
use crate::domain::Frequency;
use crate::feed::{BarFeed, CsvBarSink, FeedError};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from the loader.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("unsupported frequency '{0}': only daily bars can be downloaded")]
    UnsupportedFrequency(Frequency),

    #[error("invalid year range: {from_year} > {to_year}")]
    InvalidYearRange { from_year: i32, to_year: i32 },

    #[error("year {0} is outside the supported calendar range")]
    YearOutOfRange(i32),

    #[error("invalid instrument code '{0}': must be a plain file-name component")]
    InvalidInstrument(String),

    #[error("failed to create storage directory {path}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to download {instrument} {year} to {path}: {source}")]
    Download {
        instrument: String,
        year: i32,
        path: PathBuf,
        #[source]
        source: DataError,
    },

    #[error("failed to load {path} for {instrument}: {source}")]
    Feed {
        instrument: String,
        path: PathBuf,
        #[source]
        source: FeedError,
    },
}

/// What to load and where the cache lives.
#[derive(Debug, Clone)]
pub struct FeedOptions {
    pub instruments: Vec<String>,
    /// First year (inclusive).
    pub from_year: i32,
    /// Last year (inclusive).
    pub to_year: i32,
    /// Cache directory, created with its parents if missing.
    pub storage: PathBuf,
    pub frequency: Frequency,
    /// Log and skip pairs whose download fails instead of aborting.
    pub skip_errors: bool,
}

impl FeedOptions {
    /// Daily bars, abort on first error.
    pub fn new<I, S>(instruments: I, from_year: i32, to_year: i32, storage: impl Into<PathBuf>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            instruments: dedup_instruments(instruments.into_iter().map(Into::into)),
            from_year,
            to_year,
            storage: storage.into(),
            frequency: Frequency::Day,
            skip_errors: false,
        }
    }

    pub fn with_skip_errors(mut self, skip_errors: bool) -> Self {
        self.skip_errors = skip_errors;
        self
    }

    pub fn with_frequency(mut self, frequency: Frequency) -> Self {
        self.frequency = frequency;
        self
    }

    /// Checks that need no I/O: frequency, year range, instrument codes.
    pub fn validate(&self) -> Result<(), LoadError> {
        if self.frequency != Frequency::Day {
            return Err(LoadError::UnsupportedFrequency(self.frequency));
        }
        if self.from_year > self.to_year {
            return Err(LoadError::InvalidYearRange {
                from_year: self.from_year,
                to_year: self.to_year,
            });
        }
        for year in [self.from_year, self.to_year] {
            if year_bounds(year).is_err() {
                return Err(LoadError::YearOutOfRange(year));
            }
        }
        if let Some(bad) = self.instruments.iter().find(|i| !is_valid_instrument(i)) {
            return Err(LoadError::InvalidInstrument(bad.clone()));
        }
        Ok(())
    }
}

/// Instruments form a set: keep the first occurrence of each, in order.
fn dedup_instruments(instruments: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    instruments
        .into_iter()
        .filter(|i| seen.insert(i.clone()))
        .collect()
}

/// An instrument code becomes part of a cache file name, so it must not
/// contain path separators or be a relative path component.
pub fn is_valid_instrument(instrument: &str) -> bool {
    !instrument.trim().is_empty()
        && instrument != "."
        && instrument != ".."
        && !instrument.contains(&['/', '\\'][..])
}

/// Receives loader events. Passed in by the caller; the loader has no global logger.
pub trait LoadObserver {
    /// The storage directory did not exist and was created.
    fn on_storage_created(&self, _dir: &Path) {}

    /// A cache file is missing and is about to be downloaded.
    fn on_download_start(&self, _instrument: &str, _year: i32, _path: &Path) {}

    /// A download failed. `skipped` is true when loading continues.
    fn on_download_failed(
        &self,
        _instrument: &str,
        _year: i32,
        _path: &Path,
        _error: &DataError,
        _skipped: bool,
    ) {
    }

    /// A cache file was appended to the feed.
    fn on_file_loaded(&self, _instrument: &str, _year: i32, _path: &Path, _bars: usize) {}
}

/// Forwards loader events to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl LoadObserver for TracingObserver {
    fn on_storage_created(&self, dir: &Path) {
        tracing::info!(dir = %dir.display(), "created storage directory");
    }

    fn on_download_start(&self, instrument: &str, year: i32, path: &Path) {
        tracing::info!(instrument, year, path = %path.display(), "downloading");
    }

    fn on_download_failed(
        &self,
        instrument: &str,
        year: i32,
        path: &Path,
        error: &DataError,
        skipped: bool,
    ) {
        if skipped {
            tracing::error!(instrument, year, path = %path.display(), %error, "download failed, skipping");
        } else {
            tracing::error!(instrument, year, path = %path.display(), %error, "download failed");
        }
    }

    fn on_file_loaded(&self, instrument: &str, year: i32, path: &Path, bars: usize) {
        tracing::debug!(instrument, year, path = %path.display(), bars, "loaded");
    }
}

/// Ensure the cache is populated and load it into a fresh [`BarFeed`].
pub fn build_feed(
    source: &dyn HistorySource,
    opts: &FeedOptions,
    observer: &dyn LoadObserver,
) -> Result<BarFeed, LoadError> {
    let mut feed = BarFeed::new(opts.frequency);
    load_into(&mut feed, source, opts, observer)?;
    Ok(feed)
}

/// Ensure the cache is populated and append every cache file to `sink`.
pub fn load_into<S: CsvBarSink + ?Sized>(
    sink: &mut S,
    source: &dyn HistorySource,
    opts: &FeedOptions,
    observer: &dyn LoadObserver,
) -> Result<(), LoadError> {
    opts.validate()?;

    let cache = CsvCache::new(&opts.storage, source.tag());
    let created = cache.ensure_dir().map_err(|e| LoadError::Storage {
        path: opts.storage.clone(),
        source: e,
    })?;
    if created {
        observer.on_storage_created(cache.dir());
    }

    // `instruments` is public, so duplicates may have been pushed after `new`.
    let instruments = dedup_instruments(opts.instruments.iter().cloned());

    for year in opts.from_year..=opts.to_year {
        for instrument in &instruments {
            let path = cache.path_for(instrument, year);

            if !path.exists() {
                observer.on_download_start(instrument, year, &path);
                if let Err(e) = download_daily_bars(source, instrument, year, &path) {
                    observer.on_download_failed(instrument, year, &path, &e, opts.skip_errors);
                    if opts.skip_errors {
                        continue;
                    }
                    return Err(LoadError::Download {
                        instrument: instrument.clone(),
                        year,
                        path,
                        source: e,
                    });
                }
            }

            let bars = sink
                .add_bars_from_csv(instrument, &path)
                .map_err(|e| LoadError::Feed {
                    instrument: instrument.clone(),
                    path: path.clone(),
                    source: e,
                })?;
            observer.on_file_loaded(instrument, year, &path, bars);
        }
    }

    Ok(())
}
