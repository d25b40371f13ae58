//! On-disk CSV cache.
//!
//! Layout: `{dir}/{instrument}-{year}-{tag}.csv`, one file per
//! (instrument, year). A file existing at that path is the only cache-hit
//! signal: there is no staleness or integrity check, and nothing is evicted.

use serde::Serialize;
use std::fs;
use std::io;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

/// The CSV cache for one source tag.
#[derive(Debug, Clone)]
pub struct CsvCache {
    dir: PathBuf,
    tag: String,
}

impl CsvCache {
    pub fn new(dir: impl Into<PathBuf>, tag: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            tag: tag.into(),
        }
    }

    /// Root directory of the cache.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Path of the cache file for an instrument and year.
    pub fn path_for(&self, instrument: &str, year: i32) -> PathBuf {
        self.dir
            .join(format!("{instrument}-{year}-{}.csv", self.tag))
    }

    pub fn contains(&self, instrument: &str, year: i32) -> bool {
        self.path_for(instrument, year).exists()
    }

    /// Create the cache directory (and parents). Returns true if it was created.
    pub fn ensure_dir(&self) -> io::Result<bool> {
        if self.dir.is_dir() {
            return Ok(false);
        }
        fs::create_dir_all(&self.dir)?;
        Ok(true)
    }

    /// Cache status for every pair, year-major then instrument.
    pub fn status<S: AsRef<str>>(
        &self,
        instruments: &[S],
        years: RangeInclusive<i32>,
    ) -> Vec<CacheEntry> {
        years
            .flat_map(|year| {
                instruments.iter().map(move |instrument| {
                    let instrument = instrument.as_ref();
                    let path = self.path_for(instrument, year);
                    CacheEntry {
                        instrument: instrument.to_string(),
                        year,
                        cached: path.exists(),
                        path,
                    }
                })
            })
            .collect()
    }

    /// Pairs with no cache file.
    pub fn missing<S: AsRef<str>>(
        &self,
        instruments: &[S],
        years: RangeInclusive<i32>,
    ) -> Vec<CacheEntry> {
        self.status(instruments, years)
            .into_iter()
            .filter(|e| !e.cached)
            .collect()
    }
}

/// Cache status for a single (instrument, year) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheEntry {
    pub instrument: String,
    pub year: i32,
    pub path: PathBuf,
    pub cached: bool,
}
