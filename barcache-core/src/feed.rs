//! In-memory bar feed.
//!
//! Holds one ascending series of daily bars per instrument, filled from
//! cache files. The loader only needs the [`CsvBarSink`] capability, so any
//! other feed that can ingest a cache file can be loaded the same way.

use crate::data::normalize::CACHE_HEADER;
use crate::domain::{Bar, Frequency};
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Date formats accepted in the `Date` column (sources are not reformatted).
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y%m%d"];

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("failed to open {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed CSV in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("unexpected header in {path}: '{found}'")]
    BadHeader { path: PathBuf, found: String },

    #[error("unparseable date '{value}' in {path}")]
    BadDate { path: PathBuf, value: String },
}

/// Something that can ingest a cache file for an instrument.
pub trait CsvBarSink {
    /// Append the bars in `path` to `instrument`'s series. Returns the number of bars added.
    fn add_bars_from_csv(&mut self, instrument: &str, path: &Path) -> Result<usize, FeedError>;
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(rename = "Date")]
    date: String,
    #[serde(rename = "Open")]
    open: f64,
    #[serde(rename = "High")]
    high: f64,
    #[serde(rename = "Low")]
    low: f64,
    #[serde(rename = "Close")]
    close: f64,
    #[serde(rename = "Volume")]
    volume: f64,
    #[serde(rename = "Adj Close")]
    adj_close: f64,
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value.trim(), fmt).ok())
}

/// Daily bars keyed by instrument.
#[derive(Debug, Clone, Default)]
pub struct BarFeed {
    frequency: Frequency,
    series: BTreeMap<String, Vec<Bar>>,
}

impl BarFeed {
    pub fn new(frequency: Frequency) -> Self {
        Self {
            frequency,
            series: BTreeMap::new(),
        }
    }

    pub fn frequency(&self) -> Frequency {
        self.frequency
    }

    /// Instruments with at least one loaded file, in sorted order.
    pub fn instruments(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(|s| s.as_str())
    }

    pub fn bars(&self, instrument: &str) -> Option<&[Bar]> {
        self.series.get(instrument).map(|v| v.as_slice())
    }

    /// Total number of bars across all instruments.
    pub fn len(&self) -> usize {
        self.series.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// First and last bar date for an instrument.
    pub fn date_range(&self, instrument: &str) -> Option<(NaiveDate, NaiveDate)> {
        let bars = self.series.get(instrument)?;
        Some((bars.first()?.date, bars.last()?.date))
    }

    /// BLAKE3 hash over every bar, in instrument order.
    ///
    /// Two feeds built from identical cache files hash identically.
    pub fn fingerprint(&self) -> String {
        let mut hasher = blake3::Hasher::new();

        for (instrument, bars) in &self.series {
            hasher.update(instrument.as_bytes());
            for bar in bars {
                hasher.update(bar.date.to_string().as_bytes());
                hasher.update(&bar.open.to_le_bytes());
                hasher.update(&bar.high.to_le_bytes());
                hasher.update(&bar.low.to_le_bytes());
                hasher.update(&bar.close.to_le_bytes());
                hasher.update(&bar.volume.to_le_bytes());
                hasher.update(&bar.adj_close.to_le_bytes());
            }
        }

        hasher.finalize().to_hex().to_string()
    }
}

impl CsvBarSink for BarFeed {
    fn add_bars_from_csv(&mut self, instrument: &str, path: &Path) -> Result<usize, FeedError> {
        let file = File::open(path).map_err(|source| FeedError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let csv_err = |source| FeedError::Csv {
            path: path.to_path_buf(),
            source,
        };

        let mut rdr = csv::Reader::from_reader(file);
        let headers = rdr.headers().map_err(csv_err)?;
        let found = headers.iter().collect::<Vec<_>>().join(",");
        if found != CACHE_HEADER {
            return Err(FeedError::BadHeader {
                path: path.to_path_buf(),
                found,
            });
        }

        let mut bars = Vec::new();
        for record in rdr.deserialize::<CsvRow>() {
            let row = record.map_err(csv_err)?;
            let date = parse_date(&row.date).ok_or_else(|| FeedError::BadDate {
                path: path.to_path_buf(),
                value: row.date.clone(),
            })?;
            bars.push(Bar {
                date,
                open: row.open,
                high: row.high,
                low: row.low,
                close: row.close,
                volume: row.volume,
                adj_close: row.adj_close,
            });
        }

        // Sources may return rows newest-first.
        bars.sort_by_key(|b| b.date);

        let added = bars.len();
        self.series
            .entry(instrument.to_string())
            .or_default()
            .extend(bars);
        Ok(added)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_temp(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_rows_sorted_ascending() {
        let path = write_temp(&format!(
            "{CACHE_HEADER}\n20150106,1,2,0.5,1.5,10,1.5\n20150105,1,2,0.5,1.4,20,1.4\n"
        ));
        let mut feed = BarFeed::new(Frequency::Day);

        assert_eq!(feed.add_bars_from_csv("600848", path.path()).unwrap(), 2);
        let bars = feed.bars("600848").unwrap();
        assert_eq!(bars[0].date, NaiveDate::from_ymd_opt(2015, 1, 5).unwrap());
        assert_eq!(bars[0].volume, 20.0);
        assert_eq!(bars[1].adj_close, 1.5);
    }

    #[test]
    fn appends_files_in_call_order() {
        let y2015 = write_temp(&format!("{CACHE_HEADER}\n2015-12-31,1,1,1,1,1,1\n"));
        let y2016 = write_temp(&format!("{CACHE_HEADER}\n2016-01-04,2,2,2,2,2,2\n"));
        let mut feed = BarFeed::new(Frequency::Day);

        feed.add_bars_from_csv("ABC", y2015.path()).unwrap();
        feed.add_bars_from_csv("ABC", y2016.path()).unwrap();

        assert_eq!(feed.len(), 2);
        assert_eq!(
            feed.date_range("ABC"),
            Some((
                NaiveDate::from_ymd_opt(2015, 12, 31).unwrap(),
                NaiveDate::from_ymd_opt(2016, 1, 4).unwrap()
            ))
        );
    }

    #[test]
    fn native_header_is_rejected() {
        let path = write_temp("trade_date,open,high,low,close,volume,close\n20150105,1,2,0.5,1.4,20,1.4\n");
        let mut feed = BarFeed::new(Frequency::Day);

        let err = feed.add_bars_from_csv("600848", path.path()).unwrap_err();
        assert!(matches!(err, FeedError::BadHeader { .. }));
        assert!(feed.is_empty());
    }

    #[test]
    fn bad_date_is_reported() {
        let path = write_temp(&format!("{CACHE_HEADER}\n05/01/2015,1,2,0.5,1.4,20,1.4\n"));
        let mut feed = BarFeed::new(Frequency::Day);

        let err = feed.add_bars_from_csv("600848", path.path()).unwrap_err();
        assert!(err.to_string().contains("05/01/2015"));
    }

    #[test]
    fn missing_file_is_io_error() {
        let mut feed = BarFeed::new(Frequency::Day);
        let err = feed
            .add_bars_from_csv("X", Path::new("/nonexistent/barcache.csv"))
            .unwrap_err();
        assert!(matches!(err, FeedError::Io { .. }));
    }

    #[test]
    fn fingerprint_is_deterministic() {
        let path = write_temp(&format!("{CACHE_HEADER}\n20150105,1,2,0.5,1.4,20,1.4\n"));
        let mut a = BarFeed::new(Frequency::Day);
        let mut b = BarFeed::new(Frequency::Day);
        a.add_bars_from_csv("X", path.path()).unwrap();
        b.add_bars_from_csv("X", path.path()).unwrap();

        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), BarFeed::default().fingerprint());
    }
}
