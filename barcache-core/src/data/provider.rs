//! History source trait and structured error types.
//!
//! The `HistorySource` trait abstracts over remote data sources (Tushare,
//! Yahoo Finance) so the loader can be driven by a scripted double in tests.

use crate::domain::InstrumentKind;
use chrono::NaiveDate;
use thiserror::Error;

/// One row of a remote result, exactly as the source reported it.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    /// Date in the source's native format (not reformatted).
    pub date: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// A remote query result in the source's native layout.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFrame {
    /// Name the source gives its date index column (e.g. `trade_date`).
    pub index_label: String,
    /// Rows in whatever order the source returned them.
    pub rows: Vec<RawRow>,
}

impl RawFrame {
    pub fn new(index_label: impl Into<String>, rows: Vec<RawRow>) -> Self {
        Self {
            index_label: index_label.into(),
            rows,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Errors from fetching and normalizing one (instrument, year) pair.
///
/// The loader does not distinguish between these; they all mean the cache
/// file could not be produced.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("request rejected by provider (code {code}): {msg}")]
    Rejected { code: i64, msg: String },

    #[error("authentication required: {0}")]
    AuthenticationRequired(String),

    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("empty response for {instrument} between {start} and {end}")]
    EmptyResponse {
        instrument: String,
        start: NaiveDate,
        end: NaiveDate,
    },

    #[error("year {0} is outside the supported calendar range")]
    InvalidYear(i32),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// A remote source of daily OHLCV history.
///
/// Implementations perform a single blocking query per call, with no retries.
pub trait HistorySource: Send + Sync {
    /// Short tag used in cache file names (`{instrument}-{year}-{tag}.csv`).
    fn tag(&self) -> &str;

    /// Fetch daily bars for `instrument` between `start` and `end` inclusive.
    fn fetch_daily(
        &self,
        instrument: &str,
        start: NaiveDate,
        end: NaiveDate,
        kind: InstrumentKind,
    ) -> Result<RawFrame, DataError>;
}
