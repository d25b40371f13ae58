//! Barcache Core — historical daily bar cache.
//!
//! Given instruments and a year range, makes sure a normalized CSV file exists
//! on disk for every (instrument, year) pair, downloading missing years from a
//! remote source, and loads the files into an in-memory bar feed:
//! - Domain types (bars, frequency, index/equity classification)
//! - Remote history sources (Tushare Pro, Yahoo Finance)
//! - Two-phase normalization into `{instrument}-{year}-{source}.csv`
//! - The ensure-and-load operation and its observer hook
//! - TOML configuration

pub mod config;
pub mod data;
pub mod domain;
pub mod feed;

pub use config::{ConfigError, LoaderConfig, SourceConfig};
pub use data::{build_feed, FeedOptions, HistorySource, LoadError, LoadObserver, TracingObserver};
pub use domain::{Bar, Frequency, InstrumentKind};
pub use feed::{BarFeed, CsvBarSink, FeedError};
