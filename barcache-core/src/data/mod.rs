//! Historical data acquisition and caching.

pub mod cache;
pub mod loader;
pub mod normalize;
pub mod provider;
pub mod tushare;
pub mod yahoo;

pub use cache::{CacheEntry, CsvCache};
pub use loader::{build_feed, load_into, FeedOptions, LoadError, LoadObserver, TracingObserver};
pub use normalize::{download_daily_bars, CACHE_HEADER};
pub use provider::{DataError, HistorySource, RawFrame, RawRow};
pub use tushare::{Adjustment, TushareSource};
pub use yahoo::YahooSource;
