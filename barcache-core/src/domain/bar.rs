//! Bar — one OHLCV record for an instrument on one trading day.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Daily OHLCV bar as loaded from a cache file.
///
/// `adj_close` is whatever the cache file carries. Files written by this crate
/// duplicate the raw close into that column, so it is NOT split/dividend
/// adjusted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub adj_close: f64,
}

impl Bar {
    /// Returns true if any price field is NaN.
    pub fn is_void(&self) -> bool {
        self.open.is_nan()
            || self.high.is_nan()
            || self.low.is_nan()
            || self.close.is_nan()
            || self.adj_close.is_nan()
    }
}

/// Bar frequency. Only [`Frequency::Day`] can be downloaded and cached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Trade,
    Minute,
    Hour,
    #[default]
    Day,
    Week,
    Month,
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Frequency::Trade => "trade",
            Frequency::Minute => "minute",
            Frequency::Hour => "hour",
            Frequency::Day => "day",
            Frequency::Week => "week",
            Frequency::Month => "month",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_bar() -> Bar {
        Bar {
            date: NaiveDate::from_ymd_opt(2015, 1, 5).unwrap(),
            open: 10.0,
            high: 10.5,
            low: 9.8,
            close: 10.2,
            volume: 120_000.0,
            adj_close: 10.2,
        }
    }

    #[test]
    fn bar_is_not_void() {
        assert!(!sample_bar().is_void());
    }

    #[test]
    fn nan_close_is_void() {
        let mut bar = sample_bar();
        bar.close = f64::NAN;
        assert!(bar.is_void());
    }

    #[test]
    fn frequency_defaults_to_day() {
        assert_eq!(Frequency::default(), Frequency::Day);
    }

    #[test]
    fn frequency_parses_lowercase() {
        let f: Frequency = serde_json::from_str("\"minute\"").unwrap();
        assert_eq!(f, Frequency::Minute);
        assert_eq!(f.to_string(), "minute");
    }
}
