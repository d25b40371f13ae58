//! Yahoo Finance history source.
//!
//! Fetches daily OHLCV bars from Yahoo's v8 chart API. Yahoo has no separate
//! index endpoint: index symbols (`^GSPC`) go through the same query, so the
//! instrument kind is ignored here.
//!
//! Yahoo Finance has no official API and is subject to unannounced format changes.

use super::provider::{DataError, HistorySource, RawFrame, RawRow};
use crate::domain::InstrumentKind;
use chrono::NaiveDate;
use serde::Deserialize;

/// Yahoo Finance v8 chart API response.
#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteData>,
}

#[derive(Debug, Deserialize)]
struct QuoteData {
    open: Vec<Option<f64>>,
    high: Vec<Option<f64>>,
    low: Vec<Option<f64>>,
    close: Vec<Option<f64>>,
    volume: Vec<Option<f64>>,
}

/// Yahoo Finance history source.
pub struct YahooSource {
    client: reqwest::blocking::Client,
}

impl YahooSource {
    pub fn new() -> Result<Self, DataError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .build()
            .map_err(|e| DataError::NetworkUnreachable(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client })
    }

    /// Build the chart API URL for a symbol and date range.
    fn chart_url(symbol: &str, start: NaiveDate, end: NaiveDate) -> String {
        let start_ts = start.and_time(chrono::NaiveTime::MIN).and_utc().timestamp();
        let end_ts = end
            .and_time(chrono::NaiveTime::MIN)
            .and_utc()
            .timestamp()
            + 86_399;
        format!(
            "https://query2.finance.yahoo.com/v8/finance/chart/{symbol}\
             ?period1={start_ts}&period2={end_ts}&interval=1d"
        )
    }

    /// Parse the chart API response into a `RawFrame`.
    fn parse_response(
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
        resp: ChartResponse,
    ) -> Result<RawFrame, DataError> {
        let result = resp.chart.result.ok_or_else(|| {
            if let Some(err) = resp.chart.error {
                if err.code == "Not Found" {
                    DataError::SymbolNotFound {
                        symbol: symbol.to_string(),
                    }
                } else {
                    DataError::ResponseFormatChanged(format!("{}: {}", err.code, err.description))
                }
            } else {
                DataError::ResponseFormatChanged("empty result with no error".into())
            }
        })?;

        let data = result
            .into_iter()
            .next()
            .ok_or_else(|| DataError::ResponseFormatChanged("result array is empty".into()))?;

        // Yahoo omits timestamps entirely for a range with no trading days.
        let timestamps = data.timestamp.unwrap_or_default();

        let quote = data
            .indicators
            .quote
            .into_iter()
            .next()
            .ok_or_else(|| DataError::ResponseFormatChanged("no quote data".into()))?;

        let mut rows = Vec::with_capacity(timestamps.len());

        for (i, &ts) in timestamps.iter().enumerate() {
            let date = chrono::DateTime::from_timestamp(ts, 0)
                .map(|dt| dt.naive_utc().date())
                .ok_or_else(|| {
                    DataError::ResponseFormatChanged(format!("invalid timestamp: {ts}"))
                })?;

            let open = quote.open.get(i).copied().flatten();
            let high = quote.high.get(i).copied().flatten();
            let low = quote.low.get(i).copied().flatten();
            let close = quote.close.get(i).copied().flatten();
            let volume = quote.volume.get(i).copied().flatten();

            // Skip bars where all OHLCV are None (holidays/non-trading days)
            if open.is_none()
                && high.is_none()
                && low.is_none()
                && close.is_none()
                && volume.is_none()
            {
                continue;
            }

            rows.push(RawRow {
                date: date.format("%Y-%m-%d").to_string(),
                open: open.unwrap_or(f64::NAN),
                high: high.unwrap_or(f64::NAN),
                low: low.unwrap_or(f64::NAN),
                close: close.unwrap_or(f64::NAN),
                volume: volume.unwrap_or(0.0),
            });
        }

        if rows.is_empty() {
            return Err(DataError::EmptyResponse {
                instrument: symbol.to_string(),
                start,
                end,
            });
        }

        Ok(RawFrame::new("Date", rows))
    }
}

impl HistorySource for YahooSource {
    fn tag(&self) -> &str {
        "yahoo"
    }

    fn fetch_daily(
        &self,
        instrument: &str,
        start: NaiveDate,
        end: NaiveDate,
        _kind: InstrumentKind,
    ) -> Result<RawFrame, DataError> {
        let url = Self::chart_url(instrument, start, end);

        let resp = self
            .client
            .get(&url)
            .send()
            .map_err(|e| DataError::NetworkUnreachable(e.to_string()))?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(DataError::AuthenticationRequired(
                "Yahoo Finance requires authentication".into(),
            ));
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(DataError::SymbolNotFound {
                symbol: instrument.to_string(),
            });
        }
        if !status.is_success() {
            return Err(DataError::ResponseFormatChanged(format!(
                "HTTP {status} for {instrument}"
            )));
        }

        let chart: ChartResponse = resp.json().map_err(|e| {
            DataError::ResponseFormatChanged(format!("failed to parse response for {instrument}: {e}"))
        })?;

        Self::parse_response(instrument, start, end, chart)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn year_2016() -> (NaiveDate, NaiveDate) {
        (
            NaiveDate::from_ymd_opt(2016, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2016, 12, 31).unwrap(),
        )
    }

    #[test]
    fn chart_url_covers_whole_range() {
        let (start, end) = year_2016();
        let url = YahooSource::chart_url("TCEHY", start, end);
        assert!(url.contains("/chart/TCEHY?"));
        assert!(url.contains("period1=1451606400"));
        assert!(url.contains("period2=1483228799"));
        assert!(url.contains("interval=1d"));
    }

    #[test]
    fn parses_quotes_and_skips_holidays() {
        let (start, end) = year_2016();
        let resp: ChartResponse = serde_json::from_str(
            r#"{"chart":{"result":[{
                "timestamp":[1451865600,1451952000,1452038400],
                "indicators":{"quote":[{
                    "open":[20.1,null,20.5],
                    "high":[20.4,null,20.9],
                    "low":[19.8,null,20.2],
                    "close":[20.0,null,20.8],
                    "volume":[1000,null,1500]
                }]}
            }],"error":null}}"#,
        )
        .unwrap();

        let frame = YahooSource::parse_response("TCEHY", start, end, resp).unwrap();
        assert_eq!(frame.index_label, "Date");
        assert_eq!(frame.rows.len(), 2);
        assert_eq!(frame.rows[0].date, "2016-01-04");
        assert_eq!(frame.rows[1].date, "2016-01-06");
        assert_eq!(frame.rows[1].volume, 1500.0);
    }

    #[test]
    fn not_found_maps_to_symbol_error() {
        let (start, end) = year_2016();
        let resp: ChartResponse = serde_json::from_str(
            r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found"}}}"#,
        )
        .unwrap();

        let err = YahooSource::parse_response("NOPE", start, end, resp).unwrap_err();
        assert!(matches!(err, DataError::SymbolNotFound { .. }));
    }

    #[test]
    fn no_timestamps_is_empty_response() {
        let (start, end) = year_2016();
        let resp: ChartResponse = serde_json::from_str(
            r#"{"chart":{"result":[{"indicators":{"quote":[{
                "open":[],"high":[],"low":[],"close":[],"volume":[]}]}}],"error":null}}"#,
        )
        .unwrap();

        let err = YahooSource::parse_response("TCEHY", start, end, resp).unwrap_err();
        assert!(matches!(err, DataError::EmptyResponse { .. }));
    }
}
