//! Tushare Pro history source.
//!
//! Queries the Tushare Pro HTTP API: a single JSON POST per request carrying
//! `api_name`, `token`, `params` and `fields`. Equities go through the
//! `daily` endpoint and indices through `index_daily`.
//!
//! Dates come back as `YYYYMMDD` strings and are kept that way.
//!
//! Equity prices are forward-adjusted (qfq) by default: a second query to
//! `adj_factor` fetches the factors from the start of the range up to the
//! latest trading day, and every price is scaled by
//! `factor(date) / latest factor`. Index prices need no adjustment.

use super::provider::{DataError, HistorySource, RawFrame, RawRow};
use crate::domain::InstrumentKind;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub const DEFAULT_BASE_URL: &str = "http://api.tushare.pro";

const FIELDS: &str = "trade_date,open,high,low,close,vol";
const FACTOR_FIELDS: &str = "trade_date,adj_factor";

/// Price adjustment applied to equity bars.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Adjustment {
    /// Forward-adjusted: the latest prices are unchanged, history is rescaled.
    #[default]
    Qfq,
    /// Unadjusted exchange prices.
    Raw,
}

#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    api_name: &'a str,
    token: &'a str,
    params: QueryParams,
    fields: &'a str,
}

#[derive(Debug, Serialize)]
struct QueryParams {
    ts_code: String,
    start_date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    end_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    code: i64,
    #[serde(default)]
    msg: Option<String>,
    data: Option<ApiData>,
}

#[derive(Debug, Deserialize)]
struct ApiData {
    fields: Vec<String>,
    items: Vec<Vec<Value>>,
}

/// Tushare Pro history source.
pub struct TushareSource {
    client: reqwest::blocking::Client,
    base_url: String,
    token: String,
    adjustment: Adjustment,
}

impl TushareSource {
    pub fn new(token: impl Into<String>) -> Result<Self, DataError> {
        Self::with_base_url(token, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(
        token: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self, DataError> {
        let client = reqwest::blocking::Client::builder()
            .build()
            .map_err(|e| DataError::NetworkUnreachable(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            token: token.into(),
            adjustment: Adjustment::default(),
        })
    }

    pub fn with_adjustment(mut self, adjustment: Adjustment) -> Self {
        self.adjustment = adjustment;
        self
    }

    /// POST one API query and decode the envelope.
    fn query(
        &self,
        instrument: &str,
        api_name: &str,
        params: QueryParams,
        fields: &str,
    ) -> Result<ApiResponse, DataError> {
        let request = ApiRequest {
            api_name,
            token: &self.token,
            params,
            fields,
        };

        let resp = self
            .client
            .post(&self.base_url)
            .json(&request)
            .send()
            .map_err(|e| DataError::NetworkUnreachable(e.to_string()))?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(DataError::AuthenticationRequired(format!(
                "Tushare returned HTTP {status}"
            )));
        }
        if !status.is_success() {
            return Err(DataError::ResponseFormatChanged(format!(
                "HTTP {status} for {instrument}"
            )));
        }

        resp.json().map_err(|e| {
            DataError::ResponseFormatChanged(format!("failed to parse response for {instrument}: {e}"))
        })
    }

    fn api_name(kind: InstrumentKind) -> &'static str {
        match kind {
            InstrumentKind::Index => "index_daily",
            InstrumentKind::Equity => "daily",
        }
    }
}

/// Map an instrument code to an exchange-qualified Tushare code.
pub fn ts_code(instrument: &str, kind: InstrumentKind) -> String {
    if instrument.contains('.') {
        return instrument.to_uppercase();
    }

    if kind.is_index() {
        let mapped = match instrument {
            "sh" => Some("000001.SH"),
            "sz" => Some("399001.SZ"),
            "hs300" => Some("000300.SH"),
            "sz50" => Some("000016.SH"),
            "zxb" => Some("399005.SZ"),
            "cyb" => Some("399006.SZ"),
            _ => None,
        };
        if let Some(code) = mapped {
            return code.to_string();
        }
    }

    let exchange = match instrument.chars().next() {
        Some('6') | Some('9') => "SH",
        Some('0') | Some('2') | Some('3') => "SZ",
        Some('4') | Some('8') => "BJ",
        _ => return instrument.to_string(),
    };
    format!("{instrument}.{exchange}")
}

/// Unwrap the response envelope: non-zero codes are rejections.
fn into_data(resp: ApiResponse) -> Result<ApiData, DataError> {
    if resp.code != 0 {
        return Err(DataError::Rejected {
            code: resp.code,
            msg: resp.msg.unwrap_or_default(),
        });
    }

    resp.data
        .ok_or_else(|| DataError::ResponseFormatChanged("response has no data section".into()))
}

impl ApiData {
    fn column(&self, name: &str) -> Result<usize, DataError> {
        self.fields
            .iter()
            .position(|f| f == name)
            .ok_or_else(|| DataError::ResponseFormatChanged(format!("missing field '{name}'")))
    }
}

/// Turn the decoded API response into a `RawFrame`.
fn parse_response(
    instrument: &str,
    start: NaiveDate,
    end: NaiveDate,
    resp: ApiResponse,
) -> Result<RawFrame, DataError> {
    let data = into_data(resp)?;

    let date_idx = data.column("trade_date")?;
    let open_idx = data.column("open")?;
    let high_idx = data.column("high")?;
    let low_idx = data.column("low")?;
    let close_idx = data.column("close")?;
    let vol_idx = data.column("vol")?;

    let mut rows = Vec::with_capacity(data.items.len());
    for (i, item) in data.items.iter().enumerate() {
        let date = item
            .get(date_idx)
            .and_then(Value::as_str)
            .ok_or_else(|| DataError::ResponseFormatChanged(format!("row {i}: no trade_date")))?;

        let number = |idx: usize| item.get(idx).and_then(Value::as_f64).unwrap_or(f64::NAN);

        rows.push(RawRow {
            date: date.to_string(),
            open: number(open_idx),
            high: number(high_idx),
            low: number(low_idx),
            close: number(close_idx),
            volume: number(vol_idx),
        });
    }

    if rows.is_empty() {
        return Err(DataError::EmptyResponse {
            instrument: instrument.to_string(),
            start,
            end,
        });
    }

    Ok(RawFrame::new("trade_date", rows))
}

/// Decode an `adj_factor` response into factors keyed by `YYYYMMDD` date.
fn parse_adj_factors(resp: ApiResponse) -> Result<BTreeMap<String, f64>, DataError> {
    let data = into_data(resp)?;
    let date_idx = data.column("trade_date")?;
    let factor_idx = data.column("adj_factor")?;

    let mut factors = BTreeMap::new();
    for (i, item) in data.items.iter().enumerate() {
        let date = item
            .get(date_idx)
            .and_then(Value::as_str)
            .ok_or_else(|| DataError::ResponseFormatChanged(format!("factor row {i}: no trade_date")))?;
        // Suspended days can report a null factor; the previous one still applies.
        if let Some(factor) = item.get(factor_idx).and_then(Value::as_f64) {
            factors.insert(date.to_string(), factor);
        }
    }
    Ok(factors)
}

fn round_cents(price: f64) -> f64 {
    (price * 100.0).round() / 100.0
}

/// Forward-adjust prices: `price * factor(date) / latest factor`, rounded to
/// two decimals. A row uses the factor of its own date, else the closest
/// earlier one, else the earliest known. Volume is left as reported.
fn apply_qfq(frame: &mut RawFrame, factors: &BTreeMap<String, f64>) -> Result<(), DataError> {
    let latest = factors
        .values()
        .next_back()
        .copied()
        .filter(|f| *f > 0.0)
        .ok_or_else(|| DataError::ResponseFormatChanged("no usable adjustment factors".into()))?;

    for row in &mut frame.rows {
        let factor = factors
            .range(..=row.date.clone())
            .next_back()
            .or_else(|| factors.iter().next())
            .map(|(_, f)| *f)
            .unwrap_or(latest);
        let ratio = factor / latest;

        row.open = round_cents(row.open * ratio);
        row.high = round_cents(row.high * ratio);
        row.low = round_cents(row.low * ratio);
        row.close = round_cents(row.close * ratio);
    }
    Ok(())
}

impl HistorySource for TushareSource {
    fn tag(&self) -> &str {
        "tushare"
    }

    fn fetch_daily(
        &self,
        instrument: &str,
        start: NaiveDate,
        end: NaiveDate,
        kind: InstrumentKind,
    ) -> Result<RawFrame, DataError> {
        let code = ts_code(instrument, kind);
        let resp = self.query(
            instrument,
            Self::api_name(kind),
            QueryParams {
                ts_code: code.clone(),
                start_date: start.format("%Y%m%d").to_string(),
                end_date: Some(end.format("%Y%m%d").to_string()),
            },
            FIELDS,
        )?;
        let mut frame = parse_response(instrument, start, end, resp)?;

        if kind == InstrumentKind::Equity && self.adjustment == Adjustment::Qfq {
            // Open-ended so the latest factor is the one as of today.
            let resp = self.query(
                instrument,
                "adj_factor",
                QueryParams {
                    ts_code: code,
                    start_date: start.format("%Y%m%d").to_string(),
                    end_date: None,
                },
                FACTOR_FIELDS,
            )?;
            let factors = parse_adj_factors(resp)?;
            apply_qfq(&mut frame, &factors)?;
        }

        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn year_2015() -> (NaiveDate, NaiveDate) {
        (
            NaiveDate::from_ymd_opt(2015, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2015, 12, 31).unwrap(),
        )
    }

    fn decode(json: &str) -> ApiResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn index_aliases_map_to_exchange_codes() {
        assert_eq!(ts_code("hs300", InstrumentKind::Index), "000300.SH");
        assert_eq!(ts_code("sh", InstrumentKind::Index), "000001.SH");
        assert_eq!(ts_code("cyb", InstrumentKind::Index), "399006.SZ");
        assert_eq!(ts_code("399106", InstrumentKind::Index), "399106.SZ");
    }

    #[test]
    fn equity_codes_get_exchange_suffix() {
        assert_eq!(ts_code("600848", InstrumentKind::Equity), "600848.SH");
        assert_eq!(ts_code("000001", InstrumentKind::Equity), "000001.SZ");
        assert_eq!(ts_code("300750", InstrumentKind::Equity), "300750.SZ");
        assert_eq!(ts_code("830799", InstrumentKind::Equity), "830799.BJ");
        assert_eq!(ts_code("600848.sh", InstrumentKind::Equity), "600848.SH");
        assert_eq!(ts_code("tcehy", InstrumentKind::Equity), "tcehy");
    }

    #[test]
    fn api_name_follows_instrument_kind() {
        assert_eq!(TushareSource::api_name(InstrumentKind::Index), "index_daily");
        assert_eq!(TushareSource::api_name(InstrumentKind::Equity), "daily");
    }

    #[test]
    fn request_body_shape() {
        let req = ApiRequest {
            api_name: "daily",
            token: "t0k",
            params: QueryParams {
                ts_code: "600848.SH".into(),
                start_date: "20150101".into(),
                end_date: Some("20151231".into()),
            },
            fields: FIELDS,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["api_name"], "daily");
        assert_eq!(json["params"]["ts_code"], "600848.SH");
        assert_eq!(json["params"]["end_date"], "20151231");
    }

    #[test]
    fn open_ended_factor_query_omits_end_date() {
        let params = QueryParams {
            ts_code: "600848.SH".into(),
            start_date: "20150101".into(),
            end_date: None,
        };
        let json = serde_json::to_value(&params).unwrap();
        assert!(json.get("end_date").is_none());
    }

    #[test]
    fn qfq_rescales_history_to_latest_factor() {
        let factors = parse_adj_factors(decode(
            r#"{"code":0,"data":{
                "fields":["ts_code","trade_date","adj_factor"],
                "items":[["600848.SH","20160301",2.0],
                         ["600848.SH","20150107",2.0],
                         ["600848.SH","20150106",null],
                         ["600848.SH","20150105",1.0]]}}"#,
        ))
        .unwrap();
        assert_eq!(factors.len(), 3);

        let mut frame = RawFrame::new(
            "trade_date",
            vec![
                RawRow {
                    date: "20150107".into(),
                    open: 10.0,
                    high: 10.5,
                    low: 9.5,
                    close: 10.25,
                    volume: 500.0,
                },
                RawRow {
                    date: "20150106".into(),
                    open: 20.0,
                    high: 21.0,
                    low: 19.0,
                    close: 20.5,
                    volume: 400.0,
                },
                RawRow {
                    date: "20150102".into(),
                    open: 20.0,
                    high: 20.0,
                    low: 20.0,
                    close: 20.0,
                    volume: 300.0,
                },
            ],
        );
        apply_qfq(&mut frame, &factors).unwrap();

        // After the factor change: unchanged.
        assert_eq!(frame.rows[0].close, 10.25);
        // Null factor on 01-06 falls back to 01-05's factor of 1.0: halved.
        assert_eq!(frame.rows[1].open, 10.0);
        assert_eq!(frame.rows[1].close, 10.25);
        assert_eq!(frame.rows[1].volume, 400.0);
        // Before any factor: earliest known factor applies.
        assert_eq!(frame.rows[2].close, 10.0);
    }

    #[test]
    fn qfq_without_factors_is_an_error() {
        let mut frame = RawFrame::new("trade_date", Vec::new());
        assert!(apply_qfq(&mut frame, &BTreeMap::new()).is_err());
    }

    #[test]
    fn adjustment_defaults_to_qfq() {
        let source = TushareSource::new("t0k").unwrap();
        assert_eq!(source.adjustment, Adjustment::Qfq);
        let raw = source.with_adjustment(Adjustment::Raw);
        assert_eq!(raw.adjustment, Adjustment::Raw);
    }

    #[test]
    fn parses_items_in_field_order() {
        let (start, end) = year_2015();
        let resp = decode(
            r#"{"code":0,"msg":"","data":{
                "fields":["vol","trade_date","open","high","low","close"],
                "items":[[1200.5,"20151231",10.0,10.4,9.9,10.3],
                         [900.0,"20151230",9.8,10.1,9.7,10.0]]}}"#,
        );
        let frame = parse_response("600848", start, end, resp).unwrap();

        assert_eq!(frame.index_label, "trade_date");
        assert_eq!(frame.rows.len(), 2);
        // Source order is preserved (descending here).
        assert_eq!(frame.rows[0].date, "20151231");
        assert_eq!(frame.rows[0].volume, 1200.5);
        assert_eq!(frame.rows[1].close, 10.0);
    }

    #[test]
    fn null_prices_become_nan() {
        let (start, end) = year_2015();
        let resp = decode(
            r#"{"code":0,"data":{
                "fields":["trade_date","open","high","low","close","vol"],
                "items":[["20150105",null,10.4,9.9,10.3,100]]}}"#,
        );
        let frame = parse_response("600848", start, end, resp).unwrap();
        assert!(frame.rows[0].open.is_nan());
        assert_eq!(frame.rows[0].volume, 100.0);
    }

    #[test]
    fn nonzero_code_is_rejected() {
        let (start, end) = year_2015();
        let resp = decode(r#"{"code":40203,"msg":"rate limit","data":null}"#);
        let err = parse_response("600848", start, end, resp).unwrap_err();
        assert!(matches!(err, DataError::Rejected { code: 40203, .. }));
    }

    #[test]
    fn empty_items_is_an_error() {
        let (start, end) = year_2015();
        let resp = decode(
            r#"{"code":0,"data":{"fields":["trade_date","open","high","low","close","vol"],"items":[]}}"#,
        );
        let err = parse_response("600848", start, end, resp).unwrap_err();
        assert!(matches!(err, DataError::EmptyResponse { .. }));
    }

    #[test]
    fn missing_field_is_format_change() {
        let (start, end) = year_2015();
        let resp = decode(r#"{"code":0,"data":{"fields":["trade_date","open"],"items":[]}}"#);
        let err = parse_response("600848", start, end, resp).unwrap_err();
        assert!(err.to_string().contains("missing field 'high'"));
    }
}
