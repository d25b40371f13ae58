//! Fetch-and-normalize: produce one cache file for an (instrument, year) pair.
//!
//! The remote frame is dumped as CSV in the source's native layout, then
//! rewritten line by line with the cache header, then renamed onto the
//! destination. Both intermediate files are `tempfile` guards in the
//! destination directory, so they are removed on every exit path and the
//! destination only ever holds a complete, normalized file.

use super::provider::{DataError, HistorySource, RawFrame};
use crate::domain::InstrumentKind;
use chrono::NaiveDate;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Header of every cache file.
pub const CACHE_HEADER: &str = "Date,Open,High,Low,Close,Volume,Adj Close";

/// First and last calendar day of `year`.
pub fn year_bounds(year: i32) -> Result<(NaiveDate, NaiveDate), DataError> {
    let start = NaiveDate::from_ymd_opt(year, 1, 1);
    let end = NaiveDate::from_ymd_opt(year, 12, 31);
    match (start, end) {
        (Some(start), Some(end)) => Ok((start, end)),
        _ => Err(DataError::InvalidYear(year)),
    }
}

/// Download one calendar year of daily bars for `instrument` into `destination`.
pub fn download_daily_bars(
    source: &dyn HistorySource,
    instrument: &str,
    year: i32,
    destination: &Path,
) -> Result<(), DataError> {
    let kind = InstrumentKind::classify(instrument);
    let (start, end) = year_bounds(year)?;

    let frame = source.fetch_daily(instrument, start, end, kind)?;
    if frame.is_empty() {
        return Err(DataError::EmptyResponse {
            instrument: instrument.to_string(),
            start,
            end,
        });
    }

    let dir = match destination.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let prefix = format!(".{instrument}-{year}-");

    let native = tempfile::Builder::new()
        .prefix(&prefix)
        .suffix(".native.tmp")
        .tempfile_in(dir)?;
    write_native_csv(&frame, native.as_file())?;

    let mut normalized = tempfile::Builder::new()
        .prefix(&prefix)
        .suffix(".csv.tmp")
        .tempfile_in(dir)?;
    rewrite_header(native.reopen()?, normalized.as_file_mut())?;
    normalized.as_file().sync_all()?;

    normalized
        .persist(destination)
        .map_err(|e| DataError::Io(e.error))?;

    Ok(())
}

/// Dump a frame as CSV in the source's native layout.
///
/// Columns are the native index label followed by
/// `open,high,low,close,volume,close`. The close is written twice: the
/// second copy becomes the cache's `Adj Close`. No adjustment for splits or
/// dividends is computed; downstream code reading `Adj Close` gets raw closes.
pub fn write_native_csv<W: Write>(frame: &RawFrame, writer: W) -> Result<(), DataError> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record([
        frame.index_label.as_str(),
        "open",
        "high",
        "low",
        "close",
        "volume",
        "close",
    ])?;

    for row in &frame.rows {
        wtr.write_record([
            row.date.clone(),
            row.open.to_string(),
            row.high.to_string(),
            row.low.to_string(),
            row.close.to_string(),
            row.volume.to_string(),
            row.close.to_string(),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

/// Copy `reader` to `writer` line by line, replacing the first line with
/// [`CACHE_HEADER`]. Returns the number of data rows copied.
pub fn rewrite_header<R: Read, W: Write>(reader: R, writer: W) -> Result<usize, DataError> {
    let mut lines = BufReader::new(reader).lines();
    let mut out = BufWriter::new(writer);

    if lines.next().transpose()?.is_none() {
        return Err(DataError::ResponseFormatChanged(
            "native dump has no header line".into(),
        ));
    }
    writeln!(out, "{CACHE_HEADER}")?;

    let mut rows = 0;
    for line in lines {
        writeln!(out, "{}", line?)?;
        rows += 1;
    }

    out.flush()?;
    Ok(rows)
}
