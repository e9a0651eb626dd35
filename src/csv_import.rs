//! Two-channel temperature series from CSV exports.
//!
//! Besides its own binary logs, the analysis accepts spreadsheets exported by
//! other instruments. Values in these files are already temperatures, so no
//! unit conversion is applied.
//!
//! * [`CsvLayout::Plain`]: the first row is a header, channel 1 is column 1
//!   and channel 2 is column 2.
//! * [`CsvLayout::Fluke`]: rows up to and including the one starting with
//!   `Reading` are preamble, channel 1 is column 1 and channel 2 is column 3.
//!
//! Rows may have varying numbers of fields.

use crate::stats::CalibratedSeries;
use std::io::Read;

/// First field of the header row in Fluke exports.
pub const FLUKE_HEADER: &str = "Reading";

/// Errors raised while importing a CSV export.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error("No header row found")]
    MissingHeader,

    #[error("Line {line}: missing column {column}")]
    MissingColumn { line: u64, column: usize },

    #[error("Line {line}, column {column}: invalid temperature {value:?}")]
    InvalidValue {
        line: u64,
        column: usize,
        value: String,
    },
}

/// The result type for CSV import.
pub type Result<T> = std::result::Result<T, Error>;

/// Row layout of a CSV export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CsvLayout {
    #[default]
    Plain,
    Fluke,
}

impl CsvLayout {
    /// Columns of channel 1 and channel 2.
    pub fn columns(&self) -> (usize, usize) {
        match self {
            CsvLayout::Plain => (1, 2),
            CsvLayout::Fluke => (1, 3),
        }
    }

    fn is_header(&self, record: &csv::StringRecord) -> bool {
        match self {
            CsvLayout::Plain => true,
            CsvLayout::Fluke => record.get(0).map(str::trim) == Some(FLUKE_HEADER),
        }
    }
}

fn temperature(record: &csv::StringRecord, column: usize) -> Result<f64> {
    let line = record.position().map_or(0, |position| position.line());
    let value = record
        .get(column)
        .ok_or(Error::MissingColumn { line, column })?;
    value.trim().parse().map_err(|_| Error::InvalidValue {
        line,
        column,
        value: value.to_string(),
    })
}

/// Reads the two temperature channels of a CSV export.
///
/// # Errors
///
/// * [`Error::MissingHeader`] if the input ends before the header row.
/// * [`Error::MissingColumn`] or [`Error::InvalidValue`] for the first bad data row.
/// * [`Error::Csv`] if the input is not valid CSV.
pub fn read_series(reader: impl Read, layout: CsvLayout) -> Result<CalibratedSeries> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);
    let mut records = reader.records();

    loop {
        let record = records.next().ok_or(Error::MissingHeader)??;
        if layout.is_header(&record) {
            log::debug!("CSV header: {record:?}");
            break;
        }
    }

    let (column1, column2) = layout.columns();
    let mut channel1 = Vec::new();
    let mut channel2 = Vec::new();
    for record in records {
        let record = record?;
        channel1.push(temperature(&record, column1)?);
        channel2.push(temperature(&record, column2)?);
    }
    Ok(CalibratedSeries::from_aligned(channel1, channel2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const FLUKE_EXPORT: &str = "\
Fluke 54 II,Dual thermometer
Serial,12345678
Start,2019-03-02 10:00:00
Reading,T1,Unit,T2,Unit
1, 21.5,C,21.25,C
2, 22.0,C,21.75,C
3, 23.5,C,23.0,C
";

    #[test]
    fn fluke_export_skips_preamble_and_uses_third_column() {
        let series = read_series(FLUKE_EXPORT.as_bytes(), CsvLayout::Fluke).unwrap();
        assert_eq!(series.channel1(), &[21.5, 22.0, 23.5]);
        assert_eq!(series.channel2(), &[21.25, 21.75, 23.0]);

        let summary = series.summary().unwrap();
        assert!((summary.mean_abs_diff - 1.0 / 3.0).abs() < 1e-12);
        assert!(summary.correlation.unwrap() > 0.99);
    }

    #[test]
    fn plain_export_uses_first_row_as_header() {
        let csv = "time,t1,t2\n0,20.0,19.5\n1, 20.5 ,20.0\n";
        let series = read_series(csv.as_bytes(), CsvLayout::Plain).unwrap();
        assert_eq!(series.channel1(), &[20.0, 20.5]);
        assert_eq!(series.channel2(), &[19.5, 20.0]);
    }

    #[test]
    fn header_only_gives_empty_series() {
        let series = read_series("time,t1,t2\n".as_bytes(), CsvLayout::Plain).unwrap();
        assert!(series.is_empty());
    }

    #[test]
    fn fluke_export_without_reading_row() {
        assert_matches!(
            read_series("a,b\n1,2\n".as_bytes(), CsvLayout::Fluke),
            Err(Error::MissingHeader)
        );
        assert_matches!(
            read_series("".as_bytes(), CsvLayout::Plain),
            Err(Error::MissingHeader)
        );
    }

    #[test]
    fn bad_rows_are_rejected() {
        assert_matches!(
            read_series("h\n0,20.0\n".as_bytes(), CsvLayout::Plain),
            Err(Error::MissingColumn { line: 2, column: 2 })
        );
        assert_matches!(
            read_series("h\n0,20.0,warm\n".as_bytes(), CsvLayout::Plain),
            Err(Error::InvalidValue { line: 2, column: 2, value }) if value == "warm"
        );
    }
}
