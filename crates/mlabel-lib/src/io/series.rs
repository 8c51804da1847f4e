use csv::ReaderBuilder;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::Result;
use crate::series::{MotionSeries, RawTable};

/// Read a headered recording CSV without cleaning it.
///
/// Rows may be ragged; cells past the end of a short row count as gaps.
pub fn read_raw_table<R: Read>(reader: R) -> Result<RawTable> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);
    let headers = reader.headers()?.iter().map(str::to_string).collect();
    let mut table = RawTable::new(headers);
    for record in reader.records() {
        let record = record?;
        table.push_row(record.iter());
    }
    Ok(table)
}

/// Read and clean a recording from any reader.
pub fn read_series<R: Read>(reader: R) -> Result<MotionSeries> {
    read_raw_table(reader)?.clean()
}

/// Read and clean a recording CSV from disk.
pub fn read_series_csv(path: &Path) -> Result<MotionSeries> {
    let file = File::open(path)?;
    let series = read_series(file)?;
    log::debug!(
        "loaded {} rows x {} channels from {}",
        series.len(),
        series.channel_names().len(),
        path.display()
    );
    Ok(series)
}
