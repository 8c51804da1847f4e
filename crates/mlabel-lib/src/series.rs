use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{Error, Result};

/// Column holding the timestamp (milliseconds in the source recordings).
pub const TIMESTAMP_COLUMN: usize = 0;
/// Column holding the free-text annotation channel.
pub const ANNOTATION_COLUMN: usize = 1;

/// Point in the recording's 3D space, in source units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// Cell text that pandas-style readers treat as a gap.
pub fn is_missing(cell: &str) -> bool {
    matches!(
        cell.trim(),
        "" | "NaN" | "nan" | "NAN" | "NA" | "N/A" | "null" | "NULL"
    )
}

/// Recording exactly as read from disk: headers untouched, gaps as `None`.
#[derive(Debug, Clone, Default)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl RawTable {
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
        }
    }

    /// Append a row, mapping missing-value spellings to `None`.
    pub fn push_row<I, S>(&mut self, cells: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let row = cells
            .into_iter()
            .map(|cell| {
                let cell = cell.as_ref();
                if is_missing(cell) {
                    None
                } else {
                    Some(cell.to_string())
                }
            })
            .collect();
        self.rows.push(row);
    }

    /// Strip header whitespace, zero-fill row 0 gaps and forward-fill the rest.
    ///
    /// The annotation column is left as-is: a marker belongs to its own row only.
    pub fn clean(self) -> Result<MotionSeries> {
        if self.headers.len() <= ANNOTATION_COLUMN {
            return Err(Error::data_integrity(format!(
                "expected a timestamp and an annotation column, found {} column(s)",
                self.headers.len()
            )));
        }
        if self.rows.is_empty() {
            return Err(Error::data_integrity("recording has no data rows"));
        }
        let headers: Vec<String> = self.headers.iter().map(|h| h.trim().to_string()).collect();
        let mut seen = HashSet::new();
        for header in &headers {
            if !seen.insert(header.as_str()) {
                return Err(Error::data_integrity(format!(
                    "duplicate column '{}' after trimming headers",
                    header
                )));
            }
        }

        let width = headers.len();
        let height = self.rows.len();
        let mut numeric: Vec<Vec<f64>> = vec![Vec::with_capacity(height); width];
        let mut annotations = Vec::with_capacity(height);
        for (row_idx, row) in self.rows.iter().enumerate() {
            for (col, column) in numeric.iter_mut().enumerate() {
                let cell = row.get(col).and_then(|c| c.as_deref());
                if col == ANNOTATION_COLUMN {
                    annotations.push(cell.map(|text| text.trim().to_string()));
                    continue;
                }
                let value = match cell {
                    Some(text) => text.trim().parse::<f64>().map_err(|_| Error::InvalidCell {
                        row: row_idx,
                        column: headers[col].clone(),
                        value: text.to_string(),
                    })?,
                    None if row_idx == 0 => 0.0,
                    None => column[row_idx - 1],
                };
                column.push(value);
            }
        }

        let mut columns = numeric.into_iter();
        let timestamps = columns.next().unwrap_or_default();
        let channels: Vec<Vec<f64>> = columns.skip(1).collect();
        Ok(MotionSeries {
            timestamp_header: headers[TIMESTAMP_COLUMN].clone(),
            annotation_header: headers[ANNOTATION_COLUMN].clone(),
            channel_names: headers[ANNOTATION_COLUMN + 1..].to_vec(),
            timestamps,
            annotations,
            channels,
        })
    }
}

/// Cleaned recording: gap-free numeric channels plus the sparse annotation column.
#[derive(Debug, Clone)]
pub struct MotionSeries {
    timestamp_header: String,
    annotation_header: String,
    channel_names: Vec<String>,
    timestamps: Vec<f64>,
    annotations: Vec<Option<String>>,
    channels: Vec<Vec<f64>>,
}

impl MotionSeries {
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Milliseconds between the first and last sample.
    pub fn duration_ms(&self) -> f64 {
        match (self.timestamps.first(), self.timestamps.last()) {
            (Some(first), Some(last)) => last - first,
            _ => 0.0,
        }
    }

    pub fn timestamp_header(&self) -> &str {
        &self.timestamp_header
    }

    pub fn annotation_header(&self) -> &str {
        &self.annotation_header
    }

    pub fn channel_names(&self) -> &[String] {
        &self.channel_names
    }

    pub fn timestamps(&self) -> &[f64] {
        &self.timestamps
    }

    pub fn annotation(&self, row: usize) -> Option<&str> {
        self.annotations.get(row).and_then(|a| a.as_deref())
    }

    /// Rows carrying annotation text, in row order.
    pub fn annotated_rows(&self) -> impl Iterator<Item = (usize, &str)> + '_ {
        self.annotations
            .iter()
            .enumerate()
            .filter_map(|(row, text)| text.as_deref().map(|t| (row, t)))
    }

    pub fn channel(&self, name: &str) -> Option<&[f64]> {
        self.channel_index(name).map(|idx| self.channels[idx].as_slice())
    }

    fn channel_index(&self, name: &str) -> Option<usize> {
        self.channel_names.iter().position(|c| c == name)
    }

    /// Look up the three positional channels once so per-frame access is by index.
    pub fn resolve_axes<S: AsRef<str>>(&self, names: &[S; 3]) -> Result<AxisChannels> {
        let mut indices = [0usize; 3];
        for (slot, name) in indices.iter_mut().zip(names) {
            *slot = self
                .channel_index(name.as_ref())
                .ok_or_else(|| Error::MissingColumn(name.as_ref().to_string()))?;
        }
        Ok(AxisChannels { indices })
    }

    pub fn sample(&self, row: usize) -> Option<Sample<'_>> {
        (row < self.len()).then_some(Sample { series: self, row })
    }

    pub fn position(&self, row: usize, axes: &AxisChannels) -> Option<Position> {
        self.sample(row).map(|sample| sample.position(axes))
    }
}

/// Indices of the x/y/z channels within a [`MotionSeries`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisChannels {
    indices: [usize; 3],
}

/// One row of a cleaned series.
#[derive(Debug, Clone, Copy)]
pub struct Sample<'a> {
    series: &'a MotionSeries,
    row: usize,
}

impl<'a> Sample<'a> {
    pub fn row(&self) -> usize {
        self.row
    }

    pub fn value(&self, channel: &str) -> Option<f64> {
        self.series
            .channel_index(channel)
            .map(|idx| self.series.channels[idx][self.row])
    }

    pub fn position(&self, axes: &AxisChannels) -> Position {
        let [x, y, z] = axes.indices.map(|idx| self.series.channels[idx][self.row]);
        Position { x, y, z }
    }
}
