use chrono::NaiveDateTime;
use csv::{ReaderBuilder, Trim, WriterBuilder};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use crate::annotation::LabelRecord;

pub const LABEL_COLUMNS: [&str; 2] = ["row_number", "label"];

/// `{prefix}_labels_{YYYYmmdd_HHMMSS}.csv`
pub fn label_file_name(prefix: &str, at: NaiveDateTime) -> String {
    format!("{}_labels_{}.csv", prefix, at.format("%Y%m%d_%H%M%S"))
}

/// First path in `dir` for this timestamp that does not exist yet.
pub fn unique_label_path(dir: &Path, prefix: &str, at: NaiveDateTime) -> PathBuf {
    let base = dir.join(label_file_name(prefix, at));
    if !base.exists() {
        return base;
    }
    let stem = format!("{}_labels_{}", prefix, at.format("%Y%m%d_%H%M%S"));
    (2..)
        .map(|n| dir.join(format!("{}_{}.csv", stem, n)))
        .find(|candidate| !candidate.exists())
        .unwrap_or(base)
}

/// Write labels to a new file; an existing file is never overwritten.
pub fn write_labels_csv(path: &Path, records: &[LabelRecord]) -> Result<(), csv::Error> {
    let file = OpenOptions::new().write(true).create_new(true).open(path)?;
    let mut writer = WriterBuilder::new().from_writer(file);
    writer.write_record(LABEL_COLUMNS)?;
    for record in records {
        writer.write_record([record.row_number.to_string(), record.label.clone()])?;
    }
    writer.flush()?;
    Ok(())
}

pub fn read_labels_csv(path: &Path) -> Result<Vec<LabelRecord>, csv::Error> {
    let mut reader = ReaderBuilder::new()
        .trim(Trim::Headers)
        .has_headers(true)
        .from_path(path)?;
    reader.deserialize::<LabelRecord>().collect()
}
