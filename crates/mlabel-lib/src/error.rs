use std::path::PathBuf;
use thiserror::Error;

use crate::events::CalibrationError;

/// Errors raised while cleaning, segmenting, replaying or labeling a recording.
#[derive(Debug, Error)]
pub enum Error {
    /// Empty or structurally invalid input; aborts before any trial is played.
    #[error("data integrity: {0}")]
    DataIntegrity(String),

    /// A numeric channel cell that is neither missing nor a number.
    #[error("row {row}, column '{column}': '{value}' is not numeric")]
    InvalidCell {
        row: usize,
        column: String,
        value: String,
    },

    #[error("missing column '{0}'")]
    MissingColumn(String),

    /// Start/finish markers cannot be paired into ordered trials.
    #[error("segmentation: {0}")]
    Segmentation(String),

    #[error("frame {frame} is outside the playback range 1..={frames}")]
    FrameOutOfRange { frame: usize, frames: usize },

    #[error("invalid configuration: {0}")]
    Config(String),

    /// Labels could not be written; the session keeps its records.
    #[error("failed to persist labels to {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// Playback surface or operator prompt failure.
    #[error("interaction: {0}")]
    Interaction(String),

    #[error(transparent)]
    Calibration(#[from] CalibrationError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn data_integrity(msg: impl Into<String>) -> Self {
        Self::DataIntegrity(msg.into())
    }

    pub fn segmentation(msg: impl Into<String>) -> Self {
        Self::Segmentation(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn interaction(msg: impl Into<String>) -> Self {
        Self::Interaction(msg.into())
    }
}
