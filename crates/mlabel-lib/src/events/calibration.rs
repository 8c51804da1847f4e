use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use super::EventLog;
use crate::series::Position;

const CALIBRATION_TAG: &str = "CALIBRATION HEADPOS";

static HEADPOS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"CALIBRATION HEADPOS \(([-+]?\d+\.\d+); ([-+]?\d+\.\d+); ([-+]?\d+\.\d+)\)")
        .expect("static calibration pattern")
});

/// Why no calibration head position could be recovered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CalibrationError {
    #[error("no CALIBRATION HEADPOS marker in the recording")]
    NotFound,
    #[error("malformed calibration marker at row {row}: {text}")]
    Malformed { row: usize, text: String },
}

/// Head position from the last `CALIBRATION HEADPOS (x; y; z)` marker.
///
/// The caller decides what to do without one; nothing is defaulted here.
pub fn calibration_position(log: &EventLog) -> Result<Position, CalibrationError> {
    let marker = log
        .iter()
        .rev()
        .find(|m| m.text.contains(CALIBRATION_TAG))
        .ok_or(CalibrationError::NotFound)?;
    parse_calibration(&marker.text).ok_or_else(|| CalibrationError::Malformed {
        row: marker.row,
        text: marker.text.clone(),
    })
}

pub fn parse_calibration(text: &str) -> Option<Position> {
    let caps = HEADPOS.captures(text)?;
    let component = |idx: usize| caps.get(idx).and_then(|m| m.as_str().parse::<f64>().ok());
    Some(Position::new(component(1)?, component(2)?, component(3)?))
}
