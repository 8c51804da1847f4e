mod calibration;

pub use calibration::{calibration_position, parse_calibration, CalibrationError};

use serde::{Deserialize, Serialize};

use crate::series::MotionSeries;

/// What an annotation marker announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventCategory {
    TaskStarted,
    TaskFinished,
    /// The tracked point becomes engaged (pressed).
    Selected,
    /// The tracked point is released.
    Released,
    Calibration,
    Other,
}

/// Substring rule mapping marker text to a category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerRule {
    pub category: EventCategory,
    pub pattern: String,
}

impl MarkerRule {
    pub fn new(category: EventCategory, pattern: impl Into<String>) -> Self {
        Self {
            category,
            pattern: pattern.into(),
        }
    }
}

/// Ordered marker rules; the first matching rule decides the category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Vocabulary {
    pub rules: Vec<MarkerRule>,
}

impl Default for Vocabulary {
    fn default() -> Self {
        // Task boundaries must precede the bare STARTED rule, whose pattern they contain.
        Self {
            rules: vec![
                MarkerRule::new(EventCategory::TaskStarted, "STARTED TASK"),
                MarkerRule::new(EventCategory::TaskFinished, "FINISHED TASK"),
                MarkerRule::new(EventCategory::Selected, "STARTED"),
                MarkerRule::new(EventCategory::Released, "STOPPED"),
                MarkerRule::new(EventCategory::Calibration, "CALIBRATION"),
            ],
        }
    }
}

impl Vocabulary {
    pub fn classify(&self, text: &str) -> EventCategory {
        self.rules
            .iter()
            .find(|rule| text.contains(rule.pattern.as_str()))
            .map(|rule| rule.category)
            .unwrap_or(EventCategory::Other)
    }
}

/// Row-indexed annotation marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMarker {
    pub row: usize,
    pub text: String,
    pub category: EventCategory,
}

/// Markers of one recording, sorted by row.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventLog {
    markers: Vec<EventMarker>,
}

impl EventLog {
    /// Every annotated row of the cleaned series becomes a marker.
    pub fn extract(series: &MotionSeries, vocabulary: &Vocabulary) -> Self {
        let log = Self::from_entries(
            series
                .annotated_rows()
                .map(|(row, text)| (row, text.to_string())),
            vocabulary,
        );
        log::debug!(
            "extracted {} markers from column '{}'",
            log.len(),
            series.annotation_header()
        );
        log
    }

    /// Build from `(row, text)` pairs; markers sharing a row keep their input order.
    pub fn from_entries<I>(entries: I, vocabulary: &Vocabulary) -> Self
    where
        I: IntoIterator<Item = (usize, String)>,
    {
        let mut markers: Vec<EventMarker> = entries
            .into_iter()
            .map(|(row, text)| EventMarker {
                row,
                category: vocabulary.classify(&text),
                text,
            })
            .collect();
        markers.sort_by_key(|marker| marker.row);
        Self { markers }
    }

    /// Classify again using the markers' own text as the source.
    pub fn reclassify(&self, vocabulary: &Vocabulary) -> Self {
        Self::from_entries(
            self.markers.iter().map(|m| (m.row, m.text.clone())),
            vocabulary,
        )
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    pub fn markers(&self) -> &[EventMarker] {
        &self.markers
    }

    pub fn get(&self, index: usize) -> Option<&EventMarker> {
        self.markers.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, EventMarker> {
        self.markers.iter()
    }

    /// Markers whose row lies in `first..=last`, in log order.
    pub fn in_rows(&self, first: usize, last: usize) -> &[EventMarker] {
        let lo = self.markers.partition_point(|m| m.row < first);
        let hi = self.markers.partition_point(|m| m.row <= last);
        &self.markers[lo..hi.max(lo)]
    }

    /// Markers on exactly `row`.
    pub fn at_row(&self, row: usize) -> &[EventMarker] {
        self.in_rows(row, row)
    }

    /// Last marker at or before `row`.
    pub fn latest_at(&self, row: usize) -> Option<&EventMarker> {
        let idx = self.markers.partition_point(|m| m.row <= row);
        idx.checked_sub(1).map(|i| &self.markers[i])
    }
}

impl<'a> IntoIterator for &'a EventLog {
    type Item = &'a EventMarker;
    type IntoIter = std::slice::Iter<'a, EventMarker>;

    fn into_iter(self) -> Self::IntoIter {
        self.markers.iter()
    }
}
