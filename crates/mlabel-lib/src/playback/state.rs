use serde::{Deserialize, Serialize};

use crate::events::{EventCategory, EventLog, EventMarker};

/// Packed `0xRRGGBB` render color.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color(pub u32);

impl Color {
    pub fn rgb(self) -> (u8, u8, u8) {
        (
            ((self.0 >> 16) & 0xFF) as u8,
            ((self.0 >> 8) & 0xFF) as u8,
            (self.0 & 0xFF) as u8,
        )
    }
}

/// Press state of the tracked point.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointState {
    #[default]
    Released,
    Engaged,
}

impl PointState {
    pub fn from_engaged(engaged: bool) -> Self {
        if engaged {
            Self::Engaged
        } else {
            Self::Released
        }
    }

    pub fn is_engaged(self) -> bool {
        self == Self::Engaged
    }

    pub fn color(self) -> Color {
        match self {
            Self::Released => Color(0x0000FF),
            Self::Engaged => Color(0x008000),
        }
    }
}

fn apply(engaged: bool, marker: &EventMarker) -> bool {
    match marker.category {
        EventCategory::Selected => true,
        EventCategory::Released => false,
        _ => engaged,
    }
}

/// Engaged state after replaying rows `start+1..=row` one by one.
///
/// Starts released; markers sharing a row apply in log order.
pub fn replay_engaged(log: &EventLog, start: usize, row: usize) -> bool {
    let mut engaged = false;
    for r in start + 1..=row {
        for marker in log.at_row(r) {
            engaged = apply(engaged, marker);
        }
    }
    engaged
}

/// Rows where the state changes within one playback window, for O(log n) lookup.
#[derive(Debug, Clone, Default)]
pub struct TransitionTable {
    start: usize,
    last_row: usize,
    /// `(row, engaged after row)`, strictly increasing in row.
    transitions: Vec<(usize, bool)>,
}

impl TransitionTable {
    pub fn build(log: &EventLog, start: usize, last_row: usize) -> Self {
        let mut transitions: Vec<(usize, bool)> = Vec::new();
        let mut engaged = false;
        for marker in log.in_rows(start + 1, last_row).iter().filter(|m| is_toggle(m)) {
            engaged = apply(engaged, marker);
            match transitions.last_mut() {
                Some(last) if last.0 == marker.row => last.1 = engaged,
                _ => transitions.push((marker.row, engaged)),
            }
        }
        Self {
            start,
            last_row,
            transitions,
        }
    }

    pub fn transitions(&self) -> &[(usize, bool)] {
        &self.transitions
    }

    /// State after `row`; rows past the table's last row are clamped to it.
    pub fn state_at(&self, row: usize) -> PointState {
        if row <= self.start {
            return PointState::Released;
        }
        let row = row.min(self.last_row);
        let idx = self.transitions.partition_point(|&(r, _)| r <= row);
        match idx.checked_sub(1) {
            Some(i) => PointState::from_engaged(self.transitions[i].1),
            None => PointState::Released,
        }
    }
}

fn is_toggle(marker: &EventMarker) -> bool {
    matches!(
        marker.category,
        EventCategory::Selected | EventCategory::Released
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Vocabulary;

    fn log(entries: &[(usize, &str)]) -> EventLog {
        EventLog::from_entries(
            entries.iter().map(|(row, text)| (*row, text.to_string())),
            &Vocabulary::default(),
        )
    }

    #[test]
    fn fold_toggles_on_selected_and_released_rows() {
        let log = log(&[(5, "DRAW STARTED"), (10, "DRAW STOPPED")]);
        let states: Vec<bool> = (1..=20).map(|row| replay_engaged(&log, 0, row)).collect();
        for (idx, engaged) in states.iter().enumerate() {
            let row = idx + 1;
            assert_eq!(*engaged, (5..10).contains(&row), "row {row}");
        }
    }

    #[test]
    fn unrelated_rows_inherit_previous_state() {
        let log = log(&[
            (2, "DRAW STARTED"),
            (4, "SCENE LOADED"),
            (6, "CALIBRATION HEADPOS (0.0; 0.0; 0.0)"),
            (8, "DRAW STOPPED"),
        ]);
        assert!(replay_engaged(&log, 0, 4));
        assert!(replay_engaged(&log, 0, 7));
        assert!(!replay_engaged(&log, 0, 8));
    }

    #[test]
    fn state_resets_at_window_start() {
        let log = log(&[(3, "DRAW STARTED"), (12, "DRAW STOPPED")]);
        // a press before the window is not replayed
        assert!(!replay_engaged(&log, 5, 10));
        assert_eq!(
            TransitionTable::build(&log, 5, 20).state_at(10),
            PointState::Released
        );
    }

    #[test]
    fn table_matches_linear_replay() {
        let log = log(&[
            (3, "DRAW STARTED"),
            (4, "DRAW STARTED"),
            (7, "DRAW STOPPED"),
            (7, "DRAW STARTED"),
            (9, "STARTED TASK Sketching"),
            (11, "DRAW STOPPED"),
            (15, "DRAW STOPPED"),
            (16, "DRAW STARTED"),
            (30, "DRAW STOPPED"),
        ]);
        for start in [0, 3, 6, 12] {
            let table = TransitionTable::build(&log, start, 40);
            for row in start..=40 {
                assert_eq!(
                    table.state_at(row).is_engaged(),
                    replay_engaged(&log, start, row),
                    "start {start}, row {row}"
                );
            }
        }
    }

    #[test]
    fn same_row_markers_collapse_to_one_transition() {
        let log = log(&[(2, "DRAW STARTED"), (5, "DRAW STOPPED"), (5, "DRAW STARTED")]);
        let table = TransitionTable::build(&log, 0, 10);
        assert_eq!(table.transitions(), &[(2, true), (5, true)]);
        assert!(table.state_at(6).is_engaged());
    }

    #[test]
    fn colors_follow_state() {
        assert_eq!(PointState::Engaged.color().rgb(), (0, 0x80, 0));
        assert_eq!(PointState::Released.color().rgb(), (0, 0, 0xFF));
        assert_eq!(PointState::default(), PointState::Released);
    }
}
