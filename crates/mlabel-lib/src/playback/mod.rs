//! Frame-synchronized replay of one trial window.
//!
//! Frame `f` (1-based) shows absolute row `start + f`. Its press state is the
//! result of replaying every SELECTED/RELEASED marker on rows `start+1..=start+f`,
//! so the state always restarts as released at the trial boundary.

mod state;

pub use state::{replay_engaged, Color, PointState, TransitionTable};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::events::EventLog;
use crate::series::{AxisChannels, MotionSeries, Position};
use crate::trials::Trial;

/// Rows of one trial that playback may visit, including the observation tail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackWindow {
    pub trial: Trial,
    /// Last visitable row: `trial.end + extension`, clamped to the series.
    pub last_row: usize,
}

impl PlaybackWindow {
    /// A degenerate (`start == end`) trial still gets one frame when the series has
    /// a row after its start.
    pub fn new(trial: Trial, extension_rows: usize, series_len: usize) -> Self {
        let last_row = trial
            .end
            .saturating_add(extension_rows)
            .max(trial.start + 1)
            .min(series_len.saturating_sub(1))
            .max(trial.start);
        Self { trial, last_row }
    }

    pub fn start(&self) -> usize {
        self.trial.start
    }

    pub fn frame_count(&self) -> usize {
        self.last_row - self.trial.start
    }

    /// No row after the start marker is available to show.
    pub fn is_empty(&self) -> bool {
        self.frame_count() == 0
    }

    pub fn row_of(&self, frame: usize) -> Option<usize> {
        (1..=self.frame_count())
            .contains(&frame)
            .then(|| self.trial.start + frame)
    }
}

/// Integer frame control over `[1, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSlider {
    value: usize,
    max: usize,
}

impl FrameSlider {
    pub fn new(max: usize) -> Self {
        Self {
            value: max.min(1),
            max,
        }
    }

    pub fn value(&self) -> usize {
        self.value
    }

    pub fn max(&self) -> usize {
        self.max
    }

    pub fn set(&mut self, frame: usize) -> usize {
        self.value = frame.clamp(self.max.min(1), self.max);
        self.value
    }

    pub fn step(&mut self, delta: isize) -> usize {
        let target = if delta.is_negative() {
            self.value.saturating_sub(delta.unsigned_abs())
        } else {
            self.value.saturating_add(delta as usize)
        };
        self.set(target)
    }

    pub fn first(&mut self) -> usize {
        self.set(1)
    }

    pub fn last(&mut self) -> usize {
        self.set(self.max)
    }

    /// Position in `[0, 1]` for gauge-style widgets.
    pub fn ratio(&self) -> f64 {
        if self.max <= 1 {
            1.0
        } else {
            (self.value - 1) as f64 / (self.max - 1) as f64
        }
    }
}

/// Which points a frame shows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayMode {
    /// Every point from frame 1 to the current frame, each in its own state color.
    #[default]
    Trajectory,
    /// Only the current point, in the current state color.
    CurrentPoint,
}

impl DisplayMode {
    pub fn toggled(self) -> Self {
        match self {
            Self::Trajectory => Self::CurrentPoint,
            Self::CurrentPoint => Self::Trajectory,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RenderedPoint {
    pub frame: usize,
    pub row: usize,
    pub position: Position,
    pub state: PointState,
}

/// Everything a surface needs to draw one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameView {
    pub frame: usize,
    pub row: usize,
    pub timestamp: f64,
    pub state: PointState,
    pub mode: DisplayMode,
    pub points: Vec<RenderedPoint>,
    /// Text of the last marker at or before `row`.
    pub latest_event: Option<String>,
}

/// Static target plane placed relative to the head-calibration origin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TargetPlane {
    pub x: [f64; 2],
    pub y: [f64; 2],
    pub z: f64,
}

impl TargetPlane {
    pub fn around(origin: Position) -> Self {
        let cx = origin.x + 0.1;
        Self {
            x: [cx - 0.25, cx + 0.25],
            y: [origin.y - 0.25, origin.y + 0.25],
            z: origin.z + 0.58,
        }
    }
}

/// Replay of one trial window over a cleaned series.
pub struct Playback<'a> {
    series: &'a MotionSeries,
    log: &'a EventLog,
    axes: AxisChannels,
    window: PlaybackWindow,
    table: TransitionTable,
    plane: TargetPlane,
}

impl<'a> Playback<'a> {
    pub fn new(
        series: &'a MotionSeries,
        log: &'a EventLog,
        axes: AxisChannels,
        window: PlaybackWindow,
        origin: Position,
    ) -> Self {
        let table = TransitionTable::build(log, window.start(), window.last_row);
        Self {
            series,
            log,
            axes,
            window,
            table,
            plane: TargetPlane::around(origin),
        }
    }

    pub fn window(&self) -> &PlaybackWindow {
        &self.window
    }

    pub fn trial(&self) -> &Trial {
        &self.window.trial
    }

    pub fn frame_count(&self) -> usize {
        self.window.frame_count()
    }

    pub fn target_plane(&self) -> TargetPlane {
        self.plane
    }

    pub fn slider(&self) -> FrameSlider {
        FrameSlider::new(self.frame_count())
    }

    pub fn state_at(&self, frame: usize) -> Result<PointState> {
        let row = self.checked_row(frame)?;
        Ok(self.table.state_at(row))
    }

    /// Frames whose point is engaged.
    pub fn engaged_frames(&self) -> usize {
        (1..=self.frame_count())
            .filter(|&f| self.table.state_at(self.window.start() + f).is_engaged())
            .count()
    }

    pub fn render(&self, frame: usize, mode: DisplayMode) -> Result<FrameView> {
        let row = self.checked_row(frame)?;
        let state = self.table.state_at(row);
        let first = match mode {
            DisplayMode::Trajectory => 1,
            DisplayMode::CurrentPoint => frame,
        };
        let points = (first..=frame)
            .filter_map(|f| {
                let row = self.window.start() + f;
                self.series.position(row, &self.axes).map(|position| RenderedPoint {
                    frame: f,
                    row,
                    position,
                    state: self.table.state_at(row),
                })
            })
            .collect();
        Ok(FrameView {
            frame,
            row,
            timestamp: self.series.timestamps().get(row).copied().unwrap_or(f64::NAN),
            state,
            mode,
            points,
            latest_event: self.log.latest_at(row).map(|m| m.text.clone()),
        })
    }

    fn checked_row(&self, frame: usize) -> Result<usize> {
        self.window.row_of(frame).ok_or(Error::FrameOutOfRange {
            frame,
            frames: self.frame_count(),
        })
    }
}
