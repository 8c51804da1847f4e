use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::events::{EventCategory, EventLog, EventMarker};

/// Row window bounded by a task-start and task-finish marker (both inclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trial {
    /// 1-based position in the segmentation.
    pub index: usize,
    pub start: usize,
    pub end: usize,
    /// Start row came from configuration rather than a marker.
    pub synthetic_start: bool,
}

impl Trial {
    /// Rows between the start and finish markers.
    pub fn span(&self) -> usize {
        self.end - self.start
    }

    pub fn is_degenerate(&self) -> bool {
        self.start == self.end
    }

    pub fn contains(&self, row: usize) -> bool {
        (self.start..=self.end).contains(&row)
    }
}

/// Which markers belong to the task being labeled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFilter {
    /// A marker is in scope when its text contains any of these.
    pub keywords: Vec<String>,
    /// ...and none of these (e.g. the training-condition tag).
    pub exclude: Vec<String>,
}

impl TaskFilter {
    pub fn accepts(&self, text: &str) -> bool {
        self.keywords.iter().any(|k| text.contains(k.as_str()))
            && !self.exclude.iter().any(|k| text.contains(k.as_str()))
    }
}

/// Trials plus the task-scoped release rows they are labeled on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segmentation {
    pub trials: Vec<Trial>,
    /// Task-scoped marker indices into the source [`EventLog`].
    task_markers: Vec<usize>,
    released_rows: Vec<usize>,
}

impl Segmentation {
    pub fn released_rows(&self) -> &[usize] {
        &self.released_rows
    }

    /// Task-scoped RELEASED rows within `[trial.start, trial.end]`. A row
    /// shared with the previous trial's finish belongs to that trial.
    pub fn released_within(&self, trial: &Trial) -> &[usize] {
        let first_row = trial
            .index
            .checked_sub(2)
            .and_then(|k| self.trials.get(k))
            .filter(|prev| prev.end >= trial.start)
            .map_or(trial.start, |prev| prev.end + 1);
        let lo = self.released_rows.partition_point(|&r| r < first_row);
        let hi = self.released_rows.partition_point(|&r| r <= trial.end);
        &self.released_rows[lo..hi.max(lo)]
    }

    pub fn task_markers<'a>(&'a self, log: &'a EventLog) -> impl Iterator<Item = &'a EventMarker> {
        self.task_markers.iter().filter_map(move |&idx| log.get(idx))
    }
}

/// Pairs task-start and task-finish markers into [`Trial`] windows.
#[derive(Debug, Clone)]
pub struct TrialSegmenter {
    filter: TaskFilter,
    synthetic_start: Option<usize>,
}

impl TrialSegmenter {
    pub fn new(filter: TaskFilter) -> Self {
        Self {
            filter,
            synthetic_start: None,
        }
    }

    /// Prepend a start row for recordings known to lack their first start marker.
    pub fn with_synthetic_start(mut self, row: Option<usize>) -> Self {
        self.synthetic_start = row;
        self
    }

    pub fn segment(&self, log: &EventLog) -> Result<Segmentation> {
        let task_markers: Vec<usize> = log
            .iter()
            .enumerate()
            .filter(|(_, m)| self.filter.accepts(&m.text))
            .map(|(idx, _)| idx)
            .collect();
        let rows_of = |category: EventCategory| -> Vec<usize> {
            task_markers
                .iter()
                .filter_map(|&idx| log.get(idx))
                .filter(|m| m.category == category)
                .map(|m| m.row)
                .collect()
        };
        let mut starts = rows_of(EventCategory::TaskStarted);
        let finishes = rows_of(EventCategory::TaskFinished);
        let mut released_rows = rows_of(EventCategory::Released);
        // several markers on one row still make one release
        released_rows.dedup();
        if let Some(row) = self.synthetic_start {
            starts.insert(0, row);
        }
        log::debug!(
            "{} task markers: {} starts{}, {} finishes, {} releases",
            task_markers.len(),
            starts.len(),
            if self.synthetic_start.is_some() {
                " (one synthetic)"
            } else {
                ""
            },
            finishes.len(),
            released_rows.len()
        );

        if starts.len() != finishes.len() {
            return Err(Error::segmentation(format!(
                "{} task-start markers but {} task-finish markers (starts {:?}, finishes {:?})",
                starts.len(),
                finishes.len(),
                starts,
                finishes
            )));
        }

        let mut trials: Vec<Trial> = Vec::with_capacity(starts.len());
        for (k, (&start, &end)) in starts.iter().zip(&finishes).enumerate() {
            if start > end {
                return Err(Error::segmentation(format!(
                    "trial {} starts at row {} after it finishes at row {}",
                    k + 1,
                    start,
                    end
                )));
            }
            if let Some(prev) = trials.last() {
                if start < prev.end {
                    return Err(Error::segmentation(format!(
                        "trial {} [{}, {}] overlaps trial {} [{}, {}]",
                        k + 1,
                        start,
                        end,
                        prev.index,
                        prev.start,
                        prev.end
                    )));
                }
            }
            trials.push(Trial {
                index: k + 1,
                start,
                end,
                synthetic_start: k == 0 && self.synthetic_start.is_some(),
            });
        }

        Ok(Segmentation {
            trials,
            task_markers,
            released_rows,
        })
    }
}
