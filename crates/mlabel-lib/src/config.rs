use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::error::{Error, Result};
use crate::events::Vocabulary;
use crate::trials::TaskFilter;

/// Everything that varies between labeling tasks and recording sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelingConfig {
    pub task: TaskConfig,
    pub markers: Vocabulary,
    pub playback: PlaybackConfig,
    pub view: ViewConfig,
    /// Synthetic first task-start row per recording session, for sessions whose
    /// first start marker was never logged.
    pub sessions: BTreeMap<String, usize>,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    pub name: String,
    pub keywords: Vec<String>,
    pub exclude: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Rows shown past the finish marker to observe the hand after the task.
    pub extension_rows: usize,
    /// x, y, z channel names of the tracked point.
    pub axes: [String; 3],
}

/// Bounds of the top-down (x right, y up) projection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewConfig {
    pub x: [f64; 2],
    pub y: [f64; 2],
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Label files are named `{prefix}_labels_{timestamp}.csv`.
    pub prefix: String,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            name: "Sketching".into(),
            keywords: vec!["DRAW".into(), "Sketch".into()],
            exclude: vec!["Training".into()],
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            extension_rows: 100,
            axes: [
                "rightHandIndexTipSH_pos_x".into(),
                "rightHandIndexTipSH_pos_y".into(),
                "rightHandIndexTipSH_pos_z".into(),
            ],
        }
    }
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            x: [-0.6, 0.6],
            y: [1.2, 2.0],
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            prefix: "Sketching_task".into(),
        }
    }
}

impl Default for LabelingConfig {
    fn default() -> Self {
        let sessions = [
            ("001", 16035),
            ("002", 38877),
            ("003", 21199),
            ("004", 28578),
            ("005", 38287),
            ("006", 36788),
            ("007", 29930),
            ("008", 20802),
        ]
        .into_iter()
        .map(|(id, row)| (id.to_string(), row))
        .collect();
        Self {
            task: TaskConfig::default(),
            markers: Vocabulary::default(),
            playback: PlaybackConfig::default(),
            view: ViewConfig::default(),
            sessions,
            output: OutputConfig::default(),
        }
    }
}

impl LabelingConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|err| Error::config(err.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.markers.rules.is_empty() {
            return Err(Error::config("markers.rules must list at least one rule"));
        }
        if let Some(rule) = self.markers.rules.iter().find(|r| r.pattern.is_empty()) {
            return Err(Error::config(format!(
                "empty pattern for {:?} marker rule",
                rule.category
            )));
        }
        if self.task.keywords.iter().all(|k| k.is_empty()) {
            return Err(Error::config("task.keywords must name the task's markers"));
        }
        if self.playback.axes.iter().any(|a| a.trim().is_empty()) {
            return Err(Error::config("playback.axes needs three channel names"));
        }
        for (name, bounds) in [("view.x", self.view.x), ("view.y", self.view.y)] {
            if !(bounds[0] < bounds[1]) {
                return Err(Error::config(format!(
                    "{} bounds must be increasing, got {:?}",
                    name, bounds
                )));
            }
        }
        Ok(())
    }

    pub fn task_filter(&self) -> TaskFilter {
        TaskFilter {
            keywords: self
                .task
                .keywords
                .iter()
                .filter(|k| !k.is_empty())
                .cloned()
                .collect(),
            exclude: self
                .task
                .exclude
                .iter()
                .filter(|k| !k.is_empty())
                .cloned()
                .collect(),
        }
    }

    /// Synthetic first-start row configured for `session`.
    pub fn session_start(&self, session: &str) -> Result<usize> {
        self.sessions.get(session).copied().ok_or_else(|| {
            let known: Vec<&str> = self.sessions.keys().map(String::as_str).collect();
            Error::config(format!(
                "no synthetic start row for session '{}' (known: {})",
                session,
                known.join(", ")
            ))
        })
    }
}
