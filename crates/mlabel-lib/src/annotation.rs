//! Trial-by-trial labeling loop: play a trial, then ask the operator for one
//! label per task-scoped release inside it.

use chrono::Local;
use serde::{Deserialize, Serialize};
use std::io::{self, BufRead, StdinLock, Stdout, Write};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::events::EventLog;
use crate::io::labels::{unique_label_path, write_labels_csv};
use crate::playback::{Playback, PlaybackWindow};
use crate::series::{AxisChannels, MotionSeries, Position};
use crate::trials::{Segmentation, Trial};

/// Operator label for one RELEASED row. The label is stored exactly as typed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelRecord {
    pub row_number: usize,
    pub label: String,
}

impl LabelRecord {
    pub fn new(row_number: usize, label: impl Into<String>) -> Self {
        Self {
            row_number,
            label: label.into(),
        }
    }
}

/// Shows one trial and returns once the operator closes it.
pub trait PlaybackSurface {
    fn play(&mut self, playback: &Playback<'_>) -> Result<()>;
}

/// Line-oriented operator console.
pub trait LabelPrompt {
    fn announce(&mut self, message: &str) -> Result<()>;

    /// Print `question` and return the raw answer without its line ending.
    fn ask(&mut self, question: &str) -> Result<String>;
}

pub struct ConsolePrompt<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> ConsolePrompt<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    pub fn into_inner(self) -> (R, W) {
        (self.input, self.output)
    }
}

impl ConsolePrompt<StdinLock<'static>, Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> LabelPrompt for ConsolePrompt<R, W> {
    fn announce(&mut self, message: &str) -> Result<()> {
        writeln!(self.output, "{}", message)?;
        self.output.flush()?;
        Ok(())
    }

    fn ask(&mut self, question: &str) -> Result<String> {
        write!(self.output, "{}", question)?;
        self.output.flush()?;
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Err(Error::interaction("operator input closed"));
        }
        let answer = line.trim_end_matches(['\r', '\n']);
        Ok(answer.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionOptions {
    /// Rows played past each finish marker.
    pub extension_rows: usize,
    /// Head-calibration origin for the target plane.
    pub origin: Position,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TrialOutcome {
    Labeled { trial: usize, labels: usize },
    /// No row after the start marker to play.
    Skipped { trial: usize },
}

/// Walks the trials of one segmentation in order, collecting labels.
///
/// A trial's labels are committed only once all of its prompts are answered, so
/// a failed trial can be retried with [`AnnotationSession::next_trial`] without
/// duplicating records.
pub struct AnnotationSession<'a> {
    series: &'a MotionSeries,
    log: &'a EventLog,
    segmentation: &'a Segmentation,
    axes: AxisChannels,
    options: SessionOptions,
    records: Vec<LabelRecord>,
    cursor: usize,
}

impl<'a> AnnotationSession<'a> {
    pub fn new(
        series: &'a MotionSeries,
        log: &'a EventLog,
        segmentation: &'a Segmentation,
        axes: AxisChannels,
        options: SessionOptions,
    ) -> Self {
        Self {
            series,
            log,
            segmentation,
            axes,
            options,
            records: Vec::new(),
            cursor: 0,
        }
    }

    pub fn records(&self) -> &[LabelRecord] {
        &self.records
    }

    pub fn remaining(&self) -> usize {
        self.segmentation.trials.len() - self.cursor
    }

    pub fn is_finished(&self) -> bool {
        self.remaining() == 0
    }

    pub fn window(&self, trial: Trial) -> PlaybackWindow {
        PlaybackWindow::new(trial, self.options.extension_rows, self.series.len())
    }

    pub fn playback(&self, trial: Trial) -> Playback<'a> {
        Playback::new(
            self.series,
            self.log,
            self.axes,
            self.window(trial),
            self.options.origin,
        )
    }

    /// Play and label the next trial; `None` once every trial is done.
    pub fn next_trial<S, P>(&mut self, surface: &mut S, prompt: &mut P) -> Result<Option<TrialOutcome>>
    where
        S: PlaybackSurface + ?Sized,
        P: LabelPrompt + ?Sized,
    {
        let Some(trial) = self.segmentation.trials.get(self.cursor).copied() else {
            return Ok(None);
        };
        let window = self.window(trial);
        if window.is_empty() {
            log::warn!(
                "task {} [{}, {}] has no rows to play after its start marker, skipping",
                trial.index,
                trial.start,
                trial.end
            );
            self.cursor += 1;
            return Ok(Some(TrialOutcome::Skipped { trial: trial.index }));
        }

        prompt.announce(&format!(
            "Animating task {} from row {} to {}",
            trial.index, trial.start, window.last_row
        ))?;
        let playback = self.playback(trial);
        surface.play(&playback)?;

        let releases = self.segmentation.released_within(&trial);
        let mut labels = Vec::with_capacity(releases.len());
        for &row in releases {
            let answer = prompt.ask(&format!("Label for RELEASED at row {} (1 or 0): ", row))?;
            labels.push(LabelRecord::new(row, answer));
        }
        log::info!(
            "task {}: {} frames played, {} labels",
            trial.index,
            playback.frame_count(),
            labels.len()
        );
        let count = labels.len();
        self.records.extend(labels);
        self.cursor += 1;
        Ok(Some(TrialOutcome::Labeled {
            trial: trial.index,
            labels: count,
        }))
    }

    /// Label every remaining trial in order.
    pub fn run<S, P>(&mut self, surface: &mut S, prompt: &mut P) -> Result<Vec<TrialOutcome>>
    where
        S: PlaybackSurface + ?Sized,
        P: LabelPrompt + ?Sized,
    {
        let mut outcomes = Vec::with_capacity(self.remaining());
        while let Some(outcome) = self.next_trial(surface, prompt)? {
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    /// Write the collected labels to a new timestamped file in `dir`.
    ///
    /// Records stay in the session on failure so the caller can retry.
    pub fn persist(&self, dir: &Path, prefix: &str) -> Result<PathBuf> {
        let path = unique_label_path(dir, prefix, Local::now().naive_local());
        write_labels_csv(&path, &self.records).map_err(|source| Error::Persist {
            path: path.clone(),
            source,
        })?;
        log::info!("wrote {} labels to {}", self.records.len(), path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LabelingConfig;
    use crate::io::labels::read_labels_csv;
    use crate::io::series::read_series_csv;
    use crate::trials::TrialSegmenter;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::io::Cursor;
    use std::rc::Rc;
    use tempfile::tempdir;

    type Journal = Rc<RefCell<Vec<String>>>;

    struct RecordingSurface {
        journal: Journal,
    }

    impl PlaybackSurface for RecordingSurface {
        fn play(&mut self, playback: &Playback<'_>) -> Result<()> {
            let last = playback.render(playback.frame_count(), Default::default())?;
            self.journal.borrow_mut().push(format!(
                "play {} {}..={}",
                playback.trial().index,
                playback.window().start(),
                last.row
            ));
            Ok(())
        }
    }

    struct ScriptedPrompt {
        answers: VecDeque<&'static str>,
        journal: Journal,
    }

    impl LabelPrompt for ScriptedPrompt {
        fn announce(&mut self, message: &str) -> Result<()> {
            self.journal.borrow_mut().push(message.to_string());
            Ok(())
        }

        fn ask(&mut self, question: &str) -> Result<String> {
            self.journal.borrow_mut().push(question.trim_end().to_string());
            self.answers
                .pop_front()
                .map(str::to_string)
                .ok_or_else(|| Error::interaction("script exhausted"))
        }
    }

    fn fixture() -> (MotionSeries, EventLog, Segmentation, AxisChannels) {
        let root = Path::new(env!("CARGO_MANIFEST_DIR"))
            .parent()
            .unwrap()
            .parent()
            .unwrap();
        let series = read_series_csv(&root.join("test_data/session_sample.csv")).unwrap();
        let config = LabelingConfig::default();
        let log = EventLog::extract(&series, &config.markers);
        let seg = TrialSegmenter::new(config.task_filter()).segment(&log).unwrap();
        let axes = series.resolve_axes(&config.playback.axes).unwrap();
        (series, log, seg, axes)
    }

    fn options(extension_rows: usize) -> SessionOptions {
        SessionOptions {
            extension_rows,
            origin: Position::default(),
        }
    }

    fn scripted(answers: &[&'static str]) -> (RecordingSurface, ScriptedPrompt, Journal) {
        let journal: Journal = Rc::default();
        (
            RecordingSurface {
                journal: journal.clone(),
            },
            ScriptedPrompt {
                answers: answers.iter().copied().collect(),
                journal: journal.clone(),
            },
            journal,
        )
    }

    #[test]
    fn every_task_release_is_labeled_once_in_order() {
        let (series, log, seg, axes) = fixture();
        let (mut surface, mut prompt, journal) = scripted(&["1", "0", "1"]);
        let mut session = AnnotationSession::new(&series, &log, &seg, axes, options(2));
        let outcomes = session.run(&mut surface, &mut prompt).unwrap();

        assert_eq!(
            outcomes,
            vec![
                TrialOutcome::Labeled { trial: 1, labels: 2 },
                TrialOutcome::Labeled { trial: 2, labels: 1 },
            ]
        );
        assert_eq!(
            session.records(),
            &[
                LabelRecord::new(12, "1"),
                LabelRecord::new(15, "0"),
                LabelRecord::new(22, "1"),
            ]
        );
        assert_eq!(
            *journal.borrow(),
            vec![
                "Animating task 1 from row 7 to 18",
                "play 1 7..=18",
                "Label for RELEASED at row 12 (1 or 0):",
                "Label for RELEASED at row 15 (1 or 0):",
                "Animating task 2 from row 18 to 25",
                "play 2 18..=25",
                "Label for RELEASED at row 22 (1 or 0):",
            ]
        );
        assert!(session.is_finished());
    }

    #[test]
    fn trial_without_releases_asks_nothing() {
        let log = EventLog::from_entries(
            [
                (1, "STARTED TASK Sketching 1".to_string()),
                (4, "FINISHED TASK Sketching 1".to_string()),
            ],
            &Default::default(),
        );
        let mut raw = crate::series::RawTable::new(
            ["t", "m", "x", "y", "z"].iter().map(|s| s.to_string()).collect(),
        );
        for row in 0..8 {
            raw.push_row([row.to_string(), String::new(), "0".into(), "0".into(), "0".into()]);
        }
        let series = raw.clean().unwrap();
        let seg = TrialSegmenter::new(LabelingConfig::default().task_filter())
            .segment(&log)
            .unwrap();
        let axes = series.resolve_axes(&["x", "y", "z"]).unwrap();
        let (mut surface, mut prompt, journal) = scripted(&[]);
        let mut session =
            AnnotationSession::new(&series, &log, &seg, axes, options(100));
        let outcomes = session.run(&mut surface, &mut prompt).unwrap();
        assert_eq!(outcomes, vec![TrialOutcome::Labeled { trial: 1, labels: 0 }]);
        assert!(session.records().is_empty());
        assert_eq!(journal.borrow().len(), 2);
    }

    #[test]
    fn zero_extension_stops_at_the_finish_row() {
        let (series, log, seg, axes) = fixture();
        let (mut surface, mut prompt, journal) = scripted(&["1", "0", "1"]);
        let mut session = AnnotationSession::new(&series, &log, &seg, axes, options(0));
        session.run(&mut surface, &mut prompt).unwrap();
        let plays: Vec<String> = journal
            .borrow()
            .iter()
            .filter(|line| line.starts_with("play"))
            .cloned()
            .collect();
        assert_eq!(plays, vec!["play 1 7..=16", "play 2 18..=23"]);
    }

    #[test]
    fn shared_rows_are_labeled_once() {
        let log = EventLog::from_entries(
            [
                (1, "STARTED TASK Sketching 1".to_string()),
                (3, "DRAW STOPPED".to_string()),
                (3, "DRAW STOPPED".to_string()),
                (5, "FINISHED TASK Sketching 1".to_string()),
                (5, "STARTED TASK Sketching 2".to_string()),
                (5, "DRAW STOPPED".to_string()),
                (7, "FINISHED TASK Sketching 2".to_string()),
            ],
            &Default::default(),
        );
        let mut raw = crate::series::RawTable::new(
            ["t", "m", "x", "y", "z"].iter().map(|s| s.to_string()).collect(),
        );
        for row in 0..10 {
            raw.push_row([row.to_string(), String::new(), "0".into(), "0".into(), "0".into()]);
        }
        let series = raw.clean().unwrap();
        let seg = TrialSegmenter::new(LabelingConfig::default().task_filter())
            .segment(&log)
            .unwrap();
        let axes = series.resolve_axes(&["x", "y", "z"]).unwrap();
        let (mut surface, mut prompt, _) = scripted(&["1", "0"]);
        let mut session = AnnotationSession::new(&series, &log, &seg, axes, options(0));
        let outcomes = session.run(&mut surface, &mut prompt).unwrap();
        assert_eq!(
            outcomes,
            vec![
                TrialOutcome::Labeled { trial: 1, labels: 2 },
                TrialOutcome::Labeled { trial: 2, labels: 0 },
            ]
        );
        let rows: Vec<usize> = session.records().iter().map(|r| r.row_number).collect();
        assert_eq!(rows, vec![3, 5]);
    }

    #[test]
    fn trial_at_last_row_is_skipped() {
        let log = EventLog::from_entries(
            [
                (3, "STARTED TASK Sketching 1".to_string()),
                (3, "FINISHED TASK Sketching 1".to_string()),
            ],
            &Default::default(),
        );
        let mut raw = crate::series::RawTable::new(
            ["t", "m", "x", "y", "z"].iter().map(|s| s.to_string()).collect(),
        );
        for row in 0..4 {
            raw.push_row([row.to_string(), String::new(), "0".into(), "0".into(), "0".into()]);
        }
        let series = raw.clean().unwrap();
        let seg = TrialSegmenter::new(LabelingConfig::default().task_filter())
            .segment(&log)
            .unwrap();
        let axes = series.resolve_axes(&["x", "y", "z"]).unwrap();
        let (mut surface, mut prompt, journal) = scripted(&[]);
        let mut session =
            AnnotationSession::new(&series, &log, &seg, axes, options(100));
        let outcomes = session.run(&mut surface, &mut prompt).unwrap();
        assert_eq!(outcomes, vec![TrialOutcome::Skipped { trial: 1 }]);
        assert!(journal.borrow().is_empty());
    }

    #[test]
    fn failed_trial_keeps_earlier_labels_and_retries_cleanly() {
        let (series, log, seg, axes) = fixture();
        let (mut surface, mut prompt, _) = scripted(&["1", "0"]);
        let mut session =
            AnnotationSession::new(&series, &log, &seg, axes, options(100));
        assert!(session.run(&mut surface, &mut prompt).is_err());
        assert_eq!(session.records().len(), 2);
        assert_eq!(session.remaining(), 1);

        prompt.answers.push_back("0");
        let outcome = session.next_trial(&mut surface, &mut prompt).unwrap();
        assert_eq!(outcome, Some(TrialOutcome::Labeled { trial: 2, labels: 1 }));
        let rows: Vec<usize> = session.records().iter().map(|r| r.row_number).collect();
        assert_eq!(rows, vec![12, 15, 22]);
    }

    #[test]
    fn persists_to_a_fresh_file_each_time() {
        let (series, log, seg, axes) = fixture();
        let (mut surface, mut prompt, _) = scripted(&["1", "0", "yes"]);
        let mut session =
            AnnotationSession::new(&series, &log, &seg, axes, options(100));
        session.run(&mut surface, &mut prompt).unwrap();

        let dir = tempdir().unwrap();
        let first = session.persist(dir.path(), "Sketching_task").unwrap();
        let second = session.persist(dir.path(), "Sketching_task").unwrap();
        assert_ne!(first, second);
        let name = first.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("Sketching_task_labels_"), "{name}");
        assert_eq!(read_labels_csv(&first).unwrap(), session.records());
    }

    #[test]
    fn failed_persist_keeps_records() {
        let (series, log, seg, axes) = fixture();
        let (mut surface, mut prompt, _) = scripted(&["1", "0", "1"]);
        let mut session =
            AnnotationSession::new(&series, &log, &seg, axes, options(100));
        session.run(&mut surface, &mut prompt).unwrap();

        let dir = tempdir().unwrap();
        let missing = dir.path().join("not-there");
        let err = session.persist(&missing, "task").unwrap_err();
        assert!(matches!(err, Error::Persist { .. }));
        assert_eq!(session.records().len(), 3);
        assert!(session.persist(dir.path(), "task").is_ok());
    }

    #[test]
    fn console_prompt_reads_raw_lines() {
        let input = Cursor::new("1\r\n maybe \n");
        let mut prompt = ConsolePrompt::new(input, Vec::new());
        prompt.announce("Animating task 1 from row 7 to 18").unwrap();
        assert_eq!(prompt.ask("Label? ").unwrap(), "1");
        assert_eq!(prompt.ask("Label? ").unwrap(), " maybe ");
        assert!(matches!(prompt.ask("Label? "), Err(Error::Interaction(_))));
        let (_, output) = prompt.into_inner();
        let text = String::from_utf8(output).unwrap();
        assert!(text.starts_with("Animating task 1 from row 7 to 18\nLabel? "));
    }
}
