use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use env_logger::Env;
use log::{error, info, warn};
use mlabel_lib::{
    annotation::{
        AnnotationSession, ConsolePrompt, LabelPrompt, LabelRecord, PlaybackSurface,
        SessionOptions, TrialOutcome,
    },
    calibration_position,
    config::LabelingConfig,
    io::series::read_series_csv,
    playback::{DisplayMode, Playback, PlaybackWindow},
    EventLog, MotionSeries, Position, Segmentation, TrialSegmenter,
};
use mlabel_tui::TerminalPlayback;
use serde_json::json;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(
    name = "mlabel",
    version,
    about = "Segment motion recordings into trials and label their release events"
)]
struct Cli {
    /// TOML labeling configuration; built-in defaults when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Default)]
struct StartArgs {
    /// Session id whose configured synthetic first-start row opens trial 1
    #[arg(long, conflicts_with = "synthetic_start")]
    session: Option<String>,
    /// Explicit synthetic first-start row
    #[arg(long)]
    synthetic_start: Option<usize>,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ModeArg {
    #[value(name = "trajectory")]
    Trajectory,
    #[value(name = "current")]
    Current,
}

impl From<ModeArg> for DisplayMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Trajectory => DisplayMode::Trajectory,
            ModeArg::Current => DisplayMode::CurrentPoint,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Print every annotation marker as a JSON line
    Events {
        #[arg(long)]
        input: PathBuf,
    },
    /// Pair task markers into trials and print the segmentation as JSON
    Segment {
        #[arg(long)]
        input: PathBuf,
        #[command(flatten)]
        start: StartArgs,
    },
    /// Print the head-calibration position as JSON
    Calibration {
        #[arg(long)]
        input: PathBuf,
    },
    /// Render one playback frame of a trial as JSON
    Frame {
        #[arg(long)]
        input: PathBuf,
        #[command(flatten)]
        start: StartArgs,
        /// 1-based trial number
        #[arg(long)]
        trial: usize,
        /// 1-based frame within the trial window
        #[arg(long)]
        frame: usize,
        #[arg(long, default_value = "trajectory")]
        mode: ModeArg,
        /// Rows shown past the finish marker (overrides the configuration)
        #[arg(long)]
        extension: Option<usize>,
        /// Place the target plane at the calibration head position
        #[arg(long)]
        calibrate: bool,
    },
    /// Play each trial and collect a label for every release event
    Label {
        #[arg(long)]
        input: PathBuf,
        #[command(flatten)]
        start: StartArgs,
        /// Directory receiving the label file
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
        /// Skip the terminal playback and prompt right away
        #[arg(long)]
        no_playback: bool,
        /// Place the target plane at the calibration head position
        #[arg(long)]
        calibrate: bool,
    },
    /// Print the default configuration as TOML
    ConfigTemplate,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(Env::default().default_filter_or(&cli.log_level)).init();

    let config = match &cli.config {
        Some(path) => LabelingConfig::from_toml_file(path)
            .with_context(|| format!("loading configuration {}", path.display()))?,
        None => LabelingConfig::default(),
    };

    match cli.command {
        Commands::Events { input } => cmd_events(&config, &input)?,
        Commands::Segment { input, start } => cmd_segment(&config, &input, &start)?,
        Commands::Calibration { input } => cmd_calibration(&config, &input)?,
        Commands::Frame {
            input,
            start,
            trial,
            frame,
            mode,
            extension,
            calibrate,
        } => cmd_frame(
            &config,
            &input,
            &start,
            trial,
            frame,
            mode.into(),
            extension,
            calibrate,
        )?,
        Commands::Label {
            input,
            start,
            out_dir,
            no_playback,
            calibrate,
        } => cmd_label(&config, &input, &start, &out_dir, no_playback, calibrate)?,
        Commands::ConfigTemplate => print!("{}", config.to_toml_string()?),
    }
    Ok(())
}

struct Recording {
    series: MotionSeries,
    log: EventLog,
}

fn load_recording(config: &LabelingConfig, path: &Path) -> Result<Recording> {
    let series =
        read_series_csv(path).with_context(|| format!("loading recording {}", path.display()))?;
    let log = EventLog::extract(&series, &config.markers);
    info!(
        "loaded {} rows ({:.1} s) with {} markers from {}",
        series.len(),
        series.duration_ms() / 1000.0,
        log.len(),
        path.display()
    );
    Ok(Recording { series, log })
}

fn segment(config: &LabelingConfig, log: &EventLog, start: &StartArgs) -> Result<Segmentation> {
    let synthetic = match (&start.session, start.synthetic_start) {
        (Some(session), _) => Some(config.session_start(session)?),
        (None, row) => row,
    };
    TrialSegmenter::new(config.task_filter())
        .with_synthetic_start(synthetic)
        .segment(log)
        .context("segmenting trials")
}

fn target_origin(log: &EventLog, calibrate: bool) -> Position {
    if !calibrate {
        return Position::default();
    }
    match calibration_position(log) {
        Ok(origin) => {
            info!(
                "target plane placed at calibration ({:.4}, {:.4}, {:.4})",
                origin.x, origin.y, origin.z
            );
            origin
        }
        Err(err) => {
            warn!("{}; placing the target plane at the zero origin", err);
            Position::default()
        }
    }
}

fn cmd_events(config: &LabelingConfig, input: &Path) -> Result<()> {
    let recording = load_recording(config, input)?;
    for marker in &recording.log {
        println!("{}", serde_json::to_string(marker)?);
    }
    Ok(())
}

fn cmd_segment(config: &LabelingConfig, input: &Path, start: &StartArgs) -> Result<()> {
    let recording = load_recording(config, input)?;
    let seg = segment(config, &recording.log, start)?;
    let task_events: Vec<_> = seg.task_markers(&recording.log).collect();
    let starts: Vec<usize> = seg.trials.iter().map(|t| t.start).collect();
    let finishes: Vec<usize> = seg.trials.iter().map(|t| t.end).collect();
    let summary = json!({
        "task": config.task.name,
        "trials": seg.trials,
        "starts": starts,
        "finishes": finishes,
        "released_rows": seg.released_rows(),
        "task_events": task_events,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn cmd_calibration(config: &LabelingConfig, input: &Path) -> Result<()> {
    let recording = load_recording(config, input)?;
    let origin = calibration_position(&recording.log)?;
    println!("{}", serde_json::to_string(&origin)?);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn cmd_frame(
    config: &LabelingConfig,
    input: &Path,
    start: &StartArgs,
    trial: usize,
    frame: usize,
    mode: DisplayMode,
    extension: Option<usize>,
    calibrate: bool,
) -> Result<()> {
    let recording = load_recording(config, input)?;
    let seg = segment(config, &recording.log, start)?;
    let trial = seg
        .trials
        .iter()
        .find(|t| t.index == trial)
        .copied()
        .ok_or_else(|| anyhow!("no trial {} (found {})", trial, seg.trials.len()))?;
    let axes = recording.series.resolve_axes(&config.playback.axes)?;
    let window = PlaybackWindow::new(
        trial,
        extension.unwrap_or(config.playback.extension_rows),
        recording.series.len(),
    );
    let playback = Playback::new(
        &recording.series,
        &recording.log,
        axes,
        window,
        target_origin(&recording.log, calibrate),
    );
    let view = playback.render(frame, mode)?;
    println!("{}", serde_json::to_string(&view)?);
    Ok(())
}

/// Stand-in surface for `--no-playback`: reports the window and returns.
struct SummarySurface;

impl PlaybackSurface for SummarySurface {
    fn play(&mut self, playback: &Playback<'_>) -> mlabel_lib::Result<()> {
        info!(
            "task {}: {} frames, {} engaged",
            playback.trial().index,
            playback.frame_count(),
            playback.engaged_frames()
        );
        Ok(())
    }
}

fn cmd_label(
    config: &LabelingConfig,
    input: &Path,
    start: &StartArgs,
    out_dir: &Path,
    no_playback: bool,
    calibrate: bool,
) -> Result<()> {
    let recording = load_recording(config, input)?;
    let seg = segment(config, &recording.log, start)?;
    let axes = recording
        .series
        .resolve_axes(&config.playback.axes)
        .context("resolving tracked-point channels")?;
    let options = SessionOptions {
        extension_rows: config.playback.extension_rows,
        origin: target_origin(&recording.log, calibrate),
    };
    info!(
        "{} task: {} trials, {} release events",
        config.task.name,
        seg.trials.len(),
        seg.released_rows().len()
    );

    let mut session = AnnotationSession::new(&recording.series, &recording.log, &seg, axes, options);
    let mut prompt = ConsolePrompt::stdio();
    let outcome = if no_playback {
        session.run(&mut SummarySurface, &mut prompt)
    } else {
        session.run(&mut TerminalPlayback::new(config.view), &mut prompt)
    };
    let interrupted = match outcome {
        Ok(outcomes) => {
            let skipped = outcomes
                .iter()
                .filter(|o| matches!(o, TrialOutcome::Skipped { .. }))
                .count();
            if skipped > 0 {
                warn!("{} trials had nothing to play and were skipped", skipped);
            }
            None
        }
        Err(err) => {
            error!(
                "labeling stopped with {} trials left: {}",
                session.remaining(),
                err
            );
            Some(err)
        }
    };

    if session.records().is_empty() {
        if let Some(err) = interrupted {
            return Err(err).context("labeling stopped before any label was collected");
        }
    }
    for record in session.records() {
        println!("row {}: {}", record.row_number, record.label);
    }
    let path = persist_with_retry(&session, out_dir, &config.output.prefix, &mut prompt)?;
    println!("Labels saved to {}", path.display());

    match interrupted {
        Some(err) => Err(err).context("labeling did not finish; completed trials were saved"),
        None => Ok(()),
    }
}

fn persist_with_retry<P: LabelPrompt>(
    session: &AnnotationSession<'_>,
    dir: &Path,
    prefix: &str,
    prompt: &mut P,
) -> Result<PathBuf> {
    loop {
        match session.persist(dir, prefix) {
            Ok(path) => return Ok(path),
            Err(err) => {
                error!("{}", err);
                let retry = prompt
                    .ask("Saving labels failed. Retry? [y/N]: ")
                    .map(|answer| answer.trim().eq_ignore_ascii_case("y"))
                    .unwrap_or(false);
                if !retry {
                    dump_records(session.records())?;
                    return Err(err).context("labels were not saved; records dumped to stderr");
                }
            }
        }
    }
}

fn dump_records(records: &[LabelRecord]) -> Result<()> {
    eprintln!("{}", serde_json::to_string_pretty(records)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_arg_maps_to_display_mode() {
        assert_eq!(DisplayMode::from(ModeArg::Current), DisplayMode::CurrentPoint);
        assert_eq!(DisplayMode::from(ModeArg::Trajectory), DisplayMode::Trajectory);
    }
}
