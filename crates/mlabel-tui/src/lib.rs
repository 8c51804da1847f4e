//! Terminal playback surface: a top-down canvas of the tracked point with a
//! frame slider underneath.

use std::{
    io::{self, Stdout},
    time::Duration,
};

use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use mlabel_lib::{
    annotation::PlaybackSurface,
    config::ViewConfig,
    playback::{DisplayMode, FrameSlider, FrameView, Playback, PointState},
    Error, Result,
};
use ratatui::{
    backend::Backend,
    layout::{Constraint, Direction, Layout, Rect},
    prelude::CrosstermBackend,
    style::{Color, Modifier, Style},
    symbols,
    text::{Line, Span},
    widgets::{
        canvas::{Canvas, Points, Rectangle},
        Block, Borders, Gauge, Paragraph, Wrap,
    },
    Frame, Terminal,
};

const PAGE: isize = 10;

/// Interactive playback in the alternate screen. The display mode carries over
/// from one trial to the next.
pub struct TerminalPlayback {
    view: ViewConfig,
    mode: DisplayMode,
    tick_rate: Duration,
}

impl TerminalPlayback {
    pub fn new(view: ViewConfig) -> Self {
        Self {
            view,
            mode: DisplayMode::default(),
            tick_rate: Duration::from_millis(100),
        }
    }

    fn run<B: Backend>(&mut self, terminal: &mut Terminal<B>, playback: &Playback<'_>) -> Result<()> {
        let mut player = Player::new(playback.slider(), self.mode);
        loop {
            let view = playback.render(player.slider.value(), player.mode)?;
            terminal.draw(|f| draw(f, playback, &view, &self.view, &player))?;
            if event::poll(self.tick_rate)? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press {
                        match player.on_key(key) {
                            Step::Continue => {}
                            Step::Close => break,
                            Step::Abort => {
                                self.mode = player.mode;
                                return Err(Error::interaction("playback aborted by operator"));
                            }
                        }
                    }
                }
            }
        }
        self.mode = player.mode;
        Ok(())
    }
}

impl PlaybackSurface for TerminalPlayback {
    fn play(&mut self, playback: &Playback<'_>) -> Result<()> {
        if playback.frame_count() == 0 {
            return Ok(());
        }
        let mut terminal = setup_terminal()?;
        let outcome = self.run(&mut terminal, playback);
        restore_terminal()?;
        terminal.show_cursor()?;
        log::debug!(
            "closed playback of task {} at mode {:?}",
            playback.trial().index,
            self.mode
        );
        outcome
    }
}

fn setup_terminal() -> io::Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    Terminal::new(CrosstermBackend::new(stdout))
}

fn restore_terminal() -> io::Result<()> {
    disable_raw_mode()?;
    execute!(io::stdout(), LeaveAlternateScreen)?;
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Continue,
    Close,
    Abort,
}

/// Slider position and display mode while one trial is on screen.
#[derive(Debug, Clone, Copy)]
struct Player {
    slider: FrameSlider,
    mode: DisplayMode,
}

impl Player {
    fn new(slider: FrameSlider, mode: DisplayMode) -> Self {
        Self { slider, mode }
    }

    fn on_key(&mut self, key: KeyEvent) -> Step {
        match key.code {
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                return Step::Abort
            }
            KeyCode::Char('q') | KeyCode::Esc | KeyCode::Enter => return Step::Close,
            KeyCode::Left | KeyCode::Char('h') => {
                self.slider.step(-1);
            }
            KeyCode::Right | KeyCode::Char('l') => {
                self.slider.step(1);
            }
            KeyCode::PageDown => {
                self.slider.step(PAGE);
            }
            KeyCode::PageUp => {
                self.slider.step(-PAGE);
            }
            KeyCode::Home => {
                self.slider.first();
            }
            KeyCode::End => {
                self.slider.last();
            }
            KeyCode::Char('t') => self.mode = self.mode.toggled(),
            _ => {}
        }
        Step::Continue
    }
}

fn state_color(state: PointState) -> Color {
    let (r, g, b) = state.color().rgb();
    Color::Rgb(r, g, b)
}

fn state_label(state: PointState) -> &'static str {
    match state {
        PointState::Engaged => "engaged",
        PointState::Released => "released",
    }
}

fn mode_label(mode: DisplayMode) -> &'static str {
    match mode {
        DisplayMode::Trajectory => "trajectory",
        DisplayMode::CurrentPoint => "current point",
    }
}

fn draw(f: &mut Frame, playback: &Playback<'_>, view: &FrameView, bounds: &ViewConfig, player: &Player) {
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(0),
            Constraint::Length(3),
            Constraint::Length(4),
        ])
        .split(f.size());
    draw_canvas(f, layout[0], playback, view, bounds);
    draw_slider(f, layout[1], &player.slider);
    draw_status(f, layout[2], view);
}

fn draw_canvas(f: &mut Frame, area: Rect, playback: &Playback<'_>, view: &FrameView, bounds: &ViewConfig) {
    let trial = playback.trial();
    let title = format!(
        "Task {} rows {}..={} ({})",
        trial.index,
        trial.start,
        playback.window().last_row,
        mode_label(view.mode)
    );
    let plane = playback.target_plane();
    let released: Vec<(f64, f64)> = view
        .points
        .iter()
        .filter(|p| !p.state.is_engaged())
        .map(|p| (p.position.x, p.position.y))
        .collect();
    let engaged: Vec<(f64, f64)> = view
        .points
        .iter()
        .filter(|p| p.state.is_engaged())
        .map(|p| (p.position.x, p.position.y))
        .collect();
    let canvas = Canvas::default()
        .block(Block::default().borders(Borders::ALL).title(title))
        .marker(symbols::Marker::Braille)
        .x_bounds(bounds.x)
        .y_bounds(bounds.y)
        .paint(move |ctx| {
            ctx.draw(&Rectangle {
                x: plane.x[0],
                y: plane.y[0],
                width: plane.x[1] - plane.x[0],
                height: plane.y[1] - plane.y[0],
                color: Color::DarkGray,
            });
            ctx.layer();
            ctx.draw(&Points {
                coords: &released,
                color: state_color(PointState::Released),
            });
            ctx.draw(&Points {
                coords: &engaged,
                color: state_color(PointState::Engaged),
            });
        });
    f.render_widget(canvas, area);
}

fn draw_slider(f: &mut Frame, area: Rect, slider: &FrameSlider) {
    let gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title("Frame"))
        .gauge_style(Style::default().fg(Color::Cyan))
        .ratio(slider.ratio())
        .label(format!("{}/{}", slider.value(), slider.max()));
    f.render_widget(gauge, area);
}

fn draw_status(f: &mut Frame, area: Rect, view: &FrameView) {
    let state = Span::styled(
        state_label(view.state),
        Style::default()
            .fg(state_color(view.state))
            .add_modifier(Modifier::BOLD),
    );
    let lines = vec![
        Line::from(vec![
            Span::raw(format!("row {} | t {:.0} ms | ", view.row, view.timestamp)),
            state,
            Span::raw(format!(
                " | {}",
                view.latest_event.as_deref().unwrap_or("no event yet")
            )),
        ]),
        Line::from("←/→ step  PgUp/PgDn ±10  Home/End  t toggle mode  q/Enter close"),
    ];
    let status = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title("Status"))
        .wrap(Wrap { trim: true });
    f.render_widget(status, area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use mlabel_lib::{
        playback::PlaybackWindow, EventLog, Position, RawTable, Trial, Vocabulary,
    };
    use ratatui::backend::TestBackend;

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn keys_move_the_slider_within_bounds() {
        let mut player = Player::new(FrameSlider::new(25), DisplayMode::Trajectory);
        assert_eq!(player.on_key(press(KeyCode::Left)), Step::Continue);
        assert_eq!(player.slider.value(), 1);
        player.on_key(press(KeyCode::PageDown));
        player.on_key(press(KeyCode::Right));
        assert_eq!(player.slider.value(), 12);
        player.on_key(press(KeyCode::End));
        player.on_key(press(KeyCode::PageDown));
        assert_eq!(player.slider.value(), 25);
        player.on_key(press(KeyCode::Home));
        assert_eq!(player.slider.value(), 1);
    }

    #[test]
    fn toggle_and_close_keys() {
        let mut player = Player::new(FrameSlider::new(5), DisplayMode::Trajectory);
        player.on_key(press(KeyCode::Char('t')));
        assert_eq!(player.mode, DisplayMode::CurrentPoint);
        assert_eq!(player.on_key(press(KeyCode::Char('q'))), Step::Close);
        assert_eq!(player.on_key(press(KeyCode::Enter)), Step::Close);
        assert_eq!(
            player.on_key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)),
            Step::Abort
        );
    }

    #[test]
    fn draws_frame_status() {
        let mut raw = RawTable::new(
            ["t", "m", "x", "y", "z"].iter().map(|s| s.to_string()).collect(),
        );
        for row in 0..12 {
            let text = if row == 3 { "EVENT: DRAW STARTED" } else { "" };
            let v = row as f64 / 100.0;
            raw.push_row([
                (row * 10).to_string(),
                text.to_string(),
                v.to_string(),
                (1.5 + v).to_string(),
                "0".to_string(),
            ]);
        }
        let series = raw.clean().unwrap();
        let log = EventLog::extract(&series, &Vocabulary::default());
        let axes = series.resolve_axes(&["x", "y", "z"]).unwrap();
        let trial = Trial {
            index: 1,
            start: 0,
            end: 10,
            synthetic_start: false,
        };
        let window = PlaybackWindow::new(trial, 0, series.len());
        let playback = Playback::new(&series, &log, axes, window, Position::default());
        let player = Player::new(playback.slider(), DisplayMode::Trajectory);
        let view = playback.render(4, DisplayMode::Trajectory).unwrap();

        let mut terminal = Terminal::new(TestBackend::new(100, 30)).unwrap();
        terminal
            .draw(|f| draw(f, &playback, &view, &ViewConfig::default(), &player))
            .unwrap();
        let text: String = terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect();
        assert!(text.contains("Task 1 rows 0..=10"));
        assert!(text.contains("row 4"));
        assert!(text.contains("engaged"));
        assert!(text.contains("EVENT: DRAW STARTED"));
    }
}
