use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use std::{
    f64::consts::PI,
    io,
    sync::mpsc::Receiver,
    time::{Duration, Instant},
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    layout::{Constraint, Direction, Layout},
    style::{Color, Style},
    symbols,
    text::{Line, Span},
    widgets::{Axis, Block, Borders, Chart, Dataset, GraphType, Paragraph},
    Frame, Terminal,
};

use hydrobearing::{
    bearing_estimator::{Bearing, Geometry, Radian},
    gui::DisplayError,
    ingestion_channel::{ChannelEvent, IngestionChannel},
    tracker::{AngleSink, BearingTracker},
};

/// Everything needed to (re)start streaming from one endpoint.
pub struct Link {
    pub channel: IngestionChannel,
    pub events: Receiver<ChannelEvent>,
    pub endpoint: String,
    pub baud_rate: u32,
}

/// What is on screen right now. Only the latest bearing is kept, so however
/// fast measurements arrive the screen is redrawn once per tick.
#[derive(Default)]
struct Readout {
    bearing: Option<Bearing>,
    status: String,
}

impl AngleSink for Readout {
    fn set_angle(&mut self, primary: Radian) {
        self.bearing = Some(Bearing::from_primary(primary));
    }

    fn set_bearing(&mut self, bearing: &Bearing) {
        self.bearing = Some(*bearing);
    }

    fn set_status(&mut self, status: &str) {
        self.status = status.to_owned();
    }
}

/// A line from the array's center out to the unit circle. Zero is straight
/// ahead of the baseline, positive angles lean toward the first hydrophone.
fn ray(angle: Radian) -> Vec<(f64, f64)> {
    vec![(0.0, 0.0), (angle.sin(), angle.cos())]
}

fn unit_circle(n_points: usize) -> Vec<(f64, f64)> {
    (0..n_points)
        .map(|i| (i as f64 / n_points as f64) * 2.0 * PI)
        .map(|angle| (angle.cos(), angle.sin()))
        .collect()
}

struct App {
    link: Link,
    tracker: BearingTracker,
    readout: Readout,
    circle: Vec<(f64, f64)>,
    primary_ray: Vec<(f64, f64)>,
    ambiguous_ray: Vec<(f64, f64)>,
}

impl App {
    fn new(link: Link, geometry: Geometry) -> App {
        App {
            link,
            tracker: BearingTracker::new(geometry),
            readout: Readout::default(),
            circle: unit_circle(90),
            primary_ray: vec![],
            ambiguous_ray: vec![],
        }
    }

    fn connect(&mut self) {
        if let Err(e) = self.link.channel.start(&self.link.endpoint, self.link.baud_rate) {
            self.readout.status = e.to_string();
        }
    }

    fn disconnect(&mut self) {
        self.link.channel.stop();
        self.on_tick();
    }

    fn on_tick(&mut self) {
        self.tracker.drain(&self.link.events, &mut self.readout);
        if let Some(bearing) = self.readout.bearing {
            self.primary_ray = ray(bearing.primary);
            self.ambiguous_ray = ray(bearing.ambiguous);
        }
    }
}

pub fn engage_gui(link: Link, geometry: Geometry) -> Result<(), DisplayError> {
    // setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // create app and run it
    let tick_rate = Duration::from_millis(100);
    let mut app = App::new(link, geometry);
    app.connect();
    let res = run_app(&mut terminal, &mut app, tick_rate);
    app.link.channel.stop();

    // restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    res.map_err(DisplayError::from)
}

fn run_app<B: Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    tick_rate: Duration,
) -> io::Result<()> {
    let mut last_tick = Instant::now();
    loop {
        terminal.draw(|f| ui(f, app))?;

        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or_else(|| Duration::from_secs(0));
        if crossterm::event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') => return Ok(()),
                        KeyCode::Char('s') => app.disconnect(),
                        KeyCode::Char('r') => app.connect(),
                        _ => {}
                    }
                }
            }
        }
        if last_tick.elapsed() >= tick_rate {
            app.on_tick();
            last_tick = Instant::now();
        }
    }
}

fn geometry_label(geometry: &Geometry) -> String {
    format!(
        "d = {:.3} m, c = {:.0} m/s",
        geometry.mic_distance, geometry.speed_of_sound
    )
}

fn readout_lines(app: &App) -> Vec<Line<'static>> {
    let bearing = match app.readout.bearing {
        Some(b) => {
            let mut spans = vec![
                Span::styled(
                    format!("primary {:+7.2}°", b.primary.to_degrees()),
                    Style::default().fg(Color::Cyan),
                ),
                Span::raw(format!(" ({:.2}°)   ", b.primary_degrees())),
                Span::styled(
                    format!("ambiguous {:.2}°", b.ambiguous_degrees()),
                    Style::default().fg(Color::Red),
                ),
            ];
            if b.saturated {
                spans.push(Span::styled(
                    "   SATURATED",
                    Style::default().fg(Color::Yellow),
                ));
            }
            Line::from(spans)
        }
        None => Line::from("waiting for the first measurement..."),
    };

    let stats = app.tracker.stats();
    let status = Line::from(format!(
        "{}   [{} estimated, {} saturated, {} rejected]   {}",
        app.readout.status,
        stats.estimated,
        stats.saturated,
        stats.rejected,
        geometry_label(app.tracker.geometry())
    ));

    vec![bearing, status]
}

fn ui(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(4)])
        .split(f.size());

    let chart = Chart::new(vec![
        Dataset::default()
            .marker(symbols::Marker::Dot)
            .graph_type(GraphType::Scatter)
            .style(Style::default().fg(Color::DarkGray))
            .data(&app.circle),
        Dataset::default()
            .name("Primary")
            .marker(symbols::Marker::Braille)
            .graph_type(GraphType::Line)
            .style(Style::default().fg(Color::Cyan))
            .data(&app.primary_ray),
        Dataset::default()
            .name("Ambiguous")
            .marker(symbols::Marker::Braille)
            .graph_type(GraphType::Line)
            .style(Style::default().fg(Color::Red))
            .data(&app.ambiguous_ray),
    ])
    .block(Block::default().title(format!(" Bearing from {} ", app.link.endpoint)))
    .x_axis(
        Axis::default()
            .title(Span::styled("Baseline", Style::default().fg(Color::Red)))
            .style(Style::default().fg(Color::White))
            .bounds([-1.2, 1.2])
            .labels(["-90°", "0", "90°"].iter().cloned().map(Span::from).collect()),
    )
    .y_axis(
        Axis::default()
            .title(Span::styled("Ahead", Style::default().fg(Color::Red)))
            .style(Style::default().fg(Color::White))
            .bounds([-1.2, 1.2])
            .labels(["180°", "", "0°"].iter().cloned().map(Span::from).collect()),
    );
    f.render_widget(chart, chunks[0]);

    let readout = Paragraph::new(readout_lines(app)).block(
        Block::default()
            .borders(Borders::TOP)
            .title(" Quit <Q>  Stop <S>  Restart <R> "),
    );
    f.render_widget(readout, chunks[1]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadside_points_straight_ahead() {
        assert_eq!(ray(0.0), vec![(0.0, 0.0), (0.0, 1.0)]);
        let behind = ray(PI);
        assert!((behind[1].1 + 1.0).abs() < 1e-12);
    }

    #[test]
    fn geometry_is_shown_in_plain_units() {
        assert_eq!(
            geometry_label(&Geometry::new(0.5, 1500.0)),
            "d = 0.500 m, c = 1500 m/s"
        );
    }

    #[test]
    fn readout_keeps_the_latest_bearing() {
        let mut readout = Readout::default();
        readout.set_angle(0.1);
        readout.set_angle(0.2);
        assert_eq!(readout.bearing.map(|b| b.primary), Some(0.2));
    }
}
