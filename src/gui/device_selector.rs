use std::{io::stdout, path::PathBuf, time::Duration};

use crate::gui::error::DisplayError;

use crossterm::{
    event::{self, KeyCode, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use ratatui::{
    prelude::*,
    widgets::{
        block::{Position, Title},
        *,
    },
    Terminal,
};

/// What the user did with the list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Choice {
    Pending,
    Picked(usize),
    Quit,
}

/// Moves the cursor and reacts to a key press.
fn navigate(cursor: &mut usize, n_ports: usize, key: KeyCode) -> Choice {
    match key {
        KeyCode::Down | KeyCode::Char('j') => *cursor = (*cursor + 1) % n_ports,
        KeyCode::Up | KeyCode::Char('k') => *cursor = (*cursor + n_ports - 1) % n_ports,
        KeyCode::Enter => return Choice::Picked(*cursor),
        KeyCode::Char('q') | KeyCode::Esc => return Choice::Quit,
        _ => {}
    }
    Choice::Pending
}

/// Lets the user pick which serial device the hydrophone controller is on.
/// Returns `None` if they quit, or if there is nothing to pick from.
pub fn device_selector(mut available_ports: Vec<PathBuf>) -> Result<Option<PathBuf>, DisplayError> {
    if available_ports.is_empty() {
        return Ok(None);
    }

    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let res = run_selector(&available_ports);
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    Ok(res?.map(|i| available_ports.swap_remove(i)))
}

fn run_selector(available_ports: &[PathBuf]) -> Result<Option<usize>, DisplayError> {
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;
    terminal.clear()?;

    let n_ports = available_ports.len();
    let mut cursor = 0;
    let mut list_state = ListState::default().with_selected(Some(cursor));
    loop {
        let title = Title::from(" Hydrophone Port ".cyan().bold());
        let instructions = Title::from(Line::from(vec![
            " Navigate ".into(),
            "<Up>/<Down>".cyan().bold(),
            " Select ".into(),
            "<Enter>".cyan().bold(),
            " Quit ".into(),
            "<Q> ".cyan().bold(),
        ]));
        let block = Block::default()
            .title(title.alignment(Alignment::Center))
            .title(
                instructions
                    .alignment(Alignment::Center)
                    .position(Position::Bottom),
            )
            .borders(Borders::ALL);
        let port_names = available_ports.iter().map(|p| p.to_string_lossy());
        let list = List::new(port_names)
            .style(Style::default().fg(Color::White))
            .highlight_symbol(">>")
            .highlight_style(Style::default().fg(Color::Cyan))
            .block(block);
        list_state.select(Some(cursor));
        terminal.draw(|frame| {
            let area = frame.size();
            frame.render_stateful_widget(list, area, &mut list_state);
        })?;

        if event::poll(Duration::from_millis(16))? {
            if let event::Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match navigate(&mut cursor, n_ports, key.code) {
                        Choice::Pending => {}
                        Choice::Picked(i) => return Ok(Some(i)),
                        Choice::Quit => return Ok(None),
                    }
                }
            }
        }
    }
}
