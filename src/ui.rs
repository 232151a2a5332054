//! UI rendering for the runnel demo shell
//!
//! Pure view code: [`ViewState`] carries what the event loop learned from
//! its subscriptions and [`render`] draws it. No stream types in here.
//! The screen is a logo header, the live counter cell, a keybind footer
//! and a transient toast for each greeting.

use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph},
    Frame,
};

// ============================================================================
// Color Theme
// ============================================================================

/// Primary border color
pub const COLOR_BORDER: Color = Color::DarkGray;

/// Accent color for the counter value and key hints
pub const COLOR_ACCENT: Color = Color::Cyan;

/// Dim text for less important info
pub const COLOR_DIM: Color = Color::DarkGray;

/// Toast text color
pub const COLOR_TOAST: Color = Color::Yellow;

// ============================================================================
// Logo
// ============================================================================

const RUNNEL_LOGO: &[&str] = &[
    "┬─┐┬ ┬┌┐┌┌┐┌┌─┐┬  ",
    "├┬┘│ │││││││├┤ │  ",
    "┴└─└─┘┘└┘┘└┘└─┘┴─┘",
];

const SPINNER: &[&str] = &["⠋", "⠙", "⠸", "⠴", "⠦", "⠇"];

/// Ticks a toast stays visible, roughly two seconds at the 16ms cadence.
const TOAST_TICKS: u32 = 125;

// ============================================================================
// View state
// ============================================================================

/// What the shell knows how to draw.
pub struct ViewState {
    counter: u64,
    toast: Option<(String, u32)>,
    tick_count: u64,
    /// Set whenever something visible changed; the loop clears it on draw.
    pub dirty: bool,
}

impl ViewState {
    pub fn new(counter: u64) -> Self {
        Self {
            counter,
            toast: None,
            tick_count: 0,
            dirty: true,
        }
    }

    pub fn set_counter(&mut self, value: u64) {
        if self.counter != value {
            self.counter = value;
            self.dirty = true;
        }
    }

    /// Show a greeting. One display per value, a newer one replaces it.
    pub fn show_toast(&mut self, message: String) {
        self.toast = Some((message, TOAST_TICKS));
        self.dirty = true;
    }

    /// Advance animations by one frame tick.
    pub fn tick(&mut self) {
        self.tick_count = self.tick_count.wrapping_add(1);
        self.dirty = true;
        if let Some((_, remaining)) = &mut self.toast {
            *remaining -= 1;
            if *remaining == 0 {
                self.toast = None;
            }
        }
    }
}

// ============================================================================
// Rendering
// ============================================================================

/// Draw one frame.
pub fn render(f: &mut Frame, view: &ViewState) {
    let area = f.area();
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(RUNNEL_LOGO.len() as u16 + 1),
            Constraint::Min(5),
            Constraint::Length(3),
        ])
        .split(area);

    render_logo(f, rows[0]);
    render_counter(f, view, rows[1]);
    render_footer(f, view, rows[2]);

    if let Some((message, _)) = &view.toast {
        render_toast(f, area, message);
    }
}

fn render_logo(f: &mut Frame, area: Rect) {
    let lines: Vec<Line> = RUNNEL_LOGO
        .iter()
        .map(|row| Line::from(Span::styled(*row, Style::default().fg(COLOR_ACCENT))))
        .collect();
    f.render_widget(Paragraph::new(lines).alignment(Alignment::Center), area);
}

fn render_counter(f: &mut Frame, view: &ViewState, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(COLOR_BORDER))
        .title(" counter cell ");
    let text = vec![
        Line::from(""),
        Line::from(Span::styled(
            view.counter.to_string(),
            Style::default()
                .fg(COLOR_ACCENT)
                .add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(Span::styled(
            "space / + / enter increments",
            Style::default().fg(COLOR_DIM),
        )),
    ];
    f.render_widget(
        Paragraph::new(text).block(block).alignment(Alignment::Center),
        area,
    );
}

fn render_footer(f: &mut Frame, view: &ViewState, area: Rect) {
    let spinner = SPINNER[(view.tick_count as usize) % SPINNER.len()];
    let line = Line::from(vec![
        Span::styled(
            format!(" {spinner} demos running"),
            Style::default().fg(COLOR_DIM),
        ),
        Span::raw("   "),
        Span::styled("h", Style::default().fg(COLOR_ACCENT)),
        Span::styled(" greetings  ", Style::default().fg(COLOR_DIM)),
        Span::styled("n", Style::default().fg(COLOR_ACCENT)),
        Span::styled(" notify  ", Style::default().fg(COLOR_DIM)),
        Span::styled("q", Style::default().fg(COLOR_ACCENT)),
        Span::styled(" quit", Style::default().fg(COLOR_DIM)),
    ]);
    f.render_widget(
        Paragraph::new(line).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(COLOR_BORDER)),
        ),
        area,
    );
}

fn render_toast(f: &mut Frame, area: Rect, message: &str) {
    let width = (message.chars().count() as u16 + 4).min(area.width);
    let toast_area = Rect {
        x: area.x + area.width.saturating_sub(width + 1),
        y: area.y + 1,
        width,
        height: 3.min(area.height),
    };
    f.render_widget(Clear, toast_area);
    f.render_widget(
        Paragraph::new(Line::from(Span::styled(
            message,
            Style::default()
                .fg(COLOR_TOAST)
                .add_modifier(Modifier::BOLD),
        )))
        .alignment(Alignment::Center)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(COLOR_TOAST)),
        ),
        toast_area,
    );
}
