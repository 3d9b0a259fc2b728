//! Full-screen session view. A frame is composed as plain lines first and
//! painted afterwards, so layout can be checked without a terminal.

use std::fmt::Write as _;
use std::io::{Write, stdout};
use std::time::Duration;

use anyhow::Result;
use crossterm::cursor::{Hide, MoveTo, Show};
use crossterm::queue;
use crossterm::style::{Color, Stylize};
use crossterm::terminal::{self, Clear, ClearType, EnterAlternateScreen, LeaveAlternateScreen};

use crate::session::{SessionSummary, UsageLevel};
use crate::util::{format_tokens, human_duration, now_local, progress_bar, truncate};

const TITLE: &str = "CLAUDE CONTEXT WATCH";
const KEY_HINT: &str = "q quit | r reset alerts";

pub struct RenderData<'a> {
    pub running_for: Duration,
    pub alerts_enabled: bool,
    pub thresholds: &'a [u8],
    pub poll_interval_secs: u64,
    pub active_minutes: u64,
    pub alerted_sessions: usize,
    pub status_note: Option<&'a str>,
    pub sessions: &'a [SessionSummary],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Density {
    Roomy,
    Tight,
    Bare,
}

impl Density {
    fn for_size(cols: usize, rows: usize) -> Self {
        match (cols, rows) {
            (72.., 20..) => Self::Roomy,
            (48.., 12..) => Self::Tight,
            _ => Self::Bare,
        }
    }

    fn lines_per_session(self) -> usize {
        if self == Self::Bare { 1 } else { 2 }
    }
}

/// Already clipped to the terminal width; may carry color escapes.
#[derive(Debug, Default)]
struct Frame {
    body: Vec<String>,
    footer: String,
}

pub fn enter_terminal() -> Result<()> {
    terminal::enable_raw_mode()?;
    let mut out = stdout();
    queue!(out, EnterAlternateScreen, Hide)?;
    out.flush()?;
    Ok(())
}

pub fn leave_terminal() -> Result<()> {
    let mut out = stdout();
    queue!(out, Show, LeaveAlternateScreen)?;
    out.flush()?;
    terminal::disable_raw_mode()?;
    Ok(())
}

pub fn draw(data: &RenderData<'_>) -> Result<()> {
    let (cols, rows) = terminal::size()?;
    if cols == 0 || rows == 0 {
        return Ok(());
    }

    let frame = compose_frame(data, usize::from(cols), usize::from(rows));
    let mut out = stdout();
    queue!(out, Clear(ClearType::All))?;
    for (row, line) in (0u16..).zip(&frame.body) {
        queue!(out, MoveTo(0, row))?;
        write!(out, "{line}")?;
    }
    queue!(out, MoveTo(0, rows - 1))?;
    write!(out, "{}", frame.footer)?;
    out.flush()?;
    Ok(())
}

/// Cheap identity of what a frame would show; the clock and uptime are left
/// out so an idle screen is not repainted every tick.
pub fn frame_signature(data: &RenderData<'_>) -> String {
    let mut signature = format!(
        "{}|{}|{}|",
        data.alerts_enabled,
        data.alerted_sessions,
        data.status_note.unwrap_or_default()
    );
    for s in data.sessions {
        let _ = write!(
            signature,
            "{}:{}:{}:{}|",
            s.id, s.used_tokens, s.percentage, s.last_updated
        );
    }
    signature
}

fn compose_frame(data: &RenderData<'_>, cols: usize, rows: usize) -> Frame {
    let density = Density::for_size(cols, rows);
    let body_rows = rows.saturating_sub(1);
    let mut body = Vec::with_capacity(body_rows);

    body.push(centered(TITLE, cols));
    if density != Density::Bare {
        body.push(String::new());
        body.push(rule("Runtime", cols));
        body.extend(
            runtime_lines(data, density)
                .into_iter()
                .map(|line| truncate(&line, cols)),
        );
    }
    body.push(String::new());
    body.push(rule(&format!("Sessions ({})", data.sessions.len()), cols));

    if data.sessions.is_empty() {
        body.push(truncate("No active Claude sessions.", cols));
        body.push(truncate(
            &format!(
                "Sessions modified in the last {} min will appear here.",
                data.active_minutes
            ),
            cols,
        ));
    } else {
        for session in data.sessions {
            if body.len() + density.lines_per_session() > body_rows {
                break;
            }
            body.push(session_header(session, cols));
            if density != Density::Bare {
                body.push(truncate(&session_detail(session), cols));
            }
        }
    }
    body.truncate(body_rows);

    let hint = match data.status_note {
        Some(note) => format!("{KEY_HINT} | {note}"),
        None => KEY_HINT.to_string(),
    };
    Frame {
        body,
        footer: truncate(&hint, cols).dark_grey().to_string(),
    }
}

fn runtime_lines(data: &RenderData<'_>, density: Density) -> Vec<String> {
    let alerts = if data.alerts_enabled {
        let at: Vec<String> = data.thresholds.iter().map(|t| format!("{t}%")).collect();
        format!(
            "on at {} ({} session(s) alerted)",
            at.join(", "),
            data.alerted_sessions
        )
    } else {
        "off".to_string()
    };

    let mut lines = vec![
        field("Now", &now_local()),
        field("Uptime", &human_duration(data.running_for)),
        field("Alerts", &alerts),
    ];
    if density == Density::Roomy {
        lines.push(field(
            "Polling",
            &format!(
                "every {}s, sessions active within {} min",
                data.poll_interval_secs, data.active_minutes
            ),
        ));
    }
    lines
}

/// Name, gauge and percentage on one line. Clipping happens on the plain
/// parts before color is applied.
fn session_header(session: &SessionSummary, cols: usize) -> String {
    let color = level_color(session.level());
    let gauge = gauge_width(cols);
    let name_width = cols.saturating_sub(gauge + 10).clamp(8, 32);
    let name = format!(
        "{:<name_width$}",
        truncate(&session.project_name, name_width)
    );
    let pct = format!("{:>3}%", session.percentage).with(color).bold();
    if cols < 40 {
        return format!("{name} {pct}");
    }
    let bar = progress_bar(session.percentage, gauge).with(color);
    format!("{name} [{bar}] {pct}")
}

fn session_detail(session: &SessionSummary) -> String {
    format!(
        "  {} | used {} | free {} | updated {}",
        session.level().label(),
        format_tokens(session.used_tokens),
        format_tokens(session.free_tokens),
        session.last_updated
    )
}

fn field(label: &str, value: &str) -> String {
    format!("{label:<8}: {value}")
}

fn gauge_width(cols: usize) -> usize {
    match cols {
        100.. => 40,
        72..=99 => 24,
        48..=71 => 14,
        _ => 8,
    }
}

fn level_color(level: UsageLevel) -> Color {
    match level {
        UsageLevel::Good => Color::Green,
        UsageLevel::Warning => Color::Yellow,
        UsageLevel::Danger => Color::DarkYellow,
        UsageLevel::Critical => Color::Red,
    }
}

fn rule(title: &str, cols: usize) -> String {
    let label = format!(" {title} ");
    let label_len = label.chars().count();
    if label_len >= cols {
        return truncate(title, cols);
    }
    let left = (cols - label_len) / 2;
    let right = cols - label_len - left;
    format!("{}{label}{}", "-".repeat(left), "-".repeat(right))
}

fn centered(text: &str, cols: usize) -> String {
    let text = truncate(text, cols);
    let pad = cols.saturating_sub(text.chars().count()) / 2;
    format!("{:pad$}{text}", "")
}
