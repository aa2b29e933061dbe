//! Top header: streaming state, selected metric, key hints.

use chrono::{Local, TimeZone};
use ratatui::{
    layout::Rect,
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
};

use crate::metric::Metric;

pub fn draw_header(
    f: &mut ratatui::Frame<'_>,
    area: Rect,
    streaming: bool,
    metric: Metric,
    newest_ms: Option<i64>,
) {
    let (state, color) = if streaming {
        ("● streaming", Color::Green)
    } else {
        ("○ paused", Color::DarkGray)
    };
    let last = newest_ms
        .and_then(|ms| Local.timestamp_millis_opt(ms).single())
        .map(|t| format!("last sample {}", t.format("%H:%M:%S")))
        .unwrap_or_else(|| "no samples yet".into());
    let line = Line::from(vec![
        Span::raw("benchwatch | "),
        Span::styled(state, Style::default().fg(color)),
        Span::raw(format!(" | {} | {last}", metric.label())),
        Span::styled(
            "  (s stream, ←/→ metric, 1-9 source, r reset, q quit)",
            Style::default().fg(Color::DarkGray),
        ),
    ]);
    f.render_widget(
        Paragraph::new(line).block(Block::default().borders(Borders::BOTTOM)),
        area,
    );
}
