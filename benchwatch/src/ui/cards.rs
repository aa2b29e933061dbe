//! Per-source "latest value" cards.

use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
};

use crate::aggregator::RollingAggregator;
use crate::metric::Metric;
use crate::sources::SourceConfig;
use crate::ui::util::truncate_middle;

/// Text shown on a card for the newest sample of a source.
pub fn card_value(agg: &RollingAggregator, source_id: &str, metric: Metric) -> String {
    match agg.latest(source_id).and_then(|s| metric.value(s)) {
        Some(v) => format!("{} {}", metric.format_value(v), metric.unit()),
        None => "--".into(),
    }
}

pub fn draw_cards(
    f: &mut ratatui::Frame<'_>,
    area: Rect,
    sources: &[SourceConfig],
    agg: &RollingAggregator,
    metric: Metric,
) {
    if sources.is_empty() {
        f.render_widget(
            Paragraph::new("no sources configured")
                .block(Block::default().borders(Borders::ALL).title(metric.title())),
            area,
        );
        return;
    }
    let constraints: Vec<Constraint> = sources
        .iter()
        .map(|_| Constraint::Ratio(1, sources.len() as u32))
        .collect();
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints(constraints)
        .split(area);

    for (i, (src, rect)) in sources.iter().zip(cols.iter()).enumerate() {
        let name = truncate_middle(&src.display_name, rect.width.saturating_sub(8) as usize);
        let (title_style, body) = if src.enabled {
            (
                Style::default().fg(src.color()).add_modifier(Modifier::BOLD),
                card_value(agg, &src.id, metric),
            )
        } else {
            (Style::default().fg(Color::DarkGray), "off".into())
        };
        let block = Block::default()
            .borders(Borders::ALL)
            .title(Span::styled(format!("{} {name}", i + 1), title_style));
        let line = Line::from(Span::styled(
            body,
            Style::default().add_modifier(Modifier::BOLD),
        ));
        f.render_widget(Paragraph::new(line).centered().block(block), *rect);
    }
}
