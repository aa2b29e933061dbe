//! Combined comparison chart of every enabled source for one metric.

use std::collections::BTreeMap;

use ratatui::{
    layout::Rect,
    style::{Color, Style},
    symbols,
    text::Span,
    widgets::{Axis, Block, Borders, Chart, Dataset, GraphType},
};

use crate::history::MAX_POINTS;
use crate::metric::Metric;
use crate::sources::SourceConfig;
use crate::types::Point;
use crate::ui::util::{relative_points, y_bounds};

pub fn draw_chart(
    f: &mut ratatui::Frame<'_>,
    area: Rect,
    sources: &[SourceConfig],
    series: &BTreeMap<String, Vec<Point>>,
    metric: Metric,
) {
    let enabled: Vec<&SourceConfig> = sources.iter().filter(|s| s.enabled).collect();
    let newest = enabled
        .iter()
        .filter_map(|s| series.get(&s.id).and_then(|p| p.last()))
        .map(|p| p.timestamp)
        .max()
        .unwrap_or(0);

    // owned point buffers must outlive the datasets borrowing them
    let data: Vec<(&SourceConfig, Vec<(f64, f64)>)> = enabled
        .iter()
        .map(|s| {
            let pts = series.get(&s.id).map(Vec::as_slice).unwrap_or(&[]);
            (*s, relative_points(pts, newest))
        })
        .collect();

    let datasets: Vec<Dataset> = data
        .iter()
        .map(|(src, pts)| {
            Dataset::default()
                .name(src.display_name.clone())
                .marker(symbols::Marker::Braille)
                .graph_type(GraphType::Line)
                .style(Style::default().fg(src.color()))
                .data(pts)
        })
        .collect();

    let [lo, hi] = y_bounds(data.iter().flat_map(|(_, p)| p.iter().map(|(_, y)| y)));
    let window = MAX_POINTS as f64;
    let axis_style = Style::default().fg(Color::Gray);

    let chart = Chart::new(datasets)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!("{} ({})", metric.title(), metric.unit())),
        )
        .x_axis(
            Axis::default()
                .title("seconds")
                .style(axis_style)
                .bounds([-window, 0.0])
                .labels(vec![
                    Span::raw(format!("-{window:.0}")),
                    Span::raw(format!("-{:.0}", window / 2.0)),
                    Span::raw("0"),
                ]),
        )
        .y_axis(
            Axis::default()
                .style(axis_style)
                .bounds([lo, hi])
                .labels(vec![
                    Span::raw(metric.format_value(lo)),
                    Span::raw(metric.format_value((lo + hi) / 2.0)),
                    Span::raw(metric.format_value(hi)),
                ]),
        );
    f.render_widget(chart, area);
}
