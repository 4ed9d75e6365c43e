// src/ui/widgets/log_view.rs

use crate::app::App;
use ratatui::{
    prelude::*,
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Scrollbar, ScrollbarOrientation},
};

/// Renders the tail of the log file.
///
/// Lines are `DATE TIME LEVEL MESSAGE`; the timestamp is dimmed and the level
/// is colored. Long lines scroll horizontally with the arrow keys.
pub fn render_log_view(frame: &mut Frame, app: &mut App, area: Rect) {
    let block = Block::default().title("Logs (scroll with ← →)").borders(Borders::ALL);
    let inner_area = block.inner(area);
    frame.render_widget(block, area);

    let max_width = app.log_content.iter().map(|line| line.chars().count()).max().unwrap_or(0);
    app.log_horizontal_scroll_state = app.log_horizontal_scroll_state.content_length(max_width);

    // Only the newest lines that fit are shown.
    let visible = inner_area.height.saturating_sub(1) as usize;
    let skip = app.log_content.len().saturating_sub(visible);
    let log_lines: Vec<Line> = app.log_content.iter().skip(skip).map(|line| style_log_line(line)).collect();

    let log_paragraph = Paragraph::new(log_lines).scroll((0, app.log_horizontal_scroll as u16));
    frame.render_widget(log_paragraph, inner_area);

    let scrollbar = Scrollbar::new(ScrollbarOrientation::HorizontalBottom).thumb_symbol("■");
    let scrollbar_area = Rect {
        x: inner_area.x,
        y: inner_area.y + inner_area.height.saturating_sub(1),
        width: inner_area.width,
        height: 1,
    };
    frame.render_stateful_widget(scrollbar, scrollbar_area, &mut app.log_horizontal_scroll_state);
}

fn style_log_line(line: &str) -> Line<'_> {
    // Levels are right-aligned, so "INFO" and "WARN" carry a leading space.
    let parsed = line.split_once(' ').and_then(|(date, rest)| {
        let (time, rest) = rest.split_once(' ')?;
        let (level, message) = rest.trim_start().split_once(' ')?;
        Some((date, time, level, message))
    });
    let Some((date, time, level, message)) = parsed else {
        return Line::from(line);
    };
    let level_style = match level {
        "ERROR" => Style::default().fg(Color::Red),
        "WARN" => Style::default().fg(Color::Yellow),
        "INFO" => Style::default().fg(Color::Green),
        _ => Style::default().fg(Color::DarkGray),
    };
    Line::from(vec![
        Span::styled(format!("{date} {time} "), Style::default().fg(Color::DarkGray)),
        Span::styled(format!("{level:>5}"), level_style),
        Span::raw(format!(" {message}")),
    ])
}
