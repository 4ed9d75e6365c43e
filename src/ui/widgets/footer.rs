// src/ui/widgets/footer.rs

use crate::app::{App, AppState};
use ratatui::{
    prelude::*,
    style::{Color, Style, Stylize},
    text::{Line, Span},
    widgets::Paragraph,
};

fn key(label: &str) -> Span<'_> {
    Span::styled(label, Style::new().bold().fg(Color::Yellow))
}

/// Renders the key hints, or the feedback of the last action when there is one.
pub fn render_footer(frame: &mut Frame, app: &App, area: Rect) {
    let line = match (&app.message, app.state) {
        (_, AppState::Disclaimer) => Line::from(""),
        (Some(message), _) => Line::from(Span::styled(message.as_str(), Style::new().fg(Color::Cyan))),
        (None, AppState::Editing) => Line::from(vec![
            key("Enter"),
            Span::raw(" submit, "),
            key("Tab/Esc"),
            Span::raw(" browse jobs"),
        ]),
        (None, AppState::Browsing) => Line::from(vec![
            key("↑↓"),
            Span::raw(" select, "),
            key("C"),
            Span::raw("ancel, "),
            key("L"),
            Span::raw("ogs, "),
            key("Tab"),
            Span::raw(" add targets, "),
            key("Q"),
            Span::raw("uit"),
        ]),
    };

    frame.render_widget(Paragraph::new(line).alignment(Alignment::Center), area);
}
