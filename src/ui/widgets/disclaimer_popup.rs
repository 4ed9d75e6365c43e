// src/ui/widgets/disclaimer_popup.rs

use ratatui::{
    prelude::*,
    text::Line,
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
};

/// Renders the startup disclaimer as a modal over the dashboard.
///
/// The scans launched from here send real traffic: subfinder and chaos only
/// query passive sources, but httpx and nuclei connect to every discovered
/// host. `Clear` wipes the popup area first so the dashboard does not bleed
/// through.
pub fn render_disclaimer_popup(frame: &mut Frame, area: Rect) {
    let disclaimer_text = Text::from(vec![
        Line::from("AUTHORIZED TESTING ONLY".bold().yellow()),
        Line::from(""),
        Line::from("hawks-rs chains subdomain enumeration, live host probing and template-based vulnerability scanning against every target you submit."),
        Line::from(""),
        Line::from("Probing and scanning hosts you do not own or have written permission to test may be illegal in your jurisdiction."),
        Line::from(""),
        Line::from("Before continuing, make sure that:"),
        Line::from("1. Every target and each of its subdomains is in scope for your engagement."),
        Line::from("2. The templates directory only contains templates you have reviewed."),
        Line::from("3. You accept sole responsibility for the scans you launch."),
        Line::from(""),
        Line::from("Press ".bold() + "Enter".bold().yellow() + " to continue or ".bold() + "Q".bold().yellow() + " to quit".bold()),
    ]);

    let block = Block::default()
        .title("Disclaimer")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Red));

    let popup_area = centered_rect(70, 60, area);
    let popup = Paragraph::new(disclaimer_text)
        .block(block)
        .wrap(Wrap { trim: true })
        .alignment(Alignment::Center);

    frame.render_widget(Clear, popup_area);
    frame.render_widget(popup, popup_area);
}

/// A `Rect` of the given size (in percent of `r`) centered inside `r`.
fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let [_, middle, _] = Layout::vertical([
        Constraint::Percentage((100 - percent_y) / 2),
        Constraint::Percentage(percent_y),
        Constraint::Percentage((100 - percent_y) / 2),
    ])
    .areas(r);

    let [_, center, _] = Layout::horizontal([
        Constraint::Percentage((100 - percent_x) / 2),
        Constraint::Percentage(percent_x),
        Constraint::Percentage((100 - percent_x) / 2),
    ])
    .areas(middle);
    center
}
