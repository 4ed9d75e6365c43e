// src/ui/widgets/summary.rs

use crate::app::App;
use crate::core::models::{JobStatus, Severity, StagePayload};
use crate::ui::widgets::jobs_view::severity_style;
use ratatui::{
    prelude::*,
    text::Line,
    widgets::{Block, Borders, Gauge, Paragraph},
};

/// Renders the queue overview: slot usage gauge, job counts, and the
/// finding breakdown of the selected scan.
pub fn render_summary(frame: &mut Frame, app: &App, area: Rect) {
    let summary_container = Block::default().borders(Borders::ALL).title("Queue");
    frame.render_widget(summary_container, area);

    let summary_chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(2), // Slots label
            Constraint::Length(1), // Gauge
            Constraint::Length(1), // Spacer
            Constraint::Length(6), // Counters
            Constraint::Length(1), // Spacer
            Constraint::Min(0),    // Findings
        ])
        .split(area);

    let Some(queue) = &app.queue else {
        return;
    };

    // --- Slots ---
    let slots = Text::from(vec![
        Line::from("Scan slots".bold()),
        Line::from(format!("{}/{} in use", queue.active_scans, queue.max_concurrent)),
    ]);
    frame.render_widget(Paragraph::new(slots).alignment(Alignment::Center), summary_chunks[0]);

    let percent = (queue.active_scans * 100 / queue.max_concurrent.max(1)).min(100) as u16;
    let gauge = Gauge::default().percent(percent).label("").style(Style::default().fg(
        if percent >= 100 {
            Color::Yellow
        } else {
            Color::Green
        },
    ));
    frame.render_widget(gauge, summary_chunks[1]);

    // --- Counters ---
    let count = |status: JobStatus| queue.jobs.iter().filter(|job| job.status == status).count();
    let (loop_label, loop_style) = if queue.queue_processor_running {
        ("running", Style::default().fg(Color::Green))
    } else {
        ("stopped", Style::default().fg(Color::Red))
    };
    let counters = vec![
        Line::from(vec![Span::raw("Queued:    "), Span::raw(queue.queued_scans.to_string())]),
        Line::from(vec![
            Span::raw("Completed: "),
            Span::styled(count(JobStatus::Completed).to_string(), Style::default().fg(Color::Green)),
        ]),
        Line::from(vec![
            Span::raw("Failed:    "),
            Span::styled(count(JobStatus::Error).to_string(), Style::default().fg(Color::Red)),
        ]),
        Line::from(vec![Span::raw("Stopped:   "), Span::raw(count(JobStatus::Stopped).to_string())]),
        Line::from(vec![Span::raw("Threads:   "), Span::raw(queue.scan_threads.to_string())]),
        Line::from(vec![Span::raw("Admission: "), Span::styled(loop_label, loop_style)]),
    ];
    frame.render_widget(Paragraph::new(counters), summary_chunks[3]);

    // --- Findings of the selected scan ---
    let findings_block = Block::default().title("FINDINGS".bold());
    let findings = app.selected_results.iter().find_map(|result| match &result.payload {
        Some(StagePayload::Findings { findings, .. }) => Some(findings),
        _ => None,
    });
    let lines: Vec<Line> = match findings {
        None => vec![Line::from("No scan results yet.")],
        Some(findings) => [Severity::Critical, Severity::High, Severity::Medium, Severity::Low, Severity::Info]
            .into_iter()
            .map(|severity| {
                let n = findings.iter().filter(|f| f.severity() == severity).count();
                Line::from(vec![
                    Span::styled(format!("{:<10}", severity.to_string()), severity_style(severity)),
                    Span::raw(n.to_string()),
                ])
            })
            .collect(),
    };
    frame.render_widget(Paragraph::new(lines).block(findings_block), summary_chunks[5]);
}
