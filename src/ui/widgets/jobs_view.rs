// src/ui/widgets/jobs_view.rs

use crate::app::{App, SPINNER_CHARS};
use crate::core::models::{JobStatus, Severity, StagePayload, StageResult, StageStatus};
use ratatui::{
    prelude::*,
    text::Line,
    widgets::{Block, Borders, List, ListItem, Paragraph, Wrap},
};

fn status_style(status: JobStatus) -> Style {
    match status {
        JobStatus::Queued => Style::default().fg(Color::DarkGray),
        JobStatus::Running => Style::default().fg(Color::Cyan),
        JobStatus::Completed => Style::default().fg(Color::Green),
        JobStatus::Error => Style::default().fg(Color::Red),
        JobStatus::Stopped => Style::default().fg(Color::Yellow),
    }
}

pub fn severity_style(severity: Severity) -> Style {
    match severity {
        Severity::Critical => Style::default().fg(Color::Magenta).bold(),
        Severity::High => Style::default().fg(Color::Red),
        Severity::Medium => Style::default().fg(Color::Yellow),
        Severity::Low => Style::default().fg(Color::Cyan),
        Severity::Info | Severity::Unknown => Style::default().fg(Color::DarkGray),
    }
}

/// Renders the job list on top and the selected job's stage results below.
pub fn render_jobs_view(frame: &mut Frame, app: &mut App, area: Rect) {
    let main_block = Block::default().borders(Borders::ALL).title("Scans (navigate with ↑ ↓)");

    let jobs = app.queue.as_ref().map(|q| q.jobs.as_slice()).unwrap_or_default();
    if jobs.is_empty() {
        let hint = Paragraph::new("No scans yet. Press Tab, type targets and press Enter.")
            .alignment(Alignment::Center)
            .block(main_block);
        frame.render_widget(hint, area);
        return;
    }

    let inner_area = main_block.inner(area);
    frame.render_widget(main_block, area);
    let [list_area, detail_area] =
        Layout::vertical([Constraint::Percentage(40), Constraint::Min(0)]).areas(inner_area);

    let spinner = SPINNER_CHARS[app.spinner_frame];
    let items: Vec<ListItem> = jobs
        .iter()
        .map(|job| {
            let marker = if job.status == JobStatus::Running { spinner } else { " " };
            let mut spans = vec![
                Span::styled(format!("{marker} "), Style::default().fg(Color::Cyan)),
                Span::styled(format!("{:<10}", job.status.to_string()), status_style(job.status)),
                Span::raw(job.address.clone()),
            ];
            if job.status == JobStatus::Running {
                spans.push(Span::styled(format!("  [{}]", job.phase), Style::default().fg(Color::DarkGray)));
            }
            if job.stop_requested && job.status.is_active() {
                spans.push(Span::styled("  stopping…", Style::default().fg(Color::Yellow)));
            }
            ListItem::new(Line::from(spans))
        })
        .collect();

    let list = List::new(items).highlight_style(Style::new().bg(Color::DarkGray).add_modifier(Modifier::BOLD));
    frame.render_stateful_widget(list, list_area, &mut app.jobs_list_state);

    let detail_block = Block::default().borders(Borders::TOP).title("Stages");
    let selected = app.jobs_list_state.selected().and_then(|i| jobs.get(i));
    let Some(job) = selected else {
        frame.render_widget(Paragraph::new("Select a scan above.").block(detail_block), detail_area);
        return;
    };

    let mut lines: Vec<Line> = app.selected_results.iter().flat_map(stage_lines).collect();
    if lines.is_empty() {
        lines.push(Line::from("No stage has finished yet."));
    }
    if let Some(error) = &job.error {
        lines.push(Line::from(""));
        lines.push(Line::from(vec![
            Span::styled("Error: ", Style::default().fg(Color::Red).bold()),
            Span::raw(error.clone()),
        ]));
    }
    if let Some(note) = job.progress.last() {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(format!("Last step: {note}"), Style::default().fg(Color::DarkGray))));
    }

    let paragraph = Paragraph::new(lines).wrap(Wrap { trim: true }).block(detail_block);
    frame.render_widget(paragraph, detail_area);
}

fn stage_lines(result: &StageResult) -> Vec<Line<'static>> {
    let (icon, style) = match result.status {
        StageStatus::Success => ("✓", Style::default().fg(Color::Green)),
        StageStatus::Error => ("✗", Style::default().fg(Color::Red)),
        StageStatus::Skipped => ("-", Style::default().fg(Color::DarkGray)),
    };
    let summary = match (&result.payload, &result.error) {
        (Some(StagePayload::Subdomains { subdomains, .. }), _) => format!("{} subdomains", subdomains.len()),
        (Some(StagePayload::LiveHosts { live_hosts, .. }), _) => format!("{} live hosts", live_hosts.len()),
        (Some(StagePayload::Findings { findings, profile, .. }), _) => {
            format!("{} findings (profile {profile})", findings.len())
        }
        (None, Some(error)) => error.clone(),
        (None, None) => String::new(),
    };

    let mut lines = vec![Line::from(vec![
        Span::styled(format!("{icon} "), style),
        Span::styled(format!("{:<10}", result.stage.to_string()), style),
        Span::raw(summary),
    ])];

    if let Some(StagePayload::Findings { findings, .. }) = &result.payload {
        for finding in findings {
            let location = finding.matched_at.clone().or_else(|| finding.host.clone()).unwrap_or_default();
            lines.push(Line::from(vec![
                Span::raw("    "),
                Span::styled(format!("[{}] ", finding.severity()), severity_style(finding.severity())),
                Span::raw(format!("{} {location}", finding.template_id)),
            ]));
        }
    }
    lines
}
