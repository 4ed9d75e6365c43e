// src/app.rs

use crate::core::models::{QueueStatus, StageResult, TargetId};
use ratatui::widgets::{ListState, ScrollbarState};

pub const SPINNER_CHARS: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

/// Lines of the log file kept in the log panel.
pub const LOG_TAIL_LINES: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    /// Startup disclaimer, dismissed with Enter.
    Disclaimer,
    /// Typing targets into the input box.
    Editing,
    /// Moving through the job list.
    Browsing,
}

pub struct App {
    pub should_quit: bool,
    pub state: AppState,
    pub input: String,
    next_target_id: TargetId,
    pub queue: Option<QueueStatus>,
    pub jobs_list_state: ListState,
    /// Stage results of the selected job, oldest first.
    pub selected_results: Vec<StageResult>,
    /// Feedback for the last action, shown in the footer.
    pub message: Option<String>,
    pub show_logs: bool,
    pub log_content: Vec<String>,
    pub log_horizontal_scroll: usize,
    pub log_horizontal_scroll_state: ScrollbarState,
    pub spinner_frame: usize,
}

impl App {
    pub fn new() -> Self {
        Self {
            should_quit: false,
            state: AppState::Disclaimer,
            input: String::new(),
            next_target_id: 1,
            queue: None,
            jobs_list_state: ListState::default(),
            selected_results: Vec::new(),
            message: None,
            show_logs: false,
            log_content: Vec::new(),
            log_horizontal_scroll: 0,
            log_horizontal_scroll_state: ScrollbarState::default(),
            spinner_frame: 0,
        }
    }

    pub fn on_tick(&mut self) {
        self.spinner_frame = (self.spinner_frame + 1) % SPINNER_CHARS.len();
        if self.show_logs {
            self.log_content = crate::logging::tail_log(LOG_TAIL_LINES);
        }
    }

    /// Hands out the next target id. Ids are never reused within a session.
    pub fn allocate_target_id(&mut self) -> TargetId {
        let id = self.next_target_id;
        self.next_target_id += 1;
        id
    }

    /// Splits the input box into targets and clears it.
    pub fn take_targets(&mut self) -> Vec<String> {
        let targets = parse_target_list(&self.input);
        self.input.clear();
        targets
    }

    /// Replaces the queue snapshot, keeping the selection in range.
    pub fn refresh(&mut self, queue: QueueStatus) {
        let len = queue.jobs.len();
        self.queue = Some(queue);
        match self.jobs_list_state.selected() {
            _ if len == 0 => self.jobs_list_state.select(None),
            None => self.jobs_list_state.select(Some(0)),
            Some(i) if i >= len => self.jobs_list_state.select(Some(len - 1)),
            Some(_) => {}
        }
    }

    pub fn selected_target(&self) -> Option<TargetId> {
        let index = self.jobs_list_state.selected()?;
        self.queue.as_ref()?.jobs.get(index).map(|job| job.target_id)
    }

    pub fn select_next(&mut self) {
        let len = self.queue.as_ref().map_or(0, |q| q.jobs.len());
        if len == 0 {
            return;
        }
        let next = self.jobs_list_state.selected().map_or(0, |i| (i + 1).min(len - 1));
        self.jobs_list_state.select(Some(next));
    }

    pub fn select_previous(&mut self) {
        let previous = self.jobs_list_state.selected().map_or(0, |i| i.saturating_sub(1));
        self.jobs_list_state.select(Some(previous));
    }

    pub fn toggle_logs(&mut self) {
        self.show_logs = !self.show_logs;
        if self.show_logs {
            self.log_content = crate::logging::tail_log(LOG_TAIL_LINES);
        }
    }

    pub fn scroll_logs_left(&mut self) {
        self.log_horizontal_scroll = self.log_horizontal_scroll.saturating_sub(4);
        self.log_horizontal_scroll_state = self.log_horizontal_scroll_state.position(self.log_horizontal_scroll);
    }

    pub fn scroll_logs_right(&mut self) {
        self.log_horizontal_scroll = self.log_horizontal_scroll.saturating_add(4);
        self.log_horizontal_scroll_state = self.log_horizontal_scroll_state.position(self.log_horizontal_scroll);
    }

    pub fn quit(&mut self) {
        self.should_quit = true;
    }
}

/// Targets separated by whitespace or commas.
pub fn parse_target_list(raw: &str) -> Vec<String> {
    raw.split(|c: char| c.is_whitespace() || c == ',')
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::{JobSnapshot, JobStatus, PipelineState};
    use chrono::Utc;

    fn queue_with(ids: &[TargetId]) -> QueueStatus {
        QueueStatus {
            active_scans: 0,
            queued_scans: 0,
            max_concurrent: 1,
            scan_threads: 1,
            queue_processor_running: true,
            active_scan_ids: Vec::new(),
            scan_jobs_count: ids.len(),
            jobs: ids
                .iter()
                .map(|&target_id| JobSnapshot {
                    target_id,
                    scan_id: format!("scan_{target_id}"),
                    address: "example.com".into(),
                    status: JobStatus::Queued,
                    phase: PipelineState::Pending,
                    stop_requested: false,
                    progress: Vec::new(),
                    error: None,
                    submitted_at: Utc::now(),
                    started_at: None,
                    finished_at: None,
                })
                .collect(),
        }
    }

    #[test]
    fn input_splits_on_spaces_and_commas() {
        let mut app = App::new();
        app.input = "example.com, a.example.org  10.0.0.1,".into();
        assert_eq!(app.take_targets(), vec!["example.com", "a.example.org", "10.0.0.1"]);
        assert!(app.input.is_empty());
    }

    #[test]
    fn selection_follows_the_job_list() {
        let mut app = App::new();
        app.refresh(queue_with(&[4, 9, 11]));
        assert_eq!(app.selected_target(), Some(4));

        app.select_next();
        app.select_next();
        app.select_next();
        assert_eq!(app.selected_target(), Some(11));

        app.refresh(queue_with(&[4]));
        assert_eq!(app.selected_target(), Some(4));

        app.refresh(queue_with(&[]));
        assert_eq!(app.selected_target(), None);
    }

    #[test]
    fn target_ids_are_sequential() {
        let mut app = App::new();
        assert_eq!(app.allocate_target_id(), 1);
        assert_eq!(app.allocate_target_id(), 2);
    }
}
