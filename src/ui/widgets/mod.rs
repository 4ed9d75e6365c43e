// src/ui/widgets/mod.rs

pub mod disclaimer_popup; // Legal disclaimer shown on startup.
pub mod footer; // Key hints and last action feedback.
pub mod input; // Target entry box.
pub mod jobs_view; // Job list and stage results of the selected job.
pub mod log_view; // Tail of the log file.
pub mod summary; // Queue occupancy and finding counts.
