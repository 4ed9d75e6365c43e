// src/core/job.rs

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::core::models::{JobSnapshot, JobStatus, PipelineState, TargetId};

/// Mutable part of a job, behind the job's own lock.
#[derive(Debug)]
struct JobRecord {
    status: JobStatus,
    phase: PipelineState,
    progress: Vec<String>,
    error: Option<String>,
    submitted_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

/// One admitted unit of work for a target.
///
/// The stop flag is a lone atomic so callers can cancel without touching
/// the scheduler lock.
#[derive(Debug)]
pub struct ScanJob {
    pub target_id: TargetId,
    pub address: String,
    pub scan_id: String,
    stop: AtomicBool,
    record: Mutex<JobRecord>,
}

impl ScanJob {
    pub fn new(target_id: TargetId, address: impl Into<String>) -> Self {
        Self {
            target_id,
            address: address.into(),
            scan_id: scan_id_for(target_id),
            stop: AtomicBool::new(false),
            record: Mutex::new(JobRecord {
                status: JobStatus::Queued,
                phase: PipelineState::Pending,
                progress: Vec::new(),
                error: None,
                submitted_at: Utc::now(),
                started_at: None,
                finished_at: None,
            }),
        }
    }

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn should_stop(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    fn with_record<R>(&self, f: impl FnOnce(&mut JobRecord) -> R) -> R {
        // A poisoned record is still the best data we have.
        let mut guard = match self.record.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    pub fn mark_running(&self) {
        self.with_record(|r| {
            r.status = JobStatus::Running;
            r.started_at = Some(Utc::now());
        });
    }

    pub fn set_phase(&self, phase: PipelineState) {
        self.with_record(|r| r.phase = phase);
    }

    pub fn note(&self, message: impl Into<String>) {
        let message = message.into();
        self.with_record(|r| r.progress.push(message));
    }

    /// Moves the job to its terminal state. Later calls are ignored.
    pub fn finish(&self, phase: PipelineState, error: Option<String>) {
        self.with_record(|r| {
            if !r.status.is_active() {
                return;
            }
            r.phase = phase;
            r.status = phase.job_status();
            r.error = error;
            r.finished_at = Some(Utc::now());
        });
    }

    pub fn status(&self) -> JobStatus {
        self.with_record(|r| r.status)
    }

    pub fn snapshot(&self) -> JobSnapshot {
        let stop_requested = self.should_stop();
        self.with_record(|r| JobSnapshot {
            target_id: self.target_id,
            scan_id: self.scan_id.clone(),
            address: self.address.clone(),
            status: r.status,
            phase: r.phase,
            stop_requested,
            progress: r.progress.clone(),
            error: r.error.clone(),
            submitted_at: r.submitted_at,
            started_at: r.started_at,
            finished_at: r.finished_at,
        })
    }
}

/// Scan ids derive from the target id, so one target maps to one tracked job.
pub fn scan_id_for(target_id: TargetId) -> String {
    format!("scan_{target_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_is_recorded() {
        let job = ScanJob::new(12, "example.com");
        assert_eq!(job.scan_id, "scan_12");
        assert_eq!(job.status(), JobStatus::Queued);

        job.mark_running();
        job.set_phase(PipelineState::Probing);
        job.note("probe started");
        job.finish(PipelineState::Error, Some("httpx produced no usable output".into()));

        let snap = job.snapshot();
        assert_eq!(snap.status, JobStatus::Error);
        assert_eq!(snap.phase, PipelineState::Error);
        assert_eq!(snap.progress, vec!["probe started"]);
        assert!(snap.started_at.is_some() && snap.finished_at.is_some());
    }

    #[test]
    fn finish_is_final() {
        let job = ScanJob::new(1, "example.com");
        job.finish(PipelineState::Stopped, None);
        job.finish(PipelineState::Error, Some("late".into()));
        assert_eq!(job.status(), JobStatus::Stopped);
        assert!(job.snapshot().error.is_none());
    }

    #[test]
    fn stop_flag_is_visible_in_snapshot() {
        let job = ScanJob::new(1, "example.com");
        assert!(!job.should_stop());
        job.request_stop();
        assert!(job.should_stop());
        assert!(job.snapshot().stop_requested);
    }
}
