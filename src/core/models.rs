// src/core/models.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use strum::{Display, EnumString};

/// Identifier of a target as assigned by the caller.
pub type TargetId = i64;

// --- Targets ---

/// Scan status of a target as seen by the persistence layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TargetStatus {
    Idle,
    Queued,
    Running,
    Completed,
    Error,
    Stopped,
}

impl TargetStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error | Self::Stopped)
    }
}

/// A scan subject: a domain name or IPv4 address, already normalized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Target {
    pub id: TargetId,
    pub address: String,
    pub status: TargetStatus,
    pub last_scan: Option<DateTime<Utc>>,
}

impl Target {
    pub fn new(id: TargetId, address: impl Into<String>) -> Self {
        Self {
            id,
            address: address.into(),
            status: TargetStatus::Idle,
            last_scan: None,
        }
    }
}

// --- Jobs ---

/// Lifecycle of a job inside the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Error,
    Stopped,
}

impl JobStatus {
    /// Queued and running jobs hold the target; terminal ones release it.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Queued | Self::Running)
    }
}

impl From<JobStatus> for TargetStatus {
    fn from(status: JobStatus) -> Self {
        match status {
            JobStatus::Queued => TargetStatus::Queued,
            JobStatus::Running => TargetStatus::Running,
            JobStatus::Completed => TargetStatus::Completed,
            JobStatus::Error => TargetStatus::Error,
            JobStatus::Stopped => TargetStatus::Stopped,
        }
    }
}

/// Phase of the per-target pipeline state machine.
///
/// `Enumerating` covers both the enumeration and the optional
/// intelligence-lookup stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PipelineState {
    Pending,
    Enumerating,
    Probing,
    Scanning,
    Completed,
    Stopped,
    Error,
}

impl PipelineState {
    /// Job status corresponding to this phase.
    pub fn job_status(self) -> JobStatus {
        match self {
            Self::Pending => JobStatus::Queued,
            Self::Enumerating | Self::Probing | Self::Scanning => JobStatus::Running,
            Self::Completed => JobStatus::Completed,
            Self::Stopped => JobStatus::Stopped,
            Self::Error => JobStatus::Error,
        }
    }
}

/// Point-in-time view of a job, safe to hand to callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub target_id: TargetId,
    pub scan_id: String,
    pub address: String,
    pub status: JobStatus,
    pub phase: PipelineState,
    pub stop_requested: bool,
    pub progress: Vec<String>,
    pub error: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Scheduler-wide observability snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStatus {
    pub active_scans: usize,
    pub queued_scans: usize,
    pub max_concurrent: usize,
    pub scan_threads: usize,
    pub queue_processor_running: bool,
    pub active_scan_ids: Vec<String>,
    pub scan_jobs_count: usize,
    pub jobs: Vec<JobSnapshot>,
}

/// Outcome of a submit request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[strum(serialize_all = "snake_case")]
pub enum SubmitOutcome {
    /// A slot was free and the pipeline was launched.
    Started,
    /// The job waits in the backlog.
    Queued,
    /// The target already has a queued or running job; nothing changed.
    AlreadyActive,
}

// --- Stage results ---

/// The four pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Stage {
    Enumerate,
    Lookup,
    Probe,
    Scan,
}

impl Stage {
    /// Name of the external tool behind the stage.
    pub fn tool_name(self) -> &'static str {
        match self {
            Self::Enumerate => "subfinder",
            Self::Lookup => "chaos",
            Self::Probe => "httpx",
            Self::Scan => "nuclei",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum StageStatus {
    Success,
    Error,
    Skipped,
}

/// Severity as reported by the vulnerability scanner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
    #[default]
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FindingInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub severity: Severity,
}

/// One line of the scanner's JSON Lines output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    #[serde(rename = "template-id")]
    pub template_id: String,
    #[serde(default)]
    pub info: FindingInfo,
    #[serde(rename = "matched-at", default)]
    pub matched_at: Option<String>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    /// Remaining fields are kept verbatim for reporting.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Finding {
    pub fn severity(&self) -> Severity {
        self.info.severity
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanPerformance {
    pub execution_secs: f64,
    pub hosts_per_second: f64,
    pub hosts_scanned: usize,
    pub results_found: usize,
}

/// Stage-specific payload of a successful stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StagePayload {
    Subdomains {
        subdomains: Vec<String>,
        handoff_file: Option<PathBuf>,
    },
    LiveHosts {
        live_hosts: Vec<String>,
        handoff_file: Option<PathBuf>,
    },
    Findings {
        findings: Vec<Finding>,
        profile: String,
        performance: ScanPerformance,
    },
}

/// Immutable record of one stage execution for one target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    pub target_id: TargetId,
    pub stage: Stage,
    pub status: StageStatus,
    pub payload: Option<StagePayload>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl StageResult {
    pub fn success(target_id: TargetId, stage: Stage, payload: StagePayload, started_at: DateTime<Utc>) -> Self {
        Self {
            target_id,
            stage,
            status: StageStatus::Success,
            payload: Some(payload),
            error: None,
            started_at,
            completed_at: Utc::now(),
        }
    }

    pub fn failure(target_id: TargetId, stage: Stage, error: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            target_id,
            stage,
            status: StageStatus::Error,
            payload: None,
            error: Some(error.into()),
            started_at,
            completed_at: Utc::now(),
        }
    }
}
