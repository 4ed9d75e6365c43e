// src/core/pipeline.rs

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::core::errors::EngineError;
use crate::core::job::ScanJob;
use crate::core::models::{PipelineState, Stage, StagePayload, StageResult, StageStatus, TargetStatus};
use crate::core::scanner::ReconTools;
use crate::core::store::ResultStore;

/// The four-stage run for one target: enumerate, optional lookup, probe, scan.
///
/// Stages run strictly in order. The stop flag is checked before each one,
/// every executed stage writes exactly one record, and the first failing
/// stage ends the run. Handoff files are owned by local values and are gone
/// once `run` returns, whatever the outcome.
pub struct Pipeline {
    job: Arc<ScanJob>,
    tools: Arc<dyn ReconTools>,
    store: Arc<dyn ResultStore>,
}

impl Pipeline {
    pub fn new(job: Arc<ScanJob>, tools: Arc<dyn ReconTools>, store: Arc<dyn ResultStore>) -> Self {
        Self { job, tools, store }
    }

    /// Runs to a terminal state and records it on the job and in the store.
    pub async fn run(&self) -> PipelineState {
        let target_id = self.job.target_id;
        info!(target_id, target = %self.job.address, scan_id = %self.job.scan_id, "Pipeline started.");
        self.write_status(TargetStatus::Running).await;

        let (state, failure) = match self.execute().await {
            Ok(state) => (state, None),
            Err(e) => (PipelineState::Error, Some(e.to_string())),
        };

        self.job.finish(state, failure.clone());
        self.write_status(state.job_status().into()).await;
        match failure {
            Some(reason) => warn!(target_id, %reason, "Pipeline failed."),
            None => info!(target_id, state = %state, "Pipeline finished."),
        }
        state
    }

    async fn execute(&self) -> Result<PipelineState, EngineError> {
        let target = self.job.address.as_str();

        // Stage 1
        if !self.begin(PipelineState::Enumerating, Stage::Enumerate) {
            return Ok(PipelineState::Stopped);
        }
        let started = Utc::now();
        let outcome = self.tools.enumerate(target).await;
        let mut working = self
            .record(Stage::Enumerate, started, outcome, |set| StagePayload::Subdomains {
                subdomains: set.hosts.clone(),
                handoff_file: set.file_path(),
            })
            .await?;

        // Stage 2, optional. No "started" note, a skip leaves only the skip note.
        if self.stop_requested(Stage::Lookup) {
            return Ok(PipelineState::Stopped);
        }
        let started = Utc::now();
        match self.tools.lookup(target).await {
            Err(e) if e.stage_status() == StageStatus::Skipped => {
                info!(target_id = self.job.target_id, reason = %e, "Intelligence lookup skipped.");
                self.job.note(format!("lookup skipped: {e}"));
            }
            outcome => {
                let extra = self
                    .record(Stage::Lookup, started, outcome, |subdomains| StagePayload::Subdomains {
                        subdomains: subdomains.clone(),
                        handoff_file: None,
                    })
                    .await?;
                let added = working.merge(&extra).await?;
                self.job.note(format!("lookup added {added} new subdomains"));
            }
        }

        // Stage 3
        if !self.begin(PipelineState::Probing, Stage::Probe) {
            return Ok(PipelineState::Stopped);
        }
        let started = Utc::now();
        let outcome = self.tools.probe(&working).await;
        let live = self
            .record(Stage::Probe, started, outcome, |set| StagePayload::LiveHosts {
                live_hosts: set.hosts.clone(),
                handoff_file: set.file_path(),
            })
            .await?;
        drop(working);

        // Stage 4
        if !self.begin(PipelineState::Scanning, Stage::Scan) {
            return Ok(PipelineState::Stopped);
        }
        let started = Utc::now();
        let outcome = self.tools.scan(&live).await;
        self.record(Stage::Scan, started, outcome, |out| StagePayload::Findings {
            findings: out.findings.clone(),
            profile: out.profile.clone(),
            performance: out.performance.clone(),
        })
        .await?;

        Ok(PipelineState::Completed)
    }

    fn stop_requested(&self, stage: Stage) -> bool {
        if !self.job.should_stop() {
            return false;
        }
        info!(target_id = self.job.target_id, %stage, "Stop requested, not starting stage.");
        self.job.note(format!("stopped before {stage}"));
        true
    }

    /// Enters the next stage unless a stop was requested.
    fn begin(&self, phase: PipelineState, stage: Stage) -> bool {
        if self.stop_requested(stage) {
            return false;
        }
        self.job.set_phase(phase);
        self.job.note(format!("{stage} started"));
        true
    }

    /// Writes the stage record for `outcome` and passes the outcome through.
    async fn record<T>(
        &self,
        stage: Stage,
        started: DateTime<Utc>,
        outcome: Result<T, EngineError>,
        payload: impl FnOnce(&T) -> StagePayload,
    ) -> Result<T, EngineError> {
        let target_id = self.job.target_id;
        match outcome {
            Ok(value) => {
                let result = StageResult::success(target_id, stage, payload(&value), started);
                self.append(result).await;
                self.job.note(format!("{stage} finished"));
                Ok(value)
            }
            Err(e) => {
                warn!(target_id, %stage, tool = stage.tool_name(), error = %e, "Stage failed.");
                self.append(StageResult::failure(target_id, stage, e.to_string(), started)).await;
                self.job.note(format!("{stage} failed"));
                Err(e)
            }
        }
    }

    async fn append(&self, result: StageResult) {
        let (target_id, stage) = (result.target_id, result.stage);
        if let Err(e) = self.store.append_result(result).await {
            error!(target_id, %stage, error = %e, "Could not write stage result.");
        }
    }

    async fn write_status(&self, status: TargetStatus) {
        if let Err(e) = self.store.set_target_status(self.job.target_id, status).await {
            error!(target_id = self.job.target_id, %status, error = %e, "Could not write target status.");
        }
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::sync::Semaphore;

    use crate::core::errors::EngineError;
    use crate::core::handoff::{HandoffFile, WorkingSet};
    use crate::core::models::Stage;
    use crate::core::scanner::{ReconTools, ScanOutput};

    type Hook = Arc<dyn Fn(&str, Stage) + Send + Sync>;

    /// In-process stand-in for the external toolchain.
    #[derive(Default)]
    pub struct FakeTools {
        pub subdomains: Vec<String>,
        /// `None` means no credential is configured.
        pub lookup: Option<Vec<String>>,
        pub fail_at: Option<Stage>,
        pub panic_at: Option<Stage>,
        /// When set, enumeration waits for one permit per call.
        pub gate: Option<Arc<Semaphore>>,
        pub delay: Duration,
        /// Runs after each stage's work, before it returns.
        pub after_stage: Option<Hook>,
        /// When set, enumeration writes its hosts to a handoff file here.
        pub handoff_dir: Option<PathBuf>,
        calls: Mutex<Vec<(String, Stage)>>,
        probe_input: Mutex<Option<String>>,
        running: AtomicUsize,
        peak: AtomicUsize,
    }

    impl FakeTools {
        pub fn new(subdomains: &[&str]) -> Self {
            Self {
                subdomains: subdomains.iter().map(|s| s.to_string()).collect(),
                ..Self::default()
            }
        }

        pub fn calls(&self) -> Vec<(String, Stage)> {
            self.calls.lock().unwrap().clone()
        }

        pub fn targets_for(&self, stage: Stage) -> Vec<String> {
            self.calls().into_iter().filter(|(_, s)| *s == stage).map(|(t, _)| t).collect()
        }

        /// Contents of the handoff file the probe stage was given, if any.
        pub fn probe_input(&self) -> Option<String> {
            self.probe_input.lock().unwrap().clone()
        }

        /// Highest number of pipelines seen between enumeration start and scan end.
        pub fn peak(&self) -> usize {
            self.peak.load(Ordering::SeqCst)
        }

        fn step(&self, target: &str, stage: Stage) -> Result<(), EngineError> {
            if let Some(hook) = &self.after_stage {
                hook(target, stage);
            }
            if self.panic_at == Some(stage) {
                panic!("fake tool blew up at {stage}");
            }
            if self.fail_at == Some(stage) {
                self.running.fetch_sub(1, Ordering::SeqCst);
                return Err(EngineError::ProcessFailed {
                    tool: stage.tool_name().to_string(),
                    code: Some(1),
                    stderr: "boom".to_string(),
                });
            }
            Ok(())
        }

        fn called(&self, target: &str, stage: Stage) {
            self.calls.lock().unwrap().push((target.to_string(), stage));
        }
    }

    #[async_trait]
    impl ReconTools for FakeTools {
        async fn enumerate(&self, target: &str) -> Result<WorkingSet, EngineError> {
            self.called(target, Stage::Enumerate);
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.acquire().await.unwrap().forget();
            }
            tokio::time::sleep(self.delay).await;
            self.step(target, Stage::Enumerate)?;
            let hosts = self.subdomains.clone();
            match &self.handoff_dir {
                Some(dir) => {
                    let file = HandoffFile::from_lines(dir, "_subfinder.txt", &hosts).await?;
                    Ok(WorkingSet::file_backed(hosts, file))
                }
                None => Ok(WorkingSet::in_memory(hosts)),
            }
        }

        async fn lookup(&self, target: &str) -> Result<Vec<String>, EngineError> {
            let Some(extra) = &self.lookup else {
                return Err(EngineError::ConfigurationMissing("no credential".into()));
            };
            self.called(target, Stage::Lookup);
            self.step(target, Stage::Lookup)?;
            Ok(extra.clone())
        }

        async fn probe(&self, hosts: &WorkingSet) -> Result<WorkingSet, EngineError> {
            let target = hosts.hosts.first().cloned().unwrap_or_default();
            self.called(&target, Stage::Probe);
            if let Some(file) = &hosts.file {
                let contents = file.read_to_string().await?;
                *self.probe_input.lock().unwrap() = Some(contents);
            }
            self.step(&target, Stage::Probe)?;
            if hosts.is_empty() {
                self.running.fetch_sub(1, Ordering::SeqCst);
                return Err(EngineError::output_empty("httpx", "no hosts to probe"));
            }
            Ok(WorkingSet::in_memory(hosts.hosts.clone()))
        }

        async fn scan(&self, live: &WorkingSet) -> Result<ScanOutput, EngineError> {
            let target = live.hosts.first().cloned().unwrap_or_default();
            self.called(&target, Stage::Scan);
            self.step(&target, Stage::Scan)?;
            self.running.fetch_sub(1, Ordering::SeqCst);
            Ok(ScanOutput {
                profile: "max-performance".into(),
                ..ScanOutput::default()
            })
        }
    }
}
