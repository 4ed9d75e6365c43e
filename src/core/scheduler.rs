// src/core/scheduler.rs

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::core::errors::EngineError;
use crate::core::job::ScanJob;
use crate::core::models::{JobSnapshot, PipelineState, QueueStatus, SubmitOutcome, TargetId, TargetStatus};
use crate::core::pipeline::Pipeline;
use crate::core::scanner::ReconTools;
use crate::core::store::ResultStore;
use crate::core::targets::normalize_target;

/// Knobs fixed when the scheduler is built.
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    pub max_concurrent: usize,
    /// Tool thread hint, reported in status only.
    pub scan_threads: usize,
    /// Re-check interval while jobs wait for a slot.
    pub admission_poll: Duration,
    /// Re-check interval while the backlog is empty.
    pub idle_sleep: Duration,
}

impl SchedulerOptions {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            max_concurrent: config.concurrency_limit(),
            scan_threads: config.tool_threads(),
            admission_poll: config.admission_poll(),
            idle_sleep: config.idle_sleep(),
        }
    }
}

/// Everything guarded by the one scheduler lock.
#[derive(Default)]
struct SchedulerState {
    jobs: HashMap<TargetId, Arc<ScanJob>>,
    active: HashSet<TargetId>,
    backlog: VecDeque<TargetId>,
}

impl SchedulerState {
    /// Reserves a slot for the next backlog entry, if one is free.
    fn admit_next(&mut self, limit: usize) -> Option<Arc<ScanJob>> {
        while self.active.len() < limit {
            let target_id = self.backlog.pop_front()?;
            let Some(job) = self.jobs.get(&target_id).cloned() else {
                warn!(target_id, "Backlog entry without a job, dropping it.");
                continue;
            };
            self.active.insert(target_id);
            job.mark_running();
            return Some(job);
        }
        None
    }
}

struct Inner {
    options: SchedulerOptions,
    state: Mutex<SchedulerState>,
    tools: Arc<dyn ReconTools>,
    store: Arc<dyn ResultStore>,
    /// Poked whenever a job is queued or a slot frees up.
    wake: Notify,
    /// Poked whenever a slot frees up.
    released: Notify,
    processor: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, SchedulerState> {
        // Every critical section leaves the state consistent, so a panic
        // elsewhere while holding the lock does not invalidate it.
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn release(&self, target_id: TargetId) {
        self.lock().active.remove(&target_id);
        debug!(target_id, "Released scan slot.");
        self.wake.notify_one();
        self.released.notify_waiters();
    }

    async fn write_status(&self, target_id: TargetId, status: TargetStatus) {
        if let Err(e) = self.store.set_target_status(target_id, status).await {
            error!(target_id, %status, error = %e, "Could not write target status.");
        }
    }
}

/// Bounded set of running pipelines plus a FIFO backlog.
///
/// Cloning is cheap and every clone drives the same scheduler.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    pub fn new(options: SchedulerOptions, tools: Arc<dyn ReconTools>, store: Arc<dyn ResultStore>) -> Self {
        let options = SchedulerOptions {
            max_concurrent: options.max_concurrent.max(1),
            ..options
        };
        info!(max_concurrent = options.max_concurrent, "Scheduler created.");
        Self {
            inner: Arc::new(Inner {
                options,
                state: Mutex::new(SchedulerState::default()),
                tools,
                store,
                wake: Notify::new(),
                released: Notify::new(),
                processor: Mutex::new(None),
            }),
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.inner.options.max_concurrent
    }

    /// Registers a scan for a target.
    ///
    /// Starts it right away when a slot is free and nobody is waiting ahead
    /// of it, otherwise appends it to the backlog. A target that already has
    /// a queued or running job is left alone.
    pub async fn submit(&self, target_id: TargetId, address: &str) -> Result<SubmitOutcome, EngineError> {
        let address = normalize_target(address)?;

        // Registered first so duplicates are refused while the status write
        // is pending, but not admissible until `queued` is stored.
        let job = {
            let mut state = self.inner.lock();
            let busy = state.active.contains(&target_id)
                || state.jobs.get(&target_id).is_some_and(|job| job.status().is_active());
            if busy {
                debug!(target_id, "Scan already queued or running.");
                return Ok(SubmitOutcome::AlreadyActive);
            }
            let job = Arc::new(ScanJob::new(target_id, address));
            state.jobs.insert(target_id, Arc::clone(&job));
            job
        };

        self.inner.write_status(target_id, TargetStatus::Queued).await;

        let outcome = {
            let mut state = self.inner.lock();
            if state.active.len() < self.inner.options.max_concurrent && state.backlog.is_empty() {
                state.active.insert(target_id);
                job.mark_running();
                SubmitOutcome::Started
            } else {
                state.backlog.push_back(target_id);
                SubmitOutcome::Queued
            }
        };

        match outcome {
            SubmitOutcome::Started => {
                info!(target_id, target = %job.address, "Slot free, starting scan.");
                launch(&self.inner, job);
            }
            _ => {
                info!(target_id, target = %job.address, "All slots busy, scan queued.");
                self.inner.wake.notify_one();
            }
        }
        Ok(outcome)
    }

    /// Submits each target in order. One failure does not stop the rest.
    pub async fn submit_many<I>(&self, targets: I) -> Vec<(TargetId, Result<SubmitOutcome, EngineError>)>
    where
        I: IntoIterator<Item = (TargetId, String)>,
    {
        let mut outcomes = Vec::new();
        for (target_id, address) in targets {
            let outcome = self.submit(target_id, &address).await;
            if let Err(e) = &outcome {
                warn!(target_id, error = %e, "Could not submit target.");
            }
            outcomes.push((target_id, outcome));
        }
        outcomes
    }

    /// Asks the target's current job to stop at the next stage boundary.
    ///
    /// Returns false when there is no queued or running job for it.
    pub fn cancel(&self, target_id: TargetId) -> bool {
        let state = self.inner.lock();
        match state.jobs.get(&target_id) {
            Some(job) if job.status().is_active() => {
                job.request_stop();
                info!(target_id, "Stop requested.");
                true
            }
            _ => false,
        }
    }

    pub fn job(&self, target_id: TargetId) -> Option<JobSnapshot> {
        self.inner.lock().jobs.get(&target_id).map(|job| job.snapshot())
    }

    pub fn status(&self) -> QueueStatus {
        let queue_processor_running = self.is_running();
        let state = self.inner.lock();
        let mut active: Vec<&Arc<ScanJob>> = state.active.iter().filter_map(|id| state.jobs.get(id)).collect();
        active.sort_by_key(|job| job.target_id);
        let mut jobs: Vec<JobSnapshot> = state.jobs.values().map(|job| job.snapshot()).collect();
        jobs.sort_by_key(|job| (job.submitted_at, job.target_id));

        QueueStatus {
            active_scans: state.active.len(),
            queued_scans: state.backlog.len(),
            max_concurrent: self.inner.options.max_concurrent,
            scan_threads: self.inner.options.scan_threads,
            queue_processor_running,
            active_scan_ids: active.iter().map(|job| job.scan_id.clone()).collect(),
            scan_jobs_count: state.jobs.len(),
            jobs,
        }
    }

    /// Whether the admission loop is alive.
    pub fn is_running(&self) -> bool {
        match self.inner.processor.lock() {
            Ok(guard) => guard.as_ref().is_some_and(|(_, handle)| !handle.is_finished()),
            Err(_) => false,
        }
    }

    /// Starts the background admission loop. Calling it twice is harmless.
    pub fn start(&self) {
        let Ok(mut processor) = self.inner.processor.lock() else {
            error!("Scheduler processor lock poisoned, cannot start.");
            return;
        };
        if processor.is_some() {
            debug!("Admission loop already running.");
            return;
        }
        let token = CancellationToken::new();
        let handle = tokio::spawn(admission_loop(Arc::clone(&self.inner), token.clone()));
        *processor = Some((token, handle));
        info!("Admission loop started.");
    }

    /// Stops the admission loop. Running pipelines are left to finish.
    pub async fn stop(&self) {
        let taken = match self.inner.processor.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };
        let Some((token, handle)) = taken else {
            return;
        };
        token.cancel();
        if let Err(e) = handle.await {
            error!(error = %e, "Admission loop ended abnormally.");
        }
        info!("Admission loop stopped.");
    }

    /// Resolves once no job is running and the backlog is empty.
    pub async fn wait_until_idle(&self) {
        loop {
            let released = self.inner.released.notified();
            {
                let state = self.inner.lock();
                if state.active.is_empty() && state.backlog.is_empty() {
                    return;
                }
            }
            released.await;
        }
    }
}

async fn admission_loop(inner: Arc<Inner>, token: CancellationToken) {
    loop {
        let (admitted, backlog_empty) = {
            let mut state = inner.lock();
            let admitted = state.admit_next(inner.options.max_concurrent);
            (admitted, state.backlog.is_empty())
        };
        if let Some(job) = admitted {
            info!(target_id = job.target_id, target = %job.address, "Admitting queued scan.");
            launch(&inner, job);
            continue;
        }

        let pause = if backlog_empty {
            inner.options.idle_sleep
        } else {
            inner.options.admission_poll
        };
        tokio::select! {
            _ = token.cancelled() => break,
            _ = inner.wake.notified() => {}
            _ = tokio::time::sleep(pause) => {}
        }
    }
}

/// Runs the job's pipeline on its own task, supervised so that a panic
/// still finalizes the job and frees the slot.
fn launch(inner: &Arc<Inner>, job: Arc<ScanJob>) {
    let inner = Arc::clone(inner);
    tokio::spawn(async move {
        let pipeline = Pipeline::new(Arc::clone(&job), Arc::clone(&inner.tools), Arc::clone(&inner.store));
        let run = tokio::spawn(async move { pipeline.run().await });
        match run.await {
            Ok(state) => debug!(target_id = job.target_id, %state, "Pipeline task ended."),
            Err(e) => {
                error!(target_id = job.target_id, error = %e, "Pipeline task aborted.");
                job.finish(PipelineState::Error, Some(format!("pipeline aborted: {e}")));
                inner.write_status(job.target_id, TargetStatus::Error).await;
            }
        }
        inner.release(job.target_id);
    });
}


#[cfg(all(test, unix))]
mod process_tests {
    use super::*;
    use crate::core::models::{JobStatus, Stage, StageStatus};
    use crate::core::scanner::fixtures::external_tools;
    use crate::core::store::MemoryResultStore;
    use crate::core::test_support::script;
    use tempfile::TempDir;

    #[tokio::test]
    async fn probe_with_no_live_hosts_stops_before_scanning() {
        let bin = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        let marker = work.path().join("nuclei-ran");
        script(
            bin.path(),
            "subfinder",
            r#"while [ $# -gt 0 ]; do case "$1" in -o) out="$2"; shift;; esac; shift; done
printf '["a.example.com","b.example.com"]' > "$out""#,
        );
        script(bin.path(), "httpx", "cat > /dev/null; exit 0");
        script(bin.path(), "nuclei", &format!("touch '{}'", marker.display()));

        let tools = Arc::new(external_tools(bin.path(), work.path(), work.path()));
        let store = Arc::new(MemoryResultStore::new());
        let scheduler = Scheduler::new(
            SchedulerOptions {
                max_concurrent: 1,
                scan_threads: 1,
                admission_poll: Duration::from_millis(10),
                idle_sleep: Duration::from_millis(20),
            },
            tools,
            store.clone(),
        );

        scheduler.submit(7, "example.com").await.unwrap();
        tokio::time::timeout(Duration::from_secs(20), scheduler.wait_until_idle())
            .await
            .unwrap();

        let job = scheduler.job(7).unwrap();
        assert_eq!(job.status, JobStatus::Error);
        let results = store.results_for(7).await;
        assert_eq!(
            results.iter().map(|r| (r.stage, r.status)).collect::<Vec<_>>(),
            [(Stage::Enumerate, StageStatus::Success), (Stage::Probe, StageStatus::Error)]
        );
        assert!(!marker.exists());
        assert_eq!(store.target_status(7).await.map(|(s, _)| s), Some(TargetStatus::Error));
    }
}
