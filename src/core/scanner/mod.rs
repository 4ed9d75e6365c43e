// src/core/scanner/mod.rs

// One adapter per external tool. Each builds its command line, runs it
// through the process runner and turns the output into engine types.
pub mod chaos;
pub mod httpx;
pub mod nuclei;
pub mod subfinder;

use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::{EngineConfig, TimeoutConfig};
use crate::core::errors::EngineError;
use crate::core::handoff::WorkingSet;
use crate::core::locator::ToolLocator;
use crate::core::models::{Finding, ScanPerformance};
use crate::core::runner::ToolCommand;

/// What the vulnerability scan stage hands back to the pipeline.
#[derive(Debug, Clone, Default)]
pub struct ScanOutput {
    pub findings: Vec<Finding>,
    /// Name of the invocation profile that produced the result.
    pub profile: String,
    pub performance: ScanPerformance,
}

/// The four stage operations the pipeline drives.
///
/// Production code uses [`ExternalTools`]; tests plug in fakes so that
/// scheduling behaviour can be checked without real binaries.
#[async_trait]
pub trait ReconTools: Send + Sync {
    /// Enumerates subdomains of `target`. An empty result is valid.
    async fn enumerate(&self, target: &str) -> Result<WorkingSet, EngineError>;

    /// Optional intelligence lookup. Returns `ConfigurationMissing` when no
    /// credential is configured.
    async fn lookup(&self, target: &str) -> Result<Vec<String>, EngineError>;

    /// Probes the working set for live HTTP hosts. Zero live hosts is an error.
    async fn probe(&self, hosts: &WorkingSet) -> Result<WorkingSet, EngineError>;

    /// Runs the template scanner against the live hosts.
    async fn scan(&self, live: &WorkingSet) -> Result<ScanOutput, EngineError>;
}

/// The real toolchain: subfinder, chaos, httpx and nuclei.
#[derive(Debug)]
pub struct ExternalTools {
    locator: ToolLocator,
    work_dir: PathBuf,
    templates_dir: PathBuf,
    chaos_key: Option<String>,
    cpus: usize,
    threads: usize,
    timeouts: TimeoutConfig,
}

impl ExternalTools {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            locator: ToolLocator::new(config.tools_dir.clone()),
            work_dir: std::env::temp_dir(),
            templates_dir: config.templates_dir.clone(),
            chaos_key: config.chaos_key().map(str::to_string),
            cpus: config.cpu_count(),
            threads: config.tool_threads(),
            timeouts: config.timeouts.clone(),
        }
    }

    pub fn templates_dir(&self) -> &std::path::Path {
        &self.templates_dir
    }

    /// Base command for `tool` with the resolved path and the tuning
    /// environment every projectdiscovery tool understands.
    fn command(&self, tool: &str, timeout: Duration) -> ToolCommand {
        ToolCommand::new(tool, self.locator.resolve(tool), timeout).env("GOMAXPROCS", self.cpus)
    }
}

#[async_trait]
impl ReconTools for ExternalTools {
    async fn enumerate(&self, target: &str) -> Result<WorkingSet, EngineError> {
        subfinder::run_subfinder(self, target).await
    }

    async fn lookup(&self, target: &str) -> Result<Vec<String>, EngineError> {
        chaos::run_chaos(self, target).await
    }

    async fn probe(&self, hosts: &WorkingSet) -> Result<WorkingSet, EngineError> {
        httpx::run_httpx(self, hosts).await
    }

    async fn scan(&self, live: &WorkingSet) -> Result<ScanOutput, EngineError> {
        nuclei::run_nuclei(self, live).await
    }
}

#[cfg(all(test, unix))]
pub(crate) mod fixtures {
    use super::*;
    use std::path::Path;

    /// Tools resolved from `tools_dir` only, with handoff files in `work_dir`.
    pub fn external_tools(tools_dir: &Path, work_dir: &Path, templates_dir: &Path) -> ExternalTools {
        let config = EngineConfig {
            tools_dir: Some(tools_dir.to_path_buf()),
            templates_dir: templates_dir.to_path_buf(),
            chaos_api_key: None,
            tool_threads: Some(4),
            ..EngineConfig::default()
        };
        let mut tools = ExternalTools::from_config(&config);
        tools.work_dir = work_dir.to_path_buf();
        tools.locator = ToolLocator::with_search_paths(Some(tools_dir.to_path_buf()), Vec::new());
        tools
    }

    pub fn with_chaos_key(mut tools: ExternalTools, key: &str) -> ExternalTools {
        tools.chaos_key = Some(key.to_string());
        tools
    }
}
