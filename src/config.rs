// src/config.rs

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::logging::get_data_dir;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not parse config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Per-stage timeout table, in seconds unless noted.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct TimeoutConfig {
    pub enumerate_secs: u64,
    pub lookup_secs: u64,
    pub probe_secs: u64,
    pub scan_floor_secs: u64,
    pub scan_ceiling_secs: u64,
    pub scan_secs_per_host: u64,
    pub version_check_secs: u64,
    pub template_list_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            // subfinder is told -max-time 300 itself; leave it room to flush.
            enumerate_secs: 330,
            lookup_secs: 120,
            probe_secs: 600,
            scan_floor_secs: 60,
            scan_ceiling_secs: 300,
            scan_secs_per_host: 2,
            version_check_secs: 10,
            template_list_secs: 30,
        }
    }
}

impl TimeoutConfig {
    pub fn enumerate(&self) -> Duration {
        Duration::from_secs(self.enumerate_secs)
    }

    pub fn lookup(&self) -> Duration {
        Duration::from_secs(self.lookup_secs)
    }

    pub fn probe(&self) -> Duration {
        Duration::from_secs(self.probe_secs)
    }

    pub fn version_check(&self) -> Duration {
        Duration::from_secs(self.version_check_secs)
    }

    pub fn template_list(&self) -> Duration {
        Duration::from_secs(self.template_list_secs)
    }

    /// Scan timeout grows with the number of live hosts, clamped to floor and ceiling.
    pub fn scan(&self, host_count: usize) -> Duration {
        let scaled = (host_count as u64).saturating_mul(self.scan_secs_per_host);
        Duration::from_secs(scaled.clamp(self.scan_floor_secs, self.scan_ceiling_secs))
    }
}

/// Everything the engine needs from the outside world.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub tools_dir: Option<PathBuf>,
    pub chaos_api_key: Option<String>,
    pub max_concurrent_scans: usize,
    pub auto_tune_concurrency: bool,
    pub templates_dir: PathBuf,
    pub data_dir: PathBuf,
    /// Thread/concurrency hint passed to the external tools. Defaults to 2x CPUs.
    pub tool_threads: Option<usize>,
    pub admission_poll_ms: u64,
    pub idle_sleep_ms: u64,
    pub timeouts: TimeoutConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tools_dir: default_tools_dir(),
            chaos_api_key: None,
            max_concurrent_scans: 3,
            auto_tune_concurrency: true,
            templates_dir: PathBuf::from("templates").join("custom"),
            data_dir: get_data_dir(),
            tool_threads: None,
            admission_poll_ms: 500,
            idle_sleep_ms: 2000,
            timeouts: TimeoutConfig::default(),
        }
    }
}

/// `~/go/bin` is where `go install` drops the projectdiscovery tools.
fn default_tools_dir() -> Option<PathBuf> {
    directories::BaseDirs::new()
        .map(|dirs| dirs.home_dir().join("go").join("bin"))
        .filter(|path| path.is_dir())
}

impl EngineConfig {
    /// Loads `.env`, then the TOML file at `path` (if it exists), then
    /// environment overrides, and validates the result.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if let Ok(env_file) = dotenvy::dotenv() {
            debug!(path = %env_file.display(), "Loaded .env file.");
        }

        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            Self::from_toml_str(&raw).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?
        } else {
            info!(path = %path.display(), "No config file found, using defaults.");
            Self::default()
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    /// Applies `HAWKS_*` overrides using `lookup` to read variables.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("HAWKS_TOOLS_DIR") {
            self.tools_dir = Some(PathBuf::from(dir));
        }
        if let Some(key) = lookup("HAWKS_CHAOS_API_KEY").or_else(|| lookup("CHAOS_API_KEY")) {
            self.chaos_api_key = Some(key);
        }
        if let Some(dir) = lookup("HAWKS_TEMPLATES_DIR") {
            self.templates_dir = PathBuf::from(dir);
        }
        if let Some(raw) = lookup("HAWKS_MAX_CONCURRENT_SCANS") {
            self.max_concurrent_scans = raw.trim().parse().map_err(|_| ConfigError::Invalid {
                key: "HAWKS_MAX_CONCURRENT_SCANS",
                reason: format!("{raw:?} is not a positive integer"),
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_scans == 0 {
            return Err(ConfigError::Invalid {
                key: "max_concurrent_scans",
                reason: "must be at least 1".into(),
            });
        }
        let t = &self.timeouts;
        if t.scan_floor_secs > t.scan_ceiling_secs {
            return Err(ConfigError::Invalid {
                key: "timeouts.scan_floor_secs",
                reason: format!("floor {} exceeds ceiling {}", t.scan_floor_secs, t.scan_ceiling_secs),
            });
        }
        let all = [
            ("timeouts.enumerate_secs", t.enumerate_secs),
            ("timeouts.lookup_secs", t.lookup_secs),
            ("timeouts.probe_secs", t.probe_secs),
            ("timeouts.scan_ceiling_secs", t.scan_ceiling_secs),
            ("timeouts.version_check_secs", t.version_check_secs),
            ("timeouts.template_list_secs", t.template_list_secs),
        ];
        if let Some(&(key, _)) = all.iter().find(|(_, secs)| *secs == 0) {
            return Err(ConfigError::Invalid {
                key,
                reason: "timeout must be non-zero".into(),
            });
        }
        Ok(())
    }

    /// Credential for the intelligence lookup; an empty string counts as absent.
    pub fn chaos_key(&self) -> Option<&str> {
        self.chaos_api_key.as_deref().map(str::trim).filter(|key| !key.is_empty())
    }

    pub fn cpu_count(&self) -> usize {
        num_cpus::get().max(1)
    }

    pub fn tool_threads(&self) -> usize {
        self.tool_threads.unwrap_or_else(|| self.cpu_count() * 2).max(1)
    }

    pub fn admission_poll(&self) -> Duration {
        Duration::from_millis(self.admission_poll_ms.max(1))
    }

    pub fn idle_sleep(&self) -> Duration {
        Duration::from_millis(self.idle_sleep_ms.max(1))
    }

    /// Concurrency limit, computed once at startup.
    pub fn concurrency_limit(&self) -> usize {
        if !self.auto_tune_concurrency {
            return self.max_concurrent_scans.max(1);
        }
        let mut system = sysinfo::System::new();
        system.refresh_memory();
        let memory_gb = system.total_memory() as f64 / (1024.0 * 1024.0 * 1024.0);
        let limit = tuned_concurrency(self.cpu_count(), memory_gb, self.max_concurrent_scans);
        info!(
            cpus = self.cpu_count(),
            memory_gb = %format!("{memory_gb:.1}"),
            limit,
            "Derived concurrency limit."
        );
        limit
    }
}

/// One scan per CPU and per 2 GB of RAM, capped by the configured maximum, never below one.
pub fn tuned_concurrency(cpus: usize, memory_gb: f64, configured_max: usize) -> usize {
    let by_memory = (memory_gb / 2.0).floor() as usize;
    cpus.min(by_memory).min(configured_max).max(1)
}
