// src/core/errors.rs

use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::core::models::StageStatus;

/// Failures raised by the tool locator, the process runner and the stage adapters.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{tool} not found in the tools directory, common install paths or PATH")]
    ToolNotFound { tool: String },

    #[error("{tool} timed out after {}s", .after.as_secs())]
    ProcessTimeout { tool: String, after: Duration },

    #[error("{tool} failed with exit code {}: {stderr}", exit_code_label(.code))]
    ProcessFailed {
        tool: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("{tool} produced no usable output: {reason}")]
    OutputEmpty { tool: String, reason: String },

    /// An optional stage has nothing to run with. Resolves to a skipped stage.
    #[error("{0}")]
    ConfigurationMissing(String),

    #[error("failed to start {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: io::Error,
    },

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid target {input:?}: {reason}")]
    InvalidTarget { input: String, reason: String },

    #[error("{tool} preflight failed: {reason}")]
    Preflight { tool: String, reason: String },
}

fn exit_code_label(code: &Option<i32>) -> String {
    code.map_or_else(|| "none (killed by signal)".to_string(), |c| c.to_string())
}

impl EngineError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }

    pub fn output_empty(tool: &str, reason: impl Into<String>) -> Self {
        Self::OutputEmpty {
            tool: tool.to_string(),
            reason: reason.into(),
        }
    }

    pub fn preflight(tool: &str, reason: impl Into<String>) -> Self {
        Self::Preflight {
            tool: tool.to_string(),
            reason: reason.into(),
        }
    }

    /// Stage outcome this error resolves to when it ends a stage.
    pub fn stage_status(&self) -> StageStatus {
        match self {
            Self::ConfigurationMissing(_) => StageStatus::Skipped,
            _ => StageStatus::Error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_human_readable() {
        let err = EngineError::ProcessFailed {
            tool: "httpx".into(),
            code: Some(3),
            stderr: "bad flag".into(),
        };
        assert_eq!(err.to_string(), "httpx failed with exit code 3: bad flag");

        let err = EngineError::ProcessTimeout {
            tool: "nuclei".into(),
            after: Duration::from_secs(60),
        };
        assert_eq!(err.to_string(), "nuclei timed out after 60s");

        let err = EngineError::ProcessFailed {
            tool: "subfinder".into(),
            code: None,
            stderr: String::new(),
        };
        assert!(err.to_string().contains("killed by signal"));
    }

    #[test]
    fn missing_configuration_means_skipped() {
        assert_eq!(
            EngineError::ConfigurationMissing("no key".into()).stage_status(),
            StageStatus::Skipped
        );
        assert_eq!(
            EngineError::output_empty("httpx", "no live hosts").stage_status(),
            StageStatus::Error
        );
    }
}
