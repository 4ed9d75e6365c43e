// src/core/scanner/subfinder.rs

use tracing::{debug, info};

use super::ExternalTools;
use crate::core::errors::EngineError;
use crate::core::handoff::{parse_host_lines, HandoffFile, WorkingSet};
use crate::core::runner::run;

const TOOL: &str = "subfinder";

/// Runs passive subdomain enumeration against `target`.
///
/// The tool writes its results to a handoff file that later stages read
/// directly. Only exit code 0 counts as success. An output file that exists
/// but is empty is a valid "nothing found"; a missing file is an error.
pub async fn run_subfinder(tools: &ExternalTools, target: &str) -> Result<WorkingSet, EngineError> {
    info!(target, "Starting subdomain enumeration.");

    let output = HandoffFile::reserve(&tools.work_dir, "_subfinder.txt")?;
    let threads = tools.threads.to_string();
    let command = tools
        .command(TOOL, tools.timeouts.enumerate())
        .args(["-d", target, "-o"])
        .arg(output.path())
        .args(["-silent", "-t", threads.as_str(), "-timeout", "30", "-max-time", "300"])
        .env("SUBFINDER_THREADS", tools.threads);

    run(&command).await?.require(TOOL, &[0])?;

    if !output.exists() {
        return Err(EngineError::output_empty(TOOL, "output file was not created"));
    }

    let subdomains = parse_host_lines(&output.read_to_string().await?);
    if subdomains.is_empty() {
        info!(target, "Enumeration found no subdomains.");
        return Ok(WorkingSet::in_memory(Vec::new()));
    }

    // Normalize to one host per line, whatever format the tool chose.
    output.write_lines(&subdomains).await?;
    debug!(path = %output.path().display(), "Enumeration handoff file ready.");
    info!(target, count = subdomains.len(), "Enumeration finished.");
    Ok(WorkingSet::file_backed(subdomains, output))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::core::scanner::fixtures::external_tools;
    use crate::core::test_support::script;
    use tempfile::TempDir;

    const WRITE_TO_O: &str = r#"while [ $# -gt 0 ]; do case "$1" in -o) out="$2"; shift;; esac; shift; done"#;

    #[tokio::test]
    async fn reads_json_array_output_into_file_backed_set() {
        let bin = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        script(
            bin.path(),
            TOOL,
            &format!(r#"{WRITE_TO_O}; printf '["a.example.com","b.example.com"]' > "$out""#),
        );
        let tools = external_tools(bin.path(), work.path(), work.path());

        let set = run_subfinder(&tools, "example.com").await.unwrap();
        assert_eq!(set.hosts, vec!["a.example.com", "b.example.com"]);

        let handoff = set.file.as_ref().unwrap();
        assert_eq!(handoff.read_to_string().await.unwrap(), "a.example.com\nb.example.com\n");
    }

    #[tokio::test]
    async fn empty_file_is_a_valid_empty_result() {
        let bin = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        script(bin.path(), TOOL, &format!(r#"{WRITE_TO_O}; : > "$out""#));
        let tools = external_tools(bin.path(), work.path(), work.path());

        let set = run_subfinder(&tools, "example.com").await.unwrap();
        assert!(set.is_empty());
        assert!(set.file.is_none());
    }

    #[tokio::test]
    async fn missing_file_after_success_is_an_error() {
        let bin = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        script(bin.path(), TOOL, "exit 0");
        let tools = external_tools(bin.path(), work.path(), work.path());

        let err = run_subfinder(&tools, "example.com").await.unwrap_err();
        assert!(matches!(err, EngineError::OutputEmpty { .. }));
    }

    #[tokio::test]
    async fn nonzero_exit_is_process_failed() {
        let bin = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        script(bin.path(), TOOL, "echo 'rate limited' >&2; exit 1");
        let tools = external_tools(bin.path(), work.path(), work.path());

        let err = run_subfinder(&tools, "example.com").await.unwrap_err();
        assert_eq!(err.to_string(), "subfinder failed with exit code 1: rate limited");
    }
}
