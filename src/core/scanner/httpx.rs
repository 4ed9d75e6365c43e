// src/core/scanner/httpx.rs

use tracing::{debug, info};

use super::ExternalTools;
use crate::core::errors::EngineError;
use crate::core::handoff::{parse_host_lines, HandoffFile, WorkingSet};
use crate::core::runner::run;
use crate::core::targets::strip_scheme_and_path;

const TOOL: &str = "httpx";

/// Probes the working set for live HTTP services.
///
/// A file-backed working set is streamed to the prober's stdin as is. An
/// in-memory set is cleaned up (scheme and path stripped) and written to a
/// temporary list first. Zero live hosts fails the stage.
pub async fn run_httpx(tools: &ExternalTools, input: &WorkingSet) -> Result<WorkingSet, EngineError> {
    if input.is_empty() {
        return Err(EngineError::output_empty(TOOL, "no hosts to probe"));
    }

    let list_file;
    let hosts_file = match &input.file {
        Some(file) => file,
        None => {
            list_file = write_host_list(tools, &input.hosts).await?;
            &list_file
        }
    };
    info!(hosts = input.len(), "Starting live host probe.");

    let output = HandoffFile::reserve(&tools.work_dir, "_httpx.txt")?;
    let concurrency = tools.threads.to_string();
    let command = tools
        .command(TOOL, tools.timeouts.probe())
        .args(["-silent", "-o"])
        .arg(output.path())
        .args(["-c", concurrency.as_str(), "-rate-limit", "0", "-timeout", "10"])
        .env("HTTPX_THREADS", tools.threads)
        .env("HTTPX_CONCURRENCY", tools.threads)
        .stdin_file(hosts_file.path());

    let result = run(&command).await?.require(TOOL, &[0])?;

    let (live_hosts, handoff) = if output.exists() {
        let live_hosts = parse_host_lines(&output.read_to_string().await?);
        if live_hosts.is_empty() {
            return Err(EngineError::output_empty(TOOL, "no live hosts found"));
        }
        (live_hosts, output)
    } else {
        let live_hosts = parse_host_lines(&result.stdout);
        if live_hosts.is_empty() {
            return Err(EngineError::output_empty(TOOL, "output file not created and no stdout"));
        }
        debug!("Prober did not write its output file, falling back to stdout.");
        let handoff = HandoffFile::from_lines(&tools.work_dir, "_httpx.txt", &live_hosts).await?;
        (live_hosts, handoff)
    };

    info!(live = live_hosts.len(), "Live host probe finished.");
    Ok(WorkingSet::file_backed(live_hosts, handoff))
}

async fn write_host_list(tools: &ExternalTools, hosts: &[String]) -> Result<HandoffFile, EngineError> {
    let cleaned: Vec<String> = hosts
        .iter()
        .map(|host| strip_scheme_and_path(host))
        .filter(|host| !host.is_empty())
        .map(str::to_string)
        .collect();
    if cleaned.is_empty() {
        return Err(EngineError::output_empty(TOOL, "no valid hosts to check"));
    }
    HandoffFile::from_lines(&tools.work_dir, "_hosts.txt", &cleaned).await
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::core::scanner::fixtures::external_tools;
    use crate::core::test_support::script;
    use tempfile::TempDir;

    fn hosts(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn probes_from_handoff_file_via_stdin() {
        let bin = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        // Echo every stdin host back as live, into the -o file.
        script(
            bin.path(),
            TOOL,
            r#"while [ $# -gt 0 ]; do case "$1" in -o) out="$2"; shift;; esac; shift; done
while read -r h; do echo "https://$h"; done > "$out""#,
        );
        let tools = external_tools(bin.path(), work.path(), work.path());
        let file = HandoffFile::from_lines(work.path(), ".txt", &hosts(&["a.example.com", "b.example.com"]))
            .await
            .unwrap();
        let input = WorkingSet::file_backed(hosts(&["a.example.com", "b.example.com"]), file);

        let live = run_httpx(&tools, &input).await.unwrap();
        assert_eq!(live.hosts, hosts(&["https://a.example.com", "https://b.example.com"]));
        assert!(live.file.as_ref().unwrap().exists());
    }

    #[tokio::test]
    async fn falls_back_to_stdout_and_writes_handoff() {
        let bin = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        script(bin.path(), TOOL, "cat");
        let tools = external_tools(bin.path(), work.path(), work.path());
        let input = WorkingSet::in_memory(hosts(&["https://a.example.com/login", "", "b.example.com"]));

        let live = run_httpx(&tools, &input).await.unwrap();
        assert_eq!(live.hosts, hosts(&["a.example.com", "b.example.com"]));
        let on_disk = live.file.as_ref().unwrap().read_to_string().await.unwrap();
        assert_eq!(on_disk, "a.example.com\nb.example.com\n");
    }

    #[tokio::test]
    async fn zero_live_hosts_is_an_error() {
        let bin = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        script(bin.path(), TOOL, "cat > /dev/null");
        let tools = external_tools(bin.path(), work.path(), work.path());
        let input = WorkingSet::in_memory(hosts(&["a.example.com"]));

        let err = run_httpx(&tools, &input).await.unwrap_err();
        assert!(matches!(err, EngineError::OutputEmpty { .. }));
    }

    #[tokio::test]
    async fn empty_working_set_never_spawns() {
        let work = TempDir::new().unwrap();
        let tools = external_tools(work.path(), work.path(), work.path());

        let err = run_httpx(&tools, &WorkingSet::default()).await.unwrap_err();
        assert!(err.to_string().contains("no hosts to probe"));

        let err = run_httpx(&tools, &WorkingSet::in_memory(hosts(&[" ", "https://"]))).await.unwrap_err();
        assert!(err.to_string().contains("no valid hosts to check"));
    }
}
