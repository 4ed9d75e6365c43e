// src/core/scanner/nuclei.rs

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::{ExternalTools, ScanOutput};
use crate::core::errors::EngineError;
use crate::core::handoff::{HandoffFile, WorkingSet};
use crate::core::locator::is_executable;
use crate::core::models::{Finding, ScanPerformance};
use crate::core::runner::{run, ProcessOutput};

const TOOL: &str = "nuclei";

/// Rule id that gets a dedicated warning when matched.
const GIT_EXPOSURE_TEMPLATE: &str = "git-exposure-check";

/// One way of invoking the scanner. Profiles are tried in order until one
/// is accepted.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanProfile {
    pub name: &'static str,
    pub args: Vec<OsString>,
}

impl ScanProfile {
    fn new(name: &'static str, templates: &Path, extra: &[String]) -> Self {
        let mut args: Vec<OsString> = vec!["-t".into(), templates.into()];
        args.extend(extra.iter().map(OsString::from));
        Self { name, args }
    }

    /// The most conservative profiles. Landing on one usually means the
    /// scanner rejected the tuned flags, which deserves attention.
    pub fn is_last_resort(&self) -> bool {
        self.name == "fallback" || self.name.starts_with("specific-")
    }
}

fn tuned_flags(concurrency: usize, bulk_size: u32, timeout_secs: Option<u32>) -> Vec<String> {
    let mut flags = vec![
        "-c".to_string(),
        concurrency.to_string(),
        "-rate-limit".to_string(),
        "0".to_string(),
        "-bulk-size".to_string(),
        bulk_size.to_string(),
    ];
    if let Some(secs) = timeout_secs {
        flags.extend(["-headless".to_string(), "-timeout".to_string(), secs.to_string()]);
    }
    flags
}

/// Builds the invocation ladder, from most to least aggressive.
///
/// When the templates directory holds exactly one template, two extra
/// profiles pointing at that file directly are appended.
pub fn profile_ladder(templates_dir: &Path, templates: &[PathBuf], cpus: usize) -> Vec<ScanProfile> {
    let max_performance = tuned_flags(cpus * 2, 50, Some(10));
    let aggressive = tuned_flags(cpus * 3, 100, Some(5));

    let mut ladder = vec![
        ScanProfile::new("max-performance", templates_dir, &max_performance),
        ScanProfile::new("aggressive", templates_dir, &aggressive),
        ScanProfile::new("optimized", templates_dir, &tuned_flags(cpus, 25, None)),
        ScanProfile::new("fallback", templates_dir, &[]),
    ];
    if let [single] = templates {
        ladder.push(ScanProfile::new("specific-max-performance", single, &max_performance));
        ladder.push(ScanProfile::new("specific-aggressive", single, &aggressive));
    }
    ladder
}

/// How one profile attempt ended.
#[derive(Debug, PartialEq)]
enum Verdict {
    Accept,
    Retry(String),
}

/// Exit 0 reports findings and exit 1 means a clean run without any, unless
/// stderr blames the templates. Everything else moves on to the next profile.
fn judge(output: &ProcessOutput) -> Verdict {
    match output.exit_code {
        Some(0) => Verdict::Accept,
        Some(1) if output.stderr.to_lowercase().contains("template") => {
            Verdict::Retry(format!("templates rejected: {}", first_line(&output.stderr)))
        }
        Some(1) => Verdict::Accept,
        Some(code) => Verdict::Retry(format!("exit code {code}: {}", first_line(&output.stderr))),
        None => Verdict::Retry("killed by signal".to_string()),
    }
}

fn first_line(text: &str) -> &str {
    text.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("no error output")
}

/// Parses JSON Lines findings, skipping anything that is not a finding.
pub fn parse_findings(stdout: &str) -> Vec<Finding> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with('{'))
        .filter_map(|line| match serde_json::from_str::<Finding>(line) {
            Ok(finding) => Some(finding),
            Err(e) => {
                debug!(error = %e, "Skipping unparsable scanner line.");
                None
            }
        })
        .collect()
}

/// Template files (`.yaml`/`.yml`) directly inside `dir`, sorted by name.
async fn list_templates(dir: &Path) -> Result<Vec<PathBuf>, EngineError> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| EngineError::preflight(TOOL, format!("cannot read templates directory {}: {e}", dir.display())))?;

    let mut templates = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(|e| EngineError::io(dir, e))? {
        let path = entry.path();
        let is_template = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext == "yaml" || ext == "yml");
        if is_template && path.is_file() {
            templates.push(path);
        }
    }
    templates.sort();
    Ok(templates)
}

/// Checks that the scanner can run at all before any host is touched.
///
/// Returns the template files found.
async fn preflight(tools: &ExternalTools) -> Result<Vec<PathBuf>, EngineError> {
    let program = tools.locator.resolve(TOOL);
    if !program.is_file() {
        return Err(EngineError::ToolNotFound { tool: TOOL.to_string() });
    }
    if !is_executable(&program) {
        return Err(EngineError::preflight(TOOL, format!("{} is not executable", program.display())));
    }

    let version = tools
        .command(TOOL, tools.timeouts.version_check())
        .arg("--version");
    let version = run(&version).await?.require(TOOL, &[0])?;
    debug!(version = %first_line(&format!("{}{}", version.stdout, version.stderr)), "Scanner version check passed.");

    let dir = &tools.templates_dir;
    if !dir.exists() {
        tokio::fs::create_dir_all(dir).await.map_err(|e| EngineError::io(dir, e))?;
        info!(path = %dir.display(), "Created templates directory.");
    }
    let templates = list_templates(dir).await?;
    if templates.is_empty() {
        return Err(EngineError::preflight(
            TOOL,
            format!("no templates (.yaml/.yml) found in {}", dir.display()),
        ));
    }
    info!(count = templates.len(), path = %dir.display(), "Found scan templates.");

    // Dry-run listing is informational only.
    let listing = tools
        .command(TOOL, tools.timeouts.template_list())
        .arg("-t")
        .arg(dir)
        .arg("-tl");
    match run(&listing).await {
        Ok(out) if out.exited_with(&[0]) => debug!("Template listing succeeded."),
        Ok(out) => debug!(exit_code = ?out.exit_code, stderr = %first_line(&out.stderr), "Template listing failed."),
        Err(e) => debug!(error = %e, "Template listing could not run."),
    }

    Ok(templates)
}

/// Scans the live hosts with the configured templates.
///
/// Walks the profile ladder until one invocation is accepted. Fails with the
/// last rejection reason when every profile was rejected.
pub async fn run_nuclei(tools: &ExternalTools, live: &WorkingSet) -> Result<ScanOutput, EngineError> {
    if live.is_empty() {
        return Err(EngineError::output_empty(TOOL, "no hosts to scan"));
    }

    let list_file;
    let hosts_file = match &live.file {
        Some(file) => file,
        None => {
            list_file = HandoffFile::from_lines(&tools.work_dir, "_nuclei_hosts.txt", &live.hosts).await?;
            &list_file
        }
    };

    let templates = preflight(tools).await?;
    let ladder = profile_ladder(&tools.templates_dir, &templates, tools.cpus);
    let timeout = tools.timeouts.scan(live.len());
    info!(
        hosts = live.len(),
        profiles = ladder.len(),
        timeout_secs = timeout.as_secs(),
        "Starting vulnerability scan."
    );

    let mut last_code = None;
    let mut last_reason = String::new();
    for profile in &ladder {
        let command = tools
            .command(TOOL, timeout)
            .args(["-jsonl", "-l"])
            .arg(hosts_file.path())
            .args(profile.args.iter().cloned())
            .env("NUCLEI_THREADS", tools.threads)
            .env("NUCLEI_CONCURRENCY", tools.threads);
        debug!(profile = profile.name, cmd = %command.display(), "Trying scan profile.");

        let output = match run(&command).await {
            Ok(output) => output,
            Err(e) => {
                warn!(profile = profile.name, error = %e, "Scan profile failed, trying next.");
                last_code = None;
                last_reason = e.to_string();
                continue;
            }
        };

        if let Verdict::Retry(reason) = judge(&output) {
            warn!(profile = profile.name, %reason, "Scan profile rejected, trying next.");
            last_code = output.exit_code;
            last_reason = reason;
            continue;
        }

        let findings = parse_findings(&output.stdout);
        for finding in findings.iter().filter(|f| f.template_id == GIT_EXPOSURE_TEMPLATE) {
            warn!(
                matched_at = finding.matched_at.as_deref().unwrap_or("unknown"),
                "Exposed .git directory detected."
            );
        }

        let secs = output.elapsed.as_secs_f64();
        let performance = ScanPerformance {
            execution_secs: secs,
            hosts_per_second: if secs > 0.0 { live.len() as f64 / secs } else { 0.0 },
            hosts_scanned: live.len(),
            results_found: findings.len(),
        };
        if profile.is_last_resort() {
            warn!(profile = profile.name, "Scan only succeeded with a last-resort profile.");
        }
        info!(
            profile = profile.name,
            findings = findings.len(),
            secs = %format!("{secs:.1}"),
            hosts_per_second = %format!("{:.1}", performance.hosts_per_second),
            "Vulnerability scan finished."
        );
        return Ok(ScanOutput {
            findings,
            profile: profile.name.to_string(),
            performance,
        });
    }

    Err(EngineError::ProcessFailed {
        tool: TOOL.to_string(),
        code: last_code,
        stderr: format!("all {} scan profiles failed, last: {last_reason}", ladder.len()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn output(code: Option<i32>, stderr: &str) -> ProcessOutput {
        ProcessOutput {
            exit_code: code,
            stdout: String::new(),
            stderr: stderr.to_string(),
            elapsed: Duration::from_millis(10),
        }
    }

    #[test]
    fn exit_codes_are_judged_per_policy() {
        assert_eq!(judge(&output(Some(0), "")), Verdict::Accept);
        assert_eq!(judge(&output(Some(1), "")), Verdict::Accept);
        assert!(matches!(judge(&output(Some(1), "[FTL] Could not find Template")), Verdict::Retry(_)));
        assert!(matches!(judge(&output(Some(2), "")), Verdict::Retry(_)));
        assert!(matches!(judge(&output(None, "")), Verdict::Retry(_)));
    }

    #[test]
    fn ladder_adds_specific_profiles_for_a_single_template() {
        let dir = Path::new("/t");
        let names = |ladder: Vec<ScanProfile>| ladder.into_iter().map(|p| p.name).collect::<Vec<_>>();

        let one = profile_ladder(dir, &[PathBuf::from("/t/only.yaml")], 2);
        assert_eq!(
            names(one.clone()),
            ["max-performance", "aggressive", "optimized", "fallback", "specific-max-performance", "specific-aggressive"]
        );
        assert_eq!(one[4].args[1], OsString::from("/t/only.yaml"));
        assert_eq!(one[0].args[3], OsString::from("4"));
        assert_eq!(one[3].args, vec![OsString::from("-t"), OsString::from("/t")]);
        assert!(one[3].is_last_resort() && !one[0].is_last_resort());

        let two = profile_ladder(dir, &[PathBuf::from("/t/a.yaml"), PathBuf::from("/t/b.yml")], 2);
        assert_eq!(two.len(), 4);
    }

    #[test]
    fn findings_skip_noise_lines() {
        let stdout = "[INF] Using templates\n{\"template-id\":\"x\",\"info\":{\"severity\":\"low\"}}\n{broken\n";
        let findings = parse_findings(stdout);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].template_id, "x");
    }
}

#[cfg(all(test, unix))]
mod process_tests {
    use super::*;
    use crate::core::scanner::fixtures::external_tools;
    use crate::core::test_support::script;
    use tempfile::TempDir;

    const FINDING: &str = r#"{"template-id":"git-exposure-check","info":{"name":"Git","severity":"medium"},"host":"https://a.example.com","matched-at":"https://a.example.com/.git/config"}"#;

    async fn live_set(dir: &Path) -> WorkingSet {
        let hosts = vec!["https://a.example.com".to_string()];
        let file = HandoffFile::from_lines(dir, ".txt", &hosts).await.unwrap();
        WorkingSet::file_backed(hosts, file)
    }

    #[tokio::test]
    async fn walks_ladder_past_rejected_profile() {
        let bin = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        let templates = work.path().join("templates");
        std::fs::create_dir_all(&templates).unwrap();
        std::fs::write(templates.join("git.yaml"), "id: git-exposure-check\n").unwrap();
        std::fs::write(templates.join("other.yml"), "id: other\n").unwrap();
        script(
            bin.path(),
            TOOL,
            &format!(
                r#"case "$*" in
  *--version*) echo "Nuclei Engine Version: v3"; exit 0;;
  *" -tl"*) exit 0;;
  *"-bulk-size 50"*) echo "flag provided but not defined" >&2; exit 2;;
esac
echo 'not json'
echo '{FINDING}'
exit 0"#
            ),
        );
        let tools = external_tools(bin.path(), work.path(), &templates);

        let out = run_nuclei(&tools, &live_set(work.path()).await).await.unwrap();
        assert_eq!(out.profile, "aggressive");
        assert_eq!(out.findings.len(), 1);
        assert_eq!(out.performance.hosts_scanned, 1);
        assert_eq!(out.performance.results_found, 1);
    }

    #[tokio::test]
    async fn missing_templates_fail_preflight_and_create_directory() {
        let bin = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        let templates = work.path().join("templates").join("custom");
        script(bin.path(), TOOL, "exit 0");
        let tools = external_tools(bin.path(), work.path(), &templates);

        let err = run_nuclei(&tools, &live_set(work.path()).await).await.unwrap_err();
        assert!(matches!(err, EngineError::Preflight { .. }));
        assert!(templates.is_dir());
    }

    #[tokio::test]
    async fn every_profile_rejected_is_process_failed() {
        let bin = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        std::fs::write(work.path().join("only.yaml"), "id: only\n").unwrap();
        script(
            bin.path(),
            TOOL,
            r#"case "$*" in *--version*) exit 0;; esac
exit 2"#,
        );
        let tools = external_tools(bin.path(), work.path(), work.path());

        let err = run_nuclei(&tools, &live_set(work.path()).await).await.unwrap_err();
        match err {
            EngineError::ProcessFailed { code, stderr, .. } => {
                assert_eq!(code, Some(2));
                assert!(stderr.contains("all 6 scan profiles failed"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
