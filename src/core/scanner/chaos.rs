// src/core/scanner/chaos.rs

use tracing::info;

use super::ExternalTools;
use crate::core::errors::EngineError;
use crate::core::handoff::parse_host_lines;
use crate::core::runner::run;

const TOOL: &str = "chaos";

/// Queries the chaos subdomain dataset for `target`.
///
/// Requires an API key; without one the stage resolves to skipped. The key
/// is passed through the environment, never on the command line.
pub async fn run_chaos(tools: &ExternalTools, target: &str) -> Result<Vec<String>, EngineError> {
    let Some(key) = tools.chaos_key.as_deref() else {
        return Err(EngineError::ConfigurationMissing(
            "no intelligence-lookup credential configured".to_string(),
        ));
    };

    info!(target, "Starting intelligence lookup.");
    let command = tools
        .command(TOOL, tools.timeouts.lookup())
        .args(["-d", target, "-o", "-", "-silent"])
        .env("CHAOS_API_KEY", key);

    let output = run(&command).await?.require(TOOL, &[0])?;
    let subdomains = parse_host_lines(&output.stdout);
    info!(target, count = subdomains.len(), "Intelligence lookup finished.");
    Ok(subdomains)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::core::scanner::fixtures::{external_tools, with_chaos_key};
    use crate::core::test_support::script;
    use tempfile::TempDir;

    #[tokio::test]
    async fn no_key_means_configuration_missing() {
        let dir = TempDir::new().unwrap();
        let tools = external_tools(dir.path(), dir.path(), dir.path());
        let err = run_chaos(&tools, "example.com").await.unwrap_err();
        assert!(matches!(err, EngineError::ConfigurationMissing(_)));
    }

    #[tokio::test]
    async fn key_is_passed_via_environment() {
        let dir = TempDir::new().unwrap();
        script(
            dir.path(),
            TOOL,
            r#"[ "$CHAOS_API_KEY" = "k3y" ] || exit 9; echo b.example.com; echo c.example.com"#,
        );
        let tools = with_chaos_key(external_tools(dir.path(), dir.path(), dir.path()), "k3y");

        let subdomains = run_chaos(&tools, "example.com").await.unwrap();
        assert_eq!(subdomains, vec!["b.example.com", "c.example.com"]);
    }
}
