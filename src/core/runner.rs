// src/core/runner.rs

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::core::errors::EngineError;

/// A fully built invocation of one external tool.
///
/// Arguments are passed as an argument vector, never through a shell, so
/// target strings cannot inject commands. When a tool must read a handoff
/// file on stdin the file is opened and handed to the child directly, which
/// is the equivalent of `cat file | tool`.
#[derive(Debug, Clone)]
pub struct ToolCommand {
    tool: String,
    program: PathBuf,
    args: Vec<OsString>,
    env: Vec<(String, String)>,
    stdin_file: Option<PathBuf>,
    timeout: Duration,
}

impl ToolCommand {
    pub fn new(tool: &str, program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            tool: tool.to_string(),
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            stdin_file: None,
            timeout,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: &str, value: impl ToString) -> Self {
        self.env.push((key.to_string(), value.to_string()));
        self
    }

    pub fn stdin_file(mut self, path: &Path) -> Self {
        self.stdin_file = Some(path.to_path_buf());
        self
    }

    /// Human-readable command line for logs.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_os_str())
            .chain(self.args.iter().map(OsString::as_os_str))
            .map(|part| part.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Captured result of a finished process.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

impl ProcessOutput {
    pub fn exited_with(&self, codes: &[i32]) -> bool {
        self.exit_code.is_some_and(|code| codes.contains(&code))
    }

    /// Converts a non-accepted exit code into `ProcessFailed`.
    pub fn require(self, tool: &str, accepted: &[i32]) -> Result<Self, EngineError> {
        if self.exited_with(accepted) {
            return Ok(self);
        }
        let stderr = match self.stderr.trim() {
            "" => "no error output".to_string(),
            text => text.to_string(),
        };
        Err(EngineError::ProcessFailed {
            tool: tool.to_string(),
            code: self.exit_code,
            stderr,
        })
    }
}

/// Runs `command` to completion or until its timeout expires.
///
/// On timeout the whole process group is killed and `ProcessTimeout` is
/// returned. A program that cannot be found maps to `ToolNotFound`.
pub async fn run(command: &ToolCommand) -> Result<ProcessOutput, EngineError> {
    debug!(tool = %command.tool, cmd = %command.display(), "Spawning tool.");

    let mut cmd = Command::new(&command.program);
    cmd.args(&command.args)
        .envs(command.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    match &command.stdin_file {
        Some(path) => {
            let file = std::fs::File::open(path).map_err(|e| EngineError::io(path, e))?;
            cmd.stdin(Stdio::from(file));
        }
        None => {
            cmd.stdin(Stdio::null());
        }
    }

    // Own process group, so a timeout can take down grandchildren too.
    #[cfg(unix)]
    cmd.process_group(0);

    let started = Instant::now();
    let child = cmd.spawn().map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            EngineError::ToolNotFound {
                tool: command.tool.clone(),
            }
        } else {
            EngineError::Spawn {
                tool: command.tool.clone(),
                source,
            }
        }
    })?;
    let pid = child.id();

    match timeout(command.timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => {
            let result = ProcessOutput {
                exit_code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                elapsed: started.elapsed(),
            };
            debug!(
                tool = %command.tool,
                exit_code = ?result.exit_code,
                elapsed_ms = result.elapsed.as_millis() as u64,
                "Tool finished."
            );
            Ok(result)
        }
        Ok(Err(source)) => Err(EngineError::Spawn {
            tool: command.tool.clone(),
            source,
        }),
        Err(_) => {
            warn!(tool = %command.tool, timeout_secs = command.timeout.as_secs(), "Tool timed out, killing it.");
            if let Some(pid) = pid {
                kill_process_group(pid);
            }
            Err(EngineError::ProcessTimeout {
                tool: command.tool.clone(),
                after: command.timeout,
            })
        }
    }
}

#[cfg(unix)]
fn kill_process_group(pid: u32) {
    // The child was spawned as its own group leader, so its pid is the pgid.
    let rc = unsafe { libc::killpg(pid as libc::pid_t, libc::SIGKILL) };
    if rc != 0 {
        debug!(pid, "killpg failed; group already gone.");
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: u32) {
    // kill_on_drop already took care of the direct child.
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::core::test_support::script;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn captures_output_and_exit_code() {
        let dir = TempDir::new().unwrap();
        let tool = script(dir.path(), "echoer", r#"echo "out:$1"; echo "err:$FOO" >&2; exit 3"#);

        let cmd = ToolCommand::new("echoer", tool, Duration::from_secs(5))
            .arg("hello")
            .env("FOO", "bar");
        let output = run(&cmd).await.unwrap();

        assert_eq!(output.exit_code, Some(3));
        assert_eq!(output.stdout.trim(), "out:hello");
        assert_eq!(output.stderr.trim(), "err:bar");
        assert!(output.exited_with(&[3]));

        let err = output.require("echoer", &[0]).unwrap_err();
        assert!(matches!(err, EngineError::ProcessFailed { code: Some(3), .. }));
    }

    #[tokio::test]
    async fn arguments_are_not_shell_interpreted() {
        let dir = TempDir::new().unwrap();
        let tool = script(dir.path(), "argv", r#"printf '%s' "$1""#);

        let cmd = ToolCommand::new("argv", tool, Duration::from_secs(5)).arg("a.com; echo pwned");
        let output = run(&cmd).await.unwrap();
        assert_eq!(output.stdout, "a.com; echo pwned");
    }

    #[tokio::test]
    async fn stdin_is_fed_from_file() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("hosts.txt");
        fs::write(&input, "a.example.com\nb.example.com\n").unwrap();
        let tool = script(dir.path(), "counter", "wc -l");

        let cmd = ToolCommand::new("counter", tool, Duration::from_secs(5)).stdin_file(&input);
        let output = run(&cmd).await.unwrap();
        assert_eq!(output.stdout.trim(), "2");
    }

    #[tokio::test]
    async fn timeout_kills_and_reports() {
        let dir = TempDir::new().unwrap();
        let tool = script(dir.path(), "sleeper", "sleep 5");

        let cmd = ToolCommand::new("sleeper", tool, Duration::from_millis(200));
        let started = Instant::now();
        let err = run(&cmd).await.unwrap_err();

        assert!(matches!(err, EngineError::ProcessTimeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn missing_program_is_tool_not_found() {
        let cmd = ToolCommand::new("ghost", "ghost-tool-that-does-not-exist-91c2", Duration::from_secs(1));
        let err = run(&cmd).await.unwrap_err();
        assert!(matches!(err, EngineError::ToolNotFound { ref tool } if tool == "ghost"));
    }
}
