//! `RunShellScript`: run a script in a fresh shell process.

use crate::tools::{ParamType, ToolArguments, ToolContext, ToolError, ToolRegistry, ToolSpec};
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tokio::runtime::Handle;

pub const NAME: &str = "RunShellScript";

/// Configuration for the shell tool.
#[derive(Debug, Clone)]
pub struct ShellConfig {
    /// Shell executable.
    pub program: String,
    /// Arguments placed before the script text.
    pub args: Vec<String>,
    /// Working directory for every invocation; inherits ours when unset.
    pub working_dir: Option<PathBuf>,
    /// Only the last `max_output_lines` lines of stdout are returned.
    pub max_output_lines: usize,
}

impl Default for ShellConfig {
    fn default() -> Self {
        #[cfg(windows)]
        let (program, args) = ("powershell", vec!["-NoProfile", "-Command"]);
        #[cfg(not(windows))]
        let (program, args) = ("sh", vec!["-c"]);

        Self {
            program: program.into(),
            args: args.into_iter().map(String::from).collect(),
            working_dir: None,
            max_output_lines: 200,
        }
    }
}

pub fn spec() -> ToolSpec {
    ToolSpec::new(
        NAME,
        "Execute a shell script on the local machine and return its output",
    )
    .param("script", ParamType::String, true, "The script to execute")
    .param(
        "description",
        ParamType::String,
        false,
        "A short description of what the script does",
    )
}

/// Register the tool. The handler drives the child on the runtime that runs
/// the dispatch loop, from the blocking pool.
pub fn register(registry: &mut ToolRegistry, config: ShellConfig) {
    registry.register(spec(), move |args, ctx| {
        let handle = Handle::try_current().map_err(|e| ToolError::Execution(e.to_string()))?;
        handle.block_on(run(&config, args, ctx))
    });
}

async fn run(
    config: &ShellConfig,
    args: &ToolArguments,
    ctx: &ToolContext,
) -> Result<String, ToolError> {
    let script = args.require_string("script")?;
    if let Some(description) = args.string("description") {
        tracing::info!(%description, "running shell script");
    }
    tracing::debug!(program = %config.program, %script, "spawning shell");

    let mut cmd = Command::new(&config.program);
    cmd.args(&config.args)
        .arg(&script)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = &config.working_dir {
        cmd.current_dir(dir);
    }

    let child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => return Ok(format!("Shell execution error: {e}")),
    };

    // Dropping the wait future drops the child, which kills it.
    let output = tokio::select! {
        biased;
        _ = ctx.cancel.cancelled() => {
            tracing::debug!("shell script cancelled");
            return Err(ToolError::Cancelled);
        }
        output = tokio::time::timeout(ctx.remaining(), child.wait_with_output()) => match output {
            Ok(output) => output.map_err(|e| ToolError::Execution(e.to_string()))?,
            Err(_) => {
                tracing::debug!(timeout_ms = ctx.timeout.as_millis(), "shell script timed out");
                return Err(ctx.stop_error());
            }
        },
    };

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    if !output.status.success() || !stderr.trim().is_empty() {
        let detail = if stderr.trim().is_empty() {
            output.status.to_string()
        } else {
            stderr.trim_end().to_string()
        };
        return Ok(format!("Script execution failed:\n{detail}"));
    }

    let lines: Vec<&str> = stdout.lines().collect();
    if lines.iter().all(|line| line.trim().is_empty()) {
        return Ok("Script executed successfully with no output".into());
    }
    let start = lines.len().saturating_sub(config.max_output_lines);
    Ok(lines[start..].join("\n"))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::tools::extract;
    use std::time::{Duration, Instant};
    use tokio_util::sync::CancellationToken;

    fn ctx() -> ToolContext {
        ToolContext::new(CancellationToken::new(), Duration::from_secs(10))
    }

    fn script(text: &str) -> ToolArguments {
        extract(&serde_json::json!({ "script": text }).to_string()).unwrap()
    }

    async fn sh(text: &str) -> Result<String, ToolError> {
        run(&ShellConfig::default(), &script(text), &ctx()).await
    }

    #[tokio::test]
    async fn returns_stdout() {
        assert_eq!(sh("echo hello").await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn reports_stderr_as_failure() {
        let out = sh("echo oops >&2; exit 3").await.unwrap();
        assert_eq!(out, "Script execution failed:\noops");
    }

    #[tokio::test]
    async fn reports_non_zero_exit_without_stderr() {
        let out = sh("exit 2").await.unwrap();
        assert!(out.starts_with("Script execution failed:\n"));
    }

    #[tokio::test]
    async fn empty_output_message() {
        let out = sh("true").await.unwrap();
        assert_eq!(out, "Script executed successfully with no output");
    }

    #[tokio::test]
    async fn keeps_trailing_lines() {
        let config = ShellConfig {
            max_output_lines: 2,
            ..ShellConfig::default()
        };
        let out = run(&config, &script("printf '1\\n2\\n3\\n4\\n'"), &ctx())
            .await
            .unwrap();
        assert_eq!(out, "3\n4");
    }

    #[tokio::test]
    async fn runs_in_working_dir() {
        let config = ShellConfig {
            working_dir: Some(PathBuf::from("/")),
            ..ShellConfig::default()
        };
        assert_eq!(run(&config, &script("pwd"), &ctx()).await.unwrap(), "/");
    }

    #[tokio::test]
    async fn state_does_not_leak_between_calls() {
        sh("export LEAK=1; cd /").await.unwrap();
        assert_eq!(sh("echo \"[$LEAK]\"").await.unwrap(), "[]");
    }

    #[tokio::test]
    async fn spawn_failure_is_textual() {
        let config = ShellConfig {
            program: "/nonexistent/shell".into(),
            ..ShellConfig::default()
        };
        let out = run(&config, &script("echo hi"), &ctx()).await.unwrap();
        assert!(out.starts_with("Shell execution error: "));
    }

    #[tokio::test]
    async fn missing_script_is_invalid_input() {
        let err = run(&ShellConfig::default(), &ToolArguments::new(), &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn cancellation_kills_child() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let ctx = ToolContext::new(cancel, Duration::from_secs(10));

        let started = Instant::now();
        let err = run(&ShellConfig::default(), &script("sleep 5"), &ctx)
            .await
            .unwrap_err();
        assert_eq!(err, ToolError::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn deadline_holds_when_background_job_keeps_output_open() {
        let ctx = ToolContext::new(CancellationToken::new(), Duration::from_millis(300));

        let started = Instant::now();
        let err = run(&ShellConfig::default(), &script("sleep 3 & echo hi"), &ctx)
            .await
            .unwrap_err();
        assert_eq!(err, ToolError::Timeout(300));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn registered_handler_runs_from_blocking_pool() {
        let mut registry = ToolRegistry::new();
        register(&mut registry, ShellConfig::default());
        let handler = registry.resolve(NAME).unwrap();

        let out = tokio::task::spawn_blocking(move || handler(&script("echo pooled"), &ctx()))
            .await
            .unwrap();
        assert_eq!(out.unwrap(), "pooled");
    }
}
