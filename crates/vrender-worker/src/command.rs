//! External render command runner.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{WorkerError, WorkerResult};

/// Captured output of a finished command.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// A fully specified command line with environment and timeout.
#[derive(Debug, Clone)]
pub struct RenderCommand {
    program: String,
    args: Vec<String>,
    envs: Vec<(String, String)>,
    timeout: Option<Duration>,
}

impl RenderCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
            timeout: None,
        }
    }

    /// Build from a program-plus-arguments list; `None` when empty.
    pub fn from_parts(parts: &[String]) -> Option<Self> {
        let (program, args) = parts.split_first()?;
        Some(Self::new(program.clone()).args(args.iter().cloned()))
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    /// Run to completion, handing every stdout/stderr line to `on_line`.
    ///
    /// A non-zero exit is returned as [`WorkerError::CommandFailed`] carrying
    /// the captured output. On timeout the child is killed.
    pub async fn run<F>(&self, on_line: F) -> WorkerResult<CommandOutput>
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        which::which(&self.program)
            .map_err(|_| WorkerError::CommandNotFound(self.program.clone()))?;

        debug!("Running render command: {} {}", self.program, self.args.join(" "));

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .envs(self.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let on_line = Arc::new(on_line);
        let stdout_task = child
            .stdout
            .take()
            .map(|out| tokio::spawn(collect_lines(out, Arc::clone(&on_line))));
        let stderr_task = child
            .stderr
            .take()
            .map(|err| tokio::spawn(collect_lines(err, Arc::clone(&on_line))));

        let waited = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, child.wait()).await.ok(),
            None => Some(child.wait().await),
        };

        let Some(status) = waited else {
            let secs = self.timeout.map(|t| t.as_secs()).unwrap_or_default();
            warn!("Render command timed out after {} seconds, killing process", secs);
            let _ = child.kill().await;
            for task in [stdout_task, stderr_task].into_iter().flatten() {
                task.abort();
            }
            return Err(WorkerError::Timeout(secs));
        };
        let status = status?;

        let output = CommandOutput {
            stdout: join_output(stdout_task).await,
            stderr: join_output(stderr_task).await,
        };

        if status.success() {
            Ok(output)
        } else {
            Err(WorkerError::command_failed(
                format!("{} exited with {}", self.program, status),
                output.stdout,
                output.stderr,
                status.code(),
            ))
        }
    }
}

async fn collect_lines<R, F>(reader: R, on_line: Arc<F>) -> String
where
    R: AsyncRead + Unpin,
    F: Fn(&str) + ?Sized,
{
    let mut collected = String::new();
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let raw = buf.strip_suffix(b"\n").unwrap_or(&buf[..]);
                let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
                let line = String::from_utf8_lossy(raw);
                on_line(&line);
                collected.push_str(&line);
                collected.push('\n');
            }
            Err(e) => {
                warn!("Failed to read render command output: {}", e);
                break;
            }
        }
    }
    collected
}

async fn join_output(task: Option<tokio::task::JoinHandle<String>>) -> String {
    match task {
        Some(task) => task.await.unwrap_or_default(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn sh(script: &str) -> RenderCommand {
        RenderCommand::new("sh").arg("-c").arg(script)
    }

    #[tokio::test]
    async fn test_captures_both_streams() {
        let output = sh("echo out; echo err 1>&2").run(|_| {}).await.unwrap();
        assert_eq!(output.stdout, "out\n");
        assert_eq!(output.stderr, "err\n");
    }

    #[tokio::test]
    async fn test_streams_lines_to_callback() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        sh("echo 10%; echo 55%")
            .run(move |line| sink.lock().unwrap().push(line.to_string()))
            .await
            .unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["10%", "55%"]);
    }

    #[tokio::test]
    async fn test_invalid_utf8_does_not_stop_reading() {
        let output = sh(r"printf 'frame \377 10%%\nafter\n'").run(|_| {}).await.unwrap();
        assert_eq!(output.stdout, "frame \u{FFFD} 10%\nafter\n");
    }

    #[tokio::test]
    async fn test_last_line_without_newline() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let output = sh(r"printf 'first\r\nlast'")
            .run(move |line| sink.lock().unwrap().push(line.to_string()))
            .await
            .unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["first", "last"]);
        assert_eq!(output.stdout, "first\nlast\n");
    }

    #[tokio::test]
    async fn test_passes_environment() {
        let output = sh("printf '%s' \"$RENDER_TOKEN\"")
            .env("RENDER_TOKEN", "abc")
            .run(|_| {})
            .await
            .unwrap();
        assert_eq!(output.stdout, "abc\n");
    }

    #[tokio::test]
    async fn test_non_zero_exit_keeps_output() {
        let err = sh("echo partial; echo 'AccessDenied: nope' 1>&2; exit 3")
            .run(|_| {})
            .await
            .unwrap_err();
        match err {
            WorkerError::CommandFailed {
                stdout,
                stderr,
                exit_code,
                ..
            } => {
                assert_eq!(stdout, "partial\n");
                assert!(stderr.contains("AccessDenied"));
                assert_eq!(exit_code, Some(3));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_timeout_kills_child() {
        let started = std::time::Instant::now();
        let err = sh("sleep 5")
            .with_timeout(Duration::from_millis(200))
            .run(|_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::Timeout(_)));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_missing_program() {
        let err = RenderCommand::new("definitely-not-a-render-binary")
            .run(|_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::CommandNotFound(_)));
    }

    #[test]
    fn test_from_parts() {
        let parts = vec!["npx".to_string(), "remotion".to_string()];
        let cmd = RenderCommand::from_parts(&parts).unwrap();
        assert_eq!(cmd.program(), "npx");
        assert_eq!(cmd.get_args(), ["remotion".to_string()]);
        assert!(RenderCommand::from_parts(&[]).is_none());
    }
}
