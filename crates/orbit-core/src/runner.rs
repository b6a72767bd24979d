use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::LauncherConfig;
use crate::error::ExecutionError;

/// Captured result of one script run that exited successfully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub elapsed: Duration,
}

/// Runs a rendered script and reports its output.
///
/// Implementations must not leave the process running once `timeout` elapses.
pub trait ScriptRunner: Send + Sync {
    fn run(
        &self,
        script: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<ScriptOutput, ExecutionError>> + Send;
}

/// Invokes an external interpreter with the script as its final argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterpreterRunner {
    program: String,
    args: Vec<String>,
}

impl Default for InterpreterRunner {
    fn default() -> Self {
        Self::from_config(&LauncherConfig::default())
    }
}

impl InterpreterRunner {
    #[must_use]
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    #[must_use]
    pub fn from_config(config: &LauncherConfig) -> Self {
        Self::new(config.interpreter.clone(), config.interpreter_args.clone())
    }

    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }
}

/// Output still arriving after the interpreter exits, typically from a
/// background process holding the pipes, is collected for at most this long.
const DRAIN_TIMEOUT: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

#[derive(Debug, Default)]
struct Captured {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

impl Captured {
    fn push(&mut self, stream: Stream, chunk: &[u8]) {
        match stream {
            Stream::Stdout => self.stdout.extend_from_slice(chunk),
            Stream::Stderr => self.stderr.extend_from_slice(chunk),
        }
    }
}

fn forward<R>(
    reader: Option<R>,
    stream: Stream,
    tx: mpsc::Sender<(Stream, Vec<u8>)>,
) -> Option<JoinHandle<()>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut reader = reader?;
    Some(tokio::spawn(async move {
        let mut buf = [0u8; 4096];
        loop {
            match reader.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if tx.send((stream, buf[..n].to_vec())).await.is_err() {
                        break;
                    }
                }
            }
        }
    }))
}

impl ScriptRunner for InterpreterRunner {
    async fn run(&self, script: &str, timeout: Duration) -> Result<ScriptOutput, ExecutionError> {
        let start = Instant::now();
        let spawn_error = |source| ExecutionError::Spawn {
            program: self.program.clone(),
            script: script.to_owned(),
            source,
        };
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(script)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(spawn_error)?;

        let (tx, mut rx) = mpsc::channel(64);
        let readers: Vec<JoinHandle<()>> = [
            forward(child.stdout.take(), Stream::Stdout, tx.clone()),
            forward(child.stderr.take(), Stream::Stderr, tx),
        ]
        .into_iter()
        .flatten()
        .collect();

        let mut captured = Captured::default();
        let deadline = tokio::time::Instant::now() + timeout;

        // Only the interpreter itself is bounded by the timeout; output is
        // consumed while waiting so a full pipe cannot stall it.
        let status = {
            let mut wait = std::pin::pin!(child.wait());
            loop {
                tokio::select! {
                    status = &mut wait => break Some(status),
                    Some((stream, chunk)) = rx.recv() => captured.push(stream, &chunk),
                    () = tokio::time::sleep_until(deadline) => break None,
                }
            }
        };

        let Some(status) = status else {
            let _ = child.kill().await;
            readers.iter().for_each(JoinHandle::abort);
            tracing::warn!(program = %self.program, "script timed out after {}s", timeout.as_secs());
            return Err(ExecutionError::Timeout {
                timeout,
                script: script.to_owned(),
            });
        };

        let drain_deadline = tokio::time::Instant::now() + DRAIN_TIMEOUT;
        loop {
            tokio::select! {
                chunk = rx.recv() => match chunk {
                    Some((stream, chunk)) => captured.push(stream, &chunk),
                    None => break,
                },
                () = tokio::time::sleep_until(drain_deadline) => {
                    tracing::debug!(program = %self.program, "output pipes still open after exit");
                    break;
                }
            }
        }
        readers.iter().for_each(JoinHandle::abort);

        let status = status.map_err(spawn_error)?;
        let elapsed = start.elapsed();
        let stdout = String::from_utf8_lossy(&captured.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&captured.stderr).into_owned();

        if !status.success() {
            return Err(ExecutionError::classify(status.code(), &stderr, script));
        }

        Ok(ScriptOutput {
            stdout,
            stderr,
            exit_code: status.code().unwrap_or_default(),
            elapsed,
        })
    }
}
