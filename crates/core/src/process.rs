//! Subprocess execution with line-by-line output streaming.
//!
//! [`SystemProcessRunner`] spawns a [`tokio::process::Command`], reads
//! stdout and stderr concurrently, and hands every line to the caller's
//! callback in the order it arrives. The [`ProcessRunner`] trait is the seam
//! the execution strategies and file preprocessing are written against.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::execution::output::OutputLine;

/// Maximum number of lines kept per stream in [`ProcessOutcome`].
///
/// The callback still receives every line; only the captured copy is capped.
const MAX_CAPTURED_LINES: usize = 10_000;

/// Program, arguments and working directory of one subprocess.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessCommand {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
}

impl ProcessCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
        }
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

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

/// Exit code plus the captured stdout and stderr lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutcome {
    /// Process exit code (`-1` if killed by signal).
    pub exit_code: i32,
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
}

impl ProcessOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("Failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error while waiting for process: {0}")]
    Io(#[from] std::io::Error),

    #[error("Process was cancelled")]
    Cancelled,
}

/// Callback receiving each output line as it is produced.
pub type LineCallback<'a> = &'a mut (dyn FnMut(OutputLine) + Send);

#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run `command` to completion, calling `on_line` for every line.
    ///
    /// Cancelling `cancel` kills the process and returns
    /// [`ProcessError::Cancelled`].
    async fn invoke(
        &self,
        command: &ProcessCommand,
        on_line: LineCallback<'_>,
        cancel: &CancellationToken,
    ) -> Result<ProcessOutcome, ProcessError>;
}

/// [`ProcessRunner`] backed by real OS processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProcessRunner;

#[async_trait]
impl ProcessRunner for SystemProcessRunner {
    async fn invoke(
        &self,
        command: &ProcessCommand,
        on_line: LineCallback<'_>,
        cancel: &CancellationToken,
    ) -> Result<ProcessOutcome, ProcessError> {
        if cancel.is_cancelled() {
            return Err(ProcessError::Cancelled);
        }

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &command.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|source| ProcessError::Spawn {
            program: command.program.clone(),
            source,
        })?;

        let (tx, mut rx) = mpsc::unbounded_channel::<(String, bool)>();
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_lines(stdout, false, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_lines(stderr, true, tx.clone()));
        }
        drop(tx);

        let mut outcome = ProcessOutcome::default();

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    let _ = child.kill().await;
                    return Err(ProcessError::Cancelled);
                }
                line = rx.recv() => {
                    let Some((text, is_error)) = line else { break };
                    let captured = if is_error { &mut outcome.stderr } else { &mut outcome.stdout };
                    if captured.len() < MAX_CAPTURED_LINES {
                        captured.push(text.clone());
                    }
                    on_line(OutputLine::now(text, is_error));
                }
            }
        }

        let status = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                let _ = child.kill().await;
                return Err(ProcessError::Cancelled);
            }
            status = child.wait() => status?,
        };

        outcome.exit_code = status.code().unwrap_or(-1);
        Ok(outcome)
    }
}

/// Read `stream` line by line and forward each line tagged with `is_error`.
///
/// Invalid UTF-8 is replaced rather than ending the stream.
async fn forward_lines<R>(stream: R, is_error: bool, tx: mpsc::UnboundedSender<(String, bool)>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                while matches!(buf.last(), Some(b'\n' | b'\r')) {
                    buf.pop();
                }
                let line = String::from_utf8_lossy(&buf).into_owned();
                if tx.send((line, is_error)).is_err() {
                    break;
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, "Output stream read failed");
                break;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
