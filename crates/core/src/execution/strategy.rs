//! Where and how a rendered script runs.
//!
//! Every strategy goes through the same three phases: copy the working
//! directory to the target, execute the script there, clean up. The local
//! strategy has nothing to copy or clean; the SSH strategies use `scp` and
//! `ssh` and differ only in how they authenticate.

use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;

use crate::config::ExecutionConfig;
use crate::error::{InvocationError, InvocationResult};
use crate::execution::output::{OutputLine, OutputSink};
use crate::execution::ssh::{self, PasswordFile, SshCommands};
use crate::model::SshOptions;
use crate::process::{LineCallback, ProcessCommand, ProcessError, ProcessOutcome, ProcessRunner};

/// Exit code reported when the working directory could not be copied.
pub const COPY_FAILED_EXIT_CODE: i32 = -1;

/// What a strategy needs to run one invocation.
pub struct ExecutionJob<'a> {
    pub runner: &'a dyn ProcessRunner,
    pub config: &'a ExecutionConfig,
    /// Local working directory holding the script and staged files.
    pub working_dir: &'a Path,
    /// File name of the rendered script inside `working_dir`.
    pub script_file: &'a str,
}

#[derive(Debug, Clone)]
pub enum ExecutionStrategy {
    Local,
    PasswordSsh {
        target: SshOptions,
        password: String,
    },
    ExplicitKeySsh {
        target: SshOptions,
        private_key: PathBuf,
    },
    ImplicitKeySsh {
        target: SshOptions,
    },
}

impl ExecutionStrategy {
    /// No target means local; a password wins over an explicit key.
    pub fn select(ssh: Option<&SshOptions>) -> Self {
        let Some(target) = ssh else {
            return Self::Local;
        };
        if let Some(password) = &target.password {
            Self::PasswordSsh {
                target: target.clone(),
                password: password.clone(),
            }
        } else if let Some(key) = &target.private_key_path {
            Self::ExplicitKeySsh {
                target: target.clone(),
                private_key: key.clone(),
            }
        } else {
            Self::ImplicitKeySsh {
                target: target.clone(),
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::PasswordSsh { .. } => "password_ssh",
            Self::ExplicitKeySsh { .. } => "explicit_key_ssh",
            Self::ImplicitKeySsh { .. } => "implicit_key_ssh",
        }
    }

    /// Run all phases and return the script's exit code.
    ///
    /// A failed copy yields [`COPY_FAILED_EXIT_CODE`] without executing.
    /// Once the copy succeeded, cleanup runs exactly once whatever the
    /// execute phase returned.
    pub async fn run(
        &self,
        job: &ExecutionJob<'_>,
        sink: &mut dyn OutputSink,
        cancel: &CancellationToken,
    ) -> InvocationResult<i32> {
        if !self.copy(job, cancel).await? {
            return Ok(COPY_FAILED_EXIT_CODE);
        }

        let result = self.execute(job, sink, cancel).await;
        self.cleanup(job).await;

        if let Ok(exit_code) = &result {
            tracing::debug!(strategy = self.name(), exit_code = *exit_code, "Execution finished");
        }
        result
    }

    /// Copy the working directory to the target. `Ok(false)` on failure.
    async fn copy(&self, job: &ExecutionJob<'_>, cancel: &CancellationToken) -> InvocationResult<bool> {
        let Some(commands) = self.commands(job) else {
            return Ok(true);
        };

        let command = commands.copy_dir(job.working_dir);
        let mut log_line = |line: OutputLine| {
            tracing::debug!(text = %line.text, is_error = line.is_error, "copy output");
        };
        match self.run_phase(job, &command, &mut log_line, cancel).await {
            Ok(outcome) if outcome.success() => Ok(true),
            Ok(outcome) => {
                tracing::warn!(
                    strategy = self.name(),
                    exit_code = outcome.exit_code,
                    stderr = %outcome.stderr.join("\n"),
                    "Copy to remote host failed",
                );
                Ok(false)
            }
            Err(InvocationError::Cancelled) => Err(InvocationError::Cancelled),
            Err(e) => {
                tracing::warn!(strategy = self.name(), error = %e, "Copy to remote host failed");
                Ok(false)
            }
        }
    }

    async fn execute(
        &self,
        job: &ExecutionJob<'_>,
        sink: &mut dyn OutputSink,
        cancel: &CancellationToken,
    ) -> InvocationResult<i32> {
        let command = match self.commands(job) {
            None => ProcessCommand::new(&job.config.shell)
                .arg(job.script_file)
                .current_dir(job.working_dir),
            Some(commands) => {
                let remote_dir = self.remote_dir(job)?;
                commands.remote(format!(
                    "cd {} && {} {}",
                    ssh::shell_quote(&remote_dir),
                    job.config.shell,
                    ssh::shell_quote(job.script_file),
                ))
            }
        };

        let outcome = self
            .run_phase(job, &command, &mut |line| sink.push(line), cancel)
            .await?;
        Ok(outcome.exit_code)
    }

    /// Remove the remote copy. Failures are logged only.
    async fn cleanup(&self, job: &ExecutionJob<'_>) {
        let Some(commands) = self.commands(job) else {
            return;
        };
        let remote_dir = match self.remote_dir(job) {
            Ok(dir) => dir,
            Err(e) => {
                tracing::warn!(error = %e, "Remote cleanup skipped");
                return;
            }
        };

        let command = commands.remote(format!("rm -rf {}", ssh::shell_quote(&remote_dir)));
        // Cleanup outlives a cancelled invocation.
        let cancel = CancellationToken::new();
        let mut ignore = |_: OutputLine| {};
        let phase = self.run_phase(job, &command, &mut ignore, &cancel);

        match tokio::time::timeout(job.config.ssh.cleanup_timeout, phase).await {
            Ok(Ok(outcome)) if outcome.success() => {
                tracing::debug!(remote_dir = %remote_dir, "Remote working directory removed");
            }
            Ok(Ok(outcome)) => {
                tracing::warn!(
                    remote_dir = %remote_dir,
                    exit_code = outcome.exit_code,
                    "Remote cleanup failed",
                );
            }
            Ok(Err(e)) => {
                tracing::warn!(remote_dir = %remote_dir, error = %e, "Remote cleanup failed");
            }
            Err(_) => {
                tracing::warn!(remote_dir = %remote_dir, "Remote cleanup timed out");
            }
        }
    }

    /// Run one phase, wrapping it in `sshpass` for the password strategy.
    ///
    /// The password file lives only for the duration of this phase.
    async fn run_phase(
        &self,
        job: &ExecutionJob<'_>,
        command: &ProcessCommand,
        on_line: LineCallback<'_>,
        cancel: &CancellationToken,
    ) -> InvocationResult<ProcessOutcome> {
        let outcome: Result<ProcessOutcome, ProcessError> = match self {
            Self::PasswordSsh { password, .. } => {
                let password_file = PasswordFile::create(&job.config.temp_root, password).await?;
                let wrapped = ssh::with_password_file(
                    command.clone(),
                    &job.config.ssh.sshpass_binary,
                    password_file.path(),
                );
                let outcome = job.runner.invoke(&wrapped, on_line, cancel).await;
                drop(password_file);
                outcome
            }
            _ => job.runner.invoke(command, on_line, cancel).await,
        };
        Ok(outcome?)
    }

    fn commands<'a>(&'a self, job: &'a ExecutionJob<'_>) -> Option<SshCommands<'a>> {
        let tools = &job.config.ssh;
        match self {
            Self::Local => None,
            Self::PasswordSsh { target, .. } | Self::ImplicitKeySsh { target } => {
                Some(SshCommands::new(tools, target, None))
            }
            Self::ExplicitKeySsh {
                target,
                private_key,
            } => Some(SshCommands::new(tools, target, Some(private_key.as_path()))),
        }
    }

    fn remote_dir(&self, job: &ExecutionJob<'_>) -> InvocationResult<String> {
        ssh::remote_dir(&job.config.ssh.remote_temp_dir, job.working_dir).ok_or_else(|| {
            InvocationError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "working directory has no base name",
            ))
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
