//! Command lines for the OpenSSH based strategies.
//!
//! Everything here is argument construction; running the commands is left
//! to the [`ProcessRunner`](crate::process::ProcessRunner) so the shapes can
//! be asserted without a remote host.

use std::path::{Path, PathBuf};

use crate::config::SshToolConfig;
use crate::model::SshOptions;
use crate::process::ProcessCommand;

/// Builds `scp` and `ssh` invocations for one target.
pub struct SshCommands<'a> {
    tools: &'a SshToolConfig,
    target: &'a SshOptions,
    private_key: Option<&'a Path>,
}

impl<'a> SshCommands<'a> {
    pub fn new(
        tools: &'a SshToolConfig,
        target: &'a SshOptions,
        private_key: Option<&'a Path>,
    ) -> Self {
        Self {
            tools,
            target,
            private_key,
        }
    }

    /// `scp -r -P <port> -o StrictHostKeyChecking=<mode> [-i key] <dir> <user@host>:<remote_temp>`
    pub fn copy_dir(&self, local_dir: &Path) -> ProcessCommand {
        ProcessCommand::new(&self.tools.scp_binary)
            .arg("-r")
            .args(self.connection_options("-P"))
            .arg(local_dir.to_string_lossy())
            .arg(format!(
                "{}:{}",
                self.target.destination(),
                self.tools.remote_temp_dir
            ))
    }

    /// `ssh -p <port> -o StrictHostKeyChecking=<mode> [-i key] <user@host> <command>`
    pub fn remote(&self, remote_command: impl Into<String>) -> ProcessCommand {
        ProcessCommand::new(&self.tools.ssh_binary)
            .args(self.connection_options("-p"))
            .arg(self.target.destination())
            .arg(remote_command)
    }

    fn connection_options(&self, port_flag: &str) -> Vec<String> {
        let mut options = vec![
            port_flag.to_string(),
            self.target.port.to_string(),
            "-o".to_string(),
            format!(
                "StrictHostKeyChecking={}",
                self.target.host_key_checking.as_ssh_value()
            ),
        ];
        if let Some(key) = self.private_key {
            options.push("-i".to_string());
            options.push(key.to_string_lossy().into_owned());
        }
        options
    }
}

/// Prefix `command` with `sshpass -f <password_file>`.
pub fn with_password_file(
    command: ProcessCommand,
    sshpass_binary: &str,
    password_file: &Path,
) -> ProcessCommand {
    let mut wrapped = ProcessCommand::new(sshpass_binary)
        .arg("-f")
        .arg(password_file.to_string_lossy())
        .arg(command.program)
        .args(command.args);
    wrapped.working_dir = command.working_dir;
    wrapped
}

/// Remote location of a copied working directory.
pub fn remote_dir(remote_temp_dir: &str, working_dir: &Path) -> Option<String> {
    let base = working_dir.file_name()?.to_string_lossy();
    Some(format!("{}/{}", remote_temp_dir.trim_end_matches('/'), base))
}

/// Single-quote `value` for a POSIX shell.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

// ---------------------------------------------------------------------------
// Password file
// ---------------------------------------------------------------------------

/// A password written to a private local file for `sshpass -f`.
///
/// The file is removed when the guard is dropped.
#[derive(Debug)]
pub struct PasswordFile {
    path: PathBuf,
}

impl PasswordFile {
    /// Create the file inside `dir` readable by the owner only.
    pub async fn create(dir: &Path, password: &str) -> std::io::Result<Self> {
        use tokio::io::AsyncWriteExt;

        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(format!(".sshpass-{}", uuid::Uuid::new_v4()));

        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        options.mode(0o600);

        let mut file = options.open(&path).await?;
        let guard = Self { path };
        file.write_all(password.as_bytes()).await?;
        file.flush().await?;
        Ok(guard)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PasswordFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(error = %e, "Failed to remove password file");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
