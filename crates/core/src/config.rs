//! Domain-level settings for staging, rendering and execution.
//!
//! The API crate fills these from environment variables; tests build them
//! directly.

use std::path::PathBuf;
use std::time::Duration;

/// Default environment line format (bash `export`).
pub const DEFAULT_ENV_VAR_FORMAT: &str = "export {key}=\"{value}\"";

/// Settings shared by every invocation.
#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    /// Parent of the per-invocation working directories.
    pub temp_root: PathBuf,
    /// Shell used for scripts and preprocessing commands.
    pub shell: String,
    /// Extension of the rendered script file.
    pub script_extension: String,
    /// Environment line template with `{key}` and `{value}` placeholders.
    pub env_var_format: String,
    /// Preprocessing template applied to files without their own override.
    pub default_file_preprocessing: Option<String>,
    pub ssh: SshToolConfig,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            temp_root: std::env::temp_dir().join("shellgate"),
            shell: "bash".to_string(),
            script_extension: "sh".to_string(),
            env_var_format: DEFAULT_ENV_VAR_FORMAT.to_string(),
            default_file_preprocessing: None,
            ssh: SshToolConfig::default(),
        }
    }
}

/// External tools and paths used by the SSH strategies.
#[derive(Debug, Clone)]
pub struct SshToolConfig {
    pub ssh_binary: String,
    pub scp_binary: String,
    pub sshpass_binary: String,
    /// Remote parent directory the working directory is copied into.
    pub remote_temp_dir: String,
    /// Upper bound for the remote cleanup phase.
    pub cleanup_timeout: Duration,
}

impl Default for SshToolConfig {
    fn default() -> Self {
        Self {
            ssh_binary: "ssh".to_string(),
            scp_binary: "scp".to_string(),
            sshpass_binary: "sshpass".to_string(),
            remote_temp_dir: "/tmp".to_string(),
            cleanup_timeout: Duration::from_secs(30),
        }
    }
}

/// Bounds for pairing an invocation with its websocket.
#[derive(Debug, Clone, Copy)]
pub struct RendezvousConfig {
    /// How long either side waits for the other.
    pub attach_timeout: Duration,
    /// Interval between checks while waiting.
    pub poll_interval: Duration,
}

impl Default for RendezvousConfig {
    fn default() -> Self {
        Self {
            attach_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(100),
        }
    }
}
