use std::path::PathBuf;
use std::time::Duration;

use shellgate_core::config::{
    ExecutionConfig, RendezvousConfig, SshToolConfig, DEFAULT_ENV_VAR_FORMAT,
};

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `3600`).
    pub request_timeout_secs: u64,
    /// Directory holding script definitions.
    pub scripts_dir: PathBuf,
    /// Directory holding token definitions.
    pub tokens_dir: PathBuf,
    /// Shared lock-store directory; `None` keeps locks in memory.
    pub state_dir: Option<PathBuf>,
    pub execution: ExecutionConfig,
    pub rendezvous: RendezvousConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                  | Default                    |
    /// |--------------------------|----------------------------|
    /// | `HOST`                   | `0.0.0.0`                  |
    /// | `PORT`                   | `3000`                     |
    /// | `CORS_ORIGINS`           | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS`   | `3600`                     |
    /// | `SCRIPTS_DIR`            | `./scripts`                |
    /// | `TOKENS_DIR`             | `./tokens`                 |
    /// | `STATE_DIR`              | unset (in-memory locks)    |
    /// | `TEMP_DIR`               | `{system temp}/shellgate`  |
    /// | `SHELL_BINARY`           | `bash`                     |
    /// | `SCRIPT_EXTENSION`       | `sh`                       |
    /// | `ENV_VAR_FORMAT`         | `export {key}="{value}"`   |
    /// | `FILE_PREPROCESSING`     | unset                      |
    /// | `SSH_BINARY`             | `ssh`                      |
    /// | `SCP_BINARY`             | `scp`                      |
    /// | `SSHPASS_BINARY`         | `sshpass`                  |
    /// | `SSH_REMOTE_TEMP_DIR`    | `/tmp`                     |
    /// | `WS_ATTACH_TIMEOUT_MS`   | `5000`                     |
    /// | `WS_ATTACH_POLL_MS`      | `100`                      |
    pub fn from_env() -> Self {
        let host = env_or("HOST", "0.0.0.0");

        let port: u16 = env_or("PORT", "3000")
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = env_or("CORS_ORIGINS", "http://localhost:5173")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = env_or("REQUEST_TIMEOUT_SECS", "3600")
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let attach_timeout_ms: u64 = env_or("WS_ATTACH_TIMEOUT_MS", "5000")
            .parse()
            .expect("WS_ATTACH_TIMEOUT_MS must be a valid u64");
        let poll_ms: u64 = env_or("WS_ATTACH_POLL_MS", "100")
            .parse()
            .expect("WS_ATTACH_POLL_MS must be a valid u64");
        assert!(poll_ms > 0, "WS_ATTACH_POLL_MS must be positive");

        let defaults = ExecutionConfig::default();
        let execution = ExecutionConfig {
            temp_root: env_opt("TEMP_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.temp_root),
            shell: env_or("SHELL_BINARY", "bash"),
            script_extension: env_or("SCRIPT_EXTENSION", "sh"),
            env_var_format: env_or("ENV_VAR_FORMAT", DEFAULT_ENV_VAR_FORMAT),
            default_file_preprocessing: env_opt("FILE_PREPROCESSING"),
            ssh: SshToolConfig {
                ssh_binary: env_or("SSH_BINARY", "ssh"),
                scp_binary: env_or("SCP_BINARY", "scp"),
                sshpass_binary: env_or("SSHPASS_BINARY", "sshpass"),
                remote_temp_dir: env_or("SSH_REMOTE_TEMP_DIR", "/tmp"),
                ..defaults.ssh
            },
        };

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            scripts_dir: PathBuf::from(env_or("SCRIPTS_DIR", "./scripts")),
            tokens_dir: PathBuf::from(env_or("TOKENS_DIR", "./tokens")),
            state_dir: env_opt("STATE_DIR").map(PathBuf::from),
            execution,
            rendezvous: RendezvousConfig {
                attach_timeout: Duration::from_millis(attach_timeout_ms),
                poll_interval: Duration::from_millis(poll_ms),
            },
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Unset and empty both mean "not configured".
fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
