//! Script and token definitions as loaded from definition files.
//!
//! These types are immutable once loaded. Field names follow the
//! snake_case layout of the JSON/YAML definition files.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Script
// ---------------------------------------------------------------------------

/// A named command template with typed variables and file inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Script {
    /// Filled from the definition's file name by the loader.
    #[serde(default)]
    pub name: String,
    /// Shell command with `$(name)` placeholders.
    pub command: String,
    /// Declared variables, in declaration order.
    #[serde(default)]
    pub variables: IndexMap<String, VariableDefinition>,
    /// Declared file inputs, in declaration order.
    #[serde(default)]
    pub files: IndexMap<String, FileDefinition>,
    #[serde(default)]
    pub show_command: bool,
    #[serde(default = "default_true")]
    pub show_output: bool,
    #[serde(default)]
    pub concurrency: ConcurrencyLevel,
}

fn default_true() -> bool {
    true
}

/// Whether simultaneous invocations of the same script are permitted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConcurrencyLevel {
    /// Unrestricted.
    #[default]
    Full,
    /// One invocation per script and caller token at a time.
    PerToken,
    /// One invocation per script at a time.
    None,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VariableDefinition {
    #[serde(rename = "type", default)]
    pub variable_type: VariableType,
    #[serde(default)]
    pub default_value: Option<String>,
    #[serde(default)]
    pub regex: Option<String>,
    #[serde(default)]
    pub secret: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableType {
    #[default]
    String,
    Integer,
    Decimal,
    Boolean,
    Ip,
    Ipv4,
    Ipv6,
    DnsName,
    Hostname,
    Email,
}

impl fmt::Display for VariableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Decimal => "decimal",
            Self::Boolean => "boolean",
            Self::Ip => "ip",
            Self::Ipv4 => "ipv4",
            Self::Ipv6 => "ipv6",
            Self::DnsName => "dns_name",
            Self::Hostname => "hostname",
            Self::Email => "email",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileDefinition {
    #[serde(default)]
    pub min_size: u64,
    /// `None` means unbounded.
    #[serde(default)]
    pub max_size: Option<u64>,
    #[serde(default)]
    pub accepted_extensions: Option<Vec<String>>,
    #[serde(default)]
    pub optional: bool,
    /// Overrides the globally configured preprocessing command.
    #[serde(default)]
    pub file_preprocessing: Option<String>,
}

// ---------------------------------------------------------------------------
// Token
// ---------------------------------------------------------------------------

/// Caller credential and its grants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub name: String,
    /// IPs or CIDR ranges; `None` means any source address.
    #[serde(default)]
    pub trusted_ips: Option<Vec<String>>,
    /// Default remote target for scripts run with this token.
    #[serde(default)]
    pub ssh: Option<SshOptions>,
    /// `None` grants access to every script.
    #[serde(default)]
    pub available_scripts: Option<HashMap<String, AccessDeclaration>>,
}

/// Per-token, per-script overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccessDeclaration {
    #[serde(default)]
    pub ssh: Option<SshOptions>,
    /// Extra regex per variable, checked in addition to the script's own.
    #[serde(default)]
    pub variable_constraints: HashMap<String, String>,
    /// Fixed values the caller may not supply.
    #[serde(default)]
    pub locked_variables: HashMap<String, String>,
}

// ---------------------------------------------------------------------------
// SSH
// ---------------------------------------------------------------------------

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SshOptions {
    pub host: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub private_key_path: Option<PathBuf>,
    #[serde(default)]
    pub host_key_checking: HostKeyChecking,
}

fn default_ssh_port() -> u16 {
    22
}

impl SshOptions {
    /// `user@host` destination understood by `ssh` and `scp`.
    pub fn destination(&self) -> String {
        format!("{}@{}", self.username, self.host)
    }
}

impl fmt::Debug for SshOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SshOptions")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("private_key_path", &self.private_key_path)
            .field("host_key_checking", &self.host_key_checking)
            .finish()
    }
}

/// Value passed to OpenSSH's `StrictHostKeyChecking` option.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostKeyChecking {
    #[default]
    AcceptNew,
    Yes,
    No,
    Off,
}

impl HostKeyChecking {
    pub fn as_ssh_value(self) -> &'static str {
        match self {
            Self::AcceptNew => "accept-new",
            Self::Yes => "yes",
            Self::No => "no",
            Self::Off => "off",
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
