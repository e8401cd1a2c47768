use std::fmt;

use indexmap::IndexMap;
use serde::Serialize;

use crate::model::{Script, SshOptions};
use crate::types::SessionId;

/// Caller input exactly as received, before parsing.
#[derive(Debug, Clone, Default)]
pub struct RawInvocation {
    pub script_name: String,
    /// `name=value` entries.
    pub variables: Vec<String>,
    /// `name=value` entries whose values must be redacted.
    pub secret_variables: Vec<String>,
    /// `KEY=value` entries rendered as environment lines.
    pub environment_variables: Vec<String>,
    /// `fieldKey=filename` descriptors pairing a declared file with an upload.
    pub files: Vec<String>,
    pub websocket_session_id: Option<SessionId>,
}

/// An uploaded file body, matched to a descriptor by file name.
#[derive(Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub content: Vec<u8>,
}

impl fmt::Debug for UploadedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadedFile")
            .field("file_name", &self.file_name)
            .field("size", &self.content.len())
            .finish()
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct ParsedVariable {
    pub value: String,
    pub is_secret: bool,
}

impl fmt::Debug for ParsedVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = if self.is_secret { "<secret>" } else { &self.value };
        f.debug_struct("ParsedVariable")
            .field("value", &value)
            .field("is_secret", &self.is_secret)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvironmentVariable {
    pub key: String,
    pub value: String,
}

#[derive(Clone)]
pub struct ParsedFile {
    pub file_name: String,
    pub size: u64,
    pub content: Vec<u8>,
}

impl fmt::Debug for ParsedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParsedFile")
            .field("file_name", &self.file_name)
            .field("size", &self.size)
            .finish()
    }
}

/// Structured, deduplicated caller input.
#[derive(Debug, Clone, Default)]
pub struct ParsedScriptInvocation {
    pub script_name: String,
    pub websocket_session_id: Option<SessionId>,
    pub variables: IndexMap<String, ParsedVariable>,
    pub environment_variables: Vec<EnvironmentVariable>,
    pub files: IndexMap<String, ParsedFile>,
}

/// A value accepted for substitution into the command template.
#[derive(Clone, PartialEq, Eq)]
pub struct ScriptArgument {
    pub name: String,
    pub value: String,
    pub secret: bool,
}

impl fmt::Debug for ScriptArgument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = if self.secret { "<secret>" } else { &self.value };
        f.debug_struct("ScriptArgument")
            .field("name", &self.name)
            .field("value", &value)
            .field("secret", &self.secret)
            .finish()
    }
}

/// A file accepted for staging into the working directory.
#[derive(Clone)]
pub struct AcceptedFile {
    /// Declared file key; also the placeholder name of its staged path.
    pub name: String,
    pub destination_file_name: String,
    pub preprocessing: Option<String>,
    pub content: Vec<u8>,
}

impl fmt::Debug for AcceptedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AcceptedFile")
            .field("name", &self.name)
            .field("destination_file_name", &self.destination_file_name)
            .field("preprocessing", &self.preprocessing)
            .field("size", &self.content.len())
            .finish()
    }
}

/// Everything the execution stages need, produced by validation.
#[derive(Debug, Clone)]
pub struct ScriptInvocationContext {
    pub script: Script,
    pub arguments: Vec<ScriptArgument>,
    pub files: Vec<AcceptedFile>,
    pub environment_variables: Vec<EnvironmentVariable>,
    /// `None` means local execution.
    pub ssh: Option<SshOptions>,
    pub websocket_session_id: Option<SessionId>,
    pub correlation_id: String,
}

impl ScriptInvocationContext {
    /// Literal values that must never reach a caller-visible sink.
    pub fn secret_values(&self) -> Vec<String> {
        self.arguments
            .iter()
            .filter(|a| a.secret)
            .map(|a| a.value.clone())
            .collect()
    }
}
