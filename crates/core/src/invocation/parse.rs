//! Parsing of raw `key=value` caller input.
//!
//! Every malformed or duplicate entry is recorded; the batch is never
//! abandoned halfway, so one response lists all problems at once.

use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;

use super::types::{
    EnvironmentVariable, ParsedFile, ParsedScriptInvocation, ParsedVariable, RawInvocation,
    UploadedFile,
};
use crate::error::{InvocationResult, ValidationErrors};

static ENTRY_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([a-zA-Z0-9-_]+)=(.*)$").expect("entry pattern is valid"));

pub const MSG_INVALID_FORMAT: &str = "Invalid format, expected 'name=value'";

/// Split the trimmed `entry` into `(key, value)`, trimming the value.
pub fn split_entry(entry: &str) -> Option<(String, String)> {
    let captures = ENTRY_PATTERN.captures(entry.trim())?;
    Some((
        captures[1].to_string(),
        captures[2].trim().to_string(),
    ))
}

fn mask(text: &str) -> String {
    "*".repeat(text.chars().count())
}

/// Parse all raw arrays of `raw`, pairing file descriptors with `uploads`.
pub fn parse_invocation(
    raw: RawInvocation,
    uploads: Vec<UploadedFile>,
) -> InvocationResult<ParsedScriptInvocation> {
    let mut errors = ValidationErrors::new();

    // Plain and secret variables share one namespace.
    let mut variables: IndexMap<String, ParsedVariable> = IndexMap::new();
    let tagged = raw
        .variables
        .iter()
        .map(|e| (e, false))
        .chain(raw.secret_variables.iter().map(|e| (e, true)));
    for (entry, is_secret) in tagged {
        let Some((key, value)) = split_entry(entry) else {
            let reported = if is_secret { mask(entry) } else { entry.clone() };
            errors.add(reported, MSG_INVALID_FORMAT);
            continue;
        };
        if variables.contains_key(&key) {
            errors.add(key.clone(), format!("Variable '{key}' already provided"));
            continue;
        }
        variables.insert(key, ParsedVariable { value, is_secret });
    }

    let mut environment_variables: Vec<EnvironmentVariable> = Vec::new();
    for entry in &raw.environment_variables {
        let Some((key, value)) = split_entry(entry) else {
            errors.add(entry.clone(), MSG_INVALID_FORMAT);
            continue;
        };
        if environment_variables.iter().any(|e| e.key == key) {
            errors.add(
                key.clone(),
                format!("Environment variable '{key}' already provided"),
            );
            continue;
        }
        environment_variables.push(EnvironmentVariable { key, value });
    }

    let mut pending_uploads = uploads;
    let mut files: IndexMap<String, ParsedFile> = IndexMap::new();
    for entry in &raw.files {
        let Some((key, file_name)) = split_entry(entry) else {
            errors.add(entry.clone(), MSG_INVALID_FORMAT);
            continue;
        };
        if files.contains_key(&key) {
            errors.add(key.clone(), format!("File '{key}' already provided"));
            continue;
        }
        let Some(index) = pending_uploads.iter().position(|u| u.file_name == file_name) else {
            errors.add(key, format!("File '{file_name}' was not uploaded"));
            continue;
        };
        let upload = pending_uploads.swap_remove(index);
        files.insert(
            key,
            ParsedFile {
                file_name: upload.file_name,
                size: upload.content.len() as u64,
                content: upload.content,
            },
        );
    }

    if !pending_uploads.is_empty() {
        tracing::debug!(
            count = pending_uploads.len(),
            "Ignoring uploads without a matching file descriptor"
        );
    }

    errors.into_result(ParsedScriptInvocation {
        script_name: raw.script_name,
        websocket_session_id: raw.websocket_session_id,
        variables,
        environment_variables,
        files,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
