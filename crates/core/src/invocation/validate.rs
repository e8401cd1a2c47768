//! Validation of parsed input against a script's contract and a token's
//! access declaration.
//!
//! Every declared variable and file is checked; failures are collected and
//! returned together as one
//! [`InvocationError::Validation`](crate::error::InvocationError::Validation).

use std::path::Path;

use indexmap::IndexMap;
use regex::Regex;

use super::type_check::passes_type_validation;
use super::types::{
    AcceptedFile, ParsedFile, ParsedScriptInvocation, ScriptArgument, ScriptInvocationContext,
};
use crate::error::{InvocationResult, ValidationErrors};
use crate::model::{AccessDeclaration, FileDefinition, Script, SshOptions, VariableDefinition};

pub const MSG_NO_VALUE: &str = "No value provided";
pub const MSG_LOCKED: &str = "Variable is locked and can not be provided";
pub const MSG_NO_FILE: &str = "No file provided";

/// Inputs that come from the caller's token rather than the request body.
#[derive(Debug, Clone, Copy, Default)]
pub struct Grants<'a> {
    pub declaration: Option<&'a AccessDeclaration>,
    pub token_ssh: Option<&'a SshOptions>,
}

/// Validate `parsed` and assemble the invocation context.
pub fn validate_invocation(
    script: Script,
    grants: Grants<'_>,
    parsed: ParsedScriptInvocation,
    default_preprocessing: Option<&str>,
    correlation_id: String,
) -> InvocationResult<ScriptInvocationContext> {
    let mut errors = ValidationErrors::new();

    let arguments = validate_variables(&script, grants.declaration, &parsed, &mut errors);
    let files = validate_files(&script, parsed.files, default_preprocessing, &mut errors);

    for name in parsed.variables.keys() {
        if !script.variables.contains_key(name) {
            tracing::debug!(variable = %name, "Ignoring undeclared variable");
        }
    }

    let ssh = grants
        .declaration
        .and_then(|d| d.ssh.as_ref())
        .or(grants.token_ssh)
        .cloned();

    errors.into_result(ScriptInvocationContext {
        script,
        arguments,
        files,
        environment_variables: parsed.environment_variables,
        ssh,
        websocket_session_id: parsed.websocket_session_id,
        correlation_id,
    })
}

fn validate_variables(
    script: &Script,
    declaration: Option<&AccessDeclaration>,
    parsed: &ParsedScriptInvocation,
    errors: &mut ValidationErrors,
) -> Vec<ScriptArgument> {
    let mut arguments = Vec::with_capacity(script.variables.len());

    for (name, definition) in &script.variables {
        let locked = declaration.and_then(|d| d.locked_variables.get(name));
        let supplied = parsed.variables.get(name);

        let (value, caller_secret) = match (supplied, locked) {
            (Some(_), Some(_)) => {
                errors.add(name.clone(), MSG_LOCKED);
                continue;
            }
            (Some(var), None) => (var.value.clone(), var.is_secret),
            (None, Some(locked)) => (locked.clone(), false),
            (None, None) => match &definition.default_value {
                Some(default) => (default.clone(), false),
                None => {
                    errors.add(name.clone(), MSG_NO_VALUE);
                    continue;
                }
            },
        };

        let constraint = declaration.and_then(|d| d.variable_constraints.get(name));
        if let Err(message) = check_value(definition, constraint, &value) {
            errors.add(name.clone(), message);
            continue;
        }

        arguments.push(ScriptArgument {
            name: name.clone(),
            value,
            secret: definition.secret || caller_secret,
        });
    }

    arguments
}

/// Regex, constraint and type checks for one value, stopping at the first failure.
fn check_value(
    definition: &VariableDefinition,
    constraint: Option<&String>,
    value: &str,
) -> Result<(), String> {
    if let Some(pattern) = &definition.regex {
        if !matches_pattern(pattern, value)? {
            return Err(format!("Value does not match regex '{pattern}'"));
        }
    }

    if let Some(pattern) = constraint {
        if !matches_pattern(pattern, value)? {
            return Err(format!("Value does not match constraint '{pattern}'"));
        }
    }

    if !passes_type_validation(definition.variable_type, value) {
        return Err(format!(
            "Value does not pass type validation for type '{}'",
            definition.variable_type
        ));
    }

    Ok(())
}

fn matches_pattern(pattern: &str, value: &str) -> Result<bool, String> {
    Regex::new(pattern)
        .map(|re| re.is_match(value))
        .map_err(|_| format!("Regex '{pattern}' is invalid"))
}

fn validate_files(
    script: &Script,
    mut supplied: IndexMap<String, ParsedFile>,
    default_preprocessing: Option<&str>,
    errors: &mut ValidationErrors,
) -> Vec<AcceptedFile> {
    let mut accepted = Vec::with_capacity(script.files.len());

    for (name, definition) in &script.files {
        let Some(file) = supplied.shift_remove(name) else {
            if !definition.optional {
                errors.add(name.clone(), MSG_NO_FILE);
            }
            continue;
        };

        let messages = file_violations(definition, &file.file_name, file.size);
        if !messages.is_empty() {
            for message in messages {
                errors.add(name.clone(), message);
            }
            continue;
        }

        accepted.push(AcceptedFile {
            name: name.clone(),
            destination_file_name: destination_file_name(name, &file.file_name),
            preprocessing: definition
                .file_preprocessing
                .clone()
                .or_else(|| default_preprocessing.map(str::to_string)),
            content: file.content,
        });
    }

    for name in supplied.keys() {
        tracing::debug!(file = %name, "Ignoring undeclared file");
    }

    accepted
}

fn file_violations(definition: &FileDefinition, file_name: &str, size: u64) -> Vec<String> {
    let mut messages = Vec::new();

    if size < definition.min_size {
        messages.push(format!(
            "File contains too few bytes (min. {})",
            definition.min_size
        ));
    }
    if let Some(max) = definition.max_size {
        if size > max {
            messages.push(format!("File contains too many bytes (max. {max})"));
        }
    }

    if let Some(accepted) = &definition.accepted_extensions {
        let extension = normalize_extension(
            Path::new(file_name)
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or_default(),
        );
        let allowed = accepted.iter().any(|a| normalize_extension(a) == extension);
        if !allowed {
            messages.push(format!(
                "File extension '{extension}' is not accepted (accepted: {})",
                accepted
                    .iter()
                    .map(|a| normalize_extension(a))
                    .collect::<Vec<_>>()
                    .join(", ")
            ));
        }
    }

    messages
}

fn normalize_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_lowercase()
}

/// Base name of the uploaded file, falling back to the declared key.
fn destination_file_name(key: &str, file_name: &str) -> String {
    Path::new(file_name)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty() && *n != "..")
        .unwrap_or(key)
        .to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use assert_matches::assert_matches;

    use super::*;
    use crate::error::InvocationError;
    use crate::invocation::types::ParsedVariable;
    use crate::model::{ConcurrencyLevel, HostKeyChecking, VariableType};

    fn variable(variable_type: VariableType) -> VariableDefinition {
        VariableDefinition {
            variable_type,
            ..Default::default()
        }
    }

    fn script(variables: Vec<(&str, VariableDefinition)>) -> Script {
        Script {
            name: "test".into(),
            command: "echo".into(),
            variables: variables
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            files: IndexMap::new(),
            show_command: true,
            show_output: true,
            concurrency: ConcurrencyLevel::Full,
        }
    }

    fn parsed(vars: &[(&str, &str)]) -> ParsedScriptInvocation {
        ParsedScriptInvocation {
            script_name: "test".into(),
            variables: vars
                .iter()
                .map(|(k, v)| {
                    (
                        k.to_string(),
                        ParsedVariable {
                            value: v.to_string(),
                            is_secret: false,
                        },
                    )
                })
                .collect(),
            ..Default::default()
        }
    }

    fn run(
        script: Script,
        declaration: Option<&AccessDeclaration>,
        parsed: ParsedScriptInvocation,
    ) -> InvocationResult<ScriptInvocationContext> {
        let grants = Grants {
            declaration,
            token_ssh: None,
        };
        validate_invocation(script, grants, parsed, None, "corr".into())
    }

    fn errors_of(result: InvocationResult<ScriptInvocationContext>) -> ValidationErrors {
        match result {
            Err(InvocationError::Validation(errors)) => errors,
            other => panic!("expected validation failure, got {other:?}"),
        }
    }

    fn locked(name: &str, value: &str) -> AccessDeclaration {
        AccessDeclaration {
            locked_variables: HashMap::from([(name.to_string(), value.to_string())]),
            ..Default::default()
        }
    }

    #[test]
    fn default_value_used_when_not_supplied() {
        let mut def = variable(VariableType::String);
        def.default_value = Some("world".into());

        let ctx = run(script(vec![("name", def)]), None, parsed(&[])).unwrap();
        assert_eq!(ctx.arguments.len(), 1);
        assert_eq!(ctx.arguments[0].value, "world");
        assert!(!ctx.arguments[0].secret);
    }

    #[test]
    fn missing_value_without_default() {
        let errors = errors_of(run(
            script(vec![("name", variable(VariableType::String))]),
            None,
            parsed(&[]),
        ));
        assert_eq!(errors.get("name"), Some(&[MSG_NO_VALUE.to_string()][..]));
    }

    #[test]
    fn locked_value_wins_over_default() {
        let mut def = variable(VariableType::String);
        def.default_value = Some("default".into());
        let decl = locked("env", "production");

        let ctx = run(script(vec![("env", def)]), Some(&decl), parsed(&[])).unwrap();
        assert_eq!(ctx.arguments[0].value, "production");
    }

    #[test]
    fn locked_variable_rejects_caller_value_even_with_default() {
        let mut def = variable(VariableType::String);
        def.default_value = Some("default".into());
        let decl = locked("env", "production");

        let errors = errors_of(run(
            script(vec![("env", def)]),
            Some(&decl),
            parsed(&[("env", "production")]),
        ));
        assert_eq!(errors.get("env"), Some(&[MSG_LOCKED.to_string()][..]));
    }

    #[test]
    fn locked_value_still_checked_against_script_regex() {
        let mut def = variable(VariableType::String);
        def.regex = Some("^[a-z]+$".into());
        let decl = locked("env", "PROD-1");

        let errors = errors_of(run(script(vec![("env", def)]), Some(&decl), parsed(&[])));
        assert_matches!(errors.get("env"), Some([msg]) if msg.contains("^[a-z]+$"));
    }

    #[test]
    fn script_regex_failure_quotes_pattern() {
        let mut def = variable(VariableType::String);
        def.regex = Some("^v\\d+$".into());

        let errors = errors_of(run(
            script(vec![("tag", def)]),
            None,
            parsed(&[("tag", "latest")]),
        ));
        assert_eq!(
            errors.get("tag"),
            Some(&["Value does not match regex '^v\\d+$'".to_string()][..])
        );
    }

    #[test]
    fn declaration_constraint_is_anded() {
        let def = variable(VariableType::String);
        let decl = AccessDeclaration {
            variable_constraints: HashMap::from([("host".to_string(), "^web-".to_string())]),
            ..Default::default()
        };

        let ok = run(
            script(vec![("host", def.clone())]),
            Some(&decl),
            parsed(&[("host", "web-1")]),
        );
        assert!(ok.is_ok());

        let errors = errors_of(run(
            script(vec![("host", def)]),
            Some(&decl),
            parsed(&[("host", "db-1")]),
        ));
        assert_matches!(errors.get("host"), Some([msg]) if msg.contains("constraint"));
    }

    #[test]
    fn integer_type_failure_mentions_type_validation() {
        let errors = errors_of(run(
            script(vec![("port", variable(VariableType::Integer))]),
            None,
            parsed(&[("port", "abc")]),
        ));
        assert_matches!(
            errors.get("port"),
            Some([msg]) if msg.contains("does not pass type validation")
        );
    }

    #[test]
    fn failures_are_collected_across_variables() {
        let errors = errors_of(run(
            script(vec![
                ("port", variable(VariableType::Integer)),
                ("host", variable(VariableType::Hostname)),
                ("name", variable(VariableType::String)),
            ]),
            None,
            parsed(&[("port", "x"), ("host", "not a host")]),
        ));
        let keys: Vec<&str> = errors.keys().collect();
        assert_eq!(keys, vec!["port", "host", "name"]);
    }

    #[test]
    fn secret_flag_is_declared_or_caller_marked() {
        let mut declared = variable(VariableType::String);
        declared.secret = true;
        let mut input = parsed(&[("a", "1")]);
        input.variables.insert(
            "b".into(),
            ParsedVariable {
                value: "2".into(),
                is_secret: true,
            },
        );

        let ctx = run(
            script(vec![
                ("a", declared),
                ("b", variable(VariableType::String)),
            ]),
            None,
            input,
        )
        .unwrap();
        assert!(ctx.arguments.iter().all(|a| a.secret));
        assert_eq!(ctx.secret_values(), vec!["1".to_string(), "2".to_string()]);
    }

    #[test]
    fn effective_ssh_prefers_declaration() {
        let token_ssh = SshOptions {
            host: "token-host".into(),
            port: 22,
            username: "u".into(),
            password: None,
            private_key_path: None,
            host_key_checking: HostKeyChecking::AcceptNew,
        };
        let mut decl_ssh = token_ssh.clone();
        decl_ssh.host = "decl-host".into();
        let decl = AccessDeclaration {
            ssh: Some(decl_ssh),
            ..Default::default()
        };

        let ctx = validate_invocation(
            script(vec![]),
            Grants {
                declaration: Some(&decl),
                token_ssh: Some(&token_ssh),
            },
            parsed(&[]),
            None,
            "c".into(),
        )
        .unwrap();
        assert_eq!(ctx.ssh.unwrap().host, "decl-host");

        let ctx = validate_invocation(
            script(vec![]),
            Grants {
                declaration: None,
                token_ssh: Some(&token_ssh),
            },
            parsed(&[]),
            None,
            "c".into(),
        )
        .unwrap();
        assert_eq!(ctx.ssh.unwrap().host, "token-host");
    }

    // -- files --------------------------------------------------------------

    fn file_script(definition: FileDefinition) -> Script {
        let mut s = script(vec![]);
        s.files.insert("cert".into(), definition);
        s
    }

    fn with_file(name: &str, size: usize) -> ParsedScriptInvocation {
        let mut p = parsed(&[]);
        p.files.insert(
            "cert".into(),
            ParsedFile {
                file_name: name.into(),
                size: size as u64,
                content: vec![b'x'; size],
            },
        );
        p
    }

    #[test]
    fn oversized_file_rejected() {
        let def = FileDefinition {
            max_size: Some(100),
            ..Default::default()
        };
        let errors = errors_of(run(file_script(def), None, with_file("cert.pem", 200)));
        assert_eq!(
            errors.get("cert"),
            Some(&["File contains too many bytes (max. 100)".to_string()][..])
        );
    }

    #[test]
    fn undersized_file_rejected() {
        let def = FileDefinition {
            min_size: 10,
            ..Default::default()
        };
        let errors = errors_of(run(file_script(def), None, with_file("cert.pem", 2)));
        assert_matches!(errors.get("cert"), Some([msg]) if msg.contains("min. 10"));
    }

    #[test]
    fn missing_required_file() {
        let errors = errors_of(run(
            file_script(FileDefinition::default()),
            None,
            parsed(&[]),
        ));
        assert_eq!(errors.get("cert"), Some(&[MSG_NO_FILE.to_string()][..]));
    }

    #[test]
    fn missing_optional_file_is_fine() {
        let def = FileDefinition {
            optional: true,
            ..Default::default()
        };
        let ctx = run(file_script(def), None, parsed(&[])).unwrap();
        assert!(ctx.files.is_empty());
    }

    #[test]
    fn extension_check_is_case_insensitive_and_dot_stripped() {
        let def = FileDefinition {
            accepted_extensions: Some(vec![".PEM".into(), "crt".into()]),
            ..Default::default()
        };
        assert!(run(file_script(def.clone()), None, with_file("a.pem", 1)).is_ok());
        assert!(run(file_script(def.clone()), None, with_file("a.CRT", 1)).is_ok());

        let errors = errors_of(run(file_script(def), None, with_file("a.exe", 1)));
        assert_matches!(errors.get("cert"), Some([msg]) if msg.contains("'exe'"));
    }

    #[test]
    fn preprocessing_override_beats_default() {
        let def = FileDefinition {
            file_preprocessing: Some("scan $(file)".into()),
            ..Default::default()
        };
        let ctx = validate_invocation(
            file_script(def),
            Grants::default(),
            with_file("a.pem", 1),
            Some("default $(file)"),
            "c".into(),
        )
        .unwrap();
        assert_eq!(ctx.files[0].preprocessing.as_deref(), Some("scan $(file)"));

        let ctx = validate_invocation(
            file_script(FileDefinition::default()),
            Grants::default(),
            with_file("a.pem", 1),
            Some("default $(file)"),
            "c".into(),
        )
        .unwrap();
        assert_eq!(ctx.files[0].preprocessing.as_deref(), Some("default $(file)"));
    }

    #[test]
    fn destination_name_strips_directories() {
        assert_eq!(destination_file_name("cert", "../../etc/passwd"), "passwd");
        assert_eq!(destination_file_name("cert", "a.pem"), "a.pem");
        assert_eq!(destination_file_name("cert", ""), "cert");
    }
}
