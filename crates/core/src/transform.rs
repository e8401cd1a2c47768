//! Rendering of the command template into the final script file.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::invocation::{EnvironmentVariable, ScriptArgument};

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\(([a-zA-Z0-9-_]+)\)").expect("placeholder pattern is valid")
});

#[cfg(windows)]
pub const LINE_TERMINATOR: &str = "\r\n";
#[cfg(not(windows))]
pub const LINE_TERMINATOR: &str = "\n";

/// Replace every `$(name)` with the matching argument's value.
///
/// Placeholders without a matching argument are left as written.
pub fn render_command(template: &str, arguments: &[ScriptArgument]) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures| {
            arguments
                .iter()
                .find(|a| a.name == caps[1])
                .map(|a| a.value.clone())
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Render one environment line from a `{key}` / `{value}` format.
pub fn render_env_line(format: &str, variable: &EnvironmentVariable) -> String {
    format
        .replace("{key}", &variable.key)
        .replace("{value}", &variable.value)
}

/// Environment lines followed by the rendered command.
pub fn render_script(
    command_template: &str,
    arguments: &[ScriptArgument],
    environment: &[EnvironmentVariable],
    env_format: &str,
) -> String {
    let mut script = String::new();
    for variable in environment {
        script.push_str(&render_env_line(env_format, variable));
        script.push_str(LINE_TERMINATOR);
    }
    script.push_str(&render_command(command_template, arguments));
    script
}

/// Write `contents` to `{working_dir}/script.{extension}`.
pub async fn write_script_file(
    working_dir: &Path,
    extension: &str,
    contents: &str,
) -> std::io::Result<PathBuf> {
    let path = working_dir.join(script_file_name(extension));
    tokio::fs::write(&path, contents).await?;
    Ok(path)
}

pub fn script_file_name(extension: &str) -> String {
    format!("script.{}", extension.trim_start_matches('.'))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
