//! Writing accepted files into the working directory and preprocessing them.

use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use crate::error::{InvocationError, InvocationResult};
use crate::execution::OutputLine;
use crate::invocation::{AcceptedFile, ScriptArgument};
use crate::process::{ProcessCommand, ProcessRunner};
use crate::redact::Redactor;

/// Sub-directory of the working directory holding staged files.
pub const FILES_DIR: &str = "files";

/// Placeholder for the staged path inside a preprocessing command.
pub const FILE_PLACEHOLDER: &str = "$(file)";

/// Tools and settings used while staging.
pub struct Stager<'a> {
    pub runner: &'a dyn ProcessRunner,
    pub shell: &'a str,
    pub redactor: &'a Redactor,
}

impl Stager<'_> {
    /// Stage every file in order, stopping at the first preprocessing
    /// failure.
    ///
    /// Returns one non-secret argument per file whose value is the staged
    /// absolute path.
    pub async fn stage_all(
        &self,
        working_dir: &Path,
        files: &[AcceptedFile],
        cancel: &CancellationToken,
    ) -> InvocationResult<Vec<ScriptArgument>> {
        if files.is_empty() {
            return Ok(Vec::new());
        }

        let files_dir = std::path::absolute(working_dir.join(FILES_DIR))?;
        tokio::fs::create_dir_all(&files_dir).await?;

        let mut arguments = Vec::with_capacity(files.len());
        for file in files {
            let path = write_file(&files_dir, file).await?;
            if let Some(template) = &file.preprocessing {
                self.preprocess(working_dir, file, &path, template, cancel)
                    .await?;
            }
            arguments.push(ScriptArgument {
                name: file.name.clone(),
                value: path.to_string_lossy().into_owned(),
                secret: false,
            });
        }
        Ok(arguments)
    }

    async fn preprocess(
        &self,
        working_dir: &Path,
        file: &AcceptedFile,
        path: &Path,
        template: &str,
        cancel: &CancellationToken,
    ) -> InvocationResult<()> {
        let command_line = template.replace(
            FILE_PLACEHOLDER,
            &escape_whitespace(&path.to_string_lossy()),
        );
        let command = ProcessCommand::new(self.shell)
            .arg("-c")
            .arg(command_line)
            .current_dir(working_dir);

        let mut log_line = |line: OutputLine| {
            tracing::debug!(
                file = %file.name,
                text = %self.redactor.redact(&line.text),
                is_error = line.is_error,
                "preprocessing output",
            );
        };
        let outcome = self.runner.invoke(&command, &mut log_line, cancel).await?;

        if !outcome.success() {
            tracing::warn!(
                file = %file.name,
                exit_code = outcome.exit_code,
                "File preprocessing failed",
            );
            return Err(InvocationError::Preprocessing {
                file: file.name.clone(),
                exit_code: outcome.exit_code,
                errors: outcome
                    .stderr
                    .into_iter()
                    .map(|line| self.redactor.redact_owned(line))
                    .collect(),
            });
        }
        Ok(())
    }
}

async fn write_file(files_dir: &Path, file: &AcceptedFile) -> std::io::Result<PathBuf> {
    let path = files_dir.join(&file.destination_file_name);
    let mut out = tokio::fs::File::create(&path).await?;
    out.write_all(&file.content).await?;
    out.flush().await?;
    tracing::debug!(file = %file.name, size = file.content.len(), "File staged");
    Ok(path)
}

/// Backslash-escape whitespace so a path survives shell word splitting.
pub fn escape_whitespace(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if c.is_whitespace() {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::process::SystemProcessRunner;

    fn accepted(name: &str, dest: &str, content: &[u8], preprocessing: Option<&str>) -> AcceptedFile {
        AcceptedFile {
            name: name.into(),
            destination_file_name: dest.into(),
            preprocessing: preprocessing.map(str::to_string),
            content: content.to_vec(),
        }
    }

    fn stager(redactor: &Redactor) -> Stager<'_> {
        Stager {
            runner: &SystemProcessRunner,
            shell: "bash",
            redactor,
        }
    }

    #[test]
    fn whitespace_is_escaped() {
        assert_eq!(escape_whitespace("/tmp/my file.txt"), r"/tmp/my\ file.txt");
        assert_eq!(escape_whitespace("/plain"), "/plain");
    }

    #[tokio::test]
    async fn files_are_written_and_become_arguments() {
        let dir = tempfile::tempdir().unwrap();
        let redactor = Redactor::default();
        let files = vec![
            accepted("cert", "server.pem", b"PEM DATA", None),
            accepted("config", "app.yml", b"key: value", None),
        ];

        let args = stager(&redactor)
            .stage_all(dir.path(), &files, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(args.len(), 2);
        assert_eq!(args[0].name, "cert");
        assert!(!args[0].secret);
        let staged = Path::new(&args[0].value);
        assert!(staged.is_absolute());
        assert!(staged.ends_with("files/server.pem"));
        assert_eq!(std::fs::read(staged).unwrap(), b"PEM DATA");
    }

    #[tokio::test]
    async fn preprocessing_runs_against_staged_path() {
        let dir = tempfile::tempdir().unwrap();
        let redactor = Redactor::default();
        let files = vec![accepted(
            "data",
            "in put.txt",
            b"hello",
            Some("tr a-z A-Z < $(file) > $(file).up && mv $(file).up $(file)"),
        )];

        let args = stager(&redactor)
            .stage_all(dir.path(), &files, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(std::fs::read_to_string(&args[0].value).unwrap(), "HELLO");
    }

    #[tokio::test]
    async fn failing_preprocessing_reports_redacted_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let redactor = Redactor::new(vec!["topsecret".to_string()]);
        let files = vec![
            accepted("first", "a.txt", b"x", Some("echo 'bad topsecret' >&2; exit 4")),
            accepted("second", "b.txt", b"y", None),
        ];

        let result = stager(&redactor)
            .stage_all(dir.path(), &files, &CancellationToken::new())
            .await;

        assert_matches!(
            result,
            Err(InvocationError::Preprocessing { file, exit_code: 4, errors })
                if file == "first" && errors == vec!["bad *********".to_string()]
        );
        assert!(!dir.path().join(FILES_DIR).join("b.txt").exists());
    }

    #[tokio::test]
    async fn no_files_creates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let redactor = Redactor::default();
        let args = stager(&redactor)
            .stage_all(dir.path(), &[], &CancellationToken::new())
            .await
            .unwrap();
        assert!(args.is_empty());
        assert!(!dir.path().join(FILES_DIR).exists());
    }
}
