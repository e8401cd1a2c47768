//! Output lines, result assembly and the sinks output is delivered to.

use serde::{Deserialize, Serialize};

use crate::redact::Redactor;
use crate::types::Timestamp;

/// One line of process output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputLine {
    pub timestamp: Timestamp,
    pub text: String,
    pub is_error: bool,
}

impl OutputLine {
    pub fn now(text: impl Into<String>, is_error: bool) -> Self {
        Self {
            timestamp: chrono::Utc::now(),
            text: text.into(),
            is_error,
        }
    }
}

/// Outcome of a completed invocation.
///
/// A nonzero `exit_code` is a normal result, not an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Lines not delivered live, in emission order.
    pub output: Vec<OutputLine>,
    /// Rendered command (redacted); empty unless the script shows it.
    pub command: String,
    pub exit_code: i32,
}

/// Destination for output lines while a script runs.
pub trait OutputSink: Send {
    fn push(&mut self, line: OutputLine);
}

/// Keeps lines in memory for the synchronous result.
#[derive(Debug, Default)]
pub struct BufferedOutput {
    lines: Vec<OutputLine>,
}

impl BufferedOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_lines(self) -> Vec<OutputLine> {
        self.lines
    }
}

impl OutputSink for BufferedOutput {
    fn push(&mut self, line: OutputLine) {
        self.lines.push(line);
    }
}

/// Discards everything; used when the script hides its output.
#[derive(Debug, Default)]
pub struct DiscardOutput;

impl OutputSink for DiscardOutput {
    fn push(&mut self, _line: OutputLine) {}
}

/// Redacts each line before handing it to the wrapped sink.
pub struct RedactingSink<'a> {
    inner: &'a mut dyn OutputSink,
    redactor: &'a Redactor,
}

impl<'a> RedactingSink<'a> {
    pub fn new(inner: &'a mut dyn OutputSink, redactor: &'a Redactor) -> Self {
        Self { inner, redactor }
    }
}

impl OutputSink for RedactingSink<'_> {
    fn push(&mut self, mut line: OutputLine) {
        line.text = self.redactor.redact_owned(line.text);
        self.inner.push(line);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
