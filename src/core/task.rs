//! Diagnostics and output event types
//!
//! A [`Task`] is one entry in the diagnostics view: a severity, a message,
//! and optionally the file/line it refers to. Output events carry the raw
//! text a running step produces, tagged with a format so the presentation
//! layer can route stdout, stderr, and engine messages differently.

use std::fmt;
use std::path::PathBuf;

/// Severity of a diagnostic entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

/// One entry in the diagnostics list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub severity: Severity,
    pub description: String,
    /// Source file the diagnostic refers to, when known
    pub file: Option<PathBuf>,
    /// 1-based line in `file`, when known
    pub line: Option<u32>,
    /// What produced the diagnostic, usually a project or step name
    pub origin: Option<String>,
}

impl Task {
    pub fn error(description: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            description: description.into(),
            file: None,
            line: None,
            origin: None,
        }
    }

    pub fn warning(description: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            description: description.into(),
            file: None,
            line: None,
            origin: None,
        }
    }

    pub fn with_file(mut self, file: impl Into<PathBuf>, line: Option<u32>) -> Self {
        self.file = Some(file.into());
        self.line = line;
        self
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.severity, self.description)?;
        if let Some(file) = &self.file {
            write!(f, " ({}", file.display())?;
            if let Some(line) = self.line {
                write!(f, ":{line}")?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

/// How a piece of output text should be presented
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Raw stdout of a child process
    Stdout,
    /// Raw stderr of a child process
    Stderr,
    /// Informational message from the engine itself
    NormalMessage,
    /// Error message from the engine itself
    ErrorMessage,
}

/// Whether the consumer should append a newline after the text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NewlineMode {
    Append,
    DontAppend,
}

/// One chunk of build output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputEvent {
    pub text: String,
    pub format: OutputFormat,
    pub newline: NewlineMode,
}

impl OutputEvent {
    pub fn new(text: impl Into<String>, format: OutputFormat, newline: NewlineMode) -> Self {
        Self {
            text: text.into(),
            format,
            newline,
        }
    }

    /// A line of output: text without a trailing newline, one appended on display
    pub fn line(text: impl Into<String>, format: OutputFormat) -> Self {
        Self::new(text, format, NewlineMode::Append)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_display_with_location() {
        let task = Task::error("missing separator").with_file("Makefile", Some(3));
        assert_eq!(task.to_string(), "error: missing separator (Makefile:3)");
    }

    #[test]
    fn test_task_display_without_location() {
        let task = Task::warning("build directory reused");
        assert_eq!(task.to_string(), "warning: build directory reused");
    }

    #[test]
    fn test_output_line_appends_newline() {
        let event = OutputEvent::line("hello", OutputFormat::Stdout);
        assert_eq!(event.newline, NewlineMode::Append);
        assert_eq!(event.format, OutputFormat::Stdout);
    }
}
