//! Per-run diagnostic sink
//!
//! The compiler never aborts a run on a bad rule. Instead every problem is
//! recorded here with the source location of the offending rule, and also
//! emitted as a `tracing` event so a subscriber can show progress live.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of a diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Severity::Debug => "debug",
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        f.write_str(label)
    }
}

/// Location of an entity or rule in its FSH source file
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceLocation {
    pub file: String,
    pub start_line: u32,
    pub end_line: u32,
}

impl SourceLocation {
    pub fn new(file: impl Into<String>, start_line: u32, end_line: u32) -> Self {
        Self {
            file: file.into(),
            start_line,
            end_line,
        }
    }

    /// Location spanning a single line
    pub fn line(file: impl Into<String>, line: u32) -> Self {
        Self::new(file, line, line)
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.end_line > self.start_line {
            write!(
                f,
                "File: {} Line: {} - {}",
                self.file, self.start_line, self.end_line
            )
        } else {
            write!(f, "File: {} Line: {}", self.file, self.start_line)
        }
    }
}

/// A single message produced during compilation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<SourceLocation>,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(location) => write!(f, "{}: {}\n  {}", self.severity, self.message, location),
            None => write!(f, "{}: {}", self.severity, self.message),
        }
    }
}

/// Collects diagnostics for one compilation run
#[derive(Debug, Default, Clone)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(&mut self, message: impl Into<String>, location: Option<&SourceLocation>) {
        self.push(Severity::Error, message.into(), location);
    }

    pub fn warning(&mut self, message: impl Into<String>, location: Option<&SourceLocation>) {
        self.push(Severity::Warning, message.into(), location);
    }

    pub fn info(&mut self, message: impl Into<String>, location: Option<&SourceLocation>) {
        self.push(Severity::Info, message.into(), location);
    }

    pub fn debug(&mut self, message: impl Into<String>, location: Option<&SourceLocation>) {
        self.push(Severity::Debug, message.into(), location);
    }

    fn push(&mut self, severity: Severity, message: String, location: Option<&SourceLocation>) {
        let at = location.map(ToString::to_string).unwrap_or_default();
        match severity {
            Severity::Error => tracing::error!(%at, "{}", message),
            Severity::Warning => tracing::warn!(%at, "{}", message),
            Severity::Info => tracing::info!(%at, "{}", message),
            Severity::Debug => tracing::debug!(%at, "{}", message),
        }
        self.entries.push(Diagnostic {
            severity,
            message,
            location: location.cloned(),
        });
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    pub fn with_severity(&self, severity: Severity) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter().filter(move |d| d.severity == severity)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.with_severity(Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.with_severity(Severity::Warning)
    }

    pub fn error_count(&self) -> usize {
        self.errors().count()
    }

    pub fn warning_count(&self) -> usize {
        self.warnings().count()
    }

    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.entries
    }
}
