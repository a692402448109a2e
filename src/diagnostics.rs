//! Shared diagnostics and structured log events.
//!
//! Non-fatal findings flow through these types on the event bus and the
//! diagnostics sink; fatal failures use [`crate::errors::DtifxError`]. The
//! category set is closed so reporters can route events without string
//! matching on free text.

use std::fmt;

use colored::Colorize;
use serde::{Deserialize, Serialize};

use crate::pointer::TokenPointer;

/// Severity ladder for diagnostics. `Error` aborts the run when raised by
/// the resolver; lower severities are reported and carried through.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }

    /// Format the severity as a coloured tag for terminal display.
    pub fn to_color_str(self) -> String {
        match self {
            Severity::Info => self.as_str().cyan().to_string(),
            Severity::Warning => self.as_str().yellow().bold().to_string(),
            Severity::Error => self.as_str().red().bold().to_string(),
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Closed category set shared across subsystems.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum DiagnosticCategory {
    #[serde(rename = "reporting")]
    Reporting,
    #[serde(rename = "reporting.cli")]
    ReportingCli,
    #[serde(rename = "token-source")]
    TokenSource,
    #[serde(rename = "token-source.parser")]
    TokenSourceParser,
    #[serde(rename = "token-source.session")]
    TokenSourceSession,
    #[serde(rename = "token-source.git")]
    TokenSourceGit,
    #[serde(rename = "pipeline")]
    Pipeline,
    #[serde(rename = "pipeline.transform")]
    PipelineTransform,
    #[serde(rename = "pipeline.format")]
    PipelineFormat,
    #[serde(rename = "policy")]
    Policy,
    #[serde(rename = "diff")]
    Diff,
}

impl DiagnosticCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticCategory::Reporting => "reporting",
            DiagnosticCategory::ReportingCli => "reporting.cli",
            DiagnosticCategory::TokenSource => "token-source",
            DiagnosticCategory::TokenSourceParser => "token-source.parser",
            DiagnosticCategory::TokenSourceSession => "token-source.session",
            DiagnosticCategory::TokenSourceGit => "token-source.git",
            DiagnosticCategory::Pipeline => "pipeline",
            DiagnosticCategory::PipelineTransform => "pipeline.transform",
            DiagnosticCategory::PipelineFormat => "pipeline.format",
            DiagnosticCategory::Policy => "policy",
            DiagnosticCategory::Diff => "diff",
        }
    }
}

impl fmt::Display for DiagnosticCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A structured diagnostic reused across planner, resolver, policy and diff
/// subsystems. Serialises into the report payloads as-is.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiagnosticEvent {
    pub severity: Severity,
    /// Subsystem that raised the diagnostic, e.g. `planner`, `resolver`.
    pub scope: String,
    /// Stable machine code, e.g. `layer`, `DTIF4010`.
    pub code: String,
    pub category: DiagnosticCategory,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pointer: Option<TokenPointer>,
    /// Source span text when the parser can provide one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related: Vec<String>,
}

impl DiagnosticEvent {
    pub fn new(
        severity: Severity,
        scope: impl Into<String>,
        code: impl Into<String>,
        category: DiagnosticCategory,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            scope: scope.into(),
            code: code.into(),
            category,
            message: message.into(),
            pointer: None,
            span: None,
            related: Vec::new(),
        }
    }

    pub fn with_pointer(mut self, pointer: TokenPointer) -> Self {
        self.pointer = Some(pointer);
        self
    }

    pub fn with_related(mut self, related: Vec<String>) -> Self {
        self.related = related;
        self
    }

    /// One-line human rendering with coloured severity.
    pub fn to_display_line(&self) -> String {
        let location = self
            .pointer
            .as_ref()
            .map(|p| format!(" at {p}"))
            .unwrap_or_default();
        format!(
            "[{}] {} ({}): {}{}",
            self.severity.to_color_str(),
            self.code,
            self.category,
            self.message,
            location
        )
    }
}

/// Structured log event emitted on the event bus for stage lifecycle and
/// report payloads.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogEvent {
    pub level: LogLevel,
    /// Logical emitter, e.g. `dtifx.pipeline`.
    pub name: String,
    /// Event identifier, e.g. `build.completed`, `audit.failed`.
    pub event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// Log levels for [`LogEvent`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl LogEvent {
    pub fn info(name: impl Into<String>, event: impl Into<String>) -> Self {
        Self {
            level: LogLevel::Info,
            name: name.into(),
            event: event.into(),
            elapsed_ms: None,
            context: None,
            data: None,
        }
    }

    pub fn error(name: impl Into<String>, event: impl Into<String>) -> Self {
        Self {
            level: LogLevel::Error,
            ..Self::info(name, event)
        }
    }

    pub fn with_elapsed(mut self, elapsed_ms: u64) -> Self {
        self.elapsed_ms = Some(elapsed_ms);
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{DiagnosticCategory, DiagnosticEvent, LogEvent, Severity};
    use crate::pointer::TokenPointer;

    /// Categories serialise with their dotted wire names.
    #[test]
    fn category_wire_names() {
        let text = serde_json::to_string(&DiagnosticCategory::TokenSourceParser).unwrap();
        assert_eq!(text, "\"token-source.parser\"");
    }

    /// Severity ordering lets callers take the max across a set.
    #[test]
    fn severity_is_ordered() {
        assert!(Severity::Error > Severity::Warning);
        assert!(Severity::Warning > Severity::Info);
    }

    /// Optional fields stay out of the serialised event.
    #[test]
    fn diagnostic_serialises_sparsely() {
        let event = DiagnosticEvent::new(
            Severity::Warning,
            "planner",
            "layer",
            DiagnosticCategory::TokenSource,
            "unknown layer",
        );
        let value = serde_json::to_value(&event).unwrap();
        assert!(value.get("pointer").is_none());
        assert!(value.get("related").is_none());
        assert_eq!(value["code"], "layer");
    }

    /// Display line includes code, category and pointer.
    #[test]
    fn display_line_mentions_pointer() {
        let event = DiagnosticEvent::new(
            Severity::Error,
            "resolver",
            "DTIF4010",
            DiagnosticCategory::TokenSourceSession,
            "alias cycle",
        )
        .with_pointer(TokenPointer::new("#/color/a"));
        let line = event.to_display_line();
        assert!(line.contains("DTIF4010"));
        assert!(line.contains("token-source.session"));
        assert!(line.contains("#/color/a"));
    }

    /// Log events carry elapsed time and data payloads when set.
    #[test]
    fn log_event_builders() {
        let event = LogEvent::info("dtifx.pipeline", "build.completed")
            .with_elapsed(42)
            .with_data(json!({"tokens": 40}));
        assert_eq!(event.elapsed_ms, Some(42));
        assert_eq!(event.data.unwrap()["tokens"], 40);
    }
}
