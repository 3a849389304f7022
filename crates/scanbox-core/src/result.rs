//! Typed scan results returned to callers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A 1-based line and column location in a scanned file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// 1-based line number.
    pub line: u32,
    /// 1-based column number.
    pub column: u32,
}

impl Position {
    /// Creates a position.
    #[must_use]
    pub const fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

/// Severity attached to a finding by its rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Severity {
    /// Rule severity `ERROR`.
    Error,
    /// Rule severity `WARNING`.
    Warning,
    /// Rule severity `INFO`.
    Info,
    /// Any other label, kept verbatim.
    Other(String),
}

impl Severity {
    /// Returns the canonical label for this severity.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
            Self::Other(label) => label.as_str(),
        }
    }
}

impl From<String> for Severity {
    fn from(label: String) -> Self {
        match label.to_ascii_lowercase().as_str() {
            "error" => Self::Error,
            "warning" => Self::Warning,
            "info" => Self::Info,
            _ => Self::Other(label),
        }
    }
}

impl From<Severity> for String {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::Other(label) => label,
            known => known.as_str().to_owned(),
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One rule match reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    /// Identifier of the rule that matched.
    pub rule_id: String,
    /// Rule message rendered for this match.
    pub message: String,
    /// Rule severity.
    pub severity: Severity,
    /// Path of the matched file, relative to the scanned tree once normalized.
    pub path: String,
    /// Start of the match.
    pub start: Position,
    /// End of the match.
    pub end: Position,
    /// Matched source lines, when the engine reports them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lines: Option<String>,
}

/// A non-fatal problem reported alongside findings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineDiagnostic {
    /// Engine-defined error category.
    pub kind: String,
    /// Severity label such as `warn` or `error`, when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    /// Human-readable description.
    pub message: String,
    /// File the diagnostic relates to, when any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Rule the diagnostic relates to, when any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
}

/// A file the engine declined to scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedPath {
    /// Skipped file.
    pub path: String,
    /// Why the engine skipped it, when stated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Structured outcome of one scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanResult {
    /// Engine version that produced the result, when reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Rule matches.
    pub findings: Vec<Finding>,
    /// Non-fatal diagnostics.
    pub errors: Vec<EngineDiagnostic>,
    /// Files the engine scanned.
    pub scanned_paths: Vec<String>,
    /// Files the engine skipped.
    pub skipped_paths: Vec<SkippedPath>,
    /// Rules the engine could not apply.
    pub skipped_rules: Vec<String>,
}
