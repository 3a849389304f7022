//! Decoding of the engine's JSON report into [`ScanResult`].
//!
//! The engine report is loosely typed: error `type` fields are either a string
//! or a tagged array, skipped paths may be bare strings or objects, and most
//! sections are optional. The raw shapes below absorb that variation so the
//! public result types stay simple.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::result::{EngineDiagnostic, Finding, Position, ScanResult, Severity, SkippedPath};

const UNKNOWN_KIND: &str = "unknown";

/// Errors raised when engine output cannot be decoded.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The output is empty.
    #[error("engine produced no output")]
    Empty,
    /// The output is not a valid engine report.
    #[error("engine output is not a valid report: {source}")]
    Malformed {
        /// Underlying decoder error.
        #[source]
        source: serde_json::Error,
    },
}

/// Parses engine stdout into a [`ScanResult`].
///
/// # Errors
///
/// Returns [`ParseError::Empty`] for blank output and
/// [`ParseError::Malformed`] when the text is not a JSON report.
pub fn parse_engine_output(raw: &str) -> Result<ScanResult, ParseError> {
    if raw.trim().is_empty() {
        return Err(ParseError::Empty);
    }
    let report: RawReport =
        serde_json::from_str(raw).map_err(|source| ParseError::Malformed { source })?;
    Ok(report.into_result())
}

/// Parses an already decoded JSON value into a [`ScanResult`].
///
/// # Errors
///
/// Returns [`ParseError::Malformed`] when the value is not a report object.
pub fn parse_engine_value(value: Value) -> Result<ScanResult, ParseError> {
    let report: RawReport =
        serde_json::from_value(value).map_err(|source| ParseError::Malformed { source })?;
    Ok(report.into_result())
}

#[derive(Debug, Deserialize)]
struct RawReport {
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    results: Vec<RawFinding>,
    #[serde(default)]
    errors: Vec<RawDiagnostic>,
    #[serde(default)]
    paths: RawPaths,
    #[serde(default)]
    skipped_rules: Vec<Value>,
}

impl RawReport {
    fn into_result(self) -> ScanResult {
        ScanResult {
            version: self.version,
            findings: self.results.into_iter().map(RawFinding::into_finding).collect(),
            errors: self
                .errors
                .into_iter()
                .map(RawDiagnostic::into_diagnostic)
                .collect(),
            scanned_paths: self.paths.scanned,
            skipped_paths: self
                .paths
                .skipped
                .into_iter()
                .map(RawSkipped::into_skipped)
                .collect(),
            skipped_rules: self
                .skipped_rules
                .into_iter()
                .filter_map(skipped_rule_id)
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawFinding {
    check_id: String,
    path: String,
    #[serde(default)]
    start: RawPosition,
    #[serde(default)]
    end: RawPosition,
    #[serde(default)]
    extra: RawExtra,
}

impl RawFinding {
    fn into_finding(self) -> Finding {
        Finding {
            rule_id: self.check_id,
            message: self.extra.message,
            severity: Severity::from(self.extra.severity),
            path: self.path,
            start: self.start.into(),
            end: self.end.into(),
            lines: self.extra.lines,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawPosition {
    #[serde(default)]
    line: u32,
    #[serde(default)]
    col: u32,
}

impl From<RawPosition> for Position {
    fn from(raw: RawPosition) -> Self {
        Self::new(raw.line, raw.col)
    }
}

#[derive(Debug, Deserialize)]
struct RawExtra {
    #[serde(default)]
    message: String,
    #[serde(default = "default_severity")]
    severity: String,
    #[serde(default)]
    lines: Option<String>,
}

impl Default for RawExtra {
    fn default() -> Self {
        Self {
            message: String::new(),
            severity: default_severity(),
            lines: None,
        }
    }
}

fn default_severity() -> String {
    String::from("info")
}

#[derive(Debug, Deserialize)]
struct RawDiagnostic {
    #[serde(default, rename = "type")]
    kind: Value,
    #[serde(default)]
    level: Option<String>,
    #[serde(default)]
    message: String,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    rule_id: Option<String>,
}

impl RawDiagnostic {
    fn into_diagnostic(self) -> EngineDiagnostic {
        EngineDiagnostic {
            kind: diagnostic_kind(&self.kind),
            level: self.level,
            message: self.message,
            path: self.path,
            rule_id: self.rule_id,
        }
    }
}

fn diagnostic_kind(value: &Value) -> String {
    match value {
        Value::String(kind) => kind.clone(),
        Value::Array(items) => items
            .first()
            .and_then(Value::as_str)
            .unwrap_or(UNKNOWN_KIND)
            .to_owned(),
        _ => UNKNOWN_KIND.to_owned(),
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawPaths {
    #[serde(default)]
    scanned: Vec<String>,
    #[serde(default)]
    skipped: Vec<RawSkipped>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawSkipped {
    Bare(String),
    Detailed {
        path: String,
        #[serde(default)]
        reason: Option<String>,
    },
}

impl RawSkipped {
    fn into_skipped(self) -> SkippedPath {
        match self {
            Self::Bare(path) => SkippedPath { path, reason: None },
            Self::Detailed { path, reason } => SkippedPath { path, reason },
        }
    }
}

fn skipped_rule_id(value: Value) -> Option<String> {
    match value {
        Value::String(id) => Some(id),
        Value::Object(map) => map
            .get("rule_id")
            .and_then(Value::as_str)
            .map(str::to_owned),
        _ => None,
    }
}

#[cfg(test)]
mod tests;
